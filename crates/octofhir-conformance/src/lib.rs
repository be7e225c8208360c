//! # octofhir-conformance
//!
//! Conformance checks for FHIR servers implementing the US Core profiles and
//! the SMART App Launch framework.
//!
//! ## Modules
//!
//! - [`client`] - REST client that records every exchange a check makes
//! - [`capability`] - What the server's CapabilityStatement declares
//! - [`descriptor`] - Per-profile test descriptors
//! - [`us_core`] - The US Core descriptor table and required value sets
//! - [`search`] - Search execution, status fallback and reply validation
//! - [`runner`] - Runs the per-resource suites in reference order
//! - [`validation`] - Profile and terminology validation seams
//! - [`smart`] - Endpoint discovery, launch sequence and restricted access
//! - [`session`] - Test-session state and its stores
//! - [`outcome`] - Check outcomes and reports
//! - [`config`] - Layered configuration

pub mod capability;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod outcome;
pub mod runner;
pub mod search;
pub mod session;
pub mod smart;
pub mod us_core;
pub mod validation;

pub use capability::{CapabilitySummary, fetch_capabilities};
pub use client::{AuthHeader, FhirClient, FhirResponse, SearchParams};
pub use config::{ConformanceConfig, RunSettings, ServerSettings, SmartSettings};
pub use descriptor::{ResourceDescriptor, SearchStrategy};
pub use error::{ClientError, SessionError};
pub use outcome::{CheckAbort, CheckReport, CheckResult, Outcome, RunReport, SuiteReport, Warnings};
pub use runner::ConformanceRunner;
pub use session::{FileSessionStore, InMemorySessionStore, SessionStore, TestSession};
pub use validation::{ProfileValidator, StructuralValidator, TerminologyValidator};
