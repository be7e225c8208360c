pub mod bundle;
pub mod element_path;
pub mod error;
pub mod fhir;
pub mod fhir_reference;
pub mod search_value;
pub mod time;

pub use element_path::{resolve, resolve_all, resolve_first, split_escaped_commas};
pub use error::{CoreError, Result};
pub use fhir::ResourceType;
pub use fhir_reference::{FhirReference, UnresolvableReference, collect_references, parse_reference};
pub use search_value::{SearchParamType, resource_matches, search_value};
pub use time::{Comparator, DateRange, FhirDateTime, comparator_value};
