use anyhow::{Context, Result};
use octofhir_conformance::smart::run_restricted;
use octofhir_conformance::{ConformanceConfig, SessionStore, us_core};

use crate::cli::OutputFormat;
use crate::config::{make_client, session_store};
use crate::output::print_suite;

/// Returns whether any check failed.
pub async fn restricted(
    cfg: &ConformanceConfig,
    session_name: &str,
    format: OutputFormat,
) -> Result<bool> {
    let store = session_store()?;
    let session = store.load(session_name).await.with_context(|| {
        format!("No session named {session_name}; run `launch authorize` and `launch callback` first")
    })?;
    let client = make_client(cfg)?;
    let suite = run_restricted(&client, &session, &us_core::descriptors()).await;
    print_suite(&suite, format)?;
    Ok(suite.has_failures())
}
