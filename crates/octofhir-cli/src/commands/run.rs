use anyhow::{Result, bail};
use colored::Colorize;
use octofhir_conformance::{
    ConformanceConfig, ConformanceRunner, ResourceDescriptor, SessionStore, TestSession, us_core,
};

use crate::cli::{OutputFormat, RunArgs};
use crate::config::{make_client, session_store};
use crate::output::print_report;

fn select_descriptors(names: &[String]) -> Result<Vec<ResourceDescriptor>> {
    if names.is_empty() {
        return Ok(us_core::descriptors());
    }
    let mut selected: Vec<ResourceDescriptor> = Vec::new();
    for name in names {
        let matches = us_core::select(name);
        if matches.is_empty() {
            bail!("Unknown resource type or profile: {name}. Run `resources` to list them");
        }
        for descriptor in matches {
            if !selected.iter().any(|d| d.profile_url == descriptor.profile_url) {
                selected.push(descriptor);
            }
        }
    }
    Ok(selected)
}

/// Returns whether any check failed.
pub async fn run(
    cfg: &ConformanceConfig,
    args: &RunArgs,
    session_name: &str,
    format: OutputFormat,
) -> Result<bool> {
    let resources = if args.resources.is_empty() {
        &cfg.run.resources
    } else {
        &args.resources
    };
    let descriptors = select_descriptors(resources)?;

    let store = session_store()?;
    let mut session = match store.load(session_name).await {
        Ok(session) if session.base_url == cfg.server.base_url => session,
        _ => TestSession::with_id(session_name, &cfg.server.base_url),
    };
    let patients = if args.patients.is_empty() {
        &cfg.run.patient_ids
    } else {
        &args.patients
    };
    for patient in patients {
        session.add_patient(patient);
    }
    if session.patient_ids.is_empty() {
        eprintln!(
            "{} no patient ids given; patient searches will be skipped",
            "warning:".yellow()
        );
    }

    let mut client = make_client(cfg)?;
    if cfg.server.bearer_token.is_none() {
        if let Some(token) = &session.access_token {
            tracing::info!(session = %session.id, "using access token from the session");
            client = client.with_bearer(token);
        }
    }

    let runner = ConformanceRunner::discover(client, cfg.run.clone()).await;
    let report = runner.run(&descriptors, &mut session).await;
    store.save(&session).await?;

    print_report(&report, format)?;
    Ok(report.has_failures())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_descriptors() {
        assert_eq!(
            select_descriptors(&[]).unwrap().len(),
            us_core::descriptors().len()
        );
        let selected =
            select_descriptors(&["Observation".into(), "us-core-observation-lab".into()]).unwrap();
        assert_eq!(selected.len(), 5);
        assert!(select_descriptors(&["Spaceship".into()]).is_err());
    }
}
