use anyhow::Result;
use colored::Colorize;
use octofhir_conformance::{Outcome, ResourceDescriptor, RunReport, SearchStrategy, SuiteReport};
use serde_json::json;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Table => {
            for suite in &report.suites {
                print_suite_table(suite);
            }
            println!(
                "{}: {}",
                "Total".cyan(),
                summary(|outcome| report.count(outcome))
            );
        }
    }
    Ok(())
}

pub fn print_suite(suite: &SuiteReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(suite)?),
        OutputFormat::Table => print_suite_table(suite),
    }
    Ok(())
}

fn print_suite_table(suite: &SuiteReport) {
    println!("{}", suite.name.bold());
    let mut builder = Builder::default();
    builder.push_record(["Check", "Outcome", "Message"]);
    for check in &suite.checks {
        let mut message = check.message.clone().unwrap_or_default();
        for warning in &check.warnings {
            if !message.is_empty() {
                message.push('\n');
            }
            message.push_str("warning: ");
            message.push_str(warning);
        }
        builder.push_record([check.id.clone(), check.outcome.to_string(), message]);
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!("{table}");
    println!("  {}\n", summary(|outcome| suite.count(outcome)));
}

fn summary(count: impl Fn(Outcome) -> usize) -> String {
    format!(
        "{} passed, {} failed, {} skipped, {} omitted",
        count(Outcome::Pass).to_string().green(),
        count(Outcome::Fail).to_string().red(),
        count(Outcome::Skip).to_string().yellow(),
        count(Outcome::Omit),
    )
}

pub fn print_resources(descriptors: &[ResourceDescriptor], format: OutputFormat) -> Result<()> {
    let rows: Vec<[String; 4]> = descriptors
        .iter()
        .map(|d| {
            let search = match d.strategy {
                SearchStrategy::ByPatient => d.first_search.label(),
                SearchStrategy::ByReference => "(by reference)".to_string(),
            };
            [
                d.type_name().to_string(),
                d.key().to_string(),
                search,
                d.profile_url.clone(),
            ]
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let value: Vec<_> = rows
                .iter()
                .map(|[resource_type, key, search, profile]| {
                    json!({
                        "resourceType": resource_type,
                        "name": key,
                        "firstSearch": search,
                        "profile": profile,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Table => {
            let mut builder = Builder::default();
            builder.push_record(["ResourceType", "Name", "First search", "Profile"]);
            for row in rows {
                builder.push_record(row);
            }
            println!("{}", builder.build().with(Style::rounded()));
        }
    }
    Ok(())
}
