use anyhow::Result;
use octofhir_conformance::us_core;

use crate::cli::OutputFormat;
use crate::output::print_resources;

pub fn list(format: OutputFormat) -> Result<()> {
    print_resources(&us_core::descriptors(), format)
}
