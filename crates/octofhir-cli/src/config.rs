use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use octofhir_conformance::client::AuthHeader;
use octofhir_conformance::config::loader::load_config;
use octofhir_conformance::{ConformanceConfig, FhirClient, FileSessionStore};

use crate::cli::Cli;

/// Load the layered config and apply the global flags on top.
pub fn resolve(cli: &Cli) -> Result<ConformanceConfig> {
    let mut cfg = load_config(cli.config.as_deref()).map_err(|e| anyhow!(e))?;
    if let Some(server) = &cli.server {
        cfg.server.base_url = server.trim_end_matches('/').to_string();
    }
    if let Some(token) = &cli.token {
        cfg.server.bearer_token = Some(token.clone());
    }
    cfg.validate()
        .map_err(|e| anyhow!(e))
        .context("Invalid configuration after applying command-line flags")?;
    Ok(cfg)
}

pub fn make_client(cfg: &ConformanceConfig) -> Result<FhirClient> {
    let auth = cfg
        .server
        .bearer_token
        .clone()
        .map(|token| AuthHeader::Bearer { token });
    FhirClient::new(&cfg.server.base_url, cfg.server.request_timeout(), auth)
        .context("Failed to build HTTP client")
}

/// Sessions live under `~/.octofhir/conformance/`.
pub fn session_store() -> Result<FileSessionStore> {
    let dir: PathBuf = dirs::home_dir()
        .context("Cannot determine home directory")?
        .join(".octofhir")
        .join("conformance");
    Ok(FileSessionStore::new(dir))
}
