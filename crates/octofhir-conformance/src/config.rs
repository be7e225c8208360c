use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConformanceConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub run: RunSettings,
    /// OAuth client registration used by the launch checks
    #[serde(default)]
    pub smart: SmartSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ConformanceConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        let url = url::Url::parse(&self.server.base_url)
            .map_err(|e| format!("server.base_url is not a valid URL: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err("server.base_url must use http or https".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        // Run validations
        if self.run.max_reference_resolutions == 0 {
            return Err("run.max_reference_resolutions must be > 0".into());
        }
        if self.run.max_pages == 0 {
            return Err("run.max_pages must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// FHIR base URL of the server under test
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8888/fhir".into()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bearer_token: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    #[serde(default)]
    pub patient_ids: Vec<String>,
    /// Resource types to run; empty runs every suite
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default = "default_max_reference_resolutions")]
    pub max_reference_resolutions: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_max_reference_resolutions() -> usize {
    50
}
fn default_max_pages() -> usize {
    20
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            patient_ids: Vec::new(),
            resources: Vec::new(),
            max_reference_resolutions: default_max_reference_resolutions(),
            max_pages: default_max_pages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartSettings {
    #[serde(default)]
    pub client_id: Option<String>,
    /// Present for confidential clients, which authenticate with HTTP Basic
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: String,
    /// Overrides the discovered authorization endpoint
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    /// Overrides the discovered token endpoint
    #[serde(default)]
    pub token_endpoint: Option<String>,
    /// Accept plain-http OAuth endpoints (local test servers only)
    #[serde(default)]
    pub allow_insecure_endpoints: bool,
}

fn default_scopes() -> String {
    "launch/patient openid fhirUser offline_access patient/*.read".into()
}

impl Default for SmartSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            scopes: default_scopes(),
            authorization_endpoint: None,
            token_endpoint: None,
            allow_insecure_endpoints: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::ConformanceConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "octofhir-conformance.toml";

    pub fn load_config(path: Option<&str>) -> Result<ConformanceConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if !pathbuf.exists() {
                    return Err(format!("config file not found: {p}"));
                }
                builder = builder.add_source(File::from(pathbuf));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., OCTOFHIR__SERVER__BASE_URL=https://...
        builder = builder.add_source(
            Environment::with_prefix("OCTOFHIR")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("run.patient_ids")
                .with_list_parse_key("run.resources"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: ConformanceConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = ConformanceConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.run.max_reference_resolutions, 50);
        assert_eq!(cfg.run.max_pages, 20);
        assert_eq!(cfg.server.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validation_rules() {
        let mut cfg = ConformanceConfig::default();
        cfg.server.base_url = "ftp://example.org/fhir".into();
        assert!(cfg.validate().unwrap_err().contains("http or https"));

        let mut cfg = ConformanceConfig::default();
        cfg.server.base_url = "not a url".into();
        assert!(cfg.validate().unwrap_err().contains("server.base_url"));

        let mut cfg = ConformanceConfig::default();
        cfg.run.max_reference_resolutions = 0;
        assert!(cfg.validate().unwrap_err().contains("max_reference_resolutions"));

        let mut cfg = ConformanceConfig::default();
        cfg.run.max_pages = 0;
        assert!(cfg.validate().unwrap_err().contains("max_pages"));

        let mut cfg = ConformanceConfig::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().unwrap_err().contains("logging.level"));
    }
}
