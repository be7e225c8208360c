//! Finding the OAuth endpoints of the server under test.
//!
//! `[base]/.well-known/smart-configuration` is tried first; servers that do
//! not publish it may still advertise the endpoints through the
//! `oauth-uris` extension of their CapabilityStatement.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::client::FhirClient;
use crate::config::SmartSettings;
use crate::error::ClientError;

const OAUTH_URIS_EXTENSION: &str =
    "http://fhir-registry.smarthealthit.org/StructureDefinition/oauth-uris";

/// The fields of a SMART configuration document the launch checks use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmartConfiguration {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} is not a valid SMART configuration: {source}")]
    InvalidDocument {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no {0} was configured or discovered")]
    MissingEndpoint(&'static str),
}

/// Endpoints the launch sequence talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartEndpoints {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub capabilities: Vec<String>,
}

/// Fetch and parse `[base]/.well-known/smart-configuration`.
pub async fn fetch_smart_configuration(
    client: &FhirClient,
) -> Result<SmartConfiguration, DiscoveryError> {
    let url = format!("{}/.well-known/smart-configuration", client.base_url());
    let response = client.get_url(&url).await?;
    if !response.is_success() {
        return Err(DiscoveryError::Status {
            url,
            status: response.status,
        });
    }
    serde_json::from_str(&response.body)
        .map_err(|source| DiscoveryError::InvalidDocument { url, source })
}

/// `authorize` and `token` URIs from a CapabilityStatement's security extension.
pub fn endpoints_from_capability_statement(statement: &Value) -> (Option<String>, Option<String>) {
    let uris = statement
        .get("rest")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|rest| rest.get("security")?.get("extension")?.as_array())
        .flatten()
        .filter(|ext| ext.get("url").and_then(Value::as_str) == Some(OAUTH_URIS_EXTENSION))
        .filter_map(|ext| ext.get("extension")?.as_array())
        .flatten();

    let (mut authorize, mut token) = (None, None);
    for uri in uris {
        let value = uri.get("valueUri").and_then(Value::as_str).map(str::to_string);
        match uri.get("url").and_then(Value::as_str) {
            Some("authorize") => authorize = authorize.or(value),
            Some("token") => token = token.or(value),
            _ => {}
        }
    }
    (authorize, token)
}

/// Resolve the endpoints, preferring configured values over discovery.
pub async fn discover_endpoints(
    client: &FhirClient,
    settings: &SmartSettings,
) -> Result<SmartEndpoints, DiscoveryError> {
    if let (Some(authorization_endpoint), Some(token_endpoint)) =
        (&settings.authorization_endpoint, &settings.token_endpoint)
    {
        return Ok(SmartEndpoints {
            authorization_endpoint: authorization_endpoint.clone(),
            token_endpoint: token_endpoint.clone(),
            capabilities: Vec::new(),
        });
    }

    let discovered = match fetch_smart_configuration(client).await {
        Ok(configuration) => configuration,
        Err(err) => {
            tracing::warn!(error = %err, "SMART configuration unavailable, trying CapabilityStatement");
            let response = client.metadata().await?;
            let statement: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
            let (authorize, token) = endpoints_from_capability_statement(&statement);
            SmartConfiguration {
                authorization_endpoint: authorize,
                token_endpoint: token,
                ..Default::default()
            }
        }
    };

    Ok(SmartEndpoints {
        authorization_endpoint: settings
            .authorization_endpoint
            .clone()
            .or(discovered.authorization_endpoint)
            .ok_or(DiscoveryError::MissingEndpoint("authorization_endpoint"))?,
        token_endpoint: settings
            .token_endpoint
            .clone()
            .or(discovered.token_endpoint)
            .ok_or(DiscoveryError::MissingEndpoint("token_endpoint"))?,
        capabilities: discovered.capabilities,
    })
}
