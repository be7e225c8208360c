//! What the server's CapabilityStatement declares.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::client::FhirClient;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceCapability {
    pub interactions: HashSet<String>,
    pub search_params: HashSet<String>,
    pub rev_includes: HashSet<String>,
}

/// Per-resource summary of `rest[mode=server].resource`.
///
/// A summary built without a statement answers every question with `true`.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySummary {
    resources: HashMap<String, ResourceCapability>,
    known: bool,
}

impl CapabilitySummary {
    pub fn from_statement(statement: &Value) -> Self {
        let mut resources = HashMap::new();
        let rests = statement
            .get("rest")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|rest| rest.get("mode").and_then(Value::as_str).unwrap_or("server") == "server");

        for rest in rests {
            for resource in rest
                .get("resource")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let Some(resource_type) = resource.get("type").and_then(Value::as_str) else {
                    continue;
                };
                let entry: &mut ResourceCapability =
                    resources.entry(resource_type.to_string()).or_default();
                entry.interactions.extend(strings_at(resource, "interaction", Some("code")));
                entry.search_params.extend(strings_at(resource, "searchParam", Some("name")));
                entry.rev_includes.extend(strings_at(resource, "searchRevInclude", None));
            }
        }

        Self {
            resources,
            known: true,
        }
    }

    /// Summary used when no statement could be fetched.
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn is_known(&self) -> bool {
        self.known
    }

    pub fn resource(&self, resource_type: &str) -> Option<&ResourceCapability> {
        self.resources.get(resource_type)
    }

    pub fn supports_resource(&self, resource_type: &str) -> bool {
        !self.known || self.resources.contains_key(resource_type)
    }

    pub fn supports_interaction(&self, resource_type: &str, interaction: &str) -> bool {
        !self.known
            || self
                .resource(resource_type)
                .is_some_and(|r| r.interactions.contains(interaction))
    }

    /// Whether every parameter of a search combination is declared.
    pub fn documents_search(&self, resource_type: &str, params: &[&str]) -> bool {
        !self.known
            || self.resource(resource_type).is_some_and(|r| {
                params.iter().all(|p| r.search_params.contains(*p))
            })
    }

    pub fn supports_revinclude(&self, resource_type: &str, rev_include: &str) -> bool {
        !self.known
            || self
                .resource(resource_type)
                .is_some_and(|r| r.rev_includes.contains(rev_include))
    }
}

fn strings_at(resource: &Value, key: &str, field: Option<&str>) -> Vec<String> {
    resource
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| match field {
            Some(field) => item.get(field).and_then(Value::as_str),
            None => item.as_str(),
        })
        .map(str::to_string)
        .collect()
}

/// Fetch `[base]/metadata`. On any problem the permissive summary is
/// returned together with a warning describing why.
pub async fn fetch_capabilities(client: &FhirClient) -> (CapabilitySummary, Option<String>) {
    let response = match client.metadata().await {
        Ok(response) => response,
        Err(e) => {
            return (
                CapabilitySummary::permissive(),
                Some(format!("Could not fetch CapabilityStatement: {e}")),
            );
        }
    };
    if !response.is_success() {
        return (
            CapabilitySummary::permissive(),
            Some(format!(
                "CapabilityStatement request returned HTTP {}",
                response.status
            )),
        );
    }
    match serde_json::from_str::<Value>(&response.body) {
        Ok(statement)
            if statement.get("resourceType").and_then(Value::as_str)
                == Some("CapabilityStatement") =>
        {
            let summary = CapabilitySummary::from_statement(&statement);
            tracing::debug!(resources = summary.resources.len(), "capability statement loaded");
            (summary, None)
        }
        _ => (
            CapabilitySummary::permissive(),
            Some("metadata response is not a CapabilityStatement".into()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn statement() -> Value {
        json!({
            "resourceType": "CapabilityStatement",
            "rest": [{
                "mode": "server",
                "resource": [{
                    "type": "Condition",
                    "interaction": [{"code": "read"}, {"code": "search-type"}],
                    "searchParam": [
                        {"name": "patient", "type": "reference"},
                        {"name": "category", "type": "token"}
                    ],
                    "searchRevInclude": ["Provenance:target"]
                }, {
                    "type": "Patient",
                    "interaction": [{"code": "read"}, {"code": "vread"}, {"code": "history-instance"}]
                }]
            }]
        })
    }

    #[test]
    fn test_summary_queries() {
        let summary = CapabilitySummary::from_statement(&statement());
        assert!(summary.supports_resource("Condition"));
        assert!(!summary.supports_resource("Goal"));
        assert!(summary.supports_interaction("Patient", "vread"));
        assert!(!summary.supports_interaction("Condition", "vread"));
        assert!(summary.documents_search("Condition", &["patient", "category"]));
        assert!(!summary.documents_search("Condition", &["patient", "clinical-status"]));
        assert!(summary.supports_revinclude("Condition", "Provenance:target"));
        assert!(!summary.supports_revinclude("Patient", "Provenance:target"));
    }

    #[test]
    fn test_permissive_summary() {
        let summary = CapabilitySummary::permissive();
        assert!(!summary.is_known());
        assert!(summary.supports_interaction("Goal", "history-instance"));
        assert!(summary.documents_search("Goal", &["patient"]));
    }

    #[tokio::test]
    async fn test_fetch_falls_back_with_warning() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = FhirClient::new(&server.uri(), Duration::from_secs(5), None).unwrap();
        let (summary, warning) = fetch_capabilities(&client).await;
        assert!(!summary.is_known());
        assert_eq!(
            warning.as_deref(),
            Some("CapabilityStatement request returned HTTP 500")
        );
    }

    #[tokio::test]
    async fn test_fetch_parses_statement() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata"))
            .respond_with(ResponseTemplate::new(200).set_body_json(statement()))
            .mount(&server)
            .await;

        let client = FhirClient::new(&server.uri(), Duration::from_secs(5), None).unwrap();
        let (summary, warning) = fetch_capabilities(&client).await;
        assert!(warning.is_none());
        assert!(summary.is_known());
        assert!(summary.supports_interaction("Condition", "search-type"));
    }
}
