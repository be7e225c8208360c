//! Access checks with a token whose scopes cover only part of the record.

use octofhir_core::ResourceType;
use octofhir_core::bundle::is_operation_outcome;
use serde_json::Value;

use crate::client::{FhirClient, FhirResponse, SearchParams};
use crate::descriptor::ResourceDescriptor;
use crate::outcome::{CheckReport, CheckResult, SuiteReport, Warnings, ensure, fail};
use crate::session::TestSession;
use crate::smart::scopes::partition_access;

const SUITE: &str = "restricted";

/// Parameters servers commonly insist on, keyed by resource type.
const FALLBACK_PARAMS: [(&str, &str, &str); 6] = [
    ("CarePlan", "category", "assess-plan"),
    ("Observation", "category", "laboratory"),
    ("DiagnosticReport", "category", "LAB"),
    ("MedicationRequest", "intent", "order"),
    ("Condition", "clinical-status", "active"),
    ("AllergyIntolerance", "clinical-status", "active"),
];

/// Extra search parameter for retrying a rejected search of `resource_type`.
pub fn fallback_param(
    resource_type: &str,
    descriptors: &[ResourceDescriptor],
) -> Option<(String, String)> {
    if let Some((_, name, value)) = FALLBACK_PARAMS.iter().find(|(t, ..)| *t == resource_type) {
        return Some((name.to_string(), value.to_string()));
    }
    descriptors
        .iter()
        .filter(|d| d.type_name() == resource_type)
        .find_map(|d| {
            let status = d.status_search.as_ref()?;
            Some((status.param.clone(), status.values.first()?.clone()))
        })
}

/// Patient-compartment types the access checks cover.
pub fn restricted_types() -> impl Iterator<Item = &'static str> {
    ResourceType::PATIENT_COMPARTMENT.iter().map(ResourceType::as_str)
}

fn rejected_with_outcome(response: &FhirResponse) -> bool {
    response.status == 400
        && serde_json::from_str::<Value>(&response.body).is_ok_and(|body| is_operation_outcome(&body))
}

/// Run the restricted-access suite with the token stored in `session`.
pub async fn run_restricted(
    client: &FhirClient,
    session: &TestSession,
    descriptors: &[ResourceDescriptor],
) -> SuiteReport {
    let mut suite = SuiteReport::new("Restricted Resource Type Access");

    let precondition = match (
        session.access_token.as_deref(),
        session.received_scopes.as_deref(),
        session.patient_ids.first(),
    ) {
        (Some(token), Some(scopes), Some(patient)) => Ok((token, scopes, patient.as_str())),
        (None, ..) => Err("No access token was received in this session"),
        (_, None, _) => Err("No scopes were received in this session"),
        (.., None) => Err("No patient id is known in this session"),
    };
    let (token, scopes, patient) = match precondition {
        Ok(found) => found,
        Err(reason) => {
            suite.push(CheckReport::skipped(
                format!("{SUITE}::restriction"),
                "Received scopes restrict access",
                reason,
            ));
            for resource_type in restricted_types() {
                suite.push(CheckReport::skipped(
                    format!("{SUITE}::{resource_type}"),
                    format!("Access to {resource_type} matches the granted scopes"),
                    reason,
                ));
            }
            return suite;
        }
    };

    let (granted, denied) = partition_access(restricted_types(), scopes);
    tracing::info!(granted = ?granted, denied = ?denied, "restricted access");
    suite.push(CheckReport::finish(
        format!("{SUITE}::restriction"),
        "Received scopes restrict access",
        ensure(
            !denied.is_empty(),
            format!("Received scopes grant access to every resource type: {scopes}"),
        ),
        Warnings::default(),
        Vec::new(),
    ));

    let client = client.with_bearer(token);
    client.take_requests();
    for resource_type in restricted_types() {
        let is_granted = granted.iter().any(|g| g == resource_type);
        let result = check_access(&client, resource_type, patient, is_granted, descriptors).await;
        suite.push(CheckReport::finish(
            format!("{SUITE}::{resource_type}"),
            format!("Access to {resource_type} matches the granted scopes"),
            result,
            Warnings::default(),
            client.take_requests(),
        ));
    }
    suite
}

async fn check_access(
    client: &FhirClient,
    resource_type: &str,
    patient: &str,
    granted: bool,
    descriptors: &[ResourceDescriptor],
) -> CheckResult {
    let mut params = SearchParams::new();
    if resource_type == "Patient" {
        params.insert("_id".into(), patient.into());
    } else {
        params.insert("patient".into(), patient.into());
    }

    let mut response = client.search(resource_type, &params).await?;
    if !granted {
        return response.ensure_status_in(&[401, 403]);
    }

    if rejected_with_outcome(&response) {
        let Some((name, value)) = fallback_param(resource_type, descriptors) else {
            return fail(format!(
                "Server rejected the {resource_type} search and no fallback parameter is known"
            ));
        };
        tracing::debug!(resource_type, param = %name, "retrying search with fallback parameter");
        params.insert(name, value);
        response = client.search(resource_type, &params).await?;
    }
    ensure(
        response.is_success(),
        format!(
            "Bad response code: expected 2xx, but found {}",
            response.status
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Outcome;
    use crate::us_core;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(scopes: &str) -> TestSession {
        let mut session = TestSession::with_id("s", "http://unused");
        session.access_token = Some("at-1".into());
        session.received_scopes = Some(scopes.into());
        session.add_patient("85");
        session
    }

    fn searchset() -> serde_json::Value {
        json!({"resourceType": "Bundle", "type": "searchset", "entry": []})
    }

    #[test]
    fn test_fallback_params() {
        let descriptors = us_core::descriptors();
        assert_eq!(
            fallback_param("CarePlan", &descriptors),
            Some(("category".into(), "assess-plan".into()))
        );
        assert_eq!(
            fallback_param("MedicationRequest", &descriptors),
            Some(("intent".into(), "order".into()))
        );
        let (name, _) = fallback_param("Encounter", &descriptors).unwrap();
        assert_eq!(name, "status");
        assert_eq!(fallback_param("Patient", &descriptors), None);
        assert_eq!(restricted_types().count(), 14);
    }

    #[tokio::test]
    async fn test_granted_and_denied_types() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Patient"))
            .and(query_param("_id", "85"))
            .and(header("authorization", "Bearer at-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(searchset()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Observation"))
            .and(query_param("category", "laboratory"))
            .respond_with(ResponseTemplate::new(200).set_body_json(searchset()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Observation"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "resourceType": "OperationOutcome",
                "issue": [{"severity": "error", "code": "required", "diagnostics": "category is required"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = FhirClient::new(&server.uri(), Duration::from_secs(5), None).unwrap();
        let suite = run_restricted(
            &client,
            &session("launch/patient patient/Patient.read patient/Observation.read"),
            &us_core::descriptors(),
        )
        .await;

        assert_eq!(suite.checks.len(), 15);
        for check in &suite.checks {
            assert_eq!(check.outcome, Outcome::Pass, "{check:?}");
        }
        assert_eq!(suite.check("::Observation").unwrap().requests.len(), 2);
    }

    #[tokio::test]
    async fn test_denied_type_that_returns_data_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(searchset()))
            .mount(&server)
            .await;

        let client = FhirClient::new(&server.uri(), Duration::from_secs(5), None).unwrap();
        let suite = run_restricted(
            &client,
            &session("patient/Patient.read"),
            &us_core::descriptors(),
        )
        .await;

        assert_eq!(suite.check("::Patient").unwrap().outcome, Outcome::Pass);
        let condition = suite.check("::Condition").unwrap();
        assert_eq!(condition.outcome, Outcome::Fail);
        assert_eq!(
            condition.message.as_deref(),
            Some("Bad response code: expected 401 or 403, but found 200")
        );
    }

    #[tokio::test]
    async fn test_unrestricted_scopes_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(searchset()))
            .mount(&server)
            .await;

        let client = FhirClient::new(&server.uri(), Duration::from_secs(5), None).unwrap();
        let suite =
            run_restricted(&client, &session("patient/*.read"), &us_core::descriptors()).await;
        assert_eq!(suite.check("::restriction").unwrap().outcome, Outcome::Fail);
        assert_eq!(suite.count(Outcome::Pass), 14);
    }

    #[tokio::test]
    async fn test_missing_token_skips_everything() {
        let client = FhirClient::new("http://127.0.0.1:9", Duration::from_secs(1), None).unwrap();
        let mut session = session("patient/Patient.read");
        session.access_token = None;
        let suite = run_restricted(&client, &session, &us_core::descriptors()).await;
        assert_eq!(suite.count(Outcome::Skip), 15);
        assert_eq!(
            suite.checks[0].message.as_deref(),
            Some("No access token was received in this session")
        );
    }
}
