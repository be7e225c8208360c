use std::time::Duration;

use octofhir_conformance::config::RunSettings;
use octofhir_conformance::{ConformanceRunner, FhirClient, Outcome, TestSession, us_core};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn goal() -> Value {
    json!({
        "resourceType": "Goal",
        "id": "g1",
        "meta": {"versionId": "1"},
        "lifecycleStatus": "active",
        "description": {"text": "Lose weight"},
        "subject": {"reference": "Patient/85"},
        "target": [{"dueDate": "2020-06-01"}]
    })
}

async fn mount_server(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "CapabilityStatement",
            "rest": [{
                "mode": "server",
                "resource": [{
                    "type": "Goal",
                    "interaction": [{"code": "read"}, {"code": "search-type"}],
                    "searchParam": [
                        {"name": "patient", "type": "reference"},
                        {"name": "lifecycle-status", "type": "token"},
                        {"name": "target-date", "type": "date"}
                    ]
                }, {
                    "type": "Patient",
                    "interaction": [{"code": "read"}]
                }]
            }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Goal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": [{"resource": goal()}]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Goal/g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(goal()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Patient/85"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"resourceType": "Patient", "id": "85"})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn declared_capabilities_shape_the_run() {
    let server = MockServer::start().await;
    mount_server(&server).await;

    let client = FhirClient::new(&server.uri(), Duration::from_secs(5), None).expect("client");
    let runner = ConformanceRunner::discover(client, RunSettings::default()).await;
    assert!(runner.capabilities().is_known());

    let mut descriptors = us_core::select("Organization");
    descriptors.extend(us_core::select("Goal"));
    let mut session = TestSession::new(server.uri());
    session.add_patient("85");

    let report = runner.run(&descriptors, &mut session).await;

    // Suites that read by reference run after the patient searches
    assert_eq!(report.suites.len(), 2);
    assert!(report.suites[0].checks[0].id.starts_with("us-core-goal::"));
    assert!(report.suites[1].checks[0].id.starts_with("us-core-organization::"));
    assert!(!report.has_failures(), "{report:#?}");

    let goal = &report.suites[0];
    assert_eq!(goal.check("::search").map(|c| c.outcome), Some(Outcome::Pass));
    assert_eq!(goal.check("::read").map(|c| c.outcome), Some(Outcome::Pass));
    assert_eq!(goal.check("::vread").map(|c| c.outcome), Some(Outcome::Omit));
    assert_eq!(goal.check("::history").map(|c| c.outcome), Some(Outcome::Omit));
    assert_eq!(goal.check("::references").map(|c| c.outcome), Some(Outcome::Pass));

    let organization = &report.suites[1];
    let search = organization.check("::search").expect("search check");
    assert_eq!(search.outcome, Outcome::Skip);
    assert_eq!(
        search.message.as_deref(),
        Some("Server does not declare support for Organization")
    );

    let json = serde_json::to_value(&report).expect("serialize report");
    assert_eq!(json["suites"][0]["checks"][0]["outcome"], "pass");
}
