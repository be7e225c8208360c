use std::time::Duration;

use octofhir_conformance::config::SmartSettings;
use octofhir_conformance::smart::{
    LaunchSequence, RedirectParams, authorization_url, discover_endpoints, run_restricted,
};
use octofhir_conformance::{FhirClient, FileSessionStore, Outcome, SessionStore, TestSession, us_core};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_authorization_server(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/smart-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri()),
            "capabilities": ["launch-standalone", "client-public", "context-standalone-patient"]
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code=good-code"))
        .and(body_string_contains("client_id=conformance-app"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "restricted-token",
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "scope": "launch/patient patient/Patient.read patient/Condition.read",
                    "patient": "85",
                    "encounter": "e1"
                }))
                .insert_header("Cache-Control", "no-store")
                .insert_header("Pragma", "no-cache"),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(server)
        .await;
}

async fn mount_fhir_api(server: &MockServer) {
    let searchset = json!({"resourceType": "Bundle", "type": "searchset", "entry": []});
    for resource_type in ["Patient", "Condition"] {
        Mock::given(method("GET"))
            .and(path(format!("/{resource_type}")))
            .and(header("authorization", "Bearer restricted-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(searchset.clone()))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(server)
        .await;
}

#[tokio::test]
async fn standalone_launch_then_restricted_access() {
    let server = MockServer::start().await;
    mount_authorization_server(&server).await;
    mount_fhir_api(&server).await;

    let dir = tempfile::tempdir().expect("tmp dir");
    let store = FileSessionStore::new(dir.path());
    let client = FhirClient::new(&server.uri(), Duration::from_secs(5), None).expect("client");
    let settings = SmartSettings {
        client_id: Some("conformance-app".into()),
        redirect_uri: Some("http://localhost:4567/redirect".into()),
        scopes: "launch/patient patient/Patient.read patient/Condition.read".into(),
        allow_insecure_endpoints: true,
        ..Default::default()
    };

    // 1) Authorization request, persisted between invocations
    let endpoints = discover_endpoints(&client, &settings).await.expect("endpoints");
    let mut session = TestSession::new(server.uri());
    let url = authorization_url(&endpoints, &settings, &mut session, None).expect("authorize url");
    assert!(url.as_str().starts_with(&format!("{}/authorize?", server.uri())));
    store.save(&session).await.expect("save session");

    // 2) Redirect arrives in a later invocation
    let mut session = store.load(&session.id).await.expect("load session");
    let state = session.state.clone().expect("state issued");
    let redirect = RedirectParams::from_url(&format!(
        "http://localhost:4567/redirect?code=good-code&state={state}"
    ))
    .expect("redirect");
    let suite = LaunchSequence::new(&client, &endpoints, &settings)
        .run(&redirect, &mut session)
        .await;

    assert_eq!(suite.count(Outcome::Fail), 0, "{suite:#?}");
    assert_eq!(suite.check("::refresh").map(|c| c.outcome), Some(Outcome::Skip));
    assert_eq!(session.access_token.as_deref(), Some("restricted-token"));
    assert_eq!(session.patient_ids, ["85"]);
    assert_eq!(session.encounter_id.as_deref(), Some("e1"));
    store.update(&session).await.expect("update session");

    // 3) Restricted access with the stored token
    let session = store.load(&session.id).await.expect("reload session");
    let suite = run_restricted(&client, &session, &us_core::descriptors()).await;
    assert_eq!(suite.count(Outcome::Fail), 0, "{suite:#?}");
    assert_eq!(suite.count(Outcome::Pass), 15);
}

#[tokio::test]
async fn tampered_state_stops_the_launch() {
    let server = MockServer::start().await;
    mount_authorization_server(&server).await;

    let client = FhirClient::new(&server.uri(), Duration::from_secs(5), None).expect("client");
    let settings = SmartSettings {
        client_id: Some("conformance-app".into()),
        redirect_uri: Some("http://localhost:4567/redirect".into()),
        allow_insecure_endpoints: true,
        ..Default::default()
    };
    let endpoints = discover_endpoints(&client, &settings).await.expect("endpoints");
    let mut session = TestSession::new(server.uri());
    authorization_url(&endpoints, &settings, &mut session, None).expect("authorize url");

    let redirect = RedirectParams {
        code: Some("good-code".into()),
        state: Some("forged".into()),
        ..Default::default()
    };
    let suite = LaunchSequence::new(&client, &endpoints, &settings)
        .run(&redirect, &mut session)
        .await;

    let redirect_check = suite.check("::redirect").expect("redirect check");
    assert_eq!(redirect_check.outcome, Outcome::Fail);
    assert!(
        redirect_check
            .message
            .as_deref()
            .is_some_and(|m| m.starts_with("State provided in redirect (forged)"))
    );
    assert!(session.access_token.is_none());
    assert!(server.received_requests().await.is_some_and(|reqs| {
        reqs.iter().all(|r| r.url.path() != "/token")
    }));
}
