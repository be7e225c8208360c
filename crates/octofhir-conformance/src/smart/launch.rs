//! Standalone launch: authorization request, redirect, token exchange.
//!
//! The launch is split across two invocations. [`authorization_url`] issues
//! the `state` and stores it in the session; once the user has authorized
//! the app, [`LaunchSequence`] validates the redirect and the token exchange.

use thiserror::Error;
use url::Url;

use crate::client::{FhirClient, FhirResponse};
use crate::config::SmartSettings;
use crate::error::ClientError;
use crate::outcome::{CheckAbort, CheckReport, CheckResult, SuiteReport, Warnings, ensure, fail, skip};
use crate::session::TestSession;
use crate::smart::discovery::SmartEndpoints;
use crate::smart::token::{TokenResponse, validate_token_headers, validate_token_response};

const INVALID_CODE: &str = "INVALID_CODE";
const INVALID_CLIENT_ID: &str = "INVALID_CLIENT_ID";
const SUITE: &str = "smart_launch";

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("smart.{0} is not configured")]
    MissingSetting(&'static str),

    #[error("{0} must use https")]
    InsecureEndpoint(String),

    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

fn parse_url(url: &str) -> Result<Url, LaunchError> {
    Url::parse(url).map_err(|source| LaunchError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

/// Build the authorization request and record its `state` in the session.
pub fn authorization_url(
    endpoints: &SmartEndpoints,
    settings: &SmartSettings,
    session: &mut TestSession,
    launch: Option<&str>,
) -> Result<Url, LaunchError> {
    let client_id = settings
        .client_id
        .as_deref()
        .ok_or(LaunchError::MissingSetting("client_id"))?;
    let redirect_uri = settings
        .redirect_uri
        .as_deref()
        .ok_or(LaunchError::MissingSetting("redirect_uri"))?;

    let mut url = parse_url(&endpoints.authorization_endpoint)?;
    if url.scheme() != "https" && !settings.allow_insecure_endpoints {
        return Err(LaunchError::InsecureEndpoint(
            endpoints.authorization_endpoint.clone(),
        ));
    }

    let state = uuid::Uuid::new_v4().to_string();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &settings.scopes)
            .append_pair("state", &state)
            .append_pair("aud", &session.base_url);
        if let Some(launch) = launch {
            query.append_pair("launch", launch);
        }
    }

    tracing::info!(session = %session.id, "authorization request issued");
    session.state = Some(state);
    session.requested_scopes = Some(settings.scopes.clone());
    Ok(url)
}

/// Query parameters of the redirect back to the app.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl RedirectParams {
    pub fn from_url(redirect: &str) -> Result<Self, LaunchError> {
        let url = parse_url(redirect)?;
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        Ok(params)
    }

    /// Whether the redirect carried no OAuth parameters at all.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Where a launch currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    AwaitingRedirect,
    ExchangingToken,
    ValidatingTokenResponse,
    ValidatingTokenHeaders,
    Complete,
}

/// Checks in the order a launch runs them.
const CHECKS: [(&str, &str); 7] = [
    ("redirect", "OAuth server redirects back with a code and the issued state"),
    ("invalid_code", "OAuth token exchange fails when supplied an invalid code"),
    ("invalid_client", "OAuth token exchange fails when supplied an invalid client id"),
    ("token_exchange", "OAuth token exchange succeeds with a valid code"),
    ("token_response", "Token response contains the required fields and scopes"),
    ("token_headers", "Token response headers forbid caching"),
    ("refresh", "Refresh token exchange succeeds and does not widen the grant"),
];

/// Runs the redirect and token checks against one authorization attempt.
pub struct LaunchSequence<'a> {
    client: &'a FhirClient,
    endpoints: &'a SmartEndpoints,
    settings: &'a SmartSettings,
    state: LaunchState,
    code: Option<String>,
    token_response: Option<FhirResponse>,
}

impl<'a> LaunchSequence<'a> {
    pub fn new(
        client: &'a FhirClient,
        endpoints: &'a SmartEndpoints,
        settings: &'a SmartSettings,
    ) -> Self {
        Self {
            client,
            endpoints,
            settings,
            state: LaunchState::AwaitingRedirect,
            code: None,
            token_response: None,
        }
    }

    pub fn state(&self) -> LaunchState {
        self.state
    }

    fn client_id(&self) -> CheckResult<&'a str> {
        match self.settings.client_id.as_deref() {
            Some(client_id) => Ok(client_id),
            None => skip("smart.client_id is not configured"),
        }
    }

    /// Run every check, updating the session with what the server granted.
    pub async fn run(
        &mut self,
        redirect: &RedirectParams,
        session: &mut TestSession,
    ) -> SuiteReport {
        let mut suite = SuiteReport::new("SMART App Launch");
        self.client.take_requests();

        for (index, (name, title)) in CHECKS.iter().enumerate() {
            let mut warnings = Warnings::default();
            let result = match *name {
                "redirect" => self.receive_redirect(redirect, session),
                "invalid_code" => self.probe_invalid_code().await,
                "invalid_client" => self.probe_invalid_client().await,
                "token_exchange" => self.exchange_token().await,
                "token_response" => self.check_token_response(session, &mut warnings),
                "token_headers" => self.check_token_headers(),
                _ => self.refresh(session, &mut warnings).await,
            };
            // Nothing after a failed redirect or exchange has a token to test.
            let aborted = matches!(result, Err(CheckAbort::Fail(_)))
                && matches!(*name, "redirect" | "token_exchange");

            suite.push(CheckReport::finish(
                format!("{SUITE}::{name}"),
                *title,
                result,
                warnings,
                self.client.take_requests(),
            ));

            if aborted {
                for (name, title) in &CHECKS[index + 1..] {
                    suite.push(CheckReport::skipped(
                        format!("{SUITE}::{name}"),
                        *title,
                        "previous step failed",
                    ));
                }
                break;
            }
        }
        suite
    }

    fn receive_redirect(
        &mut self,
        redirect: &RedirectParams,
        session: &TestSession,
    ) -> CheckResult {
        if redirect.is_empty() {
            return fail("No OAuth parameters were received in the redirect");
        }
        if let Some(error) = &redirect.error {
            return fail(format!(
                "Authorization server returned error {error}: {}",
                redirect.error_description.as_deref().unwrap_or("no description")
            ));
        }
        let Some(expected) = session.state.as_deref() else {
            return skip("No authorization request was issued in this session");
        };
        let received = redirect.state.as_deref().unwrap_or("");
        ensure(
            received == expected,
            format!(
                "State provided in redirect ({received}) does not match expected state ({expected})"
            ),
        )?;
        let Some(code) = redirect.code.as_deref().filter(|c| !c.is_empty()) else {
            return fail("Redirect did not contain an authorization code");
        };
        self.code = Some(code.to_string());
        self.state = LaunchState::ExchangingToken;
        Ok(())
    }

    /// POST to the token endpoint, authenticating as the configured client.
    async fn post_token<'f>(
        &self,
        mut form: Vec<(&'f str, &'f str)>,
        client_id: &'f str,
    ) -> Result<FhirResponse, ClientError> {
        let url = &self.endpoints.token_endpoint;
        match self.settings.client_secret.as_deref() {
            Some(secret) => {
                self.client
                    .post_form(url, &form, Some((client_id, secret)))
                    .await
            }
            None => {
                form.push(("client_id", client_id));
                self.client.post_form(url, &form, None).await
            }
        }
    }

    fn redirect_uri(&self) -> &str {
        self.settings.redirect_uri.as_deref().unwrap_or_default()
    }

    async fn probe_invalid_code(&self) -> CheckResult {
        let client_id = self.client_id()?;
        let form = vec![
            ("grant_type", "authorization_code"),
            ("code", INVALID_CODE),
            ("redirect_uri", self.redirect_uri()),
        ];
        let response = self.post_token(form, client_id).await?;
        ensure(
            (400..500).contains(&response.status),
            format!(
                "Bad response code: expected 4xx, but found {}",
                response.status
            ),
        )
    }

    async fn probe_invalid_client(&self) -> CheckResult {
        let Some(code) = self.code.as_deref() else {
            return skip("No authorization code was received");
        };
        let form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri()),
        ];
        let response = self.post_token(form, INVALID_CLIENT_ID).await?;
        response.ensure_status_in(&[400, 401])
    }

    async fn exchange_token(&mut self) -> CheckResult {
        let client_id = self.client_id()?;
        let Some(code) = self.code.as_deref() else {
            return skip("No authorization code was received");
        };
        let form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri()),
        ];
        let response = self.post_token(form, client_id).await?;
        response.ensure_status(200)?;
        self.token_response = Some(response);
        self.state = LaunchState::ValidatingTokenResponse;
        Ok(())
    }

    fn check_token_response(
        &mut self,
        session: &mut TestSession,
        warnings: &mut Warnings,
    ) -> CheckResult {
        let Some(response) = &self.token_response else {
            return skip("No token response was received");
        };
        let requested = session
            .requested_scopes
            .clone()
            .unwrap_or_else(|| self.settings.scopes.clone());
        let token = validate_token_response(&response.body, &requested, true, warnings)?;
        store_token(session, &token);
        if let Some(patient) = &token.patient {
            session.add_patient(patient);
        }
        session.encounter_id = token.encounter.clone();
        self.state = LaunchState::ValidatingTokenHeaders;
        Ok(())
    }

    fn check_token_headers(&mut self) -> CheckResult {
        let Some(response) = &self.token_response else {
            return skip("No token response was received");
        };
        validate_token_headers(response)?;
        self.state = LaunchState::Complete;
        Ok(())
    }

    async fn refresh(&self, session: &mut TestSession, warnings: &mut Warnings) -> CheckResult {
        let client_id = self.client_id()?;
        let Some(refresh_token) = session.refresh_token.clone() else {
            return skip("No refresh token was received");
        };
        let granted = session.received_scopes.clone().unwrap_or_default();

        let form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];
        let response = self.post_token(form, client_id).await?;
        response.ensure_status(200)?;
        let token = validate_token_response(&response.body, &granted, false, warnings)?;
        validate_token_headers(&response)?;

        store_token(session, &token);
        if session.refresh_token.is_none() {
            session.refresh_token = Some(refresh_token);
        }
        Ok(())
    }
}

fn store_token(session: &mut TestSession, token: &TokenResponse) {
    session.access_token = token.access_token.clone();
    if token.id_token.is_some() {
        session.id_token = token.id_token.clone();
    }
    session.refresh_token = token.refresh_token.clone();
    session.token_expires_in = token.expires_in_secs();
    session.received_scopes = token.scope.clone();
}
