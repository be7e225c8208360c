//! Token endpoint responses and the rules they are held to.

use serde_json::{Map, Value};

use crate::client::FhirResponse;
use crate::outcome::{CheckResult, Warnings, ensure, fail};
use crate::smart::scopes::{parse_scope_list, scope_difference};

/// A token response as received.
///
/// Built from the raw JSON object so that a badly typed optional field is
/// reported as a warning instead of hiding the required-field checks.
#[derive(Debug, Clone, Default)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    /// Kept raw: servers send both numbers and strings here.
    pub expires_in: Option<Value>,
    pub scope: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub patient: Option<String>,
    pub encounter: Option<String>,
    pub need_patient_banner: Option<bool>,
    pub smart_style_url: Option<String>,
}

impl TokenResponse {
    /// Read the known fields of `object`, warning about any whose JSON type
    /// is wrong. Required fields are checked by [`validate_token_response`].
    pub fn from_object(object: &Map<String, Value>, warnings: &mut Warnings) -> Self {
        let mut text = |name: &str| match object.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                warnings.warn(format!("{name} is not a string: {other}"));
                None
            }
        };
        let access_token = text("access_token");
        let token_type = text("token_type");
        let scope = text("scope");
        let refresh_token = text("refresh_token");
        let id_token = text("id_token");
        let patient = text("patient");
        let encounter = text("encounter");
        let smart_style_url = text("smart_style_url");

        let need_patient_banner = match object.get("need_patient_banner") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(other) => {
                warnings.warn(format!("need_patient_banner is not a boolean: {other}"));
                None
            }
        };

        Self {
            access_token,
            token_type,
            expires_in: object.get("expires_in").filter(|v| !v.is_null()).cloned(),
            scope,
            refresh_token,
            id_token,
            patient,
            encounter,
            need_patient_banner,
            smart_style_url,
        }
    }

    /// Lifetime in seconds, accepting numeric strings.
    pub fn expires_in_secs(&self) -> Option<u64> {
        match self.expires_in.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Check a token response body.
///
/// `granted` is the scope string the response may not exceed: the requested
/// scopes for a code exchange, the original grant for a refresh.
/// `expect_context` adds warnings when no patient or encounter is returned.
pub fn validate_token_response(
    body: &str,
    granted: &str,
    expect_context: bool,
    warnings: &mut Warnings,
) -> CheckResult<TokenResponse> {
    let body: Value = serde_json::from_str(body)?;
    let Some(object) = body.as_object() else {
        return fail("Token response is not a JSON object");
    };
    let token = TokenResponse::from_object(object, warnings);

    ensure(
        present(&token.access_token),
        "Token response did not contain access_token",
    )?;
    let Some(token_type) = token.token_type.as_deref() else {
        return fail("Token response did not contain token_type");
    };
    ensure(
        token_type.eq_ignore_ascii_case("bearer"),
        format!("Token type must be Bearer, but found {token_type}"),
    )?;
    let Some(scope) = token.scope.as_deref() else {
        return fail("Token response did not contain scope");
    };
    if let Err(err) = parse_scope_list(scope) {
        return fail(format!("Token response contained an invalid scope: {err}"));
    }
    if token.refresh_token.is_some() {
        ensure(
            token.expires_in.is_some(),
            "Token response contained refresh_token but no expires_in",
        )?;
    }
    if let Some(expires_in) = &token.expires_in {
        warnings.warn_if(
            !expires_in.is_number(),
            format!("expires_in is not a number: {expires_in}"),
        );
    }

    let difference = scope_difference(granted, scope);
    ensure(
        difference.extra.is_empty(),
        format!(
            "Token response contained unrequested scopes: {}",
            difference.extra.join(", ")
        ),
    )?;
    warnings.warn_if(
        !difference.missing.is_empty(),
        format!(
            "Token response did not contain requested scopes: {}",
            difference.missing.join(", ")
        ),
    );

    if expect_context {
        warnings.warn_if(
            !present(&token.patient),
            "No patient id was provided in the token response",
        );
        warnings.warn_if(
            !present(&token.encounter),
            "No encounter id was provided in the token response",
        );
    }
    Ok(token)
}

/// Token responses carry secrets and must not be cached.
pub fn validate_token_headers(response: &FhirResponse) -> CheckResult {
    let contains = |name: &str, needle: &str| {
        response
            .header(name)
            .is_some_and(|v| v.to_ascii_lowercase().contains(needle))
    };
    ensure(
        contains("cache-control", "no-store"),
        format!(
            "Token response must have Cache-Control containing no-store, but found {}",
            response.header("cache-control").unwrap_or("none")
        ),
    )?;
    ensure(
        contains("pragma", "no-cache"),
        format!(
            "Token response must have Pragma containing no-cache, but found {}",
            response.header("pragma").unwrap_or("none")
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::CheckAbort;
    use reqwest::header::{HeaderMap, HeaderValue};
    use serde_json::json;

    const REQUESTED: &str = "launch/patient patient/Patient.read";

    fn body(overrides: Value) -> String {
        let mut token = json!({
            "access_token": "at",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "launch/patient patient/Patient.read",
            "patient": "85",
            "encounter": "e1"
        });
        for (k, v) in overrides.as_object().unwrap() {
            token[k] = v.clone();
        }
        token.to_string()
    }

    #[test]
    fn test_token_type_is_case_insensitive() {
        for token_type in ["Bearer", "bearer", "BEARER"] {
            let mut warnings = Warnings::default();
            let token = validate_token_response(
                &body(json!({"token_type": token_type})),
                REQUESTED,
                true,
                &mut warnings,
            )
            .unwrap();
            assert_eq!(token.expires_in_secs(), Some(3600));
            assert!(warnings.is_empty());
        }
        let result = validate_token_response(
            &body(json!({"token_type": "mac"})),
            REQUESTED,
            true,
            &mut Warnings::default(),
        );
        assert_eq!(
            result.map(|_| ()),
            Err(CheckAbort::Fail("Token type must be Bearer, but found mac".into()))
        );
    }

    #[test]
    fn test_extra_scope_fails_missing_scope_warns() {
        let extra = validate_token_response(
            &body(json!({"scope": "patient/Patient.read patient/Observation.read"})),
            "patient/Patient.read",
            true,
            &mut Warnings::default(),
        );
        assert!(matches!(extra, Err(CheckAbort::Fail(m)) if m.contains("patient/Observation.read")));

        let mut warnings = Warnings::default();
        let missing = validate_token_response(
            &body(json!({"scope": "patient/Patient.read"})),
            "patient/Patient.read patient/Condition.read",
            true,
            &mut warnings,
        );
        assert!(missing.is_ok());
        assert_eq!(
            warnings.as_slice(),
            ["Token response did not contain requested scopes: patient/Condition.read"]
        );
    }

    #[test]
    fn test_expires_in_rules() {
        let mut warnings = Warnings::default();
        let token = validate_token_response(
            &body(json!({"expires_in": "3600"})),
            REQUESTED,
            true,
            &mut warnings,
        )
        .unwrap();
        assert_eq!(token.expires_in_secs(), Some(3600));
        assert_eq!(warnings.as_slice(), ["expires_in is not a number: \"3600\""]);

        let mut no_expiry: Value = serde_json::from_str(&body(json!({"refresh_token": "rt"}))).unwrap();
        no_expiry.as_object_mut().unwrap().remove("expires_in");
        let result = validate_token_response(
            &no_expiry.to_string(),
            REQUESTED,
            true,
            &mut Warnings::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_context_warns_separately() {
        let mut no_context: Value = serde_json::from_str(&body(json!({}))).unwrap();
        no_context.as_object_mut().unwrap().remove("patient");
        no_context.as_object_mut().unwrap().remove("encounter");
        let mut warnings = Warnings::default();
        validate_token_response(&no_context.to_string(), REQUESTED, true, &mut warnings).unwrap();
        assert_eq!(warnings.as_slice().len(), 2);

        let mut warnings = Warnings::default();
        validate_token_response(&no_context.to_string(), REQUESTED, false, &mut warnings).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_missing_fields_and_bad_json() {
        let result = validate_token_response("{}", REQUESTED, true, &mut Warnings::default());
        assert_eq!(
            result.map(|_| ()),
            Err(CheckAbort::Fail("Token response did not contain access_token".into()))
        );
        let result = validate_token_response("<html>", REQUESTED, true, &mut Warnings::default());
        assert!(matches!(result, Err(CheckAbort::Fail(m)) if m.starts_with("Response body is not valid JSON")));
    }

    #[test]
    fn test_badly_typed_optional_fields_warn() {
        let mut warnings = Warnings::default();
        let token = validate_token_response(
            &body(json!({"need_patient_banner": "true", "patient": 85})),
            REQUESTED,
            true,
            &mut warnings,
        )
        .unwrap();
        assert_eq!(token.access_token.as_deref(), Some("at"));
        assert_eq!(token.need_patient_banner, None);
        assert_eq!(token.patient, None);
        assert_eq!(
            warnings.as_slice(),
            [
                "patient is not a string: 85",
                "need_patient_banner is not a boolean: \"true\"",
                "No patient id was provided in the token response",
            ]
        );
    }

    #[test]
    fn test_malformed_scope_fails() {
        let result = validate_token_response(
            &body(json!({"scope": "launch/patient patient\\Patient.read"})),
            REQUESTED,
            true,
            &mut Warnings::default(),
        );
        assert!(
            matches!(result, Err(CheckAbort::Fail(m)) if m.starts_with("Token response contained an invalid scope"))
        );
        let result = validate_token_response(
            &body(json!({"scope": "  "})),
            REQUESTED,
            true,
            &mut Warnings::default(),
        );
        assert_eq!(
            result.map(|_| ()),
            Err(CheckAbort::Fail(
                "Token response contained an invalid scope: Empty scope string".into()
            ))
        );
        let result = validate_token_response("[]", REQUESTED, true, &mut Warnings::default());
        assert_eq!(
            result.map(|_| ()),
            Err(CheckAbort::Fail("Token response is not a JSON object".into()))
        );
    }

    fn response(headers: &[(&'static str, &'static str)]) -> FhirResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        FhirResponse {
            method: "POST".into(),
            url: "https://auth.example.org/token".into(),
            status: 200,
            headers: map,
            body: String::new(),
        }
    }

    #[test]
    fn test_token_headers() {
        assert!(
            validate_token_headers(&response(&[
                ("cache-control", "no-cache, No-Store"),
                ("pragma", "no-cache")
            ]))
            .is_ok()
        );
        assert_eq!(
            validate_token_headers(&response(&[("cache-control", "no-store")])),
            Err(CheckAbort::Fail(
                "Token response must have Pragma containing no-cache, but found none".into()
            ))
        );
    }
}
