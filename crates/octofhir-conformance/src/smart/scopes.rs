//! SMART scope strings as the launch and restricted-access checks read them.
//!
//! Scopes are kept as the plain space-delimited strings the server returned;
//! the checks only ever need set differences and a prefix test.

use indexmap::IndexSet;
use thiserror::Error;

/// Errors from reading a scope string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScopeError {
    /// The scope string is empty.
    #[error("Empty scope string")]
    Empty,

    /// A token contains characters RFC 6749 does not allow in a scope.
    #[error("Invalid scope format: {0}")]
    InvalidFormat(String),
}

/// Split a scope string into its tokens.
///
/// Tokens must consist of `%x21 / %x23-5B / %x5D-7E` (RFC 6749 §3.3).
pub fn parse_scope_list(scopes: &str) -> Result<Vec<String>, ScopeError> {
    let tokens: Vec<&str> = scopes.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(ScopeError::Empty);
    }
    if let Some(bad) = tokens.iter().find(|t| !t.chars().all(is_scope_char)) {
        return Err(ScopeError::InvalidFormat((*bad).to_string()));
    }
    Ok(tokens.into_iter().map(str::to_string).collect())
}

fn is_scope_char(c: char) -> bool {
    matches!(c, '\x21' | '\x23'..='\x5B' | '\x5D'..='\x7E')
}

/// Whether `scopes` lets the app read `resource_type` in patient context.
///
/// True iff some token starts with `patient/<type>` or `patient/*` and ends
/// with `*` or `read`.
pub fn grants_access(resource_type: &str, scopes: &str) -> bool {
    let specific = format!("patient/{resource_type}");
    scopes.split_whitespace().any(|scope| {
        (scope.starts_with(&specific) || scope.starts_with("patient/*"))
            && (scope.ends_with('*') || scope.ends_with("read"))
    })
}

/// Difference between the scopes an app asked for and the scopes granted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeDifference {
    /// Granted but never requested.
    pub extra: Vec<String>,
    /// Requested but not granted.
    pub missing: Vec<String>,
}

pub fn scope_difference(requested: &str, received: &str) -> ScopeDifference {
    let requested: IndexSet<&str> = requested.split_whitespace().collect();
    let received: IndexSet<&str> = received.split_whitespace().collect();
    ScopeDifference {
        extra: received
            .difference(&requested)
            .map(|s| s.to_string())
            .collect(),
        missing: requested
            .difference(&received)
            .map(|s| s.to_string())
            .collect(),
    }
}

/// Split resource types into those `scopes` grants and those it does not.
pub fn partition_access<'a>(
    resource_types: impl IntoIterator<Item = &'a str>,
    scopes: &str,
) -> (Vec<String>, Vec<String>) {
    let (granted, denied): (Vec<&str>, Vec<&str>) = resource_types
        .into_iter()
        .partition(|resource_type| grants_access(resource_type, scopes));
    (
        granted.into_iter().map(str::to_string).collect(),
        denied.into_iter().map(str::to_string).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grants_access() {
        let scopes = "launch/patient patient/Patient.read patient/Observation.*";
        assert!(grants_access("Patient", scopes));
        assert!(grants_access("Observation", scopes));
        assert!(!grants_access("Condition", scopes));

        assert!(grants_access("Condition", "openid patient/*.read"));
        assert!(grants_access("Goal", "patient/*.*"));
        assert!(!grants_access("Goal", "user/Goal.read"));
        assert!(!grants_access("Goal", "patient/Goal.write"));
        assert!(!grants_access("Goal", ""));
    }

    #[test]
    fn test_scope_difference() {
        let diff = scope_difference(
            "patient/Patient.read",
            "patient/Patient.read patient/Observation.read",
        );
        assert_eq!(diff.extra, ["patient/Observation.read"]);
        assert!(diff.missing.is_empty());

        let diff = scope_difference(
            "patient/Patient.read patient/Condition.read",
            "patient/Patient.read",
        );
        assert!(diff.extra.is_empty());
        assert_eq!(diff.missing, ["patient/Condition.read"]);

        assert_eq!(
            scope_difference("a  b", "b a"),
            ScopeDifference::default()
        );
    }

    #[test]
    fn test_partition_access() {
        let (granted, denied) = partition_access(
            ["Patient", "Condition", "Observation"],
            "patient/Patient.read patient/Observation.read",
        );
        assert_eq!(granted, ["Patient", "Observation"]);
        assert_eq!(denied, ["Condition"]);
    }

    #[test]
    fn test_parse_scope_list() {
        assert_eq!(
            parse_scope_list(" openid  patient/*.read ").unwrap(),
            ["openid", "patient/*.read"]
        );
        assert_eq!(parse_scope_list("   "), Err(ScopeError::Empty));
        assert_eq!(
            parse_scope_list("openid patient\\x"),
            Err(ScopeError::InvalidFormat("patient\\x".into()))
        );
        assert!(parse_scope_list("say\"hi\"").is_err());
    }
}
