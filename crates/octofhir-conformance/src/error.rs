use thiserror::Error;

/// Errors raised by [`crate::client::FhirClient`].
///
/// Non-success HTTP statuses are not errors: checks inspect the status
/// themselves. Only failures to produce a response end up here.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("Invalid request for {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors raised by a [`crate::session::SessionStore`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Test session not found: {0}")]
    NotFound(String),

    #[error("Session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_messages() {
        assert_eq!(
            SessionError::NotFound("default".into()).to_string(),
            "Test session not found: default"
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(SessionError::from(io), SessionError::Io(_)));
    }
}
