use thiserror::Error;

/// Errors from parsing FHIR primitive values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Invalid FHIR resource type: {0}")]
    InvalidResourceType(String),

    #[error("Invalid FHIR date/dateTime: {0}")]
    InvalidDateTime(String),

    #[error("Invalid search comparator: {0}")]
    InvalidComparator(String),
}

impl CoreError {
    pub fn invalid_resource_type(resource_type: impl Into<String>) -> Self {
        Self::InvalidResourceType(resource_type.into())
    }

    pub fn invalid_date_time(datetime: impl Into<String>) -> Self {
        Self::InvalidDateTime(datetime.into())
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CoreError::invalid_resource_type("patient").to_string(),
            "Invalid FHIR resource type: patient"
        );
        assert_eq!(
            CoreError::invalid_date_time("2020-13").to_string(),
            "Invalid FHIR date/dateTime: 2020-13"
        );
        assert_eq!(
            CoreError::InvalidComparator("xx".into()).to_string(),
            "Invalid search comparator: xx"
        );
    }
}
