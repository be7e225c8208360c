//! FHIR Reference parsing and collection.
//!
//! Reference-resolution checks need every reference a resource makes, split
//! into type and id so the target can be read back from the server.
//!
//! # Reference Formats
//!
//! - Relative: `Patient/123`
//! - Versioned: `Patient/123/_history/1`
//! - Absolute URL: `http://example.org/fhir/Patient/123`
//! - Contained: `#contained-id` (cannot be resolved externally)
//! - URN: `urn:uuid:xxx` or `urn:oid:xxx` (cannot be resolved externally)
//!
//! # Example
//!
//! ```
//! use octofhir_core::fhir_reference::{collect_references, parse_reference};
//! use serde_json::json;
//!
//! let encounter = json!({
//!     "resourceType": "Encounter",
//!     "subject": {"reference": "Patient/123"},
//!     "participant": [{"individual": {"reference": "Practitioner/9/_history/2"}}]
//! });
//! let refs = collect_references(&encounter);
//! assert_eq!(refs, ["Patient/123", "Practitioner/9/_history/2"]);
//!
//! let reference = parse_reference(refs[1], None).unwrap();
//! assert_eq!(reference.resource_type, "Practitioner");
//! assert_eq!(reference.version, Some("2".to_string()));
//! ```

use std::fmt;

use serde_json::Value;

/// A successfully parsed FHIR reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FhirReference {
    /// The resource type (e.g., "Patient", "Observation")
    pub resource_type: String,
    /// The resource ID
    pub id: String,
    /// Optional version ID from `_history` suffix
    pub version: Option<String>,
}

impl FhirReference {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version: None,
        }
    }

    /// Returns the reference as a relative string (Type/id).
    pub fn to_relative(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }
}

impl fmt::Display for FhirReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}/{}/_history/{}", self.resource_type, self.id, v),
            None => write!(f, "{}/{}", self.resource_type, self.id),
        }
    }
}

/// Represents a reference that cannot be resolved against the server under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvableReference {
    /// A contained reference (starts with `#`)
    Contained(String),
    /// A URN reference (`urn:uuid:xxx` or `urn:oid:xxx`)
    Urn(String),
    /// An external server reference (different base URL)
    External(String),
    /// A malformed or invalid reference
    Invalid(String),
}

impl fmt::Display for UnresolvableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contained(id) => write!(f, "contained reference: #{id}"),
            Self::Urn(urn) => write!(f, "URN reference: {urn}"),
            Self::External(url) => write!(f, "external reference: {url}"),
            Self::Invalid(reason) => write!(f, "invalid reference: {reason}"),
        }
    }
}

impl std::error::Error for UnresolvableReference {}

/// Parse a FHIR reference string into its components.
///
/// Absolute URLs are local only when they start with `base_url`.
pub fn parse_reference(
    reference: &str,
    base_url: Option<&str>,
) -> Result<FhirReference, UnresolvableReference> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(UnresolvableReference::Invalid(
            "empty reference".to_string(),
        ));
    }

    if let Some(contained_id) = reference.strip_prefix('#') {
        return Err(UnresolvableReference::Contained(contained_id.to_string()));
    }

    if reference.starts_with("urn:") {
        return Err(UnresolvableReference::Urn(reference.to_string()));
    }

    let path = if reference.contains("://") {
        let Some(base) = base_url else {
            return Err(UnresolvableReference::External(reference.to_string()));
        };
        match reference.strip_prefix(base.trim_end_matches('/')) {
            Some(suffix) => suffix.trim_start_matches('/'),
            None => return Err(UnresolvableReference::External(reference.to_string())),
        }
    } else {
        reference
    };

    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() < 2 {
        return Err(UnresolvableReference::Invalid(format!(
            "reference must contain at least Type/id: {reference}"
        )));
    }

    let resource_type = parts[0];
    let id = parts[1];

    if !resource_type
        .chars()
        .next()
        .map(|c| c.is_ascii_uppercase())
        .unwrap_or(false)
    {
        return Err(UnresolvableReference::Invalid(format!(
            "resource type must start with uppercase letter: {resource_type}"
        )));
    }

    if id.is_empty() {
        return Err(UnresolvableReference::Invalid(
            "resource id cannot be empty".to_string(),
        ));
    }

    let version = if parts.len() >= 4 && parts[2] == "_history" {
        Some(parts[3].to_string())
    } else {
        None
    };

    Ok(FhirReference {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
        version,
    })
}

/// Every `reference` string found anywhere in `resource`, in document order.
///
/// Contained resources are not descended into: their references are
/// relative to the container and resolve through it.
pub fn collect_references(resource: &Value) -> Vec<&str> {
    let mut found = Vec::new();
    collect_into(resource, true, &mut found);
    found
}

fn collect_into<'a>(value: &'a Value, root: bool, found: &mut Vec<&'a str>) {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("reference").and_then(Value::as_str) {
                found.push(reference);
            }
            for (key, child) in map {
                if key == "reference" || (root && key == "contained") {
                    continue;
                }
                collect_into(child, false, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_into(item, false, found);
            }
        }
        _ => {}
    }
}
