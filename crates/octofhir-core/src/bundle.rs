//! Helpers for searchset Bundles and OperationOutcome bodies.

use serde_json::Value;

/// Resource type of a JSON resource, if present.
pub fn resource_type_of(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

pub fn is_bundle(value: &Value) -> bool {
    resource_type_of(value) == Some("Bundle")
}

pub fn is_operation_outcome(value: &Value) -> bool {
    resource_type_of(value) == Some("OperationOutcome")
}

/// Every `entry.resource` of a Bundle, in entry order.
pub fn entry_resources(bundle: &Value) -> impl Iterator<Item = &Value> {
    bundle
        .get("entry")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("resource"))
}

/// Bundle entries of one resource type.
pub fn resources_of_type<'a>(
    bundle: &'a Value,
    resource_type: &'a str,
) -> impl Iterator<Item = &'a Value> + 'a {
    entry_resources(bundle).filter(move |r| resource_type_of(r) == Some(resource_type))
}

/// URL of the `next` page link, if the server paginated the result.
pub fn next_link(bundle: &Value) -> Option<&str> {
    bundle
        .get("link")
        .and_then(Value::as_array)?
        .iter()
        .find(|link| link.get("relation").and_then(Value::as_str) == Some("next"))
        .and_then(|link| link.get("url"))
        .and_then(Value::as_str)
}

/// Diagnostics and details text from an OperationOutcome, joined with `; `.
pub fn outcome_messages(outcome: &Value) -> String {
    outcome
        .get("issue")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|issue| {
            issue
                .get("diagnostics")
                .and_then(Value::as_str)
                .or_else(|| {
                    issue
                        .get("details")
                        .and_then(|d| d.get("text"))
                        .and_then(Value::as_str)
                })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn searchset() -> Value {
        json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "link": [
                {"relation": "self", "url": "http://x/Condition?patient=1"},
                {"relation": "next", "url": "http://x/Condition?patient=1&page=2"}
            ],
            "entry": [
                {"resource": {"resourceType": "Condition", "id": "a"}},
                {"resource": {"resourceType": "Provenance", "id": "p"}},
                {"fullUrl": "urn:uuid:missing-resource"},
                {"resource": {"resourceType": "Condition", "id": "b"}}
            ]
        })
    }

    #[test]
    fn test_entries_by_type() {
        let bundle = searchset();
        let ids: Vec<&str> = resources_of_type(&bundle, "Condition")
            .filter_map(|r| r.get("id").and_then(Value::as_str))
            .collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(entry_resources(&bundle).count(), 3);
    }

    #[test]
    fn test_next_link() {
        assert_eq!(
            next_link(&searchset()),
            Some("http://x/Condition?patient=1&page=2")
        );
        assert_eq!(next_link(&json!({"resourceType": "Bundle"})), None);
    }

    #[test]
    fn test_outcome_messages() {
        let outcome = json!({
            "resourceType": "OperationOutcome",
            "issue": [
                {"severity": "error", "diagnostics": "status is required"},
                {"severity": "error", "details": {"text": "try again"}},
                {"severity": "warning"}
            ]
        });
        assert!(is_operation_outcome(&outcome));
        assert!(!is_bundle(&outcome));
        assert_eq!(outcome_messages(&outcome), "status is required; try again");
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = json!({"resourceType": "Bundle", "type": "searchset"});
        assert!(is_bundle(&bundle));
        assert_eq!(entry_resources(&bundle).count(), 0);
    }
}
