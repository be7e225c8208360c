//! Dotted element-path resolution over untyped FHIR JSON.
//!
//! A path such as `category.coding.code` is walked segment by segment. Whenever
//! the current value is an array the rest of the path is applied to every
//! element and the results are flattened depth-first, left to right. Missing
//! or `null` values end their branch silently: FHIR elements are optional, so
//! absence is a normal outcome rather than an error.
//!
//! A segment ending in `[x]` matches a choice element, e.g. `onset[x]` matches
//! `onsetDateTime` or `onsetPeriod`.
//!
//! # Example
//!
//! ```
//! use octofhir_core::element_path::{resolve, resolve_first};
//! use serde_json::json;
//!
//! let condition = json!({
//!     "resourceType": "Condition",
//!     "category": [
//!         {"coding": [{"code": "problem-list-item"}]},
//!         {"coding": [{"code": "health-concern"}, {"code": "encounter-diagnosis"}]}
//!     ]
//! });
//!
//! let codes: Vec<_> = resolve(&condition, "category.coding.code")
//!     .filter_map(|v| v.as_str())
//!     .collect();
//! assert_eq!(codes, ["problem-list-item", "health-concern", "encounter-diagnosis"]);
//!
//! assert!(resolve_first(&condition, "subject.reference").is_none());
//! ```

use serde_json::Value;

/// Lazy, depth-first iterator over every value reachable at a path.
#[derive(Debug, Clone)]
pub struct PathValues<'a> {
    segments: Vec<String>,
    stack: Vec<(&'a Value, usize)>,
}

impl<'a> PathValues<'a> {
    fn new(roots: Vec<&'a Value>, path: &str) -> Self {
        let segments = path
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let stack = roots.into_iter().rev().map(|v| (v, 0)).collect();
        Self { segments, stack }
    }
}

impl<'a> Iterator for PathValues<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((value, depth)) = self.stack.pop() {
            match value {
                Value::Null => continue,
                Value::Array(items) => {
                    // Reverse push keeps left-to-right order when popping.
                    for item in items.iter().rev() {
                        self.stack.push((item, depth));
                    }
                    continue;
                }
                _ => {}
            }

            if depth == self.segments.len() {
                return Some(value);
            }

            let Value::Object(map) = value else {
                continue;
            };

            let segment = &self.segments[depth];
            match segment.strip_suffix("[x]") {
                Some(prefix) => {
                    let matches: Vec<&Value> = map
                        .iter()
                        .filter(|(key, _)| is_choice_of(key, prefix))
                        .map(|(_, v)| v)
                        .collect();
                    for child in matches.into_iter().rev() {
                        self.stack.push((child, depth + 1));
                    }
                }
                None => {
                    if let Some(child) = map.get(segment.as_str()) {
                        self.stack.push((child, depth + 1));
                    }
                }
            }
        }
        None
    }
}

fn is_choice_of(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

/// Resolve `path` against a single value (a resource, or an array of resources).
pub fn resolve<'a>(root: &'a Value, path: &str) -> PathValues<'a> {
    PathValues::new(vec![root], path)
}

/// Resolve `path` against every value in `roots`, in order.
pub fn resolve_all<'a, I>(roots: I, path: &str) -> PathValues<'a>
where
    I: IntoIterator<Item = &'a Value>,
{
    PathValues::new(roots.into_iter().collect(), path)
}

/// First non-null value at `path`.
pub fn resolve_first<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    resolve(root, path).next()
}

/// First value at `path` across `roots` satisfying `predicate`.
pub fn resolve_first_matching<'a, I, F>(roots: I, path: &str, predicate: F) -> Option<&'a Value>
where
    I: IntoIterator<Item = &'a Value>,
    F: Fn(&Value) -> bool,
{
    resolve_all(roots, path).find(|v| predicate(v))
}

/// Whether any value is present at `path`.
pub fn has_value(root: &Value, path: &str) -> bool {
    resolve_first(root, path).is_some()
}

/// Split a search parameter value on unescaped commas.
///
/// A comma preceded by a backslash belongs to the token; the `\,` escape is
/// replaced by a literal comma only after splitting.
pub fn split_escaped_commas(value: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut previous = None;

    for c in value.chars() {
        if c == ',' && previous != Some('\\') {
            tokens.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
        previous = Some(c);
    }
    tokens.push(current);

    tokens
        .into_iter()
        .map(|token| token.replace("\\,", ","))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observation() -> Value {
        json!({
            "resourceType": "Observation",
            "status": "final",
            "subject": {"reference": "Patient/85"},
            "category": [{
                "coding": [{
                    "system": "http://terminology.hl7.org/CodeSystem/observation-category",
                    "code": "laboratory"
                }]
            }],
            "component": [
                {"code": {"coding": [{"code": "8480-6"}]}, "valueQuantity": {"value": 120}},
                {"code": {"coding": [{"code": "8462-4"}]}, "valueQuantity": {"value": 80}},
                {"code": {"coding": [{"code": "9279-1"}]}, "valueString": null}
            ],
            "effectiveDateTime": "2020-02-03T10:00:00Z"
        })
    }

    #[test]
    fn test_scalar_path() {
        let obs = observation();
        assert_eq!(resolve_first(&obs, "status"), Some(&json!("final")));
        assert_eq!(
            resolve_first(&obs, "subject.reference"),
            Some(&json!("Patient/85"))
        );
    }

    #[test]
    fn test_arrays_are_flattened_in_order() {
        let obs = observation();
        let codes: Vec<&str> = resolve(&obs, "component.code.coding.code")
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(codes, ["8480-6", "8462-4", "9279-1"]);
    }

    #[test]
    fn test_missing_and_null_yield_nothing() {
        let obs = observation();
        assert_eq!(resolve(&obs, "encounter.reference").count(), 0);
        assert_eq!(resolve(&obs, "component.valueString").count(), 0);
        assert_eq!(resolve(&obs, "status.nested.deeper").count(), 0);
        assert!(!has_value(&obs, "note"));
    }

    #[test]
    fn test_empty_path_yields_roots() {
        let obs = observation();
        assert_eq!(resolve_first(&obs, ""), Some(&obs));
    }

    #[test]
    fn test_array_of_resources() {
        let resources = json!([
            {"resourceType": "Condition", "code": {"text": "a"}},
            {"resourceType": "Condition"},
            {"resourceType": "Condition", "code": {"text": "b"}}
        ]);
        let texts: Vec<&str> = resolve(&resources, "code.text")
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(texts, ["a", "b"]);
    }

    #[test]
    fn test_resolve_all_over_slice() {
        let pool = vec![
            json!({"clinicalStatus": {"coding": [{"code": "active"}]}}),
            json!({"clinicalStatus": {"coding": [{"code": "resolved"}]}}),
        ];
        let codes: Vec<&str> = resolve_all(&pool, "clinicalStatus.coding.code")
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(codes, ["active", "resolved"]);
    }

    #[test]
    fn test_predicate_selects_first_match() {
        let obs = observation();
        let found = resolve_first_matching([&obs], "component.valueQuantity.value", |v| {
            v.as_i64().is_some_and(|n| n < 100)
        });
        assert_eq!(found, Some(&json!(80)));

        let none = resolve_first_matching([&obs], "component.valueQuantity.value", |v| {
            v.as_i64().is_some_and(|n| n > 500)
        });
        assert!(none.is_none());
    }

    #[test]
    fn test_choice_segment() {
        let obs = observation();
        assert_eq!(
            resolve_first(&obs, "effective[x]"),
            Some(&json!("2020-02-03T10:00:00Z"))
        );
        let values: Vec<&Value> = resolve(&obs, "component.value[x].value").collect();
        assert_eq!(values, [&json!(120), &json!(80)]);
    }

    #[test]
    fn test_choice_segment_requires_type_suffix() {
        let value = json!({"value": 1, "valueset": 2, "valueCode": "x"});
        let matched: Vec<&Value> = resolve(&value, "value[x]").collect();
        assert_eq!(matched, [&json!("x")]);
    }

    #[test]
    fn test_scalars_do_not_descend() {
        let value = json!({"a": "text"});
        assert_eq!(resolve(&value, "a.b").count(), 0);
    }

    #[test]
    fn test_split_escaped_commas() {
        assert_eq!(split_escaped_commas("a\\,b,c"), ["a,b", "c"]);
        assert_eq!(split_escaped_commas("active"), ["active"]);
        assert_eq!(split_escaped_commas("a,b,,c"), ["a", "b", "", "c"]);
        assert_eq!(split_escaped_commas("x\\,y\\,z"), ["x,y,z"]);
    }
}
