//! Turning resource elements into search parameter values and back.
//!
//! Elements are untyped JSON, so the FHIR datatype is recognised by shape:
//! a `Period` has `start`/`end`, a `Reference` has `reference`, a
//! `CodeableConcept` has `coding`, and so on.

use serde_json::Value;

use crate::element_path::{resolve, split_escaped_commas};
use crate::time::{DateRange, matches_date_search};

/// Search parameter types used by the US Core search definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchParamType {
    Token,
    Reference,
    Date,
    String,
}

/// Whether a value carries no usable content.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Search value for an element, or `None` when nothing usable is present.
///
/// With `include_system`, codings and identifiers render as `system|code`.
pub fn search_value(element: &Value, include_system: bool) -> Option<String> {
    let value = match element {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => {
            if map.contains_key("start") || map.contains_key("end") {
                // Period
                str_field(element, "start").or_else(|| str_field(element, "end"))
            } else if let Some(reference) = str_field(element, "reference") {
                Some(reference)
            } else if let Some(codings) = map.get("coding").and_then(Value::as_array) {
                codings
                    .iter()
                    .find(|c| str_field(c, "code").is_some())
                    .and_then(|c| coding_value(c, include_system))
            } else if map.contains_key("code") {
                coding_value(element, include_system)
            } else if map.contains_key("value") && !map.contains_key("unit") {
                // Identifier
                let value = str_field(element, "value")?;
                match (include_system, str_field(element, "system")) {
                    (true, Some(system)) => Some(format!("{system}|{value}")),
                    _ => Some(value),
                }
            } else if map.contains_key("family") || map.contains_key("given") {
                // HumanName
                str_field(element, "family")
                    .or_else(|| resolve(element, "given").find_map(as_string))
                    .or_else(|| str_field(element, "text"))
            } else {
                // Address
                ["text", "city", "state", "postalCode", "country"]
                    .iter()
                    .find_map(|key| str_field(element, key))
            }
        }
        Value::Null | Value::Array(_) => None,
    };
    value.filter(|v| !is_blank(v))
}

fn coding_value(coding: &Value, include_system: bool) -> Option<String> {
    let code = str_field(coding, "code")?;
    match (include_system, str_field(coding, "system")) {
        (true, Some(system)) => Some(format!("{system}|{code}")),
        _ => Some(code),
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !is_blank(s))
        .map(str::to_string)
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !is_blank(s)).map(str::to_string)
}

/// Whether any element at one of `paths` in `resource` satisfies the search value.
///
/// The value is split on unescaped commas and any alternative may match.
pub fn resource_matches(
    resource: &Value,
    kind: SearchParamType,
    paths: &[&str],
    search_value: &str,
) -> bool {
    let alternatives = split_escaped_commas(search_value);
    paths.iter().any(|path| {
        resolve(resource, path).any(|element| {
            alternatives
                .iter()
                .any(|alternative| element_matches(element, kind, alternative))
        })
    })
}

fn element_matches(element: &Value, kind: SearchParamType, expected: &str) -> bool {
    match kind {
        SearchParamType::Reference => reference_matches(element, expected),
        SearchParamType::Token => token_matches(element, expected),
        SearchParamType::String => string_matches(element, expected),
        SearchParamType::Date => DateRange::from_element(element)
            .is_some_and(|range| matches_date_search(expected, &range)),
    }
}

fn reference_matches(element: &Value, expected: &str) -> bool {
    let Some(reference) = element
        .get("reference")
        .and_then(Value::as_str)
        .or_else(|| element.as_str())
    else {
        return false;
    };
    reference == expected
        || reference.ends_with(&format!("/{expected}"))
        || expected.ends_with(&format!("/{reference}"))
}

fn token_matches(element: &Value, expected: &str) -> bool {
    let (system, code) = match expected.split_once('|') {
        Some((system, code)) => (Some(system), code),
        None => (None, expected),
    };

    let codings: Vec<&Value> = match element {
        Value::String(s) => return system.is_none() && s == code,
        Value::Bool(b) => return system.is_none() && b.to_string() == code,
        Value::Object(map) if map.contains_key("coding") => resolve(element, "coding").collect(),
        Value::Object(_) => vec![element],
        _ => return false,
    };

    codings.iter().any(|coding| {
        let value = coding
            .get("code")
            .or_else(|| coding.get("value"))
            .and_then(Value::as_str);
        let system_matches = match system {
            Some(s) => coding.get("system").and_then(Value::as_str).unwrap_or("") == s,
            None => true,
        };
        system_matches && value == Some(code)
    })
}

fn string_matches(element: &Value, expected: &str) -> bool {
    let expected = expected.to_lowercase();
    let candidates: Vec<String> = match element {
        Value::String(s) => vec![s.clone()],
        Value::Object(_) => ["family", "given", "text", "city", "state", "postalCode", "country", "line", "name"]
            .iter()
            .flat_map(|key| resolve(element, key).filter_map(as_string).collect::<Vec<_>>())
            .collect(),
        _ => Vec::new(),
    };
    candidates
        .iter()
        .any(|c| c.to_lowercase().starts_with(&expected))
}
