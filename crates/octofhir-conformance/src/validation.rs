//! Profile and terminology validation seams.
//!
//! A full FHIR validation engine is an external collaborator. The traits here
//! are what the checks call; the built-in implementations cover structure
//! and the small required value sets US Core binds to.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use octofhir_core::element_path::{has_value, resolve};
use serde_json::Value;
use thiserror::Error;

use crate::descriptor::{Binding, BindingStrength, ResourceDescriptor};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[async_trait]
pub trait ProfileValidator: Send + Sync {
    async fn validate(&self, resource: &Value, profile_url: &str) -> ValidationReport;
}

/// Structural checks against what the descriptor table knows of a profile.
#[derive(Debug, Clone, Default)]
pub struct StructuralValidator {
    profiles: HashMap<String, ProfileShape>,
}

#[derive(Debug, Clone)]
struct ProfileShape {
    resource_type: String,
    required_paths: Vec<String>,
}

impl StructuralValidator {
    pub fn new<'a>(descriptors: impl IntoIterator<Item = &'a ResourceDescriptor>) -> Self {
        let profiles = descriptors
            .into_iter()
            .map(|d| {
                (
                    d.profile_url.clone(),
                    ProfileShape {
                        resource_type: d.type_name().to_string(),
                        required_paths: d.required_paths.clone(),
                    },
                )
            })
            .collect();
        Self { profiles }
    }
}

#[async_trait]
impl ProfileValidator for StructuralValidator {
    async fn validate(&self, resource: &Value, profile_url: &str) -> ValidationReport {
        let mut report = ValidationReport::default();
        if !resource.is_object() {
            report.errors.push("resource is not a JSON object".into());
            return report;
        }

        let actual_type = resource.get("resourceType").and_then(Value::as_str);
        if actual_type.is_none() {
            report.errors.push("resourceType is missing".into());
        }
        if resource
            .get("id")
            .and_then(Value::as_str)
            .is_none_or(|id| id.trim().is_empty())
        {
            report.errors.push("id is missing".into());
        }

        let Some(shape) = self.profiles.get(profile_url) else {
            report
                .warnings
                .push(format!("Profile {profile_url} is not known; only structure was checked"));
            return report;
        };

        if let Some(actual) = actual_type
            && actual != shape.resource_type
        {
            report.errors.push(format!(
                "expected resourceType {}, found {actual}",
                shape.resource_type
            ));
        }
        for path in &shape.required_paths {
            if !has_value(resource, path) {
                report.errors.push(format!("{path}: minimum required = 1, but only found 0"));
            }
        }
        report
    }
}

/// Terminology could not answer the question at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingResolutionError {
    #[error("unknown value set {0}")]
    UnknownValueSet(String),

    #[error("unknown code system {0}")]
    UnknownCodeSystem(String),
}

#[async_trait]
pub trait TerminologyValidator: Send + Sync {
    /// Whether `code` (from `system`, when given) is a member of the value set.
    async fn validate_code(
        &self,
        value_set_url: &str,
        code: &str,
        system: Option<&str>,
    ) -> Result<bool, BindingResolutionError>;
}

/// Value sets held in memory as `(system, code)` pairs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTerminology {
    value_sets: HashMap<String, HashSet<(String, String)>>,
    systems: HashSet<String>,
}

impl InMemoryTerminology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_value_set(&mut self, url: &str, system: &str, codes: &[&str]) {
        let members = self.value_sets.entry(url.to_string()).or_default();
        for code in codes {
            members.insert((system.to_string(), code.to_string()));
        }
        self.systems.insert(system.to_string());
    }

    pub fn with_value_set(mut self, url: &str, system: &str, codes: &[&str]) -> Self {
        self.add_value_set(url, system, codes);
        self
    }
}

#[async_trait]
impl TerminologyValidator for InMemoryTerminology {
    async fn validate_code(
        &self,
        value_set_url: &str,
        code: &str,
        system: Option<&str>,
    ) -> Result<bool, BindingResolutionError> {
        let members = self
            .value_sets
            .get(value_set_url)
            .ok_or_else(|| BindingResolutionError::UnknownValueSet(value_set_url.to_string()))?;
        match system {
            Some(system) => {
                if !self.systems.contains(system) {
                    return Err(BindingResolutionError::UnknownCodeSystem(system.to_string()));
                }
                Ok(members.contains(&(system.to_string(), code.to_string())))
            }
            None => Ok(members.iter().any(|(_, c)| c == code)),
        }
    }
}

/// Result of checking one binding across a set of resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingCheck {
    /// Values outside the value set, described for the report.
    pub invalid: Vec<String>,
    pub warnings: Vec<String>,
    /// Number of coded elements found at the binding path.
    pub checked: usize,
}

/// Check every coded value at `binding.path`.
///
/// Each element is valid when any of its codings is. For a coding,
/// `(system, code)` is validated first; an `UnknownCodeSystem` answer is
/// retried as a code-only lookup, and an `UnknownValueSet` answer leaves the
/// element unchecked with a warning. Invalid values are only collected here:
/// the caller decides between failure (required) and warning (extensible).
pub async fn check_binding(
    terminology: &dyn TerminologyValidator,
    binding: &Binding,
    resources: &[Value],
) -> BindingCheck {
    let mut result = BindingCheck::default();
    let mut warned = HashSet::new();

    for resource in resources {
        for element in resolve(resource, &binding.path) {
            let codings = codings_of(element);
            if codings.is_empty() {
                continue;
            }
            result.checked += 1;

            let mut any_valid = false;
            let mut unchecked = false;
            for (system, code) in &codings {
                match lookup(terminology, &binding.value_set, code, system.as_deref()).await {
                    Ok(true) => {
                        any_valid = true;
                        break;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        unchecked = true;
                        let warning = format!(
                            "{}: {err}; binding to {} was not checked",
                            binding.path, binding.value_set
                        );
                        if warned.insert(warning.clone()) {
                            result.warnings.push(warning);
                        }
                    }
                }
            }
            if !any_valid && !unchecked {
                result.invalid.push(describe(resource, &binding.path, &codings));
            }
        }
    }
    result
}

async fn lookup(
    terminology: &dyn TerminologyValidator,
    value_set: &str,
    code: &str,
    system: Option<&str>,
) -> Result<bool, BindingResolutionError> {
    match terminology.validate_code(value_set, code, system).await {
        Err(BindingResolutionError::UnknownCodeSystem(_)) if system.is_some() => {
            terminology.validate_code(value_set, code, None).await
        }
        other => other,
    }
}

/// `(system, code)` pairs of a code, Coding, CodeableConcept or Quantity.
fn codings_of(element: &Value) -> Vec<(Option<String>, String)> {
    let pair = |v: &Value| {
        v.get("code").and_then(Value::as_str).map(|code| {
            (
                v.get("system").and_then(Value::as_str).map(str::to_string),
                code.to_string(),
            )
        })
    };
    match element {
        Value::String(code) => vec![(None, code.clone())],
        Value::Object(map) if map.contains_key("coding") => {
            resolve(element, "coding").filter_map(pair).collect()
        }
        Value::Object(_) => pair(element).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn describe(resource: &Value, path: &str, codings: &[(Option<String>, String)]) -> String {
    let id = resource.get("id").and_then(Value::as_str).unwrap_or("?");
    let values: Vec<String> = codings
        .iter()
        .map(|(system, code)| match system {
            Some(system) => format!("{system}|{code}"),
            None => code.clone(),
        })
        .collect();
    format!("{id} {path}: {}", values.join(", "))
}

/// Whether an unmet binding of this strength is a failure.
pub fn is_fatal(strength: BindingStrength) -> bool {
    strength == BindingStrength::Required
}
