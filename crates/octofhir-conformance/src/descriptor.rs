//! Declarative description of one profile's check suite.
//!
//! Every US Core profile is checked the same way; what differs is data:
//! which searches to issue, which element paths feed each search parameter,
//! which elements must be supported and which codes are bound to value sets.
//!
//! ```
//! use octofhir_conformance::descriptor::{BindingStrength, ResourceDescriptor};
//! use octofhir_core::{ResourceType, SearchParamType};
//!
//! let goal = ResourceDescriptor::builder(
//!     ResourceType::Goal,
//!     "http://hl7.org/fhir/us/core/StructureDefinition/us-core-goal",
//! )
//! .patient_param()
//! .param("lifecycle-status", SearchParamType::Token, &["lifecycleStatus"])
//! .date_param("target-date", &["target.dueDate"])
//! .first_search(&["patient"])
//! .should_search(&["patient", "target-date"])
//! .must_support("lifecycleStatus")
//! .binding("lifecycleStatus", "http://hl7.org/fhir/ValueSet/goal-status", BindingStrength::Required)
//! .build();
//!
//! assert_eq!(goal.key(), "us-core-goal");
//! assert!(goal.param("target-date").unwrap().comparators);
//! ```

use indexmap::IndexMap;
use octofhir_core::{ResourceType, SearchParamType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Searched per patient.
    ByPatient,
    /// Read by ids collected from earlier suites' references.
    ByReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    Shall,
    Should,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParamDef {
    pub name: String,
    pub kind: SearchParamType,
    pub paths: Vec<String>,
    /// Date parameters that get the gt/lt/le/ge fan-out.
    pub comparators: bool,
}

impl SearchParamDef {
    pub fn path_refs(&self) -> Vec<&str> {
        self.paths.iter().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCombination {
    pub params: Vec<String>,
    pub expectation: Expectation,
}

impl SearchCombination {
    pub fn label(&self) -> String {
        self.params.join("+")
    }
}

/// Status parameter some servers require on every search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSearch {
    pub param: String,
    /// Tried in order until one returns resources.
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MustSupport {
    pub path: String,
    pub fixed_value: Option<String>,
}

impl MustSupport {
    pub fn describe(&self) -> String {
        match &self.fixed_value {
            Some(value) => format!("{}={}", self.path, value),
            None => self.path.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStrength {
    Required,
    Extensible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub path: String,
    pub value_set: String,
    pub strength: BindingStrength,
}

#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub resource_type: ResourceType,
    pub profile_url: String,
    pub title: String,
    pub strategy: SearchStrategy,
    pub first_search: SearchCombination,
    pub combinations: Vec<SearchCombination>,
    pub params: Vec<SearchParamDef>,
    /// Values used as-is in searches instead of being read from resources.
    pub fixed_values: IndexMap<String, String>,
    pub status_search: Option<StatusSearch>,
    pub must_support: Vec<MustSupport>,
    pub bindings: Vec<Binding>,
    pub required_paths: Vec<String>,
    pub check_provenance: bool,
}

impl ResourceDescriptor {
    pub fn builder(resource_type: ResourceType, profile_url: &str) -> DescriptorBuilder {
        DescriptorBuilder::new(resource_type, profile_url)
    }

    /// Last segment of the profile URL, e.g. `us-core-condition`.
    pub fn key(&self) -> &str {
        self.profile_url
            .rsplit('/')
            .next()
            .unwrap_or(&self.profile_url)
    }

    pub fn type_name(&self) -> &str {
        self.resource_type.as_str()
    }

    pub fn param(&self, name: &str) -> Option<&SearchParamDef> {
        self.params.iter().find(|p| p.name == name)
    }
}

pub struct DescriptorBuilder {
    descriptor: ResourceDescriptor,
}

impl DescriptorBuilder {
    fn new(resource_type: ResourceType, profile_url: &str) -> Self {
        let title = resource_type.to_string();
        Self {
            descriptor: ResourceDescriptor {
                resource_type,
                profile_url: profile_url.to_string(),
                title,
                strategy: SearchStrategy::ByPatient,
                first_search: SearchCombination {
                    params: vec!["patient".to_string()],
                    expectation: Expectation::Shall,
                },
                combinations: Vec::new(),
                params: Vec::new(),
                fixed_values: IndexMap::new(),
                status_search: None,
                must_support: Vec::new(),
                bindings: Vec::new(),
                required_paths: Vec::new(),
                check_provenance: false,
            },
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.descriptor.title = title.to_string();
        self
    }

    pub fn by_reference(mut self) -> Self {
        self.descriptor.strategy = SearchStrategy::ByReference;
        self
    }

    pub fn param(mut self, name: &str, kind: SearchParamType, paths: &[&str]) -> Self {
        self.descriptor.params.push(SearchParamDef {
            name: name.to_string(),
            kind,
            paths: paths.iter().map(|p| p.to_string()).collect(),
            comparators: false,
        });
        self
    }

    /// The `patient` reference parameter over `patient` and `subject`.
    pub fn patient_param(self) -> Self {
        self.param("patient", SearchParamType::Reference, &["patient", "subject"])
    }

    /// A date parameter that also gets the comparator fan-out.
    pub fn date_param(mut self, name: &str, paths: &[&str]) -> Self {
        self = self.param(name, SearchParamType::Date, paths);
        if let Some(last) = self.descriptor.params.last_mut() {
            last.comparators = true;
        }
        self
    }

    pub fn first_search(mut self, params: &[&str]) -> Self {
        self.descriptor.first_search = combination(params, Expectation::Shall);
        self
    }

    pub fn search(mut self, params: &[&str]) -> Self {
        self.descriptor
            .combinations
            .push(combination(params, Expectation::Shall));
        self
    }

    pub fn should_search(mut self, params: &[&str]) -> Self {
        self.descriptor
            .combinations
            .push(combination(params, Expectation::Should));
        self
    }

    pub fn fixed(mut self, param: &str, value: &str) -> Self {
        self.descriptor
            .fixed_values
            .insert(param.to_string(), value.to_string());
        self
    }

    pub fn status(mut self, param: &str, values: &[&str]) -> Self {
        self.descriptor.status_search = Some(StatusSearch {
            param: param.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    pub fn must_support(mut self, path: &str) -> Self {
        self.descriptor.must_support.push(MustSupport {
            path: path.to_string(),
            fixed_value: None,
        });
        self
    }

    pub fn must_support_value(mut self, path: &str, value: &str) -> Self {
        self.descriptor.must_support.push(MustSupport {
            path: path.to_string(),
            fixed_value: Some(value.to_string()),
        });
        self
    }

    pub fn binding(mut self, path: &str, value_set: &str, strength: BindingStrength) -> Self {
        self.descriptor.bindings.push(Binding {
            path: path.to_string(),
            value_set: value_set.to_string(),
            strength,
        });
        self
    }

    /// Element that must be present (min cardinality 1).
    pub fn required(mut self, path: &str) -> Self {
        self.descriptor.required_paths.push(path.to_string());
        self
    }

    pub fn provenance(mut self) -> Self {
        self.descriptor.check_provenance = true;
        self
    }

    pub fn build(self) -> ResourceDescriptor {
        self.descriptor
    }
}

fn combination(params: &[&str], expectation: Expectation) -> SearchCombination {
    SearchCombination {
        params: params.iter().map(|p| p.to_string()).collect(),
        expectation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let descriptor = ResourceDescriptor::builder(
            ResourceType::Organization,
            "http://hl7.org/fhir/us/core/StructureDefinition/us-core-organization",
        )
        .by_reference()
        .param("name", SearchParamType::String, &["name"])
        .search(&["name"])
        .build();

        assert_eq!(descriptor.title, "Organization");
        assert_eq!(descriptor.strategy, SearchStrategy::ByReference);
        assert_eq!(descriptor.first_search.params, ["patient"]);
        assert_eq!(descriptor.combinations[0].label(), "name");
        assert!(!descriptor.param("name").unwrap().comparators);
        assert!(descriptor.param("missing").is_none());
        assert!(!descriptor.check_provenance);
    }

    #[test]
    fn test_must_support_description() {
        let ms = MustSupport {
            path: "category.coding.code".into(),
            fixed_value: Some("laboratory".into()),
        };
        assert_eq!(ms.describe(), "category.coding.code=laboratory");
    }
}
