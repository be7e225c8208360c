use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Resource types exercised by the US Core and SMART launch checks
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    AllergyIntolerance,
    CarePlan,
    CareTeam,
    Condition,
    Device,
    DiagnosticReport,
    DocumentReference,
    Encounter,
    Goal,
    Immunization,
    Location,
    Medication,
    MedicationRequest,
    Observation,
    Organization,
    Patient,
    Practitioner,
    PractitionerRole,
    Procedure,
    Provenance,
    Bundle,
    CapabilityStatement,
    OperationOutcome,
    #[serde(untagged)]
    Custom(String),
}

impl ResourceType {
    /// Resource types a patient-scoped search is expected to reach
    pub const PATIENT_COMPARTMENT: &'static [ResourceType] = &[
        ResourceType::Patient,
        ResourceType::AllergyIntolerance,
        ResourceType::CarePlan,
        ResourceType::CareTeam,
        ResourceType::Condition,
        ResourceType::Device,
        ResourceType::DiagnosticReport,
        ResourceType::DocumentReference,
        ResourceType::Encounter,
        ResourceType::Goal,
        ResourceType::Immunization,
        ResourceType::MedicationRequest,
        ResourceType::Observation,
        ResourceType::Procedure,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::AllergyIntolerance => "AllergyIntolerance",
            ResourceType::CarePlan => "CarePlan",
            ResourceType::CareTeam => "CareTeam",
            ResourceType::Condition => "Condition",
            ResourceType::Device => "Device",
            ResourceType::DiagnosticReport => "DiagnosticReport",
            ResourceType::DocumentReference => "DocumentReference",
            ResourceType::Encounter => "Encounter",
            ResourceType::Goal => "Goal",
            ResourceType::Immunization => "Immunization",
            ResourceType::Location => "Location",
            ResourceType::Medication => "Medication",
            ResourceType::MedicationRequest => "MedicationRequest",
            ResourceType::Observation => "Observation",
            ResourceType::Organization => "Organization",
            ResourceType::Patient => "Patient",
            ResourceType::Practitioner => "Practitioner",
            ResourceType::PractitionerRole => "PractitionerRole",
            ResourceType::Procedure => "Procedure",
            ResourceType::Provenance => "Provenance",
            ResourceType::Bundle => "Bundle",
            ResourceType::CapabilityStatement => "CapabilityStatement",
            ResourceType::OperationOutcome => "OperationOutcome",
            ResourceType::Custom(name) => name,
        }
    }

    /// Whether instances live in a patient compartment (searchable by `patient`)
    pub fn is_patient_compartment(&self) -> bool {
        Self::PATIENT_COMPARTMENT.contains(self)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AllergyIntolerance" => Ok(ResourceType::AllergyIntolerance),
            "CarePlan" => Ok(ResourceType::CarePlan),
            "CareTeam" => Ok(ResourceType::CareTeam),
            "Condition" => Ok(ResourceType::Condition),
            "Device" => Ok(ResourceType::Device),
            "DiagnosticReport" => Ok(ResourceType::DiagnosticReport),
            "DocumentReference" => Ok(ResourceType::DocumentReference),
            "Encounter" => Ok(ResourceType::Encounter),
            "Goal" => Ok(ResourceType::Goal),
            "Immunization" => Ok(ResourceType::Immunization),
            "Location" => Ok(ResourceType::Location),
            "Medication" => Ok(ResourceType::Medication),
            "MedicationRequest" => Ok(ResourceType::MedicationRequest),
            "Observation" => Ok(ResourceType::Observation),
            "Organization" => Ok(ResourceType::Organization),
            "Patient" => Ok(ResourceType::Patient),
            "Practitioner" => Ok(ResourceType::Practitioner),
            "PractitionerRole" => Ok(ResourceType::PractitionerRole),
            "Procedure" => Ok(ResourceType::Procedure),
            "Provenance" => Ok(ResourceType::Provenance),
            "Bundle" => Ok(ResourceType::Bundle),
            "CapabilityStatement" => Ok(ResourceType::CapabilityStatement),
            "OperationOutcome" => Ok(ResourceType::OperationOutcome),
            name => {
                if is_valid_resource_type_name(name) {
                    Ok(ResourceType::Custom(name.to_string()))
                } else {
                    Err(CoreError::invalid_resource_type(name.to_string()))
                }
            }
        }
    }
}

/// Validate if a string is a valid FHIR resource type name
pub fn is_valid_resource_type_name(name: &str) -> bool {
    // FHIR resource type names must start with uppercase letter and contain only letters
    !name.is_empty()
        && name
            .chars()
            .next()
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphabetic())
}
