//! US Core 3.1.1 profiles as descriptors, and the value sets they bind to.

use octofhir_core::ResourceType;
use octofhir_core::SearchParamType::{Date, Reference, String as Str, Token};

use crate::descriptor::{BindingStrength::*, DescriptorBuilder, ResourceDescriptor};
use crate::validation::InMemoryTerminology;

const PROFILE_BASE: &str = "http://hl7.org/fhir/us/core/StructureDefinition/";

const VS_ADMINISTRATIVE_GENDER: &str = "http://hl7.org/fhir/ValueSet/administrative-gender";
const VS_ALLERGY_CLINICAL: &str = "http://hl7.org/fhir/ValueSet/allergyintolerance-clinical";
const VS_ALLERGY_VERIFICATION: &str =
    "http://hl7.org/fhir/ValueSet/allergyintolerance-verification";
const VS_CAREPLAN_STATUS: &str = "http://hl7.org/fhir/ValueSet/request-status";
const VS_CAREPLAN_INTENT: &str = "http://hl7.org/fhir/ValueSet/care-plan-intent";
const VS_CARETEAM_STATUS: &str = "http://hl7.org/fhir/ValueSet/care-team-status";
const VS_CONDITION_CLINICAL: &str = "http://hl7.org/fhir/ValueSet/condition-clinical";
const VS_CONDITION_VERIFICATION: &str = "http://hl7.org/fhir/ValueSet/condition-ver-status";
const VS_DIAGNOSTIC_REPORT_STATUS: &str = "http://hl7.org/fhir/ValueSet/diagnostic-report-status";
const VS_DOCUMENT_REFERENCE_STATUS: &str =
    "http://hl7.org/fhir/ValueSet/document-reference-status";
const VS_DOCUMENT_TYPE: &str = "http://hl7.org/fhir/us/core/ValueSet/us-core-documentreference-type";
const VS_ENCOUNTER_STATUS: &str = "http://hl7.org/fhir/ValueSet/encounter-status";
const VS_ENCOUNTER_TYPE: &str = "http://hl7.org/fhir/us/core/ValueSet/us-core-encounter-type";
const VS_GOAL_STATUS: &str = "http://hl7.org/fhir/ValueSet/goal-status";
const VS_IMMUNIZATION_STATUS: &str = "http://hl7.org/fhir/ValueSet/immunization-status";
const VS_MEDICATION_REQUEST_STATUS: &str =
    "http://hl7.org/fhir/ValueSet/medicationrequest-status";
const VS_MEDICATION_REQUEST_INTENT: &str =
    "http://hl7.org/fhir/ValueSet/medicationrequest-intent";
const VS_OBSERVATION_STATUS: &str = "http://hl7.org/fhir/ValueSet/observation-status";
const VS_EVENT_STATUS: &str = "http://hl7.org/fhir/ValueSet/event-status";

const ALLERGY_CLINICAL: &[&str] = &["active", "inactive", "resolved"];
const CAREPLAN_STATUS: &[&str] = &[
    "draft",
    "active",
    "on-hold",
    "revoked",
    "completed",
    "entered-in-error",
    "unknown",
];
const CARETEAM_STATUS: &[&str] = &["proposed", "active", "suspended", "inactive", "entered-in-error"];
const CONDITION_CLINICAL: &[&str] = &[
    "active",
    "recurrence",
    "relapse",
    "inactive",
    "remission",
    "resolved",
];
const DIAGNOSTIC_REPORT_STATUS: &[&str] = &[
    "registered",
    "partial",
    "preliminary",
    "final",
    "amended",
    "corrected",
    "appended",
    "cancelled",
    "entered-in-error",
    "unknown",
];
const DOCUMENT_REFERENCE_STATUS: &[&str] = &["current", "superseded", "entered-in-error"];
const ENCOUNTER_STATUS: &[&str] = &[
    "planned",
    "arrived",
    "triaged",
    "in-progress",
    "onleave",
    "finished",
    "cancelled",
    "entered-in-error",
    "unknown",
];
const GOAL_STATUS: &[&str] = &[
    "proposed",
    "planned",
    "accepted",
    "active",
    "on-hold",
    "completed",
    "cancelled",
    "entered-in-error",
    "rejected",
];
const IMMUNIZATION_STATUS: &[&str] = &["completed", "entered-in-error", "not-done"];
const MEDICATION_REQUEST_STATUS: &[&str] = &[
    "active",
    "on-hold",
    "cancelled",
    "completed",
    "entered-in-error",
    "stopped",
    "draft",
    "unknown",
];
const MEDICATION_REQUEST_INTENT: &[&str] = &[
    "proposal",
    "plan",
    "order",
    "original-order",
    "reflex-order",
    "filler-order",
    "instance-order",
    "option",
];
const OBSERVATION_STATUS: &[&str] = &[
    "registered",
    "preliminary",
    "final",
    "amended",
    "corrected",
    "cancelled",
    "entered-in-error",
    "unknown",
];
const PROCEDURE_STATUS: &[&str] = &[
    "preparation",
    "in-progress",
    "not-done",
    "on-hold",
    "stopped",
    "completed",
    "entered-in-error",
    "unknown",
];

pub const SMOKING_STATUS_CODE: &str = "72166-2";
pub const PEDIATRIC_BMI_CODE: &str = "59576-9";
pub const PEDIATRIC_WEIGHT_CODE: &str = "77606-2";
pub const PULSE_OXIMETRY_CODE: &str = "59408-5";

fn profile(resource_type: ResourceType, name: &str) -> DescriptorBuilder {
    ResourceDescriptor::builder(resource_type, &format!("{PROFILE_BASE}{name}"))
}

/// Every US Core 3.1.1 suite, patient-searched suites first.
pub fn descriptors() -> Vec<ResourceDescriptor> {
    vec![
        patient(),
        allergy_intolerance(),
        care_plan(),
        care_team(),
        condition(),
        implantable_device(),
        diagnostic_report_lab(),
        diagnostic_report_note(),
        document_reference(),
        encounter(),
        goal(),
        immunization(),
        medication_request(),
        observation_lab(),
        observation_by_code(
            "us-core-smokingstatus",
            "Smoking Status Observation",
            SMOKING_STATUS_CODE,
            "social-history",
        ),
        observation_by_code(
            "pediatric-bmi-for-age",
            "Pediatric BMI for Age Observation",
            PEDIATRIC_BMI_CODE,
            "vital-signs",
        ),
        observation_by_code(
            "pediatric-weight-for-height",
            "Pediatric Weight for Height Observation",
            PEDIATRIC_WEIGHT_CODE,
            "vital-signs",
        ),
        observation_by_code(
            "us-core-pulse-oximetry",
            "Pulse Oximetry",
            PULSE_OXIMETRY_CODE,
            "vital-signs",
        ),
        procedure(),
        location(),
        medication(),
        organization(),
        practitioner(),
        practitioner_role(),
        provenance(),
    ]
}

/// Descriptors whose key or resource type matches `name` (case-insensitive).
pub fn select(name: &str) -> Vec<ResourceDescriptor> {
    descriptors()
        .into_iter()
        .filter(|d| d.key().eq_ignore_ascii_case(name) || d.type_name().eq_ignore_ascii_case(name))
        .collect()
}

/// The required value sets referenced by the table.
pub fn terminology() -> InMemoryTerminology {
    InMemoryTerminology::new()
        .with_value_set(
            VS_ADMINISTRATIVE_GENDER,
            "http://hl7.org/fhir/administrative-gender",
            &["male", "female", "other", "unknown"],
        )
        .with_value_set(
            VS_ALLERGY_CLINICAL,
            "http://terminology.hl7.org/CodeSystem/allergyintolerance-clinical",
            ALLERGY_CLINICAL,
        )
        .with_value_set(
            VS_ALLERGY_VERIFICATION,
            "http://terminology.hl7.org/CodeSystem/allergyintolerance-verification",
            &["unconfirmed", "confirmed", "refuted", "entered-in-error"],
        )
        .with_value_set(VS_CAREPLAN_STATUS, "http://hl7.org/fhir/request-status", CAREPLAN_STATUS)
        .with_value_set(
            VS_CAREPLAN_INTENT,
            "http://hl7.org/fhir/request-intent",
            &["proposal", "plan", "order", "option"],
        )
        .with_value_set(VS_CARETEAM_STATUS, "http://hl7.org/fhir/care-team-status", CARETEAM_STATUS)
        .with_value_set(
            VS_CONDITION_CLINICAL,
            "http://terminology.hl7.org/CodeSystem/condition-clinical",
            CONDITION_CLINICAL,
        )
        .with_value_set(
            VS_CONDITION_VERIFICATION,
            "http://terminology.hl7.org/CodeSystem/condition-ver-status",
            &[
                "unconfirmed",
                "provisional",
                "differential",
                "confirmed",
                "refuted",
                "entered-in-error",
            ],
        )
        .with_value_set(
            VS_DIAGNOSTIC_REPORT_STATUS,
            "http://hl7.org/fhir/diagnostic-report-status",
            DIAGNOSTIC_REPORT_STATUS,
        )
        .with_value_set(
            VS_DOCUMENT_REFERENCE_STATUS,
            "http://hl7.org/fhir/document-reference-status",
            DOCUMENT_REFERENCE_STATUS,
        )
        .with_value_set(VS_ENCOUNTER_STATUS, "http://hl7.org/fhir/encounter-status", ENCOUNTER_STATUS)
        .with_value_set(VS_GOAL_STATUS, "http://hl7.org/fhir/goal-status", GOAL_STATUS)
        .with_value_set(
            VS_IMMUNIZATION_STATUS,
            "http://hl7.org/fhir/event-status",
            IMMUNIZATION_STATUS,
        )
        .with_value_set(
            VS_MEDICATION_REQUEST_STATUS,
            "http://hl7.org/fhir/CodeSystem/medicationrequest-status",
            MEDICATION_REQUEST_STATUS,
        )
        .with_value_set(
            VS_MEDICATION_REQUEST_INTENT,
            "http://hl7.org/fhir/CodeSystem/medicationrequest-intent",
            MEDICATION_REQUEST_INTENT,
        )
        .with_value_set(
            VS_OBSERVATION_STATUS,
            "http://hl7.org/fhir/observation-status",
            OBSERVATION_STATUS,
        )
        .with_value_set(VS_EVENT_STATUS, "http://hl7.org/fhir/event-status", PROCEDURE_STATUS)
}

fn patient() -> ResourceDescriptor {
    profile(ResourceType::Patient, "us-core-patient")
        .param("_id", Token, &["id"])
        .param("identifier", Token, &["identifier"])
        .param("name", Str, &["name"])
        .param("family", Str, &["name.family"])
        .param("given", Str, &["name.given"])
        .param("gender", Token, &["gender"])
        .param("birthdate", Date, &["birthDate"])
        .first_search(&["_id"])
        .search(&["identifier"])
        .search(&["name"])
        .search(&["birthdate", "name"])
        .search(&["gender", "name"])
        .should_search(&["family", "gender"])
        .should_search(&["birthdate", "family"])
        .must_support("identifier")
        .must_support("identifier.system")
        .must_support("identifier.value")
        .must_support("name")
        .must_support("name.family")
        .must_support("name.given")
        .must_support("telecom")
        .must_support("telecom.system")
        .must_support("telecom.value")
        .must_support("telecom.use")
        .must_support("gender")
        .must_support("birthDate")
        .must_support("address")
        .must_support("address.line")
        .must_support("address.city")
        .must_support("address.state")
        .must_support("address.postalCode")
        .must_support("address.period")
        .must_support("communication")
        .must_support("communication.language")
        .must_support_value("extension.url", "http://hl7.org/fhir/us/core/StructureDefinition/us-core-race")
        .must_support_value(
            "extension.url",
            "http://hl7.org/fhir/us/core/StructureDefinition/us-core-ethnicity",
        )
        .must_support_value(
            "extension.url",
            "http://hl7.org/fhir/us/core/StructureDefinition/us-core-birthsex",
        )
        .required("identifier")
        .required("name")
        .required("gender")
        .binding("gender", VS_ADMINISTRATIVE_GENDER, Required)
        .provenance()
        .build()
}

fn allergy_intolerance() -> ResourceDescriptor {
    profile(ResourceType::AllergyIntolerance, "us-core-allergyintolerance")
        .patient_param()
        .param("clinical-status", Token, &["clinicalStatus"])
        .should_search(&["patient", "clinical-status"])
        .status("clinical-status", ALLERGY_CLINICAL)
        .must_support("clinicalStatus")
        .must_support("verificationStatus")
        .must_support("code")
        .must_support("patient")
        .required("code")
        .required("patient")
        .binding("clinicalStatus", VS_ALLERGY_CLINICAL, Required)
        .binding("verificationStatus", VS_ALLERGY_VERIFICATION, Required)
        .provenance()
        .build()
}

fn care_plan() -> ResourceDescriptor {
    profile(ResourceType::CarePlan, "us-core-careplan")
        .patient_param()
        .param("category", Token, &["category"])
        .param("status", Token, &["status"])
        .date_param("date", &["period"])
        .first_search(&["patient", "category"])
        .fixed("category", "assess-plan")
        .should_search(&["patient", "category", "date"])
        .should_search(&["patient", "category", "status", "date"])
        .should_search(&["patient", "category", "status"])
        .status("status", CAREPLAN_STATUS)
        .must_support("text")
        .must_support("text.status")
        .must_support("status")
        .must_support("intent")
        .must_support_value("category.coding.code", "assess-plan")
        .must_support("subject")
        .required("text")
        .required("status")
        .required("intent")
        .required("category")
        .required("subject")
        .binding("status", VS_CAREPLAN_STATUS, Required)
        .binding("intent", VS_CAREPLAN_INTENT, Required)
        .provenance()
        .build()
}

fn care_team() -> ResourceDescriptor {
    profile(ResourceType::CareTeam, "us-core-careteam")
        .patient_param()
        .param("status", Token, &["status"])
        .first_search(&["patient", "status"])
        .status("status", CARETEAM_STATUS)
        .must_support("status")
        .must_support("subject")
        .must_support("participant")
        .must_support("participant.role")
        .must_support("participant.member")
        .required("subject")
        .required("participant")
        .binding("status", VS_CARETEAM_STATUS, Required)
        .provenance()
        .build()
}

fn condition() -> ResourceDescriptor {
    profile(ResourceType::Condition, "us-core-condition")
        .patient_param()
        .param("category", Token, &["category"])
        .param("clinical-status", Token, &["clinicalStatus"])
        .param("code", Token, &["code"])
        .date_param("onset-date", &["onset[x]"])
        .should_search(&["patient", "onset-date"])
        .should_search(&["patient", "category"])
        .should_search(&["patient", "code"])
        .should_search(&["patient", "clinical-status"])
        .status("clinical-status", CONDITION_CLINICAL)
        .must_support("clinicalStatus")
        .must_support("verificationStatus")
        .must_support("category")
        .must_support("code")
        .must_support("subject")
        .required("category")
        .required("code")
        .required("subject")
        .binding("clinicalStatus", VS_CONDITION_CLINICAL, Required)
        .binding("verificationStatus", VS_CONDITION_VERIFICATION, Required)
        .provenance()
        .build()
}

fn implantable_device() -> ResourceDescriptor {
    profile(ResourceType::Device, "us-core-implantable-device")
        .title("Implantable Device")
        .patient_param()
        .param("type", Token, &["type"])
        .should_search(&["patient", "type"])
        .must_support("udiCarrier")
        .must_support("udiCarrier.deviceIdentifier")
        .must_support("udiCarrier.carrierHRF")
        .must_support("distinctIdentifier")
        .must_support("manufactureDate")
        .must_support("expirationDate")
        .must_support("lotNumber")
        .must_support("serialNumber")
        .must_support("type")
        .must_support("patient")
        .required("type")
        .required("patient")
        .provenance()
        .build()
}

fn diagnostic_report_lab() -> ResourceDescriptor {
    profile(ResourceType::DiagnosticReport, "us-core-diagnosticreport-lab")
        .title("DiagnosticReport for Laboratory Results Reporting")
        .patient_param()
        .param("category", Token, &["category"])
        .param("code", Token, &["code"])
        .param("status", Token, &["status"])
        .date_param("date", &["effective[x]"])
        .first_search(&["patient", "category"])
        .fixed("category", "LAB")
        .search(&["patient"])
        .search(&["patient", "code"])
        .search(&["patient", "category", "date"])
        .should_search(&["patient", "status"])
        .should_search(&["patient", "code", "date"])
        .status("status", DIAGNOSTIC_REPORT_STATUS)
        .must_support("status")
        .must_support("category")
        .must_support_value("category.coding.code", "LAB")
        .must_support("code")
        .must_support("subject")
        .must_support("effective[x]")
        .must_support("issued")
        .must_support("performer")
        .must_support("result")
        .required("status")
        .required("category")
        .required("code")
        .required("subject")
        .binding("status", VS_DIAGNOSTIC_REPORT_STATUS, Required)
        .provenance()
        .build()
}

fn diagnostic_report_note() -> ResourceDescriptor {
    profile(ResourceType::DiagnosticReport, "us-core-diagnosticreport-note")
        .title("DiagnosticReport for Report and Note exchange")
        .patient_param()
        .param("category", Token, &["category"])
        .param("code", Token, &["code"])
        .param("status", Token, &["status"])
        .date_param("date", &["effective[x]"])
        .first_search(&["patient", "category"])
        // Cardiology, Pathology and Radiology report categories
        .fixed("category", "LP29708-2,LP7839-6,LP29684-5")
        .search(&["patient", "code"])
        .search(&["patient", "category", "date"])
        .should_search(&["patient", "status"])
        .should_search(&["patient", "code", "date"])
        .status("status", DIAGNOSTIC_REPORT_STATUS)
        .must_support("status")
        .must_support("category")
        .must_support("code")
        .must_support("subject")
        .must_support("encounter")
        .must_support("effective[x]")
        .must_support("issued")
        .must_support("performer")
        .must_support("presentedForm")
        .required("status")
        .required("category")
        .required("code")
        .required("subject")
        .binding("status", VS_DIAGNOSTIC_REPORT_STATUS, Required)
        .provenance()
        .build()
}

fn document_reference() -> ResourceDescriptor {
    profile(ResourceType::DocumentReference, "us-core-documentreference")
        .patient_param()
        .param("_id", Token, &["id"])
        .param("category", Token, &["category"])
        .param("type", Token, &["type"])
        .param("status", Token, &["status"])
        .date_param("date", &["date"])
        .date_param("period", &["context.period"])
        .search(&["_id"])
        .search(&["patient", "category"])
        .search(&["patient", "category", "date"])
        .search(&["patient", "type"])
        .should_search(&["patient", "status"])
        .should_search(&["patient", "type", "period"])
        .status("status", DOCUMENT_REFERENCE_STATUS)
        .must_support("identifier")
        .must_support("status")
        .must_support("type")
        .must_support("category")
        .must_support("subject")
        .must_support("date")
        .must_support("author")
        .must_support("custodian")
        .must_support("content")
        .must_support("content.attachment")
        .must_support("content.attachment.contentType")
        .must_support("content.format")
        .must_support("context")
        .must_support("context.encounter")
        .must_support("context.period")
        .required("status")
        .required("type")
        .required("category")
        .required("subject")
        .required("content")
        .binding("status", VS_DOCUMENT_REFERENCE_STATUS, Required)
        .binding("type", VS_DOCUMENT_TYPE, Extensible)
        .provenance()
        .build()
}

fn encounter() -> ResourceDescriptor {
    profile(ResourceType::Encounter, "us-core-encounter")
        .patient_param()
        .param("_id", Token, &["id"])
        .param("identifier", Token, &["identifier"])
        .param("status", Token, &["status"])
        .param("class", Token, &["class"])
        .param("type", Token, &["type"])
        .date_param("date", &["period"])
        .search(&["_id"])
        .should_search(&["date", "patient"])
        .should_search(&["identifier"])
        .should_search(&["patient", "status"])
        .should_search(&["class", "patient"])
        .should_search(&["patient", "type"])
        .status("status", ENCOUNTER_STATUS)
        .must_support("identifier")
        .must_support("identifier.system")
        .must_support("identifier.value")
        .must_support("status")
        .must_support("class")
        .must_support("type")
        .must_support("subject")
        .must_support("participant")
        .must_support("participant.type")
        .must_support("participant.period")
        .must_support("participant.individual")
        .must_support("period")
        .must_support("reasonCode")
        .must_support("hospitalization")
        .must_support("hospitalization.dischargeDisposition")
        .must_support("location")
        .must_support("location.location")
        .required("status")
        .required("class")
        .required("type")
        .required("subject")
        .binding("status", VS_ENCOUNTER_STATUS, Required)
        .binding("type", VS_ENCOUNTER_TYPE, Extensible)
        .provenance()
        .build()
}

fn goal() -> ResourceDescriptor {
    profile(ResourceType::Goal, "us-core-goal")
        .patient_param()
        .param("lifecycle-status", Token, &["lifecycleStatus"])
        .date_param("target-date", &["target.dueDate"])
        .should_search(&["patient", "lifecycle-status"])
        .should_search(&["patient", "target-date"])
        .status("lifecycle-status", GOAL_STATUS)
        .must_support("lifecycleStatus")
        .must_support("description")
        .must_support("subject")
        .must_support("target")
        .must_support("target.dueDate")
        .required("lifecycleStatus")
        .required("description")
        .required("subject")
        .binding("lifecycleStatus", VS_GOAL_STATUS, Required)
        .provenance()
        .build()
}

fn immunization() -> ResourceDescriptor {
    profile(ResourceType::Immunization, "us-core-immunization")
        .patient_param()
        .param("status", Token, &["status"])
        .date_param("date", &["occurrence[x]"])
        .should_search(&["patient", "date"])
        .should_search(&["patient", "status"])
        .status("status", IMMUNIZATION_STATUS)
        .must_support("status")
        .must_support("statusReason")
        .must_support("vaccineCode")
        .must_support("patient")
        .must_support("occurrence[x]")
        .must_support("primarySource")
        .required("status")
        .required("vaccineCode")
        .required("patient")
        .required("occurrence[x]")
        .required("primarySource")
        .binding("status", VS_IMMUNIZATION_STATUS, Required)
        .provenance()
        .build()
}

fn medication_request() -> ResourceDescriptor {
    profile(ResourceType::MedicationRequest, "us-core-medicationrequest")
        .patient_param()
        .param("intent", Token, &["intent"])
        .param("status", Token, &["status"])
        .param("encounter", Reference, &["encounter"])
        .date_param("authoredon", &["authoredOn"])
        .first_search(&["patient", "intent"])
        .fixed("intent", &MEDICATION_REQUEST_INTENT.join(","))
        .search(&["patient", "intent", "status"])
        .should_search(&["patient", "intent", "encounter"])
        .should_search(&["patient", "intent", "authoredon"])
        .status("status", MEDICATION_REQUEST_STATUS)
        .must_support("status")
        .must_support("intent")
        .must_support("reported[x]")
        .must_support("medication[x]")
        .must_support("subject")
        .must_support("encounter")
        .must_support("authoredOn")
        .must_support("requester")
        .must_support("dosageInstruction")
        .must_support("dosageInstruction.text")
        .required("status")
        .required("intent")
        .required("medication[x]")
        .required("subject")
        .required("authoredOn")
        .required("requester")
        .binding("status", VS_MEDICATION_REQUEST_STATUS, Required)
        .binding("intent", VS_MEDICATION_REQUEST_INTENT, Required)
        .provenance()
        .build()
}

fn observation_params(builder: DescriptorBuilder) -> DescriptorBuilder {
    builder
        .patient_param()
        .param("category", Token, &["category"])
        .param("code", Token, &["code"])
        .param("status", Token, &["status"])
        .date_param("date", &["effective[x]"])
        .status("status", OBSERVATION_STATUS)
        .required("status")
        .required("category")
        .required("code")
        .required("subject")
        .binding("status", VS_OBSERVATION_STATUS, Required)
        .provenance()
}

fn observation_lab() -> ResourceDescriptor {
    observation_params(profile(ResourceType::Observation, "us-core-observation-lab"))
        .title("Laboratory Result Observation")
        .first_search(&["patient", "category"])
        .fixed("category", "laboratory")
        .search(&["patient", "code"])
        .search(&["patient", "category", "date"])
        .should_search(&["patient", "category", "status"])
        .should_search(&["patient", "code", "date"])
        .must_support("status")
        .must_support("category")
        .must_support_value("category.coding.code", "laboratory")
        .must_support("code")
        .must_support("subject")
        .must_support("effective[x]")
        .must_support("value[x]")
        .must_support("dataAbsentReason")
        .build()
}

fn observation_by_code(name: &str, title: &str, code: &str, category: &str) -> ResourceDescriptor {
    let mut builder = observation_params(profile(ResourceType::Observation, name))
        .title(title)
        .first_search(&["patient", "code"])
        .fixed("code", code)
        .search(&["patient", "category", "date"])
        .search(&["patient", "category"])
        .should_search(&["patient", "code", "date"])
        .should_search(&["patient", "category", "status"])
        .must_support("status")
        .must_support("category")
        .must_support_value("category.coding.code", category)
        .must_support("code")
        .must_support_value("code.coding.code", code)
        .must_support("subject")
        .must_support("effective[x]");
    builder = if code == SMOKING_STATUS_CODE {
        builder.must_support("issued").must_support("valueCodeableConcept")
    } else if code == PULSE_OXIMETRY_CODE {
        builder
            .must_support("value[x]")
            .must_support("component")
            .must_support("component.code")
            .must_support("component.value[x]")
    } else {
        builder
            .must_support("value[x]")
            .must_support("value[x].value")
            .must_support("value[x].unit")
    };
    builder.build()
}

fn procedure() -> ResourceDescriptor {
    profile(ResourceType::Procedure, "us-core-procedure")
        .patient_param()
        .param("code", Token, &["code"])
        .param("status", Token, &["status"])
        .date_param("date", &["performed[x]"])
        .search(&["patient", "date"])
        .should_search(&["patient", "code", "date"])
        .should_search(&["patient", "status"])
        .status("status", PROCEDURE_STATUS)
        .must_support("status")
        .must_support("code")
        .must_support("subject")
        .must_support("performed[x]")
        .required("status")
        .required("code")
        .required("subject")
        .required("performed[x]")
        .binding("status", VS_EVENT_STATUS, Required)
        .provenance()
        .build()
}

fn location() -> ResourceDescriptor {
    profile(ResourceType::Location, "us-core-location")
        .by_reference()
        .param("name", Str, &["name"])
        .param("address", Str, &["address"])
        .param("address-city", Str, &["address.city"])
        .param("address-state", Str, &["address.state"])
        .param("address-postalcode", Str, &["address.postalCode"])
        .should_search(&["name"])
        .should_search(&["address"])
        .should_search(&["address-city"])
        .should_search(&["address-state"])
        .should_search(&["address-postalcode"])
        .must_support("status")
        .must_support("name")
        .must_support("telecom")
        .must_support("address")
        .must_support("address.line")
        .must_support("address.city")
        .must_support("address.state")
        .must_support("address.postalCode")
        .must_support("managingOrganization")
        .required("name")
        .build()
}

fn medication() -> ResourceDescriptor {
    profile(ResourceType::Medication, "us-core-medication")
        .by_reference()
        .must_support("code")
        .required("code")
        .build()
}

fn organization() -> ResourceDescriptor {
    profile(ResourceType::Organization, "us-core-organization")
        .by_reference()
        .param("name", Str, &["name"])
        .param("address", Str, &["address"])
        .search(&["name"])
        .search(&["address"])
        .must_support("identifier")
        .must_support("identifier.system")
        .must_support("identifier.value")
        .must_support("active")
        .must_support("name")
        .must_support("telecom")
        .must_support("address")
        .must_support("address.line")
        .must_support("address.city")
        .must_support("address.state")
        .must_support("address.postalCode")
        .must_support("address.country")
        .required("active")
        .required("name")
        .build()
}

fn practitioner() -> ResourceDescriptor {
    profile(ResourceType::Practitioner, "us-core-practitioner")
        .by_reference()
        .param("name", Str, &["name"])
        .param("identifier", Token, &["identifier"])
        .search(&["name"])
        .search(&["identifier"])
        .must_support("identifier")
        .must_support("identifier.system")
        .must_support("identifier.value")
        .must_support("name")
        .must_support("name.family")
        .required("identifier")
        .required("name")
        .build()
}

fn practitioner_role() -> ResourceDescriptor {
    profile(ResourceType::PractitionerRole, "us-core-practitionerrole")
        .by_reference()
        .param("specialty", Token, &["specialty"])
        .param("practitioner", Reference, &["practitioner"])
        .search(&["specialty"])
        .search(&["practitioner"])
        .must_support("practitioner")
        .must_support("organization")
        .must_support("code")
        .must_support("specialty")
        .must_support("location")
        .must_support("telecom")
        .must_support("telecom.system")
        .must_support("telecom.value")
        .must_support("endpoint")
        .build()
}

fn provenance() -> ResourceDescriptor {
    profile(ResourceType::Provenance, "us-core-provenance")
        .by_reference()
        .must_support("target")
        .must_support("recorded")
        .must_support("agent")
        .must_support("agent.type")
        .must_support("agent.who")
        .must_support("agent.onBehalfOf")
        .required("target")
        .required("recorded")
        .required("agent")
        .build()
}
