//! The generic check runner.
//!
//! One [`ResourceDescriptor`] yields one suite of checks, always in the same
//! order. The search check fills a suite-scoped cache of resources keyed by
//! patient; every later check only reads that cache. Resource ids and local
//! references seen along the way go into the session's reference index so
//! suites for referenced-only resources (Organization, Practitioner, ...) can
//! run after the patient-searched ones.

use std::collections::HashSet;
use std::sync::Arc;

use octofhir_core::bundle::{is_bundle, resources_of_type};
use octofhir_core::element_path::has_value;
use octofhir_core::{
    ResourceType, UnresolvableReference, collect_references, parse_reference, resolve,
    search_value,
};
use serde_json::Value;

use crate::capability::{CapabilitySummary, fetch_capabilities};
use crate::client::{FhirClient, SearchParams};
use crate::config::RunSettings;
use crate::descriptor::{
    Expectation, MustSupport, ResourceDescriptor, SearchCombination, SearchStrategy,
};
use crate::outcome::{
    CheckReport, CheckResult, RunReport, SuiteReport, Warnings, ensure, fail, omit, skip, skip_if,
};
use crate::search::{
    build_search_params, collect_pages, derived_searches, probe_status_values, resource_label,
    search_with_status_fallback, validate_search_reply,
};
use crate::session::TestSession;
use crate::us_core;
use crate::validation::{
    ProfileValidator, StructuralValidator, TerminologyValidator, check_binding, is_fatal,
};

const PROVENANCE_REVINCLUDE: &str = "Provenance:target";

/// Resources found by a suite's search check, grouped by the patient they
/// were searched for (`None` for referenced-only resources).
#[derive(Debug, Default)]
struct SuiteState {
    groups: Vec<(Option<String>, Vec<Value>)>,
    first_search: Option<SearchParams>,
}

impl SuiteState {
    fn resources(&self) -> impl Iterator<Item = &Value> {
        self.groups.iter().flat_map(|(_, resources)| resources)
    }

    fn all(&self) -> Vec<Value> {
        self.resources().cloned().collect()
    }

    fn first(&self) -> Option<&Value> {
        self.resources().next()
    }

    fn count(&self) -> usize {
        self.groups.iter().map(|(_, resources)| resources.len()).sum()
    }

    fn is_empty(&self) -> bool {
        self.first().is_none()
    }
}

pub struct ConformanceRunner {
    client: FhirClient,
    settings: RunSettings,
    capabilities: CapabilitySummary,
    profile_validator: Arc<dyn ProfileValidator>,
    terminology: Arc<dyn TerminologyValidator>,
}

impl ConformanceRunner {
    /// Runner with the built-in structural validator and US Core value sets.
    pub fn new(client: FhirClient, settings: RunSettings, capabilities: CapabilitySummary) -> Self {
        Self {
            client,
            settings,
            capabilities,
            profile_validator: Arc::new(StructuralValidator::new(&us_core::descriptors())),
            terminology: Arc::new(us_core::terminology()),
        }
    }

    /// Fetch the server's CapabilityStatement and build a runner around it.
    pub async fn discover(client: FhirClient, settings: RunSettings) -> Self {
        let (capabilities, warning) = fetch_capabilities(&client).await;
        if let Some(warning) = warning {
            tracing::warn!(%warning, "treating every interaction as supported");
        }
        client.take_requests();
        Self::new(client, settings, capabilities)
    }

    pub fn with_profile_validator(mut self, validator: Arc<dyn ProfileValidator>) -> Self {
        self.profile_validator = validator;
        self
    }

    pub fn with_terminology(mut self, terminology: Arc<dyn TerminologyValidator>) -> Self {
        self.terminology = terminology;
        self
    }

    pub fn capabilities(&self) -> &CapabilitySummary {
        &self.capabilities
    }

    /// Run every suite, patient-searched descriptors first.
    pub async fn run(
        &self,
        descriptors: &[ResourceDescriptor],
        session: &mut TestSession,
    ) -> RunReport {
        let mut ordered: Vec<&ResourceDescriptor> = descriptors.iter().collect();
        ordered.sort_by_key(|d| d.strategy == SearchStrategy::ByReference);

        let mut report = RunReport::new(self.client.base_url());
        for descriptor in ordered {
            report.suites.push(self.run_suite(descriptor, session).await);
        }
        report
    }

    pub async fn run_suite(
        &self,
        descriptor: &ResourceDescriptor,
        session: &mut TestSession,
    ) -> SuiteReport {
        tracing::info!(profile = descriptor.key(), "running suite");
        self.client.take_requests();
        let type_name = descriptor.type_name();
        let mut suite = SuiteReport::new(descriptor.title.clone());
        let mut state = SuiteState::default();

        let mut warnings = Warnings::default();
        let result = self
            .search_check(descriptor, session, &mut state, &mut warnings)
            .await;
        let title = match descriptor.strategy {
            SearchStrategy::ByPatient => format!(
                "Server returns valid results for {type_name} search by {}",
                descriptor.first_search.label()
            ),
            SearchStrategy::ByReference => {
                format!("Server returns referenced {type_name} resources")
            }
        };
        suite.push(self.report(descriptor, "search", title, result, warnings));

        let result = self.read_check(descriptor, &state).await;
        let title = format!("Server returns correct {type_name} resource from the read interaction");
        suite.push(self.report(descriptor, "read", title, result, Warnings::default()));

        let result = self.vread_check(descriptor, &state).await;
        let title = format!("Server returns correct {type_name} resource from the vread interaction");
        suite.push(self.report(descriptor, "vread", title, result, Warnings::default()));

        let result = self.history_check(descriptor, &state).await;
        let title = format!("Server returns {type_name} history from the history interaction");
        suite.push(self.report(descriptor, "history", title, result, Warnings::default()));

        for combination in &descriptor.combinations {
            let mut warnings = Warnings::default();
            let result = self
                .combination_check(descriptor, combination, &state, &mut warnings)
                .await;
            let expectation = match combination.expectation {
                Expectation::Shall => "SHALL",
                Expectation::Should => "SHOULD",
            };
            let title = format!(
                "Server returns valid results for {type_name} search by {} ({expectation})",
                combination.label()
            );
            let name = format!("search_{}", combination.params.join("_"));
            suite.push(self.report(descriptor, &name, title, result, warnings));
        }

        if descriptor.check_provenance {
            let result = self.provenance_check(descriptor, session, &state).await;
            let title = format!("{type_name} resources returned with _revinclude=Provenance:target");
            suite.push(self.report(descriptor, "provenance", title, result, Warnings::default()));
        }

        let mut warnings = Warnings::default();
        let result = self.profile_check(descriptor, &state, &mut warnings).await;
        let title = format!("{type_name} resources conform to {}", descriptor.key());
        suite.push(self.report(descriptor, "validate", title, result, warnings));

        let result = must_support_check(descriptor, &state);
        let title = format!("All must support elements of {} are provided", descriptor.key());
        suite.push(self.report(descriptor, "must_support", title, result, Warnings::default()));

        if !descriptor.bindings.is_empty() {
            let mut warnings = Warnings::default();
            let result = self.binding_check(descriptor, &state, &mut warnings).await;
            let title = format!("{type_name} coded elements conform to their value set bindings");
            suite.push(self.report(descriptor, "bindings", title, result, warnings));
        }

        let mut warnings = Warnings::default();
        let result = self
            .reference_check(descriptor, session, &state, &mut warnings)
            .await;
        let title = format!("Every reference within {type_name} resources can be read");
        suite.push(self.report(descriptor, "references", title, result, warnings));

        suite
    }

    fn report(
        &self,
        descriptor: &ResourceDescriptor,
        name: &str,
        title: String,
        result: CheckResult,
        warnings: Warnings,
    ) -> CheckReport {
        CheckReport::finish(
            format!("{}::{name}", descriptor.key()),
            title,
            result,
            warnings,
            self.client.take_requests(),
        )
    }

    fn first_search_params(
        &self,
        descriptor: &ResourceDescriptor,
        patient_id: &str,
    ) -> CheckResult<(SearchParams, bool)> {
        let status_param = descriptor.status_search.as_ref().map(|s| s.param.as_str());
        let mut params = SearchParams::new();
        let mut probe_status = false;

        for name in &descriptor.first_search.params {
            let value = match name.as_str() {
                "patient" => Some(patient_id.to_string()),
                "_id" if descriptor.resource_type == ResourceType::Patient => {
                    Some(patient_id.to_string())
                }
                _ => descriptor.fixed_values.get(name).cloned(),
            };
            match value {
                Some(value) => {
                    params.insert(name.clone(), value);
                }
                None if Some(name.as_str()) == status_param => probe_status = true,
                None => {
                    return fail(format!(
                        "No value is available for {} search parameter {name}",
                        descriptor.type_name()
                    ));
                }
            }
        }
        Ok((params, probe_status))
    }

    async fn search_check(
        &self,
        descriptor: &ResourceDescriptor,
        session: &mut TestSession,
        state: &mut SuiteState,
        warnings: &mut Warnings,
    ) -> CheckResult {
        let type_name = descriptor.type_name();
        skip_if(
            !self.capabilities.supports_resource(type_name),
            format!("Server does not declare support for {type_name}"),
        )?;

        if descriptor.strategy == SearchStrategy::ByReference {
            return self.read_referenced(descriptor, session, state).await;
        }

        skip_if(
            session.patient_ids.is_empty(),
            "No patient ids were provided",
        )?;
        for patient_id in session.patient_ids.clone() {
            let (params, probe_status) = self.first_search_params(descriptor, &patient_id)?;
            let (params, response) = if probe_status {
                probe_status_values(&self.client, descriptor, params).await?
            } else {
                search_with_status_fallback(
                    &self.client,
                    &self.capabilities,
                    descriptor,
                    params,
                    warnings,
                )
                .await?
            };
            let resources = collect_pages(
                &self.client,
                descriptor,
                &params,
                &response,
                self.settings.max_pages,
            )
            .await?;
            tracing::debug!(
                resource_type = type_name,
                patient = %patient_id,
                found = resources.len(),
                "search complete"
            );

            for resource in &resources {
                record_references(session, resource);
            }
            if !resources.is_empty() && state.first_search.is_none() {
                state.first_search = Some(params);
            }
            state.groups.push((Some(patient_id), resources));
        }

        if state.is_empty() {
            return skip(format!(
                "No {type_name} resources appear to be available for patient(s) {}",
                session.patient_ids.join(", ")
            ));
        }
        Ok(())
    }

    async fn read_referenced(
        &self,
        descriptor: &ResourceDescriptor,
        session: &mut TestSession,
        state: &mut SuiteState,
    ) -> CheckResult {
        let type_name = descriptor.type_name();
        let ids: Vec<String> = session
            .references(type_name)
            .take(self.settings.max_reference_resolutions)
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return skip(format!(
                "No {type_name} references were found in previously fetched resources"
            ));
        }

        let mut resources = Vec::new();
        for id in ids {
            let response = self.client.read(type_name, &id).await?;
            response.ensure_status(200)?;
            let resource = response.json()?;
            ensure_identity(&resource, type_name, &id)?;
            record_references(session, &resource);
            resources.push(resource);
        }
        state.groups.push((None, resources));
        Ok(())
    }

    async fn read_check(&self, descriptor: &ResourceDescriptor, state: &SuiteState) -> CheckResult {
        let type_name = descriptor.type_name();
        let resource = first_resource(descriptor, state)?;
        let id = resource_id(resource)?;

        let response = self.client.read(type_name, id).await?;
        response.ensure_status(200)?;
        ensure_identity(&response.json()?, type_name, id)
    }

    async fn vread_check(&self, descriptor: &ResourceDescriptor, state: &SuiteState) -> CheckResult {
        let type_name = descriptor.type_name();
        if !self.capabilities.supports_interaction(type_name, "vread") {
            return omit(format!("Server does not declare vread for {type_name}"));
        }
        let resource = first_resource(descriptor, state)?;
        let id = resource_id(resource)?;
        let Some(version) = resource
            .get("meta")
            .and_then(|meta| meta.get("versionId"))
            .and_then(Value::as_str)
        else {
            return skip(format!("{} has no meta.versionId", resource_label(resource)));
        };

        let response = self.client.vread(type_name, id, version).await?;
        response.ensure_status(200)?;
        ensure_identity(&response.json()?, type_name, id)
    }

    async fn history_check(
        &self,
        descriptor: &ResourceDescriptor,
        state: &SuiteState,
    ) -> CheckResult {
        let type_name = descriptor.type_name();
        if !self
            .capabilities
            .supports_interaction(type_name, "history-instance")
        {
            return omit(format!("Server does not declare history for {type_name}"));
        }
        let resource = first_resource(descriptor, state)?;
        let id = resource_id(resource)?;

        let response = self.client.history(type_name, id).await?;
        response.ensure_status(200)?;
        let bundle = response.json()?;
        ensure(is_bundle(&bundle), "History response is not a Bundle")?;
        ensure(
            resources_of_type(&bundle, type_name)
                .any(|entry| entry.get("id").and_then(Value::as_str) == Some(id)),
            format!("History Bundle does not contain {type_name}/{id}"),
        )
    }

    async fn combination_check(
        &self,
        descriptor: &ResourceDescriptor,
        combination: &SearchCombination,
        state: &SuiteState,
        warnings: &mut Warnings,
    ) -> CheckResult {
        let type_name = descriptor.type_name();
        let _ = first_resource(descriptor, state)?;

        let mut unresolved = combination.params.clone();
        let mut found = None;
        for (patient_id, pool) in &state.groups {
            match build_search_params(descriptor, combination, patient_id.as_deref(), pool) {
                Ok(params) => {
                    found = Some((params, pool));
                    break;
                }
                Err(missing) if missing.len() < unresolved.len() => unresolved = missing,
                Err(_) => {}
            }
        }
        let Some((params, pool)) = found else {
            return skip(format!(
                "Could not find values for {} in any {type_name} resource",
                unresolved.join(", ")
            ));
        };

        let names: Vec<&str> = params.keys().map(String::as_str).collect();
        warnings.warn_if(
            !self.capabilities.documents_search(type_name, &names),
            format!(
                "CapabilityStatement does not document {type_name} search by {}",
                combination.label()
            ),
        );

        let (params, response) = search_with_status_fallback(
            &self.client,
            &self.capabilities,
            descriptor,
            params,
            warnings,
        )
        .await?;
        let bundle = validate_search_reply(descriptor, &params, &response)?;
        ensure(
            resources_of_type(&bundle, type_name).next().is_some(),
            format!(
                "Search by {} returned no {type_name} resources",
                combination.label()
            ),
        )?;

        for search in derived_searches(descriptor, &params, pool) {
            let response = self.client.search(type_name, &search).await?;
            validate_search_reply(descriptor, &search, &response)?;
        }
        Ok(())
    }

    async fn provenance_check(
        &self,
        descriptor: &ResourceDescriptor,
        session: &mut TestSession,
        state: &SuiteState,
    ) -> CheckResult {
        let type_name = descriptor.type_name();
        if !self
            .capabilities
            .supports_revinclude(type_name, PROVENANCE_REVINCLUDE)
        {
            return omit(format!(
                "Server does not declare _revinclude={PROVENANCE_REVINCLUDE} for {type_name}"
            ));
        }
        let _ = first_resource(descriptor, state)?;
        let Some(params) = &state.first_search else {
            return skip(format!("No {type_name} search returned resources"));
        };

        let mut params = params.clone();
        params.insert("_revinclude".into(), PROVENANCE_REVINCLUDE.into());
        let response = self.client.search(type_name, &params).await?;
        let bundle = validate_search_reply(descriptor, &params, &response)?;

        let provenance: Vec<&Value> = resources_of_type(&bundle, "Provenance").collect();
        if provenance.is_empty() {
            return skip(format!("No Provenance resources were returned for {type_name}"));
        }
        for resource in provenance {
            if let Some(id) = resource.get("id").and_then(Value::as_str) {
                session.record_reference("Provenance", id);
            }
        }
        Ok(())
    }

    async fn profile_check(
        &self,
        descriptor: &ResourceDescriptor,
        state: &SuiteState,
        warnings: &mut Warnings,
    ) -> CheckResult {
        let _ = first_resource(descriptor, state)?;
        let mut errors = Vec::new();
        for resource in state.resources() {
            let report = self
                .profile_validator
                .validate(resource, &descriptor.profile_url)
                .await;
            let label = resource_label(resource);
            errors.extend(report.errors.iter().map(|e| format!("{label}: {e}")));
            warnings.extend(report.warnings.iter().map(|w| format!("{label}: {w}")));
        }
        ensure(
            errors.is_empty(),
            format!(
                "{} of {} resources do not conform to {}: {}",
                errors.len(),
                state.count(),
                descriptor.key(),
                errors.join("; ")
            ),
        )
    }

    async fn binding_check(
        &self,
        descriptor: &ResourceDescriptor,
        state: &SuiteState,
        warnings: &mut Warnings,
    ) -> CheckResult {
        let _ = first_resource(descriptor, state)?;
        let resources = state.all();
        let mut failures = Vec::new();

        for binding in &descriptor.bindings {
            let result = check_binding(self.terminology.as_ref(), binding, &resources).await;
            warnings.extend(result.warnings);
            if result.invalid.is_empty() {
                continue;
            }
            if is_fatal(binding.strength) {
                failures.extend(
                    result
                        .invalid
                        .into_iter()
                        .map(|v| format!("{v} is not in {}", binding.value_set)),
                );
            } else {
                warnings.extend(result.invalid.into_iter().map(|v| {
                    format!("{v} is not in extensible value set {}", binding.value_set)
                }));
            }
        }
        ensure(
            failures.is_empty(),
            format!("Invalid codes for required bindings: {}", failures.join("; ")),
        )
    }

    async fn reference_check(
        &self,
        descriptor: &ResourceDescriptor,
        session: &mut TestSession,
        state: &SuiteState,
        warnings: &mut Warnings,
    ) -> CheckResult {
        let _ = first_resource(descriptor, state)?;
        let limit = self.settings.max_reference_resolutions;
        let mut seen = HashSet::new();
        let mut failures = Vec::new();

        'resources: for resource in state.resources() {
            for reference in collect_references(resource) {
                let target = match parse_reference(reference, Some(self.client.base_url())) {
                    Ok(target) => target,
                    Err(UnresolvableReference::Invalid(reason)) => {
                        failures.push(format!("{reference} ({reason})"));
                        continue;
                    }
                    Err(other) => {
                        tracing::debug!(%reference, reason = %other, "not resolving reference");
                        continue;
                    }
                };
                if !seen.insert(target.to_relative()) {
                    continue;
                }
                if seen.len() > limit {
                    warnings.warn(format!("Only the first {limit} references were resolved"));
                    break 'resources;
                }

                let response = self
                    .client
                    .read(&target.resource_type, &target.id)
                    .await?;
                if response.status != 200 {
                    failures.push(format!("{reference} (HTTP {})", response.status));
                    continue;
                }
                let body = response.json()?;
                if ensure_identity(&body, &target.resource_type, &target.id).is_err() {
                    failures.push(format!("{reference} (returned {})", resource_label(&body)));
                    continue;
                }
                session.record_reference(&target.resource_type, &target.id);
            }
        }
        ensure(
            failures.is_empty(),
            format!(
                "The following references could not be resolved: {}",
                failures.join(", ")
            ),
        )
    }
}

fn first_resource<'a>(
    descriptor: &ResourceDescriptor,
    state: &'a SuiteState,
) -> CheckResult<&'a Value> {
    match state.first() {
        Some(resource) => Ok(resource),
        None => skip(format!(
            "No {} resources were found by the search check",
            descriptor.type_name()
        )),
    }
}

fn resource_id(resource: &Value) -> CheckResult<&str> {
    match resource.get("id").and_then(Value::as_str) {
        Some(id) => Ok(id),
        None => fail(format!("{} has no id", resource_label(resource))),
    }
}

fn ensure_identity(resource: &Value, resource_type: &str, id: &str) -> CheckResult {
    let actual_type = resource.get("resourceType").and_then(Value::as_str);
    ensure(
        actual_type == Some(resource_type),
        format!(
            "Expected resourceType {resource_type}, but found {}",
            actual_type.unwrap_or("none")
        ),
    )?;
    let actual_id = resource.get("id").and_then(Value::as_str);
    ensure(
        actual_id == Some(id),
        format!(
            "Expected id {id}, but found {}",
            actual_id.unwrap_or("none")
        ),
    )
}

/// Index a resource and its local references in the session.
fn record_references(session: &mut TestSession, resource: &Value) {
    if let (Some(resource_type), Some(id)) = (
        resource.get("resourceType").and_then(Value::as_str),
        resource.get("id").and_then(Value::as_str),
    ) {
        session.record_reference(resource_type, id);
    }
    let base_url = session.base_url.clone();
    for reference in collect_references(resource) {
        if let Ok(target) = parse_reference(reference, Some(&base_url)) {
            session.record_reference(&target.resource_type, &target.id);
        }
    }
}

fn is_supported(resources: &[Value], element: &MustSupport) -> bool {
    resources.iter().any(|resource| match &element.fixed_value {
        Some(fixed) => resolve(resource, &element.path)
            .any(|v| search_value(v, false).as_deref() == Some(fixed.as_str())),
        None => has_value(resource, &element.path),
    })
}

fn must_support_check(descriptor: &ResourceDescriptor, state: &SuiteState) -> CheckResult {
    let _ = first_resource(descriptor, state)?;
    let resources = state.all();
    let missing: Vec<String> = descriptor
        .must_support
        .iter()
        .filter(|element| !is_supported(&resources, element))
        .map(MustSupport::describe)
        .collect();
    skip_if(
        !missing.is_empty(),
        format!(
            "Could not find {} in the {} provided {} resource(s)",
            missing.join(", "),
            resources.len(),
            descriptor.type_name()
        ),
    )
}
