//! Issuing searches and checking what comes back.

use std::collections::HashSet;

use octofhir_core::bundle::{
    is_bundle, is_operation_outcome, next_link, outcome_messages, resource_type_of,
    resources_of_type,
};
use octofhir_core::{
    Comparator, SearchParamType, comparator_value, resolve, resource_matches, search_value,
};
use serde_json::Value;

use crate::capability::CapabilitySummary;
use crate::client::{FhirClient, FhirResponse, SearchParams};
use crate::descriptor::{ResourceDescriptor, SearchCombination, SearchParamDef};
use crate::outcome::{CheckResult, Warnings, ensure, fail};

/// `Type/id` of a resource, for messages.
pub fn resource_label(resource: &Value) -> String {
    format!(
        "{}/{}",
        resource_type_of(resource).unwrap_or("Resource"),
        resource.get("id").and_then(Value::as_str).unwrap_or("?")
    )
}

fn ensure_success(response: &FhirResponse) -> CheckResult {
    ensure(
        response.is_success(),
        format!(
            "Bad response code: expected 2xx, but found {}",
            response.status
        ),
    )
}

fn has_entries(response: &FhirResponse, resource_type: &str) -> bool {
    match serde_json::from_str::<Value>(&response.body) {
        Ok(bundle) => resources_of_type(&bundle, resource_type).next().is_some(),
        Err(_) => false,
    }
}

/// Search, falling back to the descriptor's status values when the server
/// insists on a status parameter.
///
/// A 400 answer must carry an OperationOutcome. The search is then repeated
/// with each status value in turn until one returns entries of the searched
/// type. The returned reply may still be empty.
pub async fn search_with_status_fallback(
    client: &FhirClient,
    capabilities: &CapabilitySummary,
    descriptor: &ResourceDescriptor,
    params: SearchParams,
    warnings: &mut Warnings,
) -> CheckResult<(SearchParams, FhirResponse)> {
    let type_name = descriptor.type_name();
    let response = client.search(type_name, &params).await?;
    if response.status != 400 {
        ensure_success(&response)?;
        return Ok((params, response));
    }

    let body: Option<Value> = serde_json::from_str(&response.body).ok();
    let Some(outcome) = body.filter(is_operation_outcome) else {
        return fail(format!(
            "Server returned 400 for {type_name} search without an OperationOutcome"
        ));
    };
    tracing::debug!(
        resource_type = type_name,
        reason = %outcome_messages(&outcome),
        "search rejected, retrying with status values"
    );

    let Some(status) = &descriptor.status_search else {
        return fail(format!(
            "Server rejected {type_name} search with 400 and no status values are known to retry with"
        ));
    };
    let mut names: Vec<&str> = params.keys().map(String::as_str).collect();
    names.push(&status.param);
    warnings.warn_if(
        !capabilities.documents_search(type_name, &names),
        format!(
            "Server requires {} to search {type_name}, but the CapabilityStatement does not document a search by {}",
            status.param,
            names.join("+")
        ),
    );

    probe_status_values(client, descriptor, params).await
}

/// Repeat a search with each status value until one returns entries.
pub async fn probe_status_values(
    client: &FhirClient,
    descriptor: &ResourceDescriptor,
    params: SearchParams,
) -> CheckResult<(SearchParams, FhirResponse)> {
    let type_name = descriptor.type_name();
    let Some(status) = &descriptor.status_search else {
        return fail(format!("No status values are known for {type_name}"));
    };

    let mut last = None;
    for value in &status.values {
        let mut with_status = params.clone();
        with_status.insert(status.param.clone(), value.clone());
        let response = client.search(type_name, &with_status).await?;
        ensure_success(&response)?;
        if has_entries(&response, type_name) {
            return Ok((with_status, response));
        }
        last = Some((with_status, response));
    }
    match last {
        Some(last) => Ok(last),
        None => fail(format!("No status values are known for {type_name}")),
    }
}

/// Check one searchset reply: status 200, a Bundle, and every entry of the
/// searched type matching each defined parameter.
pub fn validate_search_reply(
    descriptor: &ResourceDescriptor,
    params: &SearchParams,
    response: &FhirResponse,
) -> CheckResult<Value> {
    response.ensure_status(200)?;
    let bundle = response.json()?;
    if !is_bundle(&bundle) {
        return fail(format!(
            "Expected a Bundle, but found {}",
            resource_type_of(&bundle).unwrap_or("a body without resourceType")
        ));
    }

    for resource in resources_of_type(&bundle, descriptor.type_name()) {
        for (name, value) in params {
            let Some(def) = descriptor.param(name) else {
                continue;
            };
            ensure(
                resource_matches(resource, def.kind, &def.path_refs(), value),
                format!(
                    "{} does not match search parameter {name}={value}",
                    resource_label(resource)
                ),
            )?;
        }
    }
    Ok(bundle)
}

/// Validate the first page of a reply and follow `next` links, collecting
/// every resource of the searched type.
pub async fn collect_pages(
    client: &FhirClient,
    descriptor: &ResourceDescriptor,
    params: &SearchParams,
    first: &FhirResponse,
    max_pages: usize,
) -> CheckResult<Vec<Value>> {
    let type_name = descriptor.type_name();
    let mut bundle = validate_search_reply(descriptor, params, first)?;
    let mut resources = Vec::new();
    let mut visited = HashSet::new();
    let mut pages = 1;

    loop {
        resources.extend(resources_of_type(&bundle, type_name).cloned());
        let Some(next) = next_link(&bundle).map(str::to_string) else {
            break;
        };
        if pages >= max_pages {
            tracing::debug!(resource_type = type_name, pages, "page limit reached");
            break;
        }
        if !visited.insert(next.clone()) {
            break;
        }
        let response = client.get_url(&next).await?;
        bundle = validate_search_reply(descriptor, params, &response)?;
        pages += 1;
    }
    Ok(resources)
}

fn first_search_value(def: &SearchParamDef, resource: &Value) -> Option<String> {
    def.paths
        .iter()
        .flat_map(|path| resolve(resource, path))
        .find_map(|element| search_value(element, false))
}

/// Build the parameters of a dependent search from already-fetched resources.
///
/// `patient` takes the patient id; every other value is read from the
/// resources. A resource that supplies every value is preferred so the search
/// is expected to find it again. On failure the unresolved names are returned.
pub fn build_search_params(
    descriptor: &ResourceDescriptor,
    combination: &SearchCombination,
    patient_id: Option<&str>,
    pool: &[Value],
) -> Result<SearchParams, Vec<String>> {
    let resolve_from = |resource: &Value| -> (SearchParams, Vec<String>) {
        let mut params = SearchParams::new();
        let mut missing = Vec::new();
        for name in &combination.params {
            let value = match name.as_str() {
                "patient" => patient_id.map(str::to_string),
                _ => descriptor
                    .param(name)
                    .and_then(|def| first_search_value(def, resource)),
            };
            match value {
                Some(value) => {
                    params.insert(name.clone(), value);
                }
                None => missing.push(name.clone()),
            }
        }
        (params, missing)
    };

    let mut unresolved: Option<Vec<String>> = None;
    for resource in pool {
        let (params, missing) = resolve_from(resource);
        if missing.is_empty() {
            return Ok(params);
        }
        unresolved = Some(match unresolved {
            Some(previous) if previous.len() <= missing.len() => previous,
            _ => missing,
        });
    }
    Err(unresolved.unwrap_or_else(|| combination.params.clone()))
}

/// Extra searches derived from a passing one: `system|code` for token values
/// taken from codings with a system, and the comparator fan-out for dates.
pub fn derived_searches(
    descriptor: &ResourceDescriptor,
    params: &SearchParams,
    pool: &[Value],
) -> Vec<SearchParams> {
    let mut searches = Vec::new();
    for (name, value) in params {
        let Some(def) = descriptor.param(name) else {
            continue;
        };
        match def.kind {
            SearchParamType::Token => {
                if let Some(with_system) = system_qualified(def, value, pool) {
                    let mut search = params.clone();
                    search.insert(name.clone(), with_system);
                    searches.push(search);
                }
            }
            SearchParamType::Date if def.comparators => {
                for comparator in Comparator::FAN_OUT {
                    let mut search = params.clone();
                    search.insert(name.clone(), comparator_value(comparator, value));
                    searches.push(search);
                }
            }
            _ => {}
        }
    }
    searches
}

fn system_qualified(def: &SearchParamDef, code: &str, pool: &[Value]) -> Option<String> {
    pool.iter()
        .flat_map(|resource| def.paths.iter().flat_map(move |path| resolve(resource, path)))
        .filter_map(|element| search_value(element, true))
        .find(|value| {
            value
                .split_once('|')
                .is_some_and(|(system, c)| !system.is_empty() && c == code)
        })
}
