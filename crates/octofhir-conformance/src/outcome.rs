//! Check outcomes and reports.
//!
//! A check body returns [`CheckResult`]. `Err(CheckAbort::Fail)` and
//! `Err(CheckAbort::Skip)` stop the check at the point of the `?`; warnings
//! are collected on the side in [`Warnings`] and never change the outcome.

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Final outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
    /// Not applicable: the server declares the interaction unsupported.
    Omit,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Fail => "fail",
            Outcome::Skip => "skip",
            Outcome::Omit => "omit",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short-circuiting outcome of a check body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckAbort {
    Fail(String),
    Skip(String),
    Omit(String),
}

impl CheckAbort {
    pub fn message(&self) -> &str {
        match self {
            CheckAbort::Fail(m) | CheckAbort::Skip(m) | CheckAbort::Omit(m) => m,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            CheckAbort::Fail(_) => Outcome::Fail,
            CheckAbort::Skip(_) => Outcome::Skip,
            CheckAbort::Omit(_) => Outcome::Omit,
        }
    }
}

impl From<ClientError> for CheckAbort {
    fn from(err: ClientError) -> Self {
        CheckAbort::Fail(err.to_string())
    }
}

impl From<serde_json::Error> for CheckAbort {
    fn from(err: serde_json::Error) -> Self {
        CheckAbort::Fail(format!("Response body is not valid JSON: {err}"))
    }
}

pub type CheckResult<T = ()> = Result<T, CheckAbort>;

pub fn fail<T>(message: impl Into<String>) -> CheckResult<T> {
    Err(CheckAbort::Fail(message.into()))
}

pub fn skip<T>(message: impl Into<String>) -> CheckResult<T> {
    Err(CheckAbort::Skip(message.into()))
}

pub fn omit<T>(message: impl Into<String>) -> CheckResult<T> {
    Err(CheckAbort::Omit(message.into()))
}

/// Fail unless `condition` holds.
pub fn ensure(condition: bool, message: impl Into<String>) -> CheckResult {
    if condition { Ok(()) } else { fail(message) }
}

/// Skip when `condition` holds.
pub fn skip_if(condition: bool, message: impl Into<String>) -> CheckResult {
    if condition { skip(message) } else { Ok(()) }
}

/// Non-fatal findings accumulated while a check runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Warnings(Vec<String>);

impl Warnings {
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(warning = %message, "check warning");
        self.0.push(message);
    }

    pub fn warn_if(&mut self, condition: bool, message: impl Into<String>) {
        if condition {
            self.warn(message);
        }
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = String>) {
        for message in messages {
            self.warn(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// One HTTP exchange issued during a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    /// `None` when no response was received.
    pub status: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub id: String,
    pub title: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requests: Vec<RequestRecord>,
}

impl CheckReport {
    /// Build the report for a finished check and log its outcome.
    pub fn finish(
        id: impl Into<String>,
        title: impl Into<String>,
        result: CheckResult,
        warnings: Warnings,
        requests: Vec<RequestRecord>,
    ) -> Self {
        let (outcome, message) = match result {
            Ok(()) => (Outcome::Pass, None),
            Err(abort) => (abort.outcome(), Some(abort.message().to_string())),
        };
        let report = Self {
            id: id.into(),
            title: title.into(),
            outcome,
            message,
            warnings: warnings.into_vec(),
            requests,
        };
        match report.outcome {
            Outcome::Pass => tracing::info!(check = %report.id, "pass"),
            Outcome::Fail => {
                tracing::warn!(check = %report.id, message = ?report.message, "fail")
            }
            Outcome::Skip | Outcome::Omit => {
                tracing::info!(check = %report.id, outcome = %report.outcome, message = ?report.message, "not run")
            }
        }
        report
    }

    /// Report for a check that never ran because an earlier step failed.
    pub fn skipped(id: impl Into<String>, title: impl Into<String>, reason: &str) -> Self {
        Self::finish(
            id,
            title,
            skip(reason.to_string()),
            Warnings::default(),
            Vec::new(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub name: String,
    pub checks: Vec<CheckReport>,
}

impl SuiteReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checks: Vec::new(),
        }
    }

    pub fn push(&mut self, report: CheckReport) {
        self.checks.push(report);
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.checks.iter().filter(|c| c.outcome == outcome).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(Outcome::Fail) > 0
    }

    pub fn check(&self, id_suffix: &str) -> Option<&CheckReport> {
        self.checks.iter().find(|c| c.id.ends_with(id_suffix))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub base_url: String,
    pub started_at: String,
    pub suites: Vec<SuiteReport>,
}

impl RunReport {
    pub fn new(base_url: impl Into<String>) -> Self {
        let started_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            started_at,
            suites: Vec::new(),
        }
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.suites.iter().map(|s| s.count(outcome)).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.suites.iter().any(SuiteReport::has_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: Option<u32>) -> CheckResult<u32> {
        let v = value.ok_or_else(|| CheckAbort::Skip("nothing to check".into()))?;
        ensure(v > 10, format!("{v} is too small"))?;
        Ok(v)
    }

    #[test]
    fn test_question_mark_short_circuits() {
        assert_eq!(body(Some(20)), Ok(20));
        assert_eq!(body(Some(5)), Err(CheckAbort::Fail("5 is too small".into())));
        assert_eq!(body(None), Err(CheckAbort::Skip("nothing to check".into())));
    }

    #[test]
    fn test_warnings_do_not_change_outcome() {
        let mut warnings = Warnings::default();
        warnings.warn("expires_in is not numeric");
        warnings.warn_if(false, "never recorded");
        let report = CheckReport::finish("x::token", "Token", Ok(()), warnings, Vec::new());
        assert_eq!(report.outcome, Outcome::Pass);
        assert_eq!(report.warnings, ["expires_in is not numeric"]);
        assert!(report.message.is_none());
    }

    #[test]
    fn test_suite_counters_and_serialization() {
        let mut suite = SuiteReport::new("Condition");
        suite.push(CheckReport::finish("c::search", "Search", Ok(()), Warnings::default(), vec![]));
        suite.push(CheckReport::finish(
            "c::read",
            "Read",
            fail("Bad response code: expected 200, but found 404"),
            Warnings::default(),
            vec![RequestRecord {
                method: "GET".into(),
                url: "http://x/Condition/1".into(),
                status: Some(404),
            }],
        ));
        suite.push(CheckReport::skipped("c::vread", "Vread", "previous step failed"));
        assert_eq!(suite.count(Outcome::Pass), 1);
        assert_eq!(suite.count(Outcome::Skip), 1);
        assert!(suite.has_failures());
        assert_eq!(suite.check("::read").map(|c| c.outcome), Some(Outcome::Fail));

        let json = serde_json::to_value(&suite).unwrap();
        assert_eq!(json["checks"][1]["outcome"], "fail");
        assert_eq!(json["checks"][1]["requests"][0]["status"], 404);
        assert!(json["checks"][0].get("warnings").is_none());
    }

    #[test]
    fn test_json_error_becomes_fail() {
        let abort: CheckAbort = serde_json::from_str::<serde_json::Value>("<html>")
            .unwrap_err()
            .into();
        assert_eq!(abort.outcome(), Outcome::Fail);
        assert!(abort.message().starts_with("Response body is not valid JSON"));
    }
}
