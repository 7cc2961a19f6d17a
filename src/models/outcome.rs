use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use super::report::SuiteReport;

/// Terminal classification of one supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    Success,
    AssertionFailure,
    PageError,
    Timeout,
    LoadFailure,
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, RunOutcome::Success)
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_failure() { 1 } else { 0 }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::AssertionFailure => "assertion failure",
            RunOutcome::PageError => "page error",
            RunOutcome::Timeout => "timeout",
            RunOutcome::LoadFailure => "load failure",
        }
    }
}

/// What a run emits on standard output.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Report(SuiteReport),
    /// Only used for load failures, where no test context exists.
    Text(String),
}

#[derive(Debug, Clone)]
pub struct RunVerdict {
    pub outcome: RunOutcome,
    pub payload: Payload,
    pub elapsed: Duration,
}

impl RunVerdict {
    pub fn failed(&self) -> bool {
        self.outcome.is_failure()
    }

    pub fn report(&self) -> Option<&SuiteReport> {
        match &self.payload {
            Payload::Report(report) => Some(report),
            Payload::Text(_) => None,
        }
    }

    /// Serialized report, or the plain-text message for load failures.
    pub fn render(&self) -> Result<String> {
        match &self.payload {
            Payload::Report(report) => {
                serde_json::to_string(report).context("failed to serialize suite report")
            }
            Payload::Text(text) => Ok(text.clone()),
        }
    }
}
