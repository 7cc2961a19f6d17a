pub mod junit;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use crate::batch::DocumentRun;
use crate::models::{Payload, RunOutcome, RunVerdict, SuiteReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Suite Report JSON (the canonical output).
    #[default]
    Json,
    /// JUnit XML, for CI systems.
    Junit,
}

/// Render a single document's verdict. Load failures stay plain text in every format.
pub fn render_single(format: Format, document: &str, verdict: &RunVerdict) -> Result<String> {
    match (format, &verdict.payload) {
        (_, Payload::Text(text)) => Ok(text.clone()),
        (Format::Json, Payload::Report(_)) => verdict.render(),
        (Format::Junit, Payload::Report(_)) => Ok(junit::render(&[(document, verdict)])),
    }
}

#[derive(Serialize)]
struct BatchEntry<'a> {
    document: String,
    outcome: RunOutcome,
    failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a SuiteReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

pub fn render_batch(format: Format, runs: &[DocumentRun]) -> Result<String> {
    match format {
        Format::Json => {
            let entries: Vec<BatchEntry<'_>> = runs
                .iter()
                .map(|run| BatchEntry {
                    document: run.document.display().to_string(),
                    outcome: run.verdict.outcome,
                    failed: run.verdict.failed(),
                    report: run.verdict.report(),
                    message: match &run.verdict.payload {
                        Payload::Text(text) => Some(text.as_str()),
                        Payload::Report(_) => None,
                    },
                })
                .collect();
            serde_json::to_string(&entries).context("failed to serialize batch results")
        }
        Format::Junit => {
            let names: Vec<String> = runs
                .iter()
                .map(|r| r.document.display().to_string())
                .collect();
            let suites: Vec<(&str, &RunVerdict)> = names
                .iter()
                .zip(runs)
                .map(|(name, run)| (name.as_str(), &run.verdict))
                .collect();
            Ok(junit::render(&suites))
        }
    }
}
