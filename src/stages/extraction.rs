//! Structured extraction stage
//!
//! Each complaint narrative is sent to the text generator with a fixed
//! instruction template. A response is kept only if it is a JSON object holding
//! `issue_category`, `severity` and `summary`; everything else goes to the
//! rejected side table with the reason it failed.

use crate::error::{LensError, Result};
use crate::ml::TextGenerator;
use crate::records::ComplaintRecord;
use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

/// Instruction template; the narrative is appended after the marker line
pub const EXTRACTION_PROMPT: &str = "Read the municipal service request resolution below and return strict JSON with exactly three keys:\n\
\"issue_category\": a short lowercase label for the underlying issue,\n\
\"severity\": an integer from 1 (trivial) to 5 (dangerous),\n\
\"summary\": one sentence describing what happened.\n\
Return only the JSON object, no prose and no code fences.";

pub const KEY_CATEGORY: &str = "issue_category";
pub const KEY_SEVERITY: &str = "severity";
pub const KEY_SUMMARY: &str = "summary";

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("valid fence pattern")
});

/// A validated extraction projected into typed columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredExtraction {
    pub id: String,
    pub issue_category: String,
    /// `None` when the model's value is not an integer in 1..=5
    pub severity: Option<i64>,
    pub summary: Option<String>,
}

/// A discarded extraction, kept for failure accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedExtraction {
    pub id: String,
    pub raw_output: String,
    pub reason: String,
}

/// Why a raw output was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    MalformedJson(String),
    NotAnObject,
    MissingKey(&'static str),
    InvalidCategory,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MalformedJson(e) => write!(f, "malformed JSON: {}", e),
            Rejection::NotAnObject => write!(f, "response is not a JSON object"),
            Rejection::MissingKey(key) => write!(f, "missing key '{}'", key),
            Rejection::InvalidCategory => write!(f, "issue_category is not a non-empty string"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Accepted(StructuredExtraction),
    Rejected(RejectedExtraction),
}

/// Full output of one extraction run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionReport {
    pub accepted: Vec<StructuredExtraction>,
    pub rejected: Vec<RejectedExtraction>,
}

impl ExtractionReport {
    fn from_outcomes(outcomes: Vec<ExtractionOutcome>) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match outcome {
                ExtractionOutcome::Accepted(row) => report.accepted.push(row),
                ExtractionOutcome::Rejected(row) => report.rejected.push(row),
            }
        }
        report.accepted.sort_by(|a, b| a.id.cmp(&b.id));
        report.rejected.sort_by(|a, b| a.id.cmp(&b.id));
        report
    }
}

pub fn build_prompt(narrative: &str) -> String {
    format!("{}\n\nNarrative: {}", EXTRACTION_PROMPT, narrative)
}

/// Remove a surrounding Markdown code fence, if any
pub fn strip_code_fence(raw: &str) -> &str {
    match CODE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

/// Integer cast that yields `None` instead of failing, then range check
pub fn cast_severity(value: &Value) -> Option<i64> {
    let severity = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    (1..=5).contains(&severity).then_some(severity)
}

fn parse_output(id: &str, raw: &str) -> std::result::Result<StructuredExtraction, Rejection> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| Rejection::MalformedJson(e.to_string()))?;
    let object = value.as_object().ok_or(Rejection::NotAnObject)?;

    for key in [KEY_CATEGORY, KEY_SEVERITY, KEY_SUMMARY] {
        if !object.contains_key(key) {
            return Err(Rejection::MissingKey(key));
        }
    }

    let issue_category = object[KEY_CATEGORY]
        .as_str()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(Rejection::InvalidCategory)?
        .to_string();

    Ok(StructuredExtraction {
        id: id.to_string(),
        issue_category,
        severity: cast_severity(&object[KEY_SEVERITY]),
        summary: object[KEY_SUMMARY].as_str().map(str::to_string),
    })
}

/// Validate one raw model output
pub fn validate_output(id: &str, raw: &str) -> ExtractionOutcome {
    match parse_output(id, raw) {
        Ok(row) => ExtractionOutcome::Accepted(row),
        Err(rejection) => {
            log::warn!("Rejected extraction for {}: {}", id, rejection);
            ExtractionOutcome::Rejected(RejectedExtraction {
                id: id.to_string(),
                raw_output: raw.to_string(),
                reason: rejection.to_string(),
            })
        }
    }
}

/// Run extraction over every complaint that has a narrative.
///
/// Any generator failure fails the whole run; partial results are dropped.
pub async fn run_extraction(
    generator: &dyn TextGenerator,
    complaints: &[ComplaintRecord],
    concurrency: usize,
) -> Result<ExtractionReport> {
    let inputs: Vec<(&str, &str)> = complaints
        .iter()
        .filter_map(|c| c.resolution.as_deref().map(|text| (c.id.as_str(), text)))
        .collect();

    log::info!(
        "Extracting {} of {} complaints with {}",
        inputs.len(),
        complaints.len(),
        generator.model_name()
    );

    let outcomes: Vec<ExtractionOutcome> = stream::iter(inputs)
        .map(|(id, narrative)| async move {
            let raw = generator.generate(&build_prompt(narrative)).await.map_err(|e| {
                LensError::Extraction(format!("generation failed for {}: {}", id, e))
            })?;
            log::debug!("Generated {} bytes for {}", raw.len(), id);
            Ok::<_, LensError>(validate_output(id, &raw))
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let report = ExtractionReport::from_outcomes(outcomes);
    log::info!(
        "Extraction kept {} rows, rejected {}",
        report.accepted.len(),
        report.rejected.len()
    );
    Ok(report)
}
