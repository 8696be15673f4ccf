//! Prompt construction and response parsing for the validator's two call
//! shapes: initial analysis and confirmation rounds (spec §4.H).

use crate::error::LlmError;
use crate::model::task::{ChecklistRule, RawFinding, Severity};
use serde::Deserialize;

pub fn initial_analysis_prompt(rule: &ChecklistRule, code_payload: &str, context_blob: &str) -> String {
    format!(
        "Checklist rule: {}\n{}\n\nCode under review:\n{}\n\nContext:\n{}\n\n\
         Surface any candidate vulnerabilities matching this rule. Respond as JSON: \
         {{\"findings\":[{{\"title\":\"...\",\"description\":\"...\",\"severity\":\"info|low|medium|high|critical\",\"confidence\":0.0}}]}}. \
         If nothing applies, respond with an empty findings array.",
        rule.key, rule.prompt_fragment, code_payload, context_blob
    )
}

pub fn initial_analysis_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": { "findings": { "type": "array" } },
        "required": ["findings"],
    })
}

#[derive(Deserialize)]
struct InitialResponse {
    findings: Vec<RawFindingJson>,
}

#[derive(Deserialize)]
struct RawFindingJson {
    title: String,
    description: String,
    severity: String,
    confidence: f32,
}

pub fn parse_initial_response(value: serde_json::Value) -> Result<Vec<RawFinding>, LlmError> {
    let parsed: InitialResponse = serde_json::from_value(value).map_err(|e| LlmError::ParseFailure(e.to_string()))?;
    Ok(parsed
        .findings
        .into_iter()
        .map(|f| RawFinding {
            title: f.title,
            description: f.description,
            severity: parse_severity(&f.severity),
            confidence: f.confidence,
        })
        .collect())
}

fn parse_severity(raw: &str) -> Severity {
    match raw.to_lowercase().as_str() {
        "low" => Severity::Low,
        "medium" => Severity::Medium,
        "high" => Severity::High,
        "critical" => Severity::Critical,
        _ => Severity::Info,
    }
}

pub fn confirmation_prompt(rule: &ChecklistRule, findings: &[RawFinding], round: u32, extra_context: &str) -> String {
    let summary = findings
        .iter()
        .map(|f| format!("- {} ({:?}, confidence {:.2}): {}", f.title, f.severity, f.confidence, f.description))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Checklist rule: {}\nRound {round} confirmation.\n\nCandidate findings so far:\n{summary}\n\n\
         Additional context gathered this round:\n{extra_context}\n\n\
         Does this evidence confirm the finding? Respond as JSON: \
         {{\"verdict\":\"confirmed\"|\"rejected\"|\"uncertain\",\"confidence\":0.0}}.",
        rule.key
    )
}

pub fn confirmation_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": { "verdict": {"type": "string"}, "confidence": {"type": "number"} },
        "required": ["verdict", "confidence"],
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Confirmed,
    Rejected,
    Uncertain,
}

#[derive(Deserialize)]
struct ConfirmationResponse {
    verdict: String,
    confidence: f32,
}

pub fn parse_confirmation_response(value: serde_json::Value) -> Result<(Verdict, f32), LlmError> {
    let parsed: ConfirmationResponse = serde_json::from_value(value).map_err(|e| LlmError::ParseFailure(e.to_string()))?;
    let verdict = match parsed.verdict.to_lowercase().as_str() {
        "confirmed" => Verdict::Confirmed,
        "rejected" => Verdict::Rejected,
        _ => Verdict::Uncertain,
    };
    Ok((verdict, parsed.confidence))
}
