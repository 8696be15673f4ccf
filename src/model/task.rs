//! The audit task — the fundamental unit of work (spec §3, §4.G, §4.H).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TaskId = Uuid;

/// Which planner mode produced this task. Any subset of modes may be active
/// in a given run (spec §4.G); a task belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    BusinessFlow,
    File,
    Function,
}

impl ScanMode {
    pub fn as_key(&self) -> &'static str {
        match self {
            ScanMode::BusinessFlow => "BUSINESS_FLOW",
            ScanMode::File => "FILE",
            ScanMode::Function => "FUNCTION",
        }
    }
}

/// A named checklist category with its prompt fragment (spec GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistRule {
    pub key: String,
    pub prompt_fragment: String,
}

/// The task's position in the Planned -> Analyzing -> Confirming(k) -> Done|Skipped
/// state machine (spec §4.H). Status transitions are monotone except for an
/// explicit `reset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase")]
pub enum TaskStatus {
    Planned,
    Analyzing,
    Confirming { round: u32 },
    Done { outcome: TaskOutcome },
    Skipped { error_kind: String, detail: String },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done { .. } | TaskStatus::Skipped { .. })
    }

    pub fn round(&self) -> u32 {
        match self {
            TaskStatus::Confirming { round } => *round,
            _ => 0,
        }
    }
}

/// The final outcome distinguished in the report (spec §7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Confirmed,
    Rejected,
}

/// A single LLM exchange recorded for idempotent replay (spec §4.H, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    pub prompt_hash: String,
    pub response: String,
    pub confidence: f32,
}

/// A raw candidate vulnerability surfaced by the validator before
/// post-processing (spec §4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFinding {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// The audit task record (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: String,
    pub name: String,
    pub rule: ChecklistRule,
    pub scan_mode: ScanMode,
    pub target_id: String,
    pub code_payload: String,
    pub context_blob: String,
    pub status: TaskStatus,
    pub rounds: Vec<RoundRecord>,
    pub raw_findings: Vec<RawFinding>,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        project_id: impl Into<String>,
        name: impl Into<String>,
        rule: ChecklistRule,
        scan_mode: ScanMode,
        target_id: impl Into<String>,
        code_payload: impl Into<String>,
        context_blob: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            name: name.into(),
            rule,
            scan_mode,
            target_id: target_id.into(),
            code_payload: code_payload.into(),
            context_blob: context_blob.into(),
            status: TaskStatus::Planned,
            rounds: Vec::new(),
            raw_findings: Vec::new(),
            confidence: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The key that makes task creation idempotent across re-runs (spec §3,
    /// §4.G, §8 "Task keying").
    pub fn key(&self) -> (String, String, String, ScanMode) {
        (
            self.project_id.clone(),
            self.target_id.clone(),
            self.rule.key.clone(),
            self.scan_mode,
        )
    }

    /// Advance the status, refusing to move a terminal task except through
    /// `reset` (spec §3 invariant: "once DONE, task fields are append-only").
    pub fn transition(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn record_round(&mut self, record: RoundRecord) {
        self.confidence = record.confidence;
        self.rounds.push(record);
        self.updated_at = Utc::now();
    }

    /// The business flow a BUSINESS_FLOW-mode task's findings belong to,
    /// recovered from `target_id` (the flow's uuid, set by the planner).
    pub fn flow_id(&self) -> Option<Uuid> {
        if self.scan_mode == ScanMode::BusinessFlow { self.target_id.parse().ok() } else { None }
    }

    /// Explicit escape hatch from a terminal state — the one documented
    /// exception to status transitions being monotone (spec §3).
    pub fn reset(&mut self) {
        self.status = TaskStatus::Planned;
        self.rounds.clear();
        self.raw_findings.clear();
        self.confidence = 0.0;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> ChecklistRule {
        ChecklistRule {
            key: "reentrancy".into(),
            prompt_fragment: "Check for reentrancy".into(),
        }
    }

    #[test]
    fn key_identifies_the_idempotence_quadruple() {
        let t = Task::new("proj", "deposit", rule(), ScanMode::Function, "TokenVault.deposit", "", "");
        assert_eq!(
            t.key(),
            ("proj".into(), "TokenVault.deposit".into(), "reentrancy".into(), ScanMode::Function)
        );
    }

    #[test]
    fn reset_clears_terminal_state() {
        let mut t = Task::new("proj", "deposit", rule(), ScanMode::Function, "T.f", "", "");
        t.transition(TaskStatus::Done { outcome: TaskOutcome::Confirmed });
        assert!(t.status.is_terminal());
        t.reset();
        assert_eq!(t.status, TaskStatus::Planned);
        assert!(t.rounds.is_empty());
    }
}
