//! Business flows — ordered function sequences representing a user-facing
//! scenario (spec §3, §4.D).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type FlowId = Uuid;

/// Where a flow's steps originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowSource {
    JsonFile,
    Mermaid,
    Ast,
    Llm,
}

/// A single step in a flow, as written in the source artifact (`File.fn` or
/// `Contract.fn`) and, once resolved, the function id it was matched to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStep {
    pub raw: String,
    pub resolved_function_id: Option<String>,
}

impl FlowStep {
    pub fn unresolved(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            resolved_function_id: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_function_id.is_some()
    }
}

/// An ordered, finite sequence of function ids representing a user-facing
/// scenario (e.g. "deposit -> mint -> stake -> claim").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessFlow {
    pub id: FlowId,
    pub name: String,
    pub source: FlowSource,
    pub steps: Vec<FlowStep>,
    /// Set when at least one step failed to resolve (spec §4.D, §7).
    pub has_dropped_steps: bool,
}

impl BusinessFlow {
    pub fn new(name: impl Into<String>, source: FlowSource, steps: Vec<FlowStep>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source,
            steps,
            has_dropped_steps: false,
        }
    }

    /// Resolved steps in source order — the invariant the planner must
    /// preserve when it assembles a BUSINESS_FLOW task payload (spec §5c, §8).
    pub fn resolved_function_ids(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| s.resolved_function_id.as_deref())
            .collect()
    }

    pub fn resolved_step_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_resolved()).count()
    }

    /// A flow with zero resolved steps must be dropped entirely (spec §4.D).
    pub fn is_viable(&self) -> bool {
        self.resolved_step_count() > 0
    }

    pub fn mark_dropped_steps(&mut self) {
        self.has_dropped_steps = self.resolved_step_count() < self.steps.len();
    }
}

/// A step string of the required `Identifier.Identifier` form (spec §6).
pub fn is_valid_step_syntax(step: &str) -> bool {
    let mut parts = step.split('.');
    let first = parts.next();
    let second = parts.next();
    let rest = parts.next();
    matches!((first, second, rest), (Some(a), Some(b), None)
        if !a.is_empty() && !b.is_empty()
        && a.chars().all(|c| c.is_alphanumeric() || c == '_')
        && b.chars().all(|c| c.is_alphanumeric() || c == '_'))
}
