//! Post-processed findings and clusters (spec §3, §4.I).

use crate::model::task::{Severity, TaskId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ClusterId = Uuid;

/// A finding extracted from a task's final response, before clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub task_ids: Vec<TaskId>,
    pub flow_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub confidence: f32,
    pub code_excerpt: String,
    pub cluster_id: Option<ClusterId>,
}

impl Finding {
    pub fn new(
        task_id: TaskId,
        flow_id: Option<Uuid>,
        title: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        confidence: f32,
        code_excerpt: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_ids: vec![task_id],
            flow_id,
            title: title.into(),
            description: description.into(),
            severity,
            confidence,
            code_excerpt: code_excerpt.into(),
            cluster_id: None,
        }
    }
}

/// A cluster of semantically-equivalent findings with a designated
/// representative (spec §3 invariant: "each finding belongs to exactly one
/// cluster; clusters have a designated canonical finding").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub member_ids: Vec<Uuid>,
    pub representative_id: Uuid,
    pub severity: Severity,
}

/// The final, report-ready record: a cluster folded down to its
/// representative content plus aggregate metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalFinding {
    pub cluster_id: ClusterId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub confidence: f32,
    pub code_excerpt: String,
    pub member_count: usize,
}
