//! Result Processor (spec §4.I): normalize raw task findings, group by
//! business flow, split oversized groups, run iterative LLM clustering
//! rounds, then post-process into final report-ready records.

pub mod clustering;

use crate::error::LlmError;
use crate::llm::{JsonCompletionRequest, ManagedProvider};
use crate::model::finding::{Cluster, FinalFinding, Finding};
use crate::model::task::{Severity, Task, TaskOutcome, TaskStatus};
use clustering::DisjointSet;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

pub struct ResultProcessorConfig {
    pub max_group_size: usize,
    pub clustering_rounds: u32,
    pub worker_pool_size: usize,
    pub translate_to: Option<String>,
}

pub struct ResultProcessor {
    managed: ManagedProvider,
    model_id: String,
    config: ResultProcessorConfig,
}

impl ResultProcessor {
    pub fn new(managed: ManagedProvider, model_id: impl Into<String>, config: ResultProcessorConfig) -> Self {
        Self { managed, model_id: model_id.into(), config }
    }

    /// Full pipeline: normalize -> group by flow -> split oversized groups
    /// -> iterative clustering -> post-process -> optional translation
    /// (spec §4.I).
    pub async fn process(&self, tasks: &[Task]) -> Result<Vec<FinalFinding>, LlmError> {
        let findings = Self::normalize(tasks);
        if findings.is_empty() {
            return Ok(Vec::new());
        }

        let groups = Self::group_by_flow(findings);
        let groups = self.split_oversized_groups(groups);

        let clustered_groups: Vec<Vec<Cluster>> = stream::iter(groups.into_iter().map(|group| self.cluster_group(group)))
            .buffer_unordered(self.config.worker_pool_size)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let mut findings_by_id: HashMap<Uuid, Finding> = HashMap::new();
        for task in tasks {
            for finding in Self::normalize(std::slice::from_ref(task)) {
                findings_by_id.insert(finding.id, finding);
            }
        }

        let mut finals = Vec::new();
        for cluster in clustered_groups.into_iter().flatten() {
            if let Some(final_finding) = self.post_process(&cluster, &findings_by_id) {
                finals.push(final_finding);
            }
        }

        if let Some(target_language) = self.config.translate_to.clone() {
            finals = self.translate(finals, &target_language).await?;
        }

        info!(clusters = finals.len(), "result processing complete");
        Ok(finals)
    }

    /// Extract structured findings from each completed task's raw
    /// findings (spec §4.I step 1).
    fn normalize(tasks: &[Task]) -> Vec<Finding> {
        tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Done { outcome: TaskOutcome::Confirmed }))
            .flat_map(|task| {
                task.raw_findings.iter().map(move |raw| {
                    Finding::new(task.id, task.flow_id(), raw.title.clone(), raw.description.clone(), raw.severity, raw.confidence, task.code_payload.clone())
                })
            })
            .collect()
    }

    /// Findings from the same business flow become an initial cluster
    /// candidate; anything without a flow id gets its own bucket (spec
    /// §4.I step 2).
    fn group_by_flow(findings: Vec<Finding>) -> Vec<Vec<Finding>> {
        let mut groups: HashMap<Option<Uuid>, Vec<Finding>> = HashMap::new();
        for finding in findings {
            groups.entry(finding.flow_id).or_default().push(finding);
        }
        groups.into_values().collect()
    }

    /// Split any group larger than `max_group_size` into fixed-size chunks
    /// (spec §4.I step 3).
    fn split_oversized_groups(&self, groups: Vec<Vec<Finding>>) -> Vec<Vec<Finding>> {
        let mut result = Vec::new();
        for group in groups {
            if group.len() <= self.config.max_group_size {
                result.push(group);
            } else {
                for chunk in group.chunks(self.config.max_group_size) {
                    result.push(chunk.to_vec());
                }
            }
        }
        result
    }

    /// Run the configured number of clustering rounds over one group,
    /// asking an LLM each round to identify semantically equivalent
    /// findings; merges accumulate in a disjoint set so a pair once joined
    /// never splits (spec §4.I step 4).
    async fn cluster_group(&self, group: Vec<Finding>) -> Result<Vec<Cluster>, LlmError> {
        let ids: Vec<Uuid> = group.iter().map(|f| f.id).collect();
        let mut set = DisjointSet::new(ids.clone());

        for round in 0..self.config.clustering_rounds {
            let pairs = self.identify_equivalent_pairs(&group, round).await?;
            if pairs.is_empty() {
                break;
            }
            for (a, b) in pairs {
                set.union(a, b);
            }
        }

        let findings_by_id: HashMap<Uuid, &Finding> = group.iter().map(|f| (f.id, f)).collect();
        let groups = set.groups();
        Ok(groups
            .into_values()
            .filter_map(|member_ids| {
                let members: Vec<&Finding> = member_ids.iter().filter_map(|id| findings_by_id.get(id).copied()).collect();
                Self::build_cluster(&member_ids, &members)
            })
            .collect())
    }

    fn build_cluster(member_ids: &[Uuid], members: &[&Finding]) -> Option<Cluster> {
        let representative = Self::pick_representative(members)?;
        let severity = members.iter().map(|f| f.severity).max()?;
        Some(Cluster { id: Uuid::new_v4(), member_ids: member_ids.to_vec(), representative_id: representative.id, severity })
    }

    /// Highest confidence, then longest description (spec §4.I step 5).
    fn pick_representative<'a>(members: &[&'a Finding]) -> Option<&'a Finding> {
        members
            .iter()
            .copied()
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal).then(a.description.len().cmp(&b.description.len())))
    }

    async fn identify_equivalent_pairs(&self, group: &[Finding], round: u32) -> Result<Vec<(Uuid, Uuid)>, LlmError> {
        if group.len() < 2 {
            return Ok(Vec::new());
        }
        let catalog = group
            .iter()
            .map(|f| format!("{}: {} - {}", f.id, f.title, f.description))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Round {round}. Identify pairs of findings below that describe the same underlying issue. \
             Respond as JSON: {{\"pairs\":[[\"id-a\",\"id-b\"], ...]}}. If none are equivalent, return an empty list.\n\n{catalog}"
        );
        let request = JsonCompletionRequest {
            id: Uuid::new_v4(),
            prompt,
            schema: serde_json::json!({"type": "object", "properties": {"pairs": {"type": "array"}}, "required": ["pairs"]}),
            model_id: self.model_id.clone(),
        };
        let value = self.managed.complete_json(request).await?;
        let pairs: EquivalentPairs = serde_json::from_value(value).map_err(|e| LlmError::ParseFailure(e.to_string()))?;
        Ok(pairs
            .pairs
            .into_iter()
            .filter_map(|pair| {
                let a = pair.first()?.parse().ok()?;
                let b = pair.get(1)?.parse().ok()?;
                Some((a, b))
            })
            .collect())
    }

    fn post_process(&self, cluster: &Cluster, findings_by_id: &HashMap<Uuid, Finding>) -> Option<FinalFinding> {
        let representative = findings_by_id.get(&cluster.representative_id)?;
        Some(FinalFinding {
            cluster_id: cluster.id,
            title: representative.title.clone(),
            description: representative.description.clone(),
            severity: cluster.severity,
            confidence: representative.confidence,
            code_excerpt: representative.code_excerpt.clone(),
            member_count: cluster.member_ids.len(),
        })
    }

    /// Translate titles/descriptions to the configured target language,
    /// preserving code excerpts verbatim (spec §4.I step 6).
    async fn translate(&self, finals: Vec<FinalFinding>, target_language: &str) -> Result<Vec<FinalFinding>, LlmError> {
        let mut translated = Vec::with_capacity(finals.len());
        for finding in finals {
            let prompt = format!(
                "Translate the following title and description to {target_language}. Preserve all code exactly. \
                 Respond as JSON: {{\"title\":\"...\",\"description\":\"...\"}}.\n\nTitle: {}\nDescription: {}",
                finding.title, finding.description
            );
            let request = JsonCompletionRequest {
                id: Uuid::new_v4(),
                prompt,
                schema: serde_json::json!({"type": "object", "properties": {"title": {"type": "string"}, "description": {"type": "string"}}, "required": ["title", "description"]}),
                model_id: self.model_id.clone(),
            };
            let value = self.managed.complete_json(request).await?;
            let parsed: Translation = serde_json::from_value(value).map_err(|e| LlmError::ParseFailure(e.to_string()))?;
            translated.push(FinalFinding { title: parsed.title, description: parsed.description, ..finding });
        }
        Ok(translated)
    }
}

#[derive(serde::Deserialize)]
struct EquivalentPairs {
    pairs: Vec<Vec<String>>,
}

#[derive(serde::Deserialize)]
struct Translation {
    title: String,
    description: String,
}
