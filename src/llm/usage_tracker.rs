//! Token and cost accounting across LLM calls (SPEC_FULL.md §B "usage
//! accounting"), adapted from the teacher's `claude::usage_tracker`. The
//! teacher tracked usage per coding session; here usage is tracked per
//! project and per model, since a single engine run fans out many
//! concurrent provider calls across tasks rather than one conversation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::llm::types::TokenUsage;

#[derive(Debug, Clone, Default)]
pub struct ModelUsage {
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub request_count: u64,
    pub estimated_cost: f64,
}

#[derive(Debug, Default)]
struct UsageData {
    by_model: HashMap<String, ModelUsage>,
    total_requests: u64,
    total_tokens: u64,
    total_cost: f64,
    first_request: Option<DateTime<Utc>>,
    last_request: Option<DateTime<Utc>>,
}

/// Per-model cost rates, $ per token. Unknown models fall back to `default`.
#[derive(Debug, Clone)]
pub struct CostTable {
    pub default: (f64, f64),
    pub by_model: HashMap<String, (f64, f64)>,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            default: (0.000003, 0.000015),
            by_model: HashMap::new(),
        }
    }
}

impl CostTable {
    fn rate_for(&self, model_id: &str) -> (f64, f64) {
        self.by_model.get(model_id).copied().unwrap_or(self.default)
    }

    pub fn estimate(&self, model_id: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let (input_rate, output_rate) = self.rate_for(model_id);
        (input_tokens as f64 * input_rate) + (output_tokens as f64 * output_rate)
    }
}

#[derive(Debug)]
pub struct UsageTracker {
    cost_table: CostTable,
    data: Arc<Mutex<UsageData>>,
}

impl UsageTracker {
    pub fn new(cost_table: CostTable) -> Self {
        Self {
            cost_table,
            data: Arc::new(Mutex::new(UsageData::default())),
        }
    }

    pub async fn record(&self, model_id: &str, usage: &TokenUsage) {
        let cost = self.cost_table.estimate(model_id, usage.input_tokens, usage.output_tokens);
        let now = Utc::now();
        let mut data = self.data.lock().await;

        let entry = data.by_model.entry(model_id.to_string()).or_insert_with(|| ModelUsage {
            model_id: model_id.to_string(),
            ..Default::default()
        });
        entry.input_tokens += usage.input_tokens;
        entry.output_tokens += usage.output_tokens;
        entry.request_count += 1;
        entry.estimated_cost += cost;

        data.total_requests += 1;
        data.total_tokens += usage.total_tokens;
        data.total_cost += cost;
        if data.first_request.is_none() {
            data.first_request = Some(now);
        }
        data.last_request = Some(now);
    }

    pub async fn total_cost(&self) -> f64 {
        self.data.lock().await.total_cost
    }

    pub async fn total_tokens(&self) -> u64 {
        self.data.lock().await.total_tokens
    }

    pub async fn by_model(&self) -> Vec<ModelUsage> {
        self.data.lock().await.by_model.values().cloned().collect()
    }
}
