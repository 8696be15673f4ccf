//! Business-Flow Processor (spec §4.D): precedence orchestration across
//! JSON / Mermaid / AST-LLM-fallback sources, step resolution, and
//! token-budget splitting of oversized flows into sub-flows.

use crate::business_flow::json_source::{self, RawFlowSpec};
use crate::business_flow::matcher::StepMatcher;
use crate::business_flow::mermaid_source::MermaidFlowExtractor;
use crate::error::FlowError;
use crate::llm::LLMProvider;
use crate::model::flow::{BusinessFlow, FlowSource, FlowStep};
use crate::model::function::Function;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub struct BusinessFlowProcessor<'a> {
    matcher: StepMatcher<'a>,
    llm: Arc<dyn LLMProvider>,
    model_id: String,
    mermaid_extractor: MermaidFlowExtractor,
    functions: &'a [Function],
}

impl<'a> BusinessFlowProcessor<'a> {
    pub fn new(
        functions: &'a [Function],
        matcher: StepMatcher<'a>,
        llm: Arc<dyn LLMProvider>,
        model_id: impl Into<String>,
    ) -> Self {
        let model_id = model_id.into();
        Self {
            matcher,
            llm: llm.clone(),
            model_id: model_id.clone(),
            mermaid_extractor: MermaidFlowExtractor::new(llm, model_id),
            functions,
        }
    }

    /// Derive the flow list via the spec §4.D precedence, stopping at the
    /// first source that yields at least one viable flow.
    pub async fn derive_flows(
        &self,
        json_root: Option<&Path>,
        project_id: &str,
        mermaid_diagram_paths: &[std::path::PathBuf],
    ) -> Result<Vec<BusinessFlow>, FlowError> {
        if let Some(json_root) = json_root {
            let specs = json_source::load_project_flows(json_root, project_id)?;
            if !specs.is_empty() {
                let flows = self.resolve_specs(specs, FlowSource::JsonFile).await;
                let viable: Vec<_> = flows.into_iter().filter(|f| f.is_viable()).collect();
                if !viable.is_empty() {
                    info!(project_id, count = viable.len(), "flows derived from JSON source");
                    return Ok(viable);
                }
            }
        }

        if !mermaid_diagram_paths.is_empty() {
            let mut all_specs = Vec::new();
            for path in mermaid_diagram_paths {
                match self.mermaid_extractor.extract_from_file(path).await {
                    Ok(specs) => all_specs.extend(specs),
                    Err(err) => warn!(path = %path.display(), "mermaid flow extraction failed: {err}"),
                }
            }
            let flows = self.resolve_specs(all_specs, FlowSource::Mermaid).await;
            let viable: Vec<_> = flows.into_iter().filter(|f| f.is_viable()).collect();
            if !viable.is_empty() {
                info!(project_id, count = viable.len(), "flows derived from mermaid source");
                return Ok(viable);
            }
        }

        let fallback = self.ast_llm_fallback().await?;
        info!(project_id, count = fallback.len(), "flows derived from AST/LLM fallback");
        Ok(fallback)
    }

    async fn resolve_specs(&self, specs: Vec<RawFlowSpec>, source: FlowSource) -> Vec<BusinessFlow> {
        let mut flows = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut steps = Vec::with_capacity(spec.steps.len());
            for raw_step in spec.steps {
                let resolved = self.matcher.resolve(&raw_step).await;
                if resolved.is_none() {
                    warn!(flow = %spec.name, step = %raw_step, "step did not resolve to any function");
                }
                steps.push(FlowStep { raw: raw_step, resolved_function_id: resolved });
            }
            let mut flow = BusinessFlow::new(spec.name, source, steps);
            flow.mark_dropped_steps();
            flows.push(flow);
        }
        flows
    }

    /// For each public/external function with no flow membership yet, ask
    /// an LLM to name the flow it represents and list its step functions
    /// (spec §4.D precedence step 3).
    async fn ast_llm_fallback(&self) -> Result<Vec<BusinessFlow>, FlowError> {
        let mut flows = Vec::new();
        for function in self.functions.iter().filter(|f| f.is_externally_reachable()) {
            let prompt = format!(
                "Given this smart contract function, name the business flow it represents and list, in order, the fully-qualified (Contract.function) steps involved. Respond as JSON: {{\"name\":\"...\",\"steps\":[\"Contract.fn\", ...]}}.\n\nFunction:\n{}",
                function.content
            );
            let request = crate::llm::JsonCompletionRequest {
                id: uuid::Uuid::new_v4(),
                prompt,
                schema: serde_json::json!({
                    "type": "object",
                    "properties": { "name": {"type": "string"}, "steps": {"type": "array"} },
                    "required": ["name", "steps"],
                }),
                model_id: self.model_id.clone(),
            };

            match self.llm.complete_json(request).await {
                Ok(value) => {
                    if let Ok(spec) = serde_json::from_value::<RawFlowSpec>(value) {
                        let resolved = self.resolve_specs(vec![spec], FlowSource::Ast).await;
                        flows.extend(resolved.into_iter().filter(|f| f.is_viable()));
                    }
                }
                Err(err) => warn!(function = %function.id, "AST/LLM fallback call failed: {err}"),
            }
        }
        Ok(flows)
    }

    /// Concatenate a flow's resolved function bodies, in step order, with
    /// separators (spec §4.D "business-flow code"). Splits into contiguous
    /// sub-flows at step boundaries when the result exceeds `token_budget`.
    pub fn assemble_payloads(&self, flow: &BusinessFlow, token_budget: usize) -> Vec<(BusinessFlow, String)> {
        let resolved_ids = flow.resolved_function_ids();
        let bodies: Vec<(&str, &str)> = resolved_ids
            .iter()
            .filter_map(|id| self.functions.iter().find(|f| f.id == *id).map(|f| (*id, f.content.as_str())))
            .collect();

        let mut sub_flows = Vec::new();
        let mut current_steps = Vec::new();
        let mut current_payload = String::new();

        for (id, body) in bodies {
            let addition = format!("// --- {id} ---\n{body}\n");
            if !current_payload.is_empty() && estimate_tokens(&current_payload) + estimate_tokens(&addition) > token_budget {
                sub_flows.push(Self::build_sub_flow(flow, &current_steps, &current_payload));
                current_steps = Vec::new();
                current_payload = String::new();
            }
            current_payload.push_str(&addition);
            current_steps.push(id.to_string());
        }
        if !current_payload.is_empty() {
            sub_flows.push(Self::build_sub_flow(flow, &current_steps, &current_payload));
        }
        sub_flows
    }

    fn build_sub_flow(parent: &BusinessFlow, step_ids: &[String], payload: &str) -> (BusinessFlow, String) {
        let steps = step_ids
            .iter()
            .map(|id| FlowStep { raw: id.clone(), resolved_function_id: Some(id.clone()) })
            .collect();
        let sub = BusinessFlow::new(parent.name.clone(), parent.source, steps);
        (sub, payload.to_string())
    }
}

fn estimate_tokens(text: &str) -> usize {
    (text.len() as f64 / 4.0).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::CompletionRequest;
    use crate::model::function::{StateMutability, Visibility};
    use crate::vector::index::InMemoryVectorIndex;
    use async_trait::async_trait;

    fn function(id: &str, content: &str) -> Function {
        Function {
            id: id.to_string(),
            name: id.split('.').next_back().unwrap().to_string(),
            content: content.to_string(),
            start_line: 1,
            end_line: 1,
            relative_file_path: "X.sol".to_string(),
            absolute_file_path: "/X.sol".to_string(),
            contract_name: id.split('.').next().unwrap().to_string(),
            contract_code: String::new(),
            modifiers: Vec::new(),
            visibility: Visibility::Public,
            state_mutability: StateMutability::Nonpayable,
            description: None,
        }
    }

    struct NoopLlm;

    #[async_trait]
    impl LLMProvider for NoopLlm {
        async fn complete(&self, _request: CompletionRequest) -> Result<crate::llm::CompletionResponse, LlmError> {
            unreachable!()
        }
        async fn complete_json(&self, _request: crate::llm::JsonCompletionRequest) -> Result<serde_json::Value, LlmError> {
            Ok(serde_json::json!({"flows": []}))
        }
        fn provider_name(&self) -> &'static str {
            "noop"
        }
    }

    struct NoopEmbedder;
    #[async_trait]
    impl crate::llm::EmbeddingProvider for NoopEmbedder {
        async fn embed(&self, _text: &str, _model_id: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![0.0])
        }
        fn dimension(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn oversized_flow_splits_at_step_boundaries() {
        let functions = vec![
            function("A.one", &"x".repeat(20)),
            function("A.two", &"y".repeat(20)),
        ];
        let matcher = StepMatcher::new(&functions, Arc::new(InMemoryVectorIndex::new()), Arc::new(NoopEmbedder), "model", 0.7);
        let processor = BusinessFlowProcessor::new(&functions, matcher, Arc::new(NoopLlm), "model");

        let flow = BusinessFlow::new(
            "flow",
            FlowSource::JsonFile,
            vec![
                FlowStep { raw: "A.one".into(), resolved_function_id: Some("A.one".into()) },
                FlowStep { raw: "A.two".into(), resolved_function_id: Some("A.two".into()) },
            ],
        );

        let sub_flows = processor.assemble_payloads(&flow, 5);
        assert_eq!(sub_flows.len(), 2);
    }

    #[tokio::test]
    async fn json_precedence_short_circuits_other_sources() {
        let functions = vec![function("TokenVault.deposit", "function deposit() {}")];
        let matcher = StepMatcher::new(&functions, Arc::new(InMemoryVectorIndex::new()), Arc::new(NoopEmbedder), "model", 0.7);
        let processor = BusinessFlowProcessor::new(&functions, matcher, Arc::new(NoopLlm), "model");

        let dir = tempfile::TempDir::new().unwrap();
        let project_dir = crate::env::json_flows_dir_path(dir.path(), "proj");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(
            project_dir.join("flows.json"),
            r#"{"flows":[{"name":"Deposit","steps":["TokenVault.deposit"]}]}"#,
        )
        .unwrap();

        let flows = processor.derive_flows(Some(dir.path()), "proj", &[]).await.unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].source, FlowSource::JsonFile);
    }
}
