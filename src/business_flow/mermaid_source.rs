//! Mermaid-diagram business-flow source (spec §4.D precedence step 2, §6
//! flow-extraction prompt, content-exact).

use crate::business_flow::json_source::RawFlowSpec;
use crate::error::FlowError;
use crate::llm::LLMProvider;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Required verbatim per spec §6. Do not reword — the extraction contract
/// depends on this exact phrasing.
pub const FLOW_EXTRACTION_PROMPT: &str = "Based on the above business flow diagram, extract business flows in JSON format with the following structure: {\"flows\":[{\"name\":\"...\",\"steps\":[\"file.function\", ...]}]}.";

const CLEANING_INSTRUCTION: &str = "The following is a JSON object describing extracted business flows. Repair each step string so it matches exactly the form `Identifier.Identifier`: strip any file extension, replace path separators or arrows with a single dot, and merge any step that was spuriously split across two entries. Return the corrected JSON with the same shape, no commentary.";

pub struct MermaidFlowExtractor {
    llm: Arc<dyn LLMProvider>,
    model_id: String,
}

impl MermaidFlowExtractor {
    pub fn new(llm: Arc<dyn LLMProvider>, model_id: impl Into<String>) -> Self {
        Self { llm, model_id: model_id.into() }
    }

    /// Extract flows from one diagram file, then apply the LLM cleaning
    /// pass that repairs step syntax (spec §4.D: "strip extensions, fix
    /// separators, merge spurious splits").
    pub async fn extract_from_file(&self, diagram_path: &Path) -> Result<Vec<RawFlowSpec>, FlowError> {
        let diagram = std::fs::read_to_string(diagram_path)?;
        let prompt = format!("{diagram}\n\n{FLOW_EXTRACTION_PROMPT}");

        let request = crate::llm::JsonCompletionRequest {
            id: uuid::Uuid::new_v4(),
            prompt,
            schema: serde_json::json!({
                "type": "object",
                "properties": { "flows": { "type": "array" } },
                "required": ["flows"],
            }),
            model_id: self.model_id.clone(),
        };

        let extracted = self
            .llm
            .complete_json(request)
            .await
            .map_err(|e| FlowError::InvalidStepSyntax(format!("extraction call failed: {e}")))?;

        let cleaned = self.clean(extracted).await?;
        let wrapped: WrappedFlows = serde_json::from_value(cleaned)?;
        info!(path = %diagram_path.display(), flows = wrapped.flows.len(), "extracted flows from mermaid diagram");
        Ok(wrapped.flows)
    }

    async fn clean(&self, raw: serde_json::Value) -> Result<serde_json::Value, FlowError> {
        let prompt = format!("{CLEANING_INSTRUCTION}\n\n{raw}");
        let request = crate::llm::JsonCompletionRequest {
            id: uuid::Uuid::new_v4(),
            prompt,
            schema: serde_json::json!({
                "type": "object",
                "properties": { "flows": { "type": "array" } },
                "required": ["flows"],
            }),
            model_id: self.model_id.clone(),
        };
        self.llm
            .complete_json(request)
            .await
            .map_err(|e| FlowError::InvalidStepSyntax(format!("cleaning call failed: {e}")))
    }
}

#[derive(serde::Deserialize)]
struct WrappedFlows {
    flows: Vec<RawFlowSpec>,
}
