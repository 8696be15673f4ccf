//! Trims assembled context blobs to a token ceiling, dropping whole
//! sections in priority order rather than truncating mid-sentence (spec
//! §4.F).
//!
//! Adapted from the teacher's `claude::context_manager::optimize_context`
//! compression-ratio bookkeeping, generalized from "drop oldest messages"
//! to "drop lowest-priority named sections".

pub const SECTION_FUNCTION_BODY: &str = "function_body";
pub const SECTION_BUSINESS_FLOW: &str = "business_flow";
pub const SECTION_CALL_TREE: &str = "call_tree";
pub const SECTION_RAG_NEIGHBORS: &str = "rag_neighbors";
pub const SECTION_FILE_DESCRIPTION: &str = "file_description";

/// Drop order when the assembled blob exceeds the budget: function body is
/// kept longest, file description is dropped first (spec §4.F: "function
/// body > direct callers/callees > RAG neighbors > file description"). The
/// flow's concatenated step bodies are the primary payload for
/// BUSINESS_FLOW-mode tasks, so they rank just below the function body
/// itself, ahead of the supporting call tree and RAG sections.
const PRIORITY_ORDER: [&str; 5] =
    [SECTION_FUNCTION_BODY, SECTION_BUSINESS_FLOW, SECTION_CALL_TREE, SECTION_RAG_NEIGHBORS, SECTION_FILE_DESCRIPTION];

#[derive(Debug, Clone, Copy)]
pub struct SizeOptimizer {
    token_budget: usize,
}

impl SizeOptimizer {
    pub fn new(token_budget: usize) -> Self {
        Self { token_budget }
    }

    /// Concatenate `sections` (name, content) in priority order, dropping
    /// whole lowest-priority sections until the estimated token count fits
    /// the budget.
    pub fn trim(&self, mut sections: Vec<(&'static str, String)>) -> String {
        sections.retain(|(_, content)| !content.is_empty());
        sections.sort_by_key(|(name, _)| PRIORITY_ORDER.iter().position(|p| p == name).unwrap_or(usize::MAX));

        while estimate_tokens(&sections) > self.token_budget && sections.len() > 1 {
            sections.pop();
        }

        sections.into_iter().map(|(_, content)| content).collect::<Vec<_>>().join("\n\n")
    }
}

fn estimate_tokens(sections: &[(&'static str, String)]) -> usize {
    let total_chars: usize = sections.iter().map(|(_, c)| c.len()).sum();
    (total_chars as f64 / 4.0).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_highest_priority_sections_when_over_budget() {
        let optimizer = SizeOptimizer::new(5);
        let sections = vec![
            (SECTION_FILE_DESCRIPTION, "d".repeat(40)),
            (SECTION_RAG_NEIGHBORS, "r".repeat(40)),
            (SECTION_FUNCTION_BODY, "body".to_string()),
        ];
        let trimmed = optimizer.trim(sections);
        assert!(trimmed.contains("body"));
        assert!(!trimmed.contains("ddddd"));
    }

    #[test]
    fn never_splits_a_section_mid_content() {
        let optimizer = SizeOptimizer::new(1000);
        let sections = vec![(SECTION_FUNCTION_BODY, "whole sentence kept intact".to_string())];
        let trimmed = optimizer.trim(sections);
        assert_eq!(trimmed, "whole sentence kept intact");
    }

    #[test]
    fn business_flow_outranks_call_tree_and_rag() {
        let optimizer = SizeOptimizer::new(5);
        let sections = vec![
            (SECTION_RAG_NEIGHBORS, "r".repeat(40)),
            (SECTION_CALL_TREE, "c".repeat(40)),
            (SECTION_BUSINESS_FLOW, "flow".to_string()),
        ];
        let trimmed = optimizer.trim(sections);
        assert_eq!(trimmed, "flow");
    }

    #[test]
    fn empty_sections_are_dropped() {
        let optimizer = SizeOptimizer::new(1000);
        let sections = vec![(SECTION_FUNCTION_BODY, "body".to_string()), (SECTION_RAG_NEIGHBORS, String::new())];
        let trimmed = optimizer.trim(sections);
        assert_eq!(trimmed, "body");
    }
}
