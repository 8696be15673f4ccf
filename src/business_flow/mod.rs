//! Business-Flow Processor (spec §4.D): derives ordered function-id
//! sequences representing user-facing scenarios, from JSON files, Mermaid
//! diagrams, or an AST/LLM fallback, with two-stage step resolution.

pub mod json_source;
pub mod matcher;
pub mod mermaid_source;
pub mod processor;

pub use matcher::StepMatcher;
pub use mermaid_source::{FLOW_EXTRACTION_PROMPT, MermaidFlowExtractor};
pub use processor::BusinessFlowProcessor;
