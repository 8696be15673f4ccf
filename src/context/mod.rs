//! Context Factory (spec §4.F): the single retrieval surface consumed by
//! the planner and validator, unifying RAG search, call-tree formatting,
//! and business-flow concatenation with a shared size-budget trimmer.

pub mod factory;
pub mod size_optimizer;

pub use factory::{ContextFactory, HybridOptions, Modality};
pub use size_optimizer::SizeOptimizer;
