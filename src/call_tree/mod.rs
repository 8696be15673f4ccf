//! Call-Tree Builder (spec §4.C): upstream/downstream static call relations
//! among functions, with ambiguity side-channel recording.

pub mod builder;

pub use builder::{AmbiguityRecord, CallTreeBuilder, CallTreeNode, FunctionCallInfo};
