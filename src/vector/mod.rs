//! Embedding & Vector Index (spec §4.B): multi-modal embeddings per
//! function/file and the k-NN search surface consumed by the context
//! factory and the business-flow matcher.

pub mod embedding_store;
pub mod index;

pub use embedding_store::EmbeddingStore;
pub use index::{InMemoryVectorIndex, ScoredRow, VectorIndex, VectorRow};
