//! External AI service boundary
//!
//! Traits for the hosted generation and embedding models, their HTTP-backed
//! implementations, deterministic local stand-ins, and exact vector search.

pub mod embedding;
pub mod generation;
pub mod remote;
pub mod search;

// Re-export main types
pub use embedding::{
    Embedding, EmbeddingRecord, EmbeddingService, LocalEmbedder, MultimodalEmbeddingService,
    TaskType,
};
pub use generation::{LocalGenerator, OpenAiGenerator, TextGenerator};
pub use remote::{HttpEmbeddingClient, HttpMultimodalClient};
pub use search::{DistanceMetric, Neighbor, VectorSearchIndex};
