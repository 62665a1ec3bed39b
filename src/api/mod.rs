//! API layer for complaint-lens
//!
//! `ComplaintPipeline` runs the stages and reads the views; the retriever
//! turns query phrases into ranked complaints and images.

pub mod pipeline;
pub mod retriever;

// Re-export main API types
pub use pipeline::{ComplaintPipeline, Services, StageSummary};
pub use retriever::{ComplaintMatch, ImageMatch, QueryCache, QueryKind};
