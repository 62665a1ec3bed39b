//! # complaint-lens
//!
//! An analytics pipeline over municipal service complaints: structured
//! extraction from free-text resolutions with a generative model, semantic
//! search over narrative embeddings, text-to-image search over a photo
//! catalog, and two read-only views for anomaly and hotspot dashboards.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use complaint_lens::{ComplaintPipeline, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut pipeline = ComplaintPipeline::local(Config::default())?;
//!
//!     pipeline.ingest_complaints_file("complaints.jsonl")?;
//!     pipeline.run_extraction().await?;
//!     pipeline.run_text_embedding().await?;
//!
//!     for hit in pipeline.semantic_search("pothole repaired", 5).await? {
//!         println!("{:.3} {} {}", hit.distance, hit.id, hit.category);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod ml;
pub mod records;
pub mod stages;
pub mod storage;
pub mod utils;
pub mod views;

// Re-export main API types
pub use api::{ComplaintMatch, ComplaintPipeline, ImageMatch, Services, StageSummary};
pub use config::Config;
pub use error::{LensError, Result};

// Re-export commonly used types
pub use records::{ComplaintRecord, ImageReference};
pub use stages::{RejectedExtraction, StructuredExtraction};
pub use storage::DatabaseStats;
pub use views::{DailyCount, HotspotCell};
