//! Storage functionality for complaint-lens
//!
//! Source relations and stage output tables live in one embedded SQLite file.

pub mod database;
pub mod schema;

// Re-export main types
pub use database::{Database, DatabaseStats, VectorTable};
