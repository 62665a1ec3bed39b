//! Source relations: complaint rows and image references
//!
//! Both are immutable once ingested. Complaints arrive as JSON (an array or one
//! object per line); image references come from scanning an object catalog.

pub mod catalog;

pub use catalog::ObjectCatalog;

use crate::error::{LensError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single municipal complaint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintRecord {
    /// Unique identifier
    pub id: String,
    /// Category label assigned at intake
    pub category: String,
    /// Free-text resolution narrative
    #[serde(default)]
    pub resolution: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl ComplaintRecord {
    /// Both coordinates, when present
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// An object in the image catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Object URI (`file://` for local catalogs)
    pub uri: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Parse complaints from a JSON array or from JSON lines
pub fn parse_complaints(content: &str) -> Result<Vec<ComplaintRecord>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let mut records = Vec::new();
    for (line_number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: ComplaintRecord = serde_json::from_str(line).map_err(|e| {
            LensError::Validation(format!("line {}: {}", line_number + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}
