//! Phrase-to-record retrieval over the persisted vector tables
//!
//! Query phrases are embedded with the query task type and compared against the
//! document vectors with an exact cosine scan. Query vectors are cached per
//! service and model so repeated searches skip the service round trip.

use crate::error::{LensError, Result};
use crate::ml::{Embedding, EmbeddingRecord, VectorSearchIndex};
use crate::records::ComplaintRecord;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

const QUERY_CACHE_CAPACITY: usize = 256;

/// A complaint returned by semantic search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintMatch {
    pub id: String,
    pub category: String,
    pub resolution: Option<String>,
    /// Cosine distance to the query, smaller is closer
    pub distance: f32,
}

/// An image returned by text-to-image search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMatch {
    pub uri: String,
    pub distance: f32,
}

/// Which service produced a query vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Text,
    Multimodal,
}

type CacheKey = (QueryKind, String, String);

/// LRU cache of query vectors keyed by service kind, model and phrase
pub struct QueryCache {
    inner: Mutex<LruCache<CacheKey, Embedding>>,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn key(kind: QueryKind, model: &str, phrase: &str) -> CacheKey {
        (kind, model.to_string(), phrase.to_string())
    }

    pub fn get(&self, kind: QueryKind, model: &str, phrase: &str) -> Option<Embedding> {
        let mut cache = self.inner.lock().ok()?;
        cache.get(&Self::key(kind, model, phrase)).cloned()
    }

    pub fn put(&self, kind: QueryKind, model: &str, phrase: &str, embedding: Embedding) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(Self::key(kind, model, phrase), embedding);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(QUERY_CACHE_CAPACITY)
    }
}

/// Trimmed phrase, or a validation error when nothing is left
pub fn normalize_phrase(phrase: &str) -> Result<&str> {
    let trimmed = phrase.trim();
    if trimmed.is_empty() {
        return Err(LensError::Validation(
            "Search phrase must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Nearest `k` complaints to `query`, joined back to their source rows
pub fn rank_complaints(
    vectors: Vec<EmbeddingRecord>,
    complaints: &[ComplaintRecord],
    query: &Embedding,
    k: usize,
) -> Result<Vec<ComplaintMatch>> {
    let index = VectorSearchIndex::from_records(vectors)?;
    let by_id: HashMap<&str, &ComplaintRecord> =
        complaints.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut matches = Vec::new();
    for neighbor in index.search(query, k)? {
        match by_id.get(neighbor.id.as_str()) {
            Some(complaint) => matches.push(ComplaintMatch {
                id: neighbor.id,
                category: complaint.category.clone(),
                resolution: complaint.resolution.clone(),
                distance: neighbor.distance,
            }),
            None => log::warn!("Vector {} has no matching complaint, skipping", neighbor.id),
        }
    }
    Ok(matches)
}

/// Nearest `k` images to `query`, in raw distance order
pub fn rank_images(
    vectors: Vec<EmbeddingRecord>,
    query: &Embedding,
    k: usize,
) -> Result<Vec<ImageMatch>> {
    let index = VectorSearchIndex::from_records(vectors)?;
    Ok(index
        .search(query, k)?
        .into_iter()
        .map(|n| ImageMatch {
            uri: n.id,
            distance: n.distance,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::TaskType;
    use chrono::Utc;

    fn doc(id: &str, values: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: id.to_string(),
            embedding: Embedding::new(values, TaskType::RetrievalDocument),
        }
    }

    fn complaint(id: &str) -> ComplaintRecord {
        ComplaintRecord {
            id: id.to_string(),
            category: "Noise".to_string(),
            resolution: Some(format!("narrative {}", id)),
            created_at: Utc::now(),
            latitude: None,
            longitude: None,
        }
    }

    #[test]
    fn test_empty_phrase_rejected() {
        assert!(matches!(normalize_phrase("   "), Err(LensError::Validation(_))));
        assert_eq!(normalize_phrase(" pothole ").unwrap(), "pothole");
    }

    #[test]
    fn test_rank_complaints_joins_and_orders() {
        let vectors = vec![doc("far", vec![0.0, 1.0]), doc("near", vec![1.0, 0.1])];
        let complaints = vec![complaint("far"), complaint("near")];
        let query = Embedding::new(vec![1.0, 0.0], TaskType::RetrievalQuery);

        let matches = rank_complaints(vectors, &complaints, &query, 5).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "near");
        assert_eq!(matches[0].resolution.as_deref(), Some("narrative near"));
        assert!(matches[0].distance < matches[1].distance);
    }

    #[test]
    fn test_document_vector_cannot_query() {
        let vectors = vec![doc("a", vec![1.0, 0.0])];
        let query = Embedding::new(vec![1.0, 0.0], TaskType::RetrievalDocument);
        assert!(rank_images(vectors, &query, 1).is_err());
    }

    #[test]
    fn test_query_cache_evicts_oldest() {
        let cache = QueryCache::new(2);
        let e = Embedding::new(vec![1.0], TaskType::RetrievalQuery);
        cache.put(QueryKind::Text, "m", "a", e.clone());
        cache.put(QueryKind::Text, "m", "b", e.clone());
        cache.put(QueryKind::Text, "m", "c", e.clone());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(QueryKind::Text, "m", "a").is_none());
        assert!(cache.get(QueryKind::Text, "other", "c").is_none());
        assert_eq!(cache.get(QueryKind::Text, "m", "c"), Some(e));
    }

    #[test]
    fn test_query_cache_separates_service_kinds() {
        let cache = QueryCache::new(8);
        let text = Embedding::new(vec![1.0, 0.0], TaskType::RetrievalQuery);
        let image = Embedding::new(vec![0.0, 1.0, 0.0], TaskType::RetrievalQuery);
        cache.put(QueryKind::Text, "shared", "pothole", text.clone());
        assert!(cache.get(QueryKind::Multimodal, "shared", "pothole").is_none());

        cache.put(QueryKind::Multimodal, "shared", "pothole", image.clone());
        assert_eq!(cache.get(QueryKind::Text, "shared", "pothole"), Some(text));
        assert_eq!(cache.get(QueryKind::Multimodal, "shared", "pothole"), Some(image));
    }
}
