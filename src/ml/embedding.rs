//! Embedding types and the embedding service boundary
//!
//! Vectors meant for storage and vectors meant for querying are produced by two
//! separate operations. Both return `Embedding`, tagged with the `TaskType` it
//! was generated for, so the search index can refuse to mix them up.

use crate::error::{LensError, Result};
use crate::records::ImageReference;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Task-type hint sent to the embedding service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    /// Vectors persisted into a searchable table
    RetrievalDocument,
    /// Vectors generated for an ad hoc query phrase
    RetrievalQuery,
}

impl TaskType {
    /// Wire name understood by the hosted embedding endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            TaskType::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "RETRIEVAL_DOCUMENT" => Ok(TaskType::RetrievalDocument),
            "RETRIEVAL_QUERY" => Ok(TaskType::RetrievalQuery),
            other => Err(LensError::Embedding(format!("Unknown task type: {}", other))),
        }
    }
}

/// A fixed-length vector plus the task type it was produced for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    values: Vec<f32>,
    task: TaskType,
}

impl Embedding {
    pub fn new(values: Vec<f32>, task: TaskType) -> Self {
        Self { values, task }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn task(&self) -> TaskType {
        self.task
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// A persisted vector table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Complaint id or image URI
    pub id: String,
    pub embedding: Embedding,
}

/// Text embedding service
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    fn model_name(&self) -> &str;

    /// Vectors for storage, one per input, in input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Vector for an ad hoc query phrase
    async fn embed_query(&self, text: &str) -> Result<Embedding>;
}

/// Embedding service placing images and text in one vector space
#[async_trait]
pub trait MultimodalEmbeddingService: Send + Sync {
    fn model_name(&self) -> &str;

    /// Vectors for storage, one per image, in input order
    async fn embed_images(&self, images: &[ImageReference]) -> Result<Vec<Embedding>>;

    /// Vector for a text phrase, comparable with image vectors
    async fn embed_text_query(&self, text: &str) -> Result<Embedding>;
}

/// Deterministic offline embedder based on signed feature hashing.
///
/// Stands in for the hosted services: identical input always yields an identical
/// vector, and texts sharing words land close together. Images are embedded from
/// the words in their object name.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimension: usize,
}

impl LocalEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn features(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();

            let idx = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-12 {
            for val in &mut vector {
                *val /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingService for LocalEmbedder {
    fn model_name(&self) -> &str {
        "local-hashing"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts
            .iter()
            .map(|text| Embedding::new(self.features(text), TaskType::RetrievalDocument))
            .collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        Ok(Embedding::new(self.features(text), TaskType::RetrievalQuery))
    }
}

#[async_trait]
impl MultimodalEmbeddingService for LocalEmbedder {
    fn model_name(&self) -> &str {
        "local-hashing-multimodal"
    }

    async fn embed_images(&self, images: &[ImageReference]) -> Result<Vec<Embedding>> {
        Ok(images
            .iter()
            .map(|image| {
                let words = object_words(&image.uri);
                Embedding::new(self.features(&words), TaskType::RetrievalDocument)
            })
            .collect())
    }

    async fn embed_text_query(&self, text: &str) -> Result<Embedding> {
        Ok(Embedding::new(self.features(text), TaskType::RetrievalQuery))
    }
}

/// Lowercased alphanumeric tokens with a light suffix strip
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| stem(&t.to_lowercase()))
}

fn stem(word: &str) -> String {
    for suffix in ["ing", "ed", "s"] {
        if word.len() > suffix.len() + 2 && word.ends_with(suffix) {
            return word[..word.len() - suffix.len()].to_string();
        }
    }
    word.to_string()
}

/// Words in the file name of an object URI
fn object_words(uri: &str) -> String {
    let name = uri.rsplit('/').next().unwrap_or(uri);
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    stem.replace(['_', '-'], " ")
}
