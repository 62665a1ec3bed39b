//! Exact nearest-neighbour search over a vector table
//!
//! The index only accepts document-task vectors and only answers query-task
//! vectors. Results come back in non-decreasing distance order.

use crate::error::{LensError, Result};
use crate::ml::embedding::{Embedding, EmbeddingRecord, TaskType};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Distance metrics supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Cosine distance, `1 - cos(a, b)`
    #[default]
    Cosine,
    /// Euclidean distance (L2)
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Negated dot product
    DotProduct,
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: String,
    /// Lower = more similar
    pub distance: f32,
}

/// Flat vector index with exact search
pub struct VectorSearchIndex {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    dimension: Option<usize>,
    metric: DistanceMetric,
}

impl VectorSearchIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            ids: Vec::new(),
            vectors: Vec::new(),
            dimension: None,
            metric,
        }
    }

    /// Build a cosine index from stored rows
    pub fn from_records(records: Vec<EmbeddingRecord>) -> Result<Self> {
        let mut index = Self::new(DistanceMetric::Cosine);
        for record in records {
            index.add(record.id, record.embedding)?;
        }
        Ok(index)
    }

    /// Add a stored vector
    pub fn add(&mut self, id: String, embedding: Embedding) -> Result<()> {
        if embedding.task() != TaskType::RetrievalDocument {
            return Err(LensError::Search(format!(
                "Vector {} was generated for {}, only {} vectors can be indexed",
                id,
                embedding.task().as_str(),
                TaskType::RetrievalDocument.as_str()
            )));
        }

        let dimension = embedding.dimension();
        match self.dimension {
            Some(expected) if expected != dimension => {
                return Err(LensError::Search(format!(
                    "Vector {} has dimension {} but index dimension is {}",
                    id, dimension, expected
                )));
            }
            None => self.dimension = Some(dimension),
            _ => {}
        }

        self.ids.push(id);
        self.vectors.push(embedding.values().to_vec());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// The `k` stored vectors closest to `query`, nearest first
    pub fn search(&self, query: &Embedding, k: usize) -> Result<Vec<Neighbor>> {
        if query.task() != TaskType::RetrievalQuery {
            return Err(LensError::Search(format!(
                "Search requires a {} vector, got {}",
                TaskType::RetrievalQuery.as_str(),
                query.task().as_str()
            )));
        }

        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(expected) = self.dimension {
            if query.dimension() != expected {
                return Err(LensError::Search(format!(
                    "Query dimension {} doesn't match index dimension {}",
                    query.dimension(),
                    expected
                )));
            }
        }

        let query_values = query.values();
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .par_iter()
            .enumerate()
            .map(|(i, vector)| (i, self.distance(query_values, vector)))
            .collect();

        scored.sort_by(|a, b| {
            compare_distance(a.1, b.1).then_with(|| self.ids[a.0].cmp(&self.ids[b.0]))
        });
        scored.truncate(k);

        log::debug!("Vector search returned {} of {} rows", scored.len(), self.len());

        Ok(scored
            .into_iter()
            .map(|(i, distance)| Neighbor {
                id: self.ids[i].clone(),
                distance,
            })
            .collect())
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::Cosine => cosine_distance(a, b),
            DistanceMetric::Euclidean => euclidean_distance(a, b),
            DistanceMetric::Manhattan => manhattan_distance(a, b),
            DistanceMetric::DotProduct => -dot_product(a, b),
        }
    }
}

/// NaN sorts after every real distance
fn compare_distance(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Cosine distance (1 - cosine similarity)
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        1.0 // Maximum distance for zero vectors
    } else {
        1.0 - (dot / (norm_a * norm_b))
    }
}

/// Euclidean distance (L2)
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Manhattan distance (L1)
pub fn manhattan_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn doc(values: Vec<f32>) -> Embedding {
        Embedding::new(values, TaskType::RetrievalDocument)
    }

    fn query(values: Vec<f32>) -> Embedding {
        Embedding::new(values, TaskType::RetrievalQuery)
    }

    #[test]
    fn test_add_and_search_vectors() {
        let mut index = VectorSearchIndex::new(DistanceMetric::Cosine);
        index.add("x".into(), doc(vec![1.0, 0.0, 0.0])).unwrap();
        index.add("y".into(), doc(vec![0.0, 1.0, 0.0])).unwrap();
        index.add("z".into(), doc(vec![0.0, 0.0, 1.0])).unwrap();

        let results = index.search(&query(vec![0.9, 0.1, 0.0]), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "x");
        assert_eq!(results[1].id, "y");
        assert!(results[0].distance <= results[1].distance);
    }

    #[test]
    fn test_results_non_decreasing() {
        let mut index = VectorSearchIndex::new(DistanceMetric::Cosine);
        for i in 0..20 {
            let angle = i as f32 * 0.15;
            index
                .add(format!("r{:02}", i), doc(vec![angle.cos(), angle.sin()]))
                .unwrap();
        }

        for q in [vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.3]] {
            let results = index.search(&query(q), 20).unwrap();
            assert_eq!(results.len(), 20);
            assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }

    #[test]
    fn test_ties_break_by_id() {
        let mut index = VectorSearchIndex::new(DistanceMetric::Cosine);
        index.add("b".into(), doc(vec![1.0, 0.0])).unwrap();
        index.add("a".into(), doc(vec![2.0, 0.0])).unwrap();

        let results = index.search(&query(vec![1.0, 0.0]), 2).unwrap();
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "b");
    }

    #[test]
    fn test_rejects_mixed_task_types() {
        let mut index = VectorSearchIndex::new(DistanceMetric::Cosine);
        assert!(matches!(
            index.add("q".into(), query(vec![1.0])),
            Err(LensError::Search(_))
        ));

        index.add("d".into(), doc(vec![1.0])).unwrap();
        assert!(matches!(
            index.search(&doc(vec![1.0]), 1),
            Err(LensError::Search(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = VectorSearchIndex::new(DistanceMetric::Cosine);
        index.add("a".into(), doc(vec![1.0, 0.0])).unwrap();
        assert!(index.add("b".into(), doc(vec![1.0, 0.0, 0.0])).is_err());
        assert!(index.search(&query(vec![1.0]), 1).is_err());
    }

    #[test]
    fn test_zero_k_and_empty_index() {
        let mut index = VectorSearchIndex::new(DistanceMetric::Cosine);
        assert!(index.search(&query(vec![1.0]), 3).unwrap().is_empty());
        index.add("a".into(), doc(vec![1.0])).unwrap();
        assert!(index.search(&query(vec![1.0]), 0).unwrap().is_empty());
    }

    #[test]
    fn test_distance_metrics() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0];

        assert_relative_eq!(cosine_distance(&a, &b), 1.0, epsilon = 1e-6);
        assert_relative_eq!(cosine_distance(&a, &a), 0.0, epsilon = 1e-6);
        assert_relative_eq!(cosine_distance(&a, &[0.0, 0.0, 0.0]), 1.0, epsilon = 1e-6);
        assert_relative_eq!(euclidean_distance(&a, &b), 2.0_f32.sqrt(), epsilon = 1e-6);
        assert_relative_eq!(manhattan_distance(&a, &b), 2.0, epsilon = 1e-6);
        assert_relative_eq!(dot_product(&a, &b), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_nan_sorts_last() {
        assert_eq!(compare_distance(f32::NAN, 0.5), Ordering::Greater);
        assert_eq!(compare_distance(0.5, f32::NAN), Ordering::Less);
    }
}
