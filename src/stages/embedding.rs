//! Embedding stages: complaint narratives and catalogued images
//!
//! Both produce a full vector table snapshot keyed by source id, generated
//! with the document task type. Eligibility filtering happens before any
//! service call so that near-empty narratives never cost an invocation.

use crate::error::{LensError, Result};
use crate::ml::{EmbeddingRecord, EmbeddingService, MultimodalEmbeddingService};
use crate::records::{ComplaintRecord, ImageReference};

/// Narratives that carry no information
pub const PLACEHOLDER_NARRATIVES: &[&str] = &["n/a", "na", "none", "null", "-"];

/// True when a narrative is worth embedding
pub fn is_embeddable(narrative: Option<&str>, min_length: usize) -> bool {
    let Some(text) = narrative else {
        return false;
    };
    let trimmed = text.trim();
    if trimmed.is_empty()
        || PLACEHOLDER_NARRATIVES
            .iter()
            .any(|p| trimmed.eq_ignore_ascii_case(p))
    {
        return false;
    }
    trimmed.chars().count() > min_length
}

/// Embed every eligible complaint narrative
pub async fn run_text_embedding(
    service: &dyn EmbeddingService,
    complaints: &[ComplaintRecord],
    min_length: usize,
    batch_size: usize,
) -> Result<Vec<EmbeddingRecord>> {
    let mut eligible: Vec<(&str, String)> = complaints
        .iter()
        .filter(|c| is_embeddable(c.resolution.as_deref(), min_length))
        .filter_map(|c| c.resolution.clone().map(|text| (c.id.as_str(), text)))
        .collect();
    eligible.sort_by(|a, b| a.0.cmp(b.0));

    log::info!(
        "Embedding {} of {} narratives with {}",
        eligible.len(),
        complaints.len(),
        service.model_name()
    );

    let mut records = Vec::with_capacity(eligible.len());
    for batch in eligible.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        let embeddings = service.embed_documents(&texts).await?;
        check_batch(batch.len(), embeddings.len())?;
        records.extend(
            batch
                .iter()
                .zip(embeddings)
                .map(|((id, _), embedding)| EmbeddingRecord {
                    id: id.to_string(),
                    embedding,
                }),
        );
    }

    ensure_uniform_dimension(&records)?;
    Ok(records)
}

/// Embed every catalogued image
pub async fn run_image_embedding(
    service: &dyn MultimodalEmbeddingService,
    images: &[ImageReference],
    batch_size: usize,
) -> Result<Vec<EmbeddingRecord>> {
    let mut sorted: Vec<&ImageReference> = images.iter().collect();
    sorted.sort_by(|a, b| a.uri.cmp(&b.uri));

    log::info!(
        "Embedding {} images with {}",
        sorted.len(),
        service.model_name()
    );

    let mut records = Vec::with_capacity(sorted.len());
    for batch in sorted.chunks(batch_size.max(1)) {
        let owned: Vec<ImageReference> = batch.iter().map(|r| (*r).clone()).collect();
        let embeddings = service.embed_images(&owned).await?;
        check_batch(owned.len(), embeddings.len())?;
        records.extend(owned.into_iter().zip(embeddings).map(|(image, embedding)| {
            EmbeddingRecord {
                id: image.uri,
                embedding,
            }
        }));
    }

    ensure_uniform_dimension(&records)?;
    Ok(records)
}

fn check_batch(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(LensError::Embedding(format!(
            "Service returned {} vectors for {} inputs",
            got, expected
        )));
    }
    Ok(())
}

fn ensure_uniform_dimension(records: &[EmbeddingRecord]) -> Result<()> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let expected = first.embedding.dimension();
    if let Some(bad) = records
        .iter()
        .find(|r| r.embedding.dimension() != expected || r.embedding.dimension() == 0)
    {
        return Err(LensError::Embedding(format!(
            "Vector for {} has dimension {}, expected {}",
            bad.id,
            bad.embedding.dimension(),
            expected
        )));
    }
    Ok(())
}

/// Dimension of a vector table, if it has rows
pub fn table_dimension(records: &[EmbeddingRecord]) -> Option<usize> {
    records.first().map(|r| r.embedding.dimension())
}
