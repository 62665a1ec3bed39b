//! ComplaintPipeline - Main orchestration API
//!
//! Owns the database and the three model services and exposes every stage
//! and view as one call. Stages recompute their whole output table from the
//! source relations and overwrite it, so rerunning any stage is safe.

use crate::api::retriever::{
    ComplaintMatch, ImageMatch, QueryCache, QueryKind, normalize_phrase, rank_complaints,
    rank_images,
};
use crate::config::Config;
use crate::error::Result;
use crate::ml::{
    EmbeddingService, HttpEmbeddingClient, HttpMultimodalClient, LocalEmbedder, LocalGenerator,
    MultimodalEmbeddingService, OpenAiGenerator, TextGenerator,
};
use crate::records::{ComplaintRecord, ObjectCatalog, parse_complaints};
use crate::stages::{self, StagePolicy, run_stage};
use crate::storage::{Database, DatabaseStats, VectorTable};
use crate::views::{DailyCount, HotspotCell, check_precision, daily_counts, hotspots};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// The model services a pipeline talks to
#[derive(Clone)]
pub struct Services {
    pub generator: Arc<dyn TextGenerator>,
    pub embedder: Arc<dyn EmbeddingService>,
    pub multimodal: Arc<dyn MultimodalEmbeddingService>,
}

impl Services {
    /// Deterministic offline services
    pub fn local(config: &Config) -> Self {
        let embedder = Arc::new(LocalEmbedder::new(config.embedding.dimension));
        Self {
            generator: Arc::new(LocalGenerator::new()),
            embedder: embedder.clone(),
            multimodal: embedder,
        }
    }

    /// HTTP-backed hosted services
    pub fn remote(config: &Config) -> Self {
        Self {
            generator: Arc::new(OpenAiGenerator::new(&config.generation)),
            embedder: Arc::new(HttpEmbeddingClient::new(&config.embedding)),
            multimodal: Arc::new(HttpMultimodalClient::new(&config.embedding)),
        }
    }
}

/// Outcome of one stage run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: String,
    /// Rows the stage read from its source relation
    pub input_rows: usize,
    /// Rows written to the output table
    pub written: usize,
    /// Rows diverted to the rejection table
    pub rejected: usize,
}

/// Main entry point for running stages and reading views
pub struct ComplaintPipeline {
    config: Config,
    database: Database,
    services: Services,
    query_cache: QueryCache,
}

impl ComplaintPipeline {
    /// Assemble a pipeline from parts
    pub fn new(config: Config, database: Database, services: Services) -> Result<Self> {
        config.validate()?;
        log::info!(
            "Pipeline ready (generator: {}, embedder: {}, multimodal: {})",
            services.generator.model_name(),
            services.embedder.model_name(),
            services.multimodal.model_name()
        );
        Ok(Self {
            config,
            database,
            services,
            query_cache: QueryCache::default(),
        })
    }

    /// Open the configured database with offline services
    pub fn local(config: Config) -> Result<Self> {
        let database = Database::new(&config.database.path)?;
        let services = Services::local(&config);
        Self::new(config, database, services)
    }

    /// Open the configured database with hosted services
    pub fn remote(config: Config) -> Result<Self> {
        let database = Database::new(&config.database.path)?;
        let services = Services::remote(&config);
        Self::new(config, database, services)
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy::from_config(&self.config.pipeline)
    }

    /// Add complaints to the source relation; existing ids are kept as they are
    pub fn ingest_complaints(&mut self, complaints: &[ComplaintRecord]) -> Result<usize> {
        self.database.insert_complaints(complaints)
    }

    /// Ingest a JSON array or JSON lines file
    pub fn ingest_complaints_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let complaints = parse_complaints(&content)?;
        log::info!("Parsed {} complaints from {}", complaints.len(), path.display());
        self.ingest_complaints(&complaints)
    }

    /// Recompute the extraction tables
    pub async fn run_extraction(&mut self) -> Result<StageSummary> {
        let complaints = self.database.load_complaints()?;
        let generator = self.services.generator.as_ref();
        let concurrency = self.config.pipeline.concurrency;
        let source = &complaints;

        let report = run_stage("extraction", self.policy(), move || {
            stages::run_extraction(generator, source, concurrency)
        })
        .await?;

        self.database.replace_extractions(&report)?;

        Ok(StageSummary {
            stage: "extraction".to_string(),
            input_rows: complaints.len(),
            written: report.accepted.len(),
            rejected: report.rejected.len(),
        })
    }

    /// Recompute the complaint narrative vector table
    pub async fn run_text_embedding(&mut self) -> Result<StageSummary> {
        let complaints = self.database.load_complaints()?;
        let embedder = self.services.embedder.as_ref();
        let min_length = self.config.pipeline.min_narrative_length;
        let batch_size = self.config.embedding.batch_size;
        let source = &complaints;

        let records = run_stage("text_embedding", self.policy(), move || {
            stages::run_text_embedding(embedder, source, min_length, batch_size)
        })
        .await?;

        self.database
            .replace_embeddings(VectorTable::Text, &records)?;

        Ok(StageSummary {
            stage: "text_embedding".to_string(),
            input_rows: complaints.len(),
            written: records.len(),
            rejected: 0,
        })
    }

    /// Snapshot the images under `root` into the catalog table
    pub fn catalog_images<P: AsRef<Path>>(
        &mut self,
        root: P,
        extensions: Option<&[String]>,
    ) -> Result<usize> {
        let mut catalog = ObjectCatalog::new(root);
        if let Some(extensions) = extensions {
            catalog = catalog.with_extensions(extensions);
        }
        let images = catalog.scan()?;
        self.database.replace_image_references(&images)?;
        Ok(images.len())
    }

    /// Recompute the image vector table from the current catalog
    pub async fn run_image_embedding(&mut self) -> Result<StageSummary> {
        let images = self.database.load_image_references()?;
        let multimodal = self.services.multimodal.as_ref();
        let batch_size = self.config.embedding.batch_size;
        let source = &images;

        let records = run_stage("image_embedding", self.policy(), move || {
            stages::run_image_embedding(multimodal, source, batch_size)
        })
        .await?;

        self.database
            .replace_embeddings(VectorTable::Image, &records)?;

        Ok(StageSummary {
            stage: "image_embedding".to_string(),
            input_rows: images.len(),
            written: records.len(),
            rejected: 0,
        })
    }

    /// The `k` complaints whose narratives are closest to `phrase`
    pub async fn semantic_search(&self, phrase: &str, k: usize) -> Result<Vec<ComplaintMatch>> {
        let phrase = normalize_phrase(phrase)?;
        let vectors = self.database.load_embeddings(VectorTable::Text)?;
        if vectors.is_empty() {
            log::warn!("No complaint vectors stored; run the text embedding stage first");
            return Ok(Vec::new());
        }

        let embedder = self.services.embedder.as_ref();
        let query = match self.query_cache.get(QueryKind::Text, embedder.model_name(), phrase) {
            Some(cached) => cached,
            None => {
                let fresh = embedder.embed_query(phrase).await?;
                self.query_cache
                    .put(QueryKind::Text, embedder.model_name(), phrase, fresh.clone());
                fresh
            }
        };

        let complaints = self.database.load_complaints()?;
        let matches = rank_complaints(vectors, &complaints, &query, k)?;
        log::info!("Found {} complaints for '{}'", matches.len(), phrase);
        Ok(matches)
    }

    /// The `k` catalogued images closest to `phrase`
    pub async fn image_search(&self, phrase: &str, k: usize) -> Result<Vec<ImageMatch>> {
        let phrase = normalize_phrase(phrase)?;
        let vectors = self.database.load_embeddings(VectorTable::Image)?;
        if vectors.is_empty() {
            log::warn!("No image vectors stored; run the image embedding stage first");
            return Ok(Vec::new());
        }

        let multimodal = self.services.multimodal.as_ref();
        let cached = self
            .query_cache
            .get(QueryKind::Multimodal, multimodal.model_name(), phrase);
        let query = match cached {
            Some(cached) => cached,
            None => {
                let fresh = multimodal.embed_text_query(phrase).await?;
                self.query_cache.put(
                    QueryKind::Multimodal,
                    multimodal.model_name(),
                    phrase,
                    fresh.clone(),
                );
                fresh
            }
        };

        let matches = rank_images(vectors, &query, k)?;
        log::info!("Found {} images for '{}'", matches.len(), phrase);
        Ok(matches)
    }

    /// Daily counts with trailing baselines; `window_days` defaults to the configured window
    pub fn anomaly_view(
        &self,
        category: Option<&str>,
        window_days: Option<u32>,
    ) -> Result<Vec<DailyCount>> {
        let complaints = self.database.load_complaints()?;
        let window = window_days.unwrap_or(self.config.pipeline.rolling_window_days);
        Ok(daily_counts(&complaints, window, category))
    }

    /// Counts per point and category; `precision` defaults to the configured one
    pub fn hotspot_view(&self, precision: Option<u32>) -> Result<Vec<HotspotCell>> {
        let precision = precision.or(self.config.pipeline.hotspot_precision);
        check_precision(precision)?;
        let complaints = self.database.load_complaints()?;
        Ok(hotspots(&complaints, precision))
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        self.database.get_stats()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
