//! HTTP clients for hosted embedding models
//!
//! Both clients speak the `models/{model}:predict` shape: a list of `instances`
//! in, a list of `predictions` out, one per instance and in the same order.

use crate::config::EmbeddingConfig;
use crate::error::{LensError, Result};
use crate::ml::embedding::{Embedding, EmbeddingService, MultimodalEmbeddingService, TaskType};
use crate::records::ImageReference;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct PredictRequest<I: Serialize> {
    instances: Vec<I>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse<P> {
    predictions: Vec<P>,
}

#[derive(Debug, Serialize)]
struct TextInstance<'a> {
    content: &'a str,
    task_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct TextPrediction {
    embeddings: TextValues,
}

#[derive(Debug, Deserialize)]
struct TextValues {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct MultimodalInstance {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<ImagePayload>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes_base64_encoded: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gcs_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultimodalPrediction {
    #[serde(default)]
    text_embedding: Option<Vec<f32>>,
    #[serde(default)]
    image_embedding: Option<Vec<f32>>,
}

/// Shared request plumbing
#[derive(Clone)]
struct PredictClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl PredictClient {
    fn new(endpoint: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if !self.api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| LensError::Config(format!("Invalid API key header: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn predict<I, P>(&self, model: &str, instances: Vec<I>) -> Result<Vec<P>>
    where
        I: Serialize + Send,
        P: DeserializeOwned,
    {
        let url = format!("{}/models/{}:predict", self.endpoint, model);
        let expected = instances.len();
        log::debug!("Embedding request to {} with {} instances", url, expected);

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&PredictRequest { instances })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(LensError::Service(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let body: PredictResponse<P> = response.json().await?;
        if body.predictions.len() != expected {
            return Err(LensError::Service(format!(
                "Expected {} predictions, got {}",
                expected,
                body.predictions.len()
            )));
        }
        Ok(body.predictions)
    }
}

/// Hosted text embedding model
pub struct HttpEmbeddingClient {
    client: PredictClient,
    model: String,
    batch_size: usize,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            client: PredictClient::new(&config.endpoint, &config.api_key),
            model: config.text_model.clone(),
            batch_size: config.batch_size.max(1),
        }
    }

    async fn embed(&self, texts: &[String], task: TaskType) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let instances: Vec<TextInstance> = batch
                .iter()
                .map(|text| TextInstance {
                    content: text,
                    task_type: task.as_str(),
                })
                .collect();
            let predictions: Vec<TextPrediction> =
                self.client.predict(&self.model, instances).await?;
            embeddings.extend(
                predictions
                    .into_iter()
                    .map(|p| Embedding::new(p.embeddings.values, task)),
            );
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.embed(texts, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed(&[text.to_string()], TaskType::RetrievalQuery)
            .await?
            .pop()
            .ok_or_else(|| LensError::Service("Empty embedding response".to_string()))
    }
}

/// Hosted multimodal embedding model
pub struct HttpMultimodalClient {
    client: PredictClient,
    model: String,
    batch_size: usize,
}

impl HttpMultimodalClient {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            client: PredictClient::new(&config.endpoint, &config.api_key),
            model: config.multimodal_model.clone(),
            batch_size: config.batch_size.max(1),
        }
    }
}

/// Inline local files; hand object-store URIs to the service as-is
async fn image_payload(image: &ImageReference) -> Result<ImagePayload> {
    match image.uri.strip_prefix("file://") {
        Some(path) => {
            let bytes = tokio::fs::read(path).await?;
            Ok(ImagePayload {
                bytes_base64_encoded: Some(general_purpose::STANDARD.encode(bytes)),
                gcs_uri: None,
            })
        }
        None => Ok(ImagePayload {
            bytes_base64_encoded: None,
            gcs_uri: Some(image.uri.clone()),
        }),
    }
}

#[async_trait]
impl MultimodalEmbeddingService for HttpMultimodalClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_images(&self, images: &[ImageReference]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(images.len());
        for batch in images.chunks(self.batch_size) {
            let mut instances = Vec::with_capacity(batch.len());
            for image in batch {
                instances.push(MultimodalInstance {
                    text: None,
                    image: Some(image_payload(image).await?),
                });
            }

            let predictions: Vec<MultimodalPrediction> =
                self.client.predict(&self.model, instances).await?;
            for (image, prediction) in batch.iter().zip(predictions) {
                let values = prediction.image_embedding.ok_or_else(|| {
                    LensError::Service(format!("No image embedding for {}", image.uri))
                })?;
                embeddings.push(Embedding::new(values, TaskType::RetrievalDocument));
            }
        }
        Ok(embeddings)
    }

    async fn embed_text_query(&self, text: &str) -> Result<Embedding> {
        let instances = vec![MultimodalInstance {
            text: Some(text.to_string()),
            image: None,
        }];
        let predictions: Vec<MultimodalPrediction> =
            self.client.predict(&self.model, instances).await?;
        predictions
            .into_iter()
            .next()
            .and_then(|p| p.text_embedding)
            .map(|values| Embedding::new(values, TaskType::RetrievalQuery))
            .ok_or_else(|| LensError::Service("No text embedding in response".to_string()))
    }
}
