//! Text generation service boundary
//!
//! The extraction stage only needs "prompt in, text out". `OpenAiGenerator`
//! talks to any OpenAI-compatible chat endpoint; `LocalGenerator` answers
//! offline with a keyword heuristic in the same JSON shape.

use crate::config::GenerationConfig;
use crate::error::{LensError, Result};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;

/// A hosted text-generation model
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    /// One raw text completion for one prompt
    async fn generate(&self, prompt: &str) -> Result<String>;
}

const SYSTEM_PROMPT: &str = "You convert municipal service request notes into structured data. Respond with JSON only.";

/// Chat-completions backed generator
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Self {
        let openai_config = match &config.api_base {
            Some(base_url) => OpenAIConfig::new()
                .with_api_key(&config.api_key)
                .with_api_base(base_url),
            None => OpenAIConfig::new().with_api_key(&config.api_key),
        };

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(
                    SYSTEM_PROMPT.to_string(),
                ),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
                name: None,
            }),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                log::error!("No content in chat response from {}", self.model);
                LensError::Service("No content in response".to_string())
            })?;

        Ok(content)
    }
}

/// Keyword-driven generator used offline.
///
/// Reads the narrative after the prompt's `Narrative:` marker and answers with
/// the same three JSON keys a hosted model is asked for.
#[derive(Debug, Clone, Default)]
pub struct LocalGenerator;

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("pothole", &["pothole", "asphalt", "pavement"]),
    ("noise", &["noise", "loud", "music", "party"]),
    ("sanitation", &["trash", "garbage", "litter", "dumping", "sanitation"]),
    ("graffiti", &["graffiti", "vandal"]),
    ("water", &["leak", "hydrant", "water", "flood"]),
    ("lighting", &["streetlight", "street light", "lamp"]),
    ("parking", &["parking", "vehicle", "car"]),
];

const SEVERE_WORDS: &[&str] = &["danger", "injur", "emergency", "collapse", "flood"];
const MINOR_WORDS: &[&str] = &["no action", "not found", "duplicate", "closed"];

impl LocalGenerator {
    pub fn new() -> Self {
        Self
    }

    fn respond(narrative: &str) -> serde_json::Value {
        let lower = narrative.to_lowercase();

        let category = CATEGORY_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(category, _)| *category)
            .unwrap_or("other");

        let severity = if SEVERE_WORDS.iter().any(|w| lower.contains(w)) {
            5
        } else if MINOR_WORDS.iter().any(|w| lower.contains(w)) {
            1
        } else {
            3
        };

        let summary = narrative
            .split_terminator(['.', '!', '?'])
            .next()
            .unwrap_or(narrative)
            .trim();

        serde_json::json!({
            "issue_category": category,
            "severity": severity,
            "summary": format!("{}.", summary),
        })
    }
}

#[async_trait]
impl TextGenerator for LocalGenerator {
    fn model_name(&self) -> &str {
        "local-keyword"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let narrative = prompt
            .rsplit_once("Narrative:")
            .map(|(_, text)| text.trim())
            .unwrap_or(prompt.trim());
        Ok(Self::respond(narrative).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_generator_emits_three_keys() {
        let generator = LocalGenerator::new();
        let raw = generator
            .generate("Return JSON.\nNarrative: Pothole fixed by DOT crew on 5th Ave. Crew left.")
            .await
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["issue_category"], "pothole");
        assert_eq!(value["severity"], 3);
        assert_eq!(value["summary"], "Pothole fixed by DOT crew on 5th Ave.");
    }

    #[tokio::test]
    async fn test_local_generator_severity_keywords() {
        let generator = LocalGenerator::new();
        let raw = generator
            .generate("Narrative: Water main flood near the school")
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["issue_category"], "water");
        assert_eq!(value["severity"], 5);
    }

    #[test]
    fn test_openai_generator_uses_configured_model() {
        let config = GenerationConfig {
            model: "gpt-test".to_string(),
            api_base: Some("http://localhost:11434/v1".to_string()),
            ..GenerationConfig::default()
        };
        let generator = OpenAiGenerator::new(&config);
        assert_eq!(generator.model_name(), "gpt-test");
    }
}
