//! Language-model provider.
//!
//! [`OpenAiChatModel`] speaks the OpenAI `/chat/completions` protocol, which
//! covers OpenAI itself and any compatible server (Ollama's `/v1`, vLLM,
//! llama.cpp). The prompt is sent as a single user message.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: usize,
    pub top_p: f32,
    pub frequency_penalty: f32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Result<Self> {
        // The caller bounds each call; this only guards against hung sockets.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": params.temperature,
            "max_tokens": params.max_output_tokens,
            "top_p": params.top_p,
            "frequency_penalty": params.frequency_penalty,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach language model at {}", self.base_url))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Language model error {}: {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_completion(&json)
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing choices[0].message.content"))
}

/// Build the model named in `[generation]`.
///
/// `openai` needs `OPENAI_API_KEY`; `ollama` talks to its OpenAI-compatible
/// endpoint and needs no key.
pub fn create_language_model(config: &GenerationConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = match std::env::var("OPENAI_API_KEY") {
                Ok(key) if !key.is_empty() => key,
                _ => bail!("OPENAI_API_KEY environment variable not set"),
            };
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            Ok(Box::new(OpenAiChatModel::new(
                base_url,
                Some(api_key),
                config.model.clone(),
            )?))
        }
        "ollama" => {
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434/v1".to_string());
            Ok(Box::new(OpenAiChatModel::new(
                base_url,
                None,
                config.model.clone(),
            )?))
        }
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_content_is_trimmed() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Rust and Python.\n" } }]
        });
        assert_eq!(parse_completion(&json).unwrap(), "Rust and Python.");
    }

    #[test]
    fn missing_choices_is_an_error() {
        assert!(parse_completion(&serde_json::json!({ "error": "overloaded" })).is_err());
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = GenerationConfig {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            ..GenerationConfig::default()
        };
        let model = create_language_model(&config).unwrap();
        assert_eq!(model.model_name(), "llama3.2");
    }
}
