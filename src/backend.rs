//! Model invocation capability used by the summarizer.
//!
//! The summarizer talks to the same model the session uses for ordinary
//! turns. [`OpenAiCompatibleBackend`] covers the local servers ctxguard is
//! built for (Ollama, LM Studio, llama.cpp server, vLLM), all of which expose
//! the Chat Completions endpoint.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;

/// A single generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Instructions for the model.
    pub system: String,
    /// The material to work on.
    pub prompt: String,
    /// Soft output-length hint.
    pub max_tokens: usize,
    /// Model to use instead of the backend default.
    pub model: Option<String>,
}

/// Request/response access to a text generation model.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Generate text for the request.
    ///
    /// # Errors
    /// Returns an error if the call fails or the server rejects it.
    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}

/// Backend for servers exposing `POST /v1/chat/completions`.
#[derive(Clone)]
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
        }
    }

    /// Send a bearer token with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Build from the `[model]` config section.
    ///
    /// The API key is read from the environment variable named by
    /// `api_key_env`, if any.
    pub fn from_config(config: &ModelConfig) -> Self {
        let backend = Self::new(&config.base_url, &config.model);
        match config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
        {
            Some(key) => backend.with_api_key(key),
            None => backend,
        }
    }

    pub fn completions_url(&self) -> String {
        completions_url(&self.base_url)
    }
}

/// Accepts base URLs with or without a trailing `/v1`.
fn completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

#[derive(Debug, Serialize)]
struct ApiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    max_tokens: usize,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the first choice's text out of a completions response body.
fn extract_content(body: &[u8]) -> Result<String> {
    let response: ApiChatResponse =
        serde_json::from_slice(body).context("Failed to parse completions response")?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();
    Ok(content)
}

#[async_trait]
impl ModelBackend for OpenAiCompatibleBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let api_request = ApiChatRequest {
            model,
            messages: vec![
                ApiMessage {
                    role: "system",
                    content: &request.system,
                },
                ApiMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            stream: false,
        };

        tracing::debug!(
            model,
            max_tokens = request.max_tokens,
            prompt_chars = request.prompt.len(),
            "model request"
        );

        let mut builder = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .json(&api_request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to reach model server at {}", self.base_url))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .context("Failed to read model server response body")?;

        tracing::debug!(status = %status, body_len = bytes.len(), "model response");

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            bail!("Model server returned {}: {}", status, body.trim());
        }

        extract_content(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_variants() {
        assert_eq!(
            completions_url("http://127.0.0.1:11434"),
            "http://127.0.0.1:11434/v1/chat/completions"
        );
        assert_eq!(
            completions_url("http://127.0.0.1:11434/"),
            "http://127.0.0.1:11434/v1/chat/completions"
        );
        assert_eq!(
            completions_url("http://localhost:1234/v1"),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            completions_url("http://localhost:1234/v1/"),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_extract_content() {
        let body = br#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "The user set up a Rust project."}}
            ]
        }"#;
        assert_eq!(
            extract_content(body).unwrap(),
            "The user set up a Rust project."
        );
    }

    #[test]
    fn test_extract_content_missing_choices_is_empty() {
        assert_eq!(extract_content(br#"{"choices": []}"#).unwrap(), "");
        assert_eq!(extract_content(br#"{}"#).unwrap(), "");
        assert_eq!(
            extract_content(br#"{"choices": [{"message": {"content": null}}]}"#).unwrap(),
            ""
        );
    }

    #[test]
    fn test_extract_content_rejects_garbage() {
        assert!(extract_content(b"<html>502 Bad Gateway</html>").is_err());
    }

    #[test]
    fn test_request_serialization() {
        let request = ApiChatRequest {
            model: "llama3.1",
            messages: vec![ApiMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 512,
            stream: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "llama3.1");
        assert_eq!(value["max_tokens"], 512);
        assert_eq!(value["stream"], false);
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn test_from_config_uses_configured_values() {
        let config = ModelConfig {
            base_url: "http://localhost:8080/v1".to_string(),
            model: "qwen2.5-coder".to_string(),
            timeout_secs: 30,
            api_key_env: None,
        };
        let backend = OpenAiCompatibleBackend::from_config(&config);
        assert_eq!(backend.model, "qwen2.5-coder");
        assert_eq!(
            backend.completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
        assert!(backend.api_key.is_none());
    }
}
