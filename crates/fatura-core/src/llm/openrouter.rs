//! OpenAI-compatible chat completions client (OpenRouter by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::prompt::{SYSTEM_INSTRUCTION, extraction_prompt};
use crate::error::ExtractionError;
use crate::models::config::ExtractionConfig;
use crate::stages::extraction::FieldProducer;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat completions client used as the extraction collaborator.
pub struct OpenRouterClient {
    http: Client,
    base_url: String,
    api_key: String,
    fallback_model: Option<String>,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenRouterClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let defaults = ExtractionConfig::default();
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            fallback_model: None,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            timeout: Duration::from_secs(defaults.timeout_secs),
        }
    }

    /// Build a client from configuration. The API key comes from the
    /// environment variable named in the config.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let api_key = config.api_key().ok_or_else(|| {
            ExtractionError::NotConfigured(format!("environment variable {} is not set", config.api_key_env))
        })?;

        Ok(Self {
            fallback_model: config.fallback_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
            ..Self::new(config.base_url.clone(), api_key)
        })
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn complete(&self, model: &str, raw_text: &str) -> Result<String, ExtractionError> {
        let prompt = extraction_prompt(raw_text);
        let request = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };

        debug!("Requesting extraction from {} with model {}", self.endpoint(), model);
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::Service(format!("failed to reach {}: {}", self.base_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::PAYMENT_REQUIRED || body.to_lowercase().contains("credits") {
                return Err(ExtractionError::InsufficientCredits(format!("HTTP {}: {}", status, body)));
            }
            return Err(ExtractionError::Service(format!("HTTP {}: {}", status, body)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::InvalidResponse(format!("failed to decode completion: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ExtractionError::InvalidResponse("completion has no content".to_string()))
    }

    async fn complete_with_fallback(&self, model: &str, raw_text: &str) -> Result<String, ExtractionError> {
        match self.complete(model, raw_text).await {
            Err(ExtractionError::InsufficientCredits(reason)) => match self.fallback_model.as_deref() {
                Some(fallback) if fallback != model => {
                    warn!("Model {} rejected for credits ({}), retrying with {}", model, reason, fallback);
                    self.complete(fallback, raw_text).await
                }
                _ => Err(ExtractionError::InsufficientCredits(reason)),
            },
            other => other,
        }
    }
}

#[async_trait]
impl FieldProducer for OpenRouterClient {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn produce_fields(&self, raw_text: &str, model: &str) -> Result<String, ExtractionError> {
        let content = tokio::time::timeout(self.timeout, self.complete_with_fallback(model, raw_text))
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout.as_secs()))??;

        info!("Model {} answered with {} chars", model, content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn completion(content: &str) -> serde_json::Value {
        json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("Authorization", "Bearer test-key")
                    .body_contains("\"response_format\":{\"type\":\"json_object\"}")
                    .body_contains("\"model\":\"openai/gpt-4o\"");
                then.status(200)
                    .json_body(completion(r#"{"biller_name": "Acme Co"}"#));
            })
            .await;

        let client = OpenRouterClient::new(server.base_url(), "test-key");
        let content = client.produce_fields("Acme Co", "openai/gpt-4o").await.unwrap();

        mock.assert_async().await;
        assert_eq!(content, r#"{"biller_name": "Acme Co"}"#);
    }

    #[tokio::test]
    async fn test_credit_error_retries_with_fallback_model() {
        let server = MockServer::start_async().await;
        let primary = server
            .mock_async(|when, then| {
                when.method(POST).body_contains("\"model\":\"openai/gpt-4o\"");
                then.status(402).body("insufficient credits");
            })
            .await;
        let fallback = server
            .mock_async(|when, then| {
                when.method(POST).body_contains("\"model\":\"openai/gpt-4o-mini\"");
                then.status(200).json_body(completion("{}"));
            })
            .await;

        let client = OpenRouterClient::new(server.base_url(), "key").with_fallback_model("openai/gpt-4o-mini");
        let content = client.produce_fields("text", "openai/gpt-4o").await.unwrap();

        primary.assert_async().await;
        fallback.assert_async().await;
        assert_eq!(content, "{}");
    }

    #[tokio::test]
    async fn test_server_error_is_service_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(500).body("boom");
            })
            .await;

        let client = OpenRouterClient::new(server.base_url(), "key").with_fallback_model("other");
        let result = client.produce_fields("text", "model").await;
        assert!(matches!(result, Err(ExtractionError::Service(msg)) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let client = OpenRouterClient::new(server.base_url(), "key");
        let result = client.produce_fields("text", "model").await;
        assert!(matches!(result, Err(ExtractionError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .delay(Duration::from_millis(500))
                    .json_body(completion("{}"));
            })
            .await;

        let client = OpenRouterClient::new(server.base_url(), "key").with_timeout(Duration::from_millis(50));
        let result = client.produce_fields("text", "model").await;
        assert!(matches!(result, Err(ExtractionError::Timeout(_))));
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = ExtractionConfig {
            api_key_env: "FATURA_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ExtractionConfig::default()
        };
        assert!(matches!(
            OpenRouterClient::from_config(&config),
            Err(ExtractionError::NotConfigured(_))
        ));
    }
}
