//! Generative-text adapter.
//!
//! Works with any OpenAI-compatible chat completions endpoint. The
//! single call type enforces the JSON-object response mode and parses
//! the completion strictly; a completion that is not valid JSON is a
//! parse failure, distinct from transport errors and never retried.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

use super::http::{self, RetryPolicy};
use super::GenerativeText;

/// HTTP client for an OpenAI-compatible chat completions endpoint.
pub struct GenAiHttpClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
}

impl GenAiHttpClient {
    /// Create a client for the given endpoint and model.
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client: http::build_client(request_timeout),
            base_url,
            api_key,
            model,
            max_tokens: 2000,
            temperature: 0.2,
            retry,
        }
    }

    /// Override generation parameters.
    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

#[async_trait::async_trait]
impl GenerativeText for GenAiHttpClient {
    async fn complete_json(
        &self,
        system: &str,
        user: &str,
    ) -> Result<serde_json::Value, AdapterError> {
        tracing::debug!(
            model = %self.model,
            max_tokens = self.max_tokens,
            user_chars = user.len(),
            "generative request",
        );

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let body = http::with_retries(&self.retry, "genai.complete", || async {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| http::map_transport_error(&e))?;
            if !response.status().is_success() {
                return Err(http::map_error_response(response).await);
            }
            response
                .json::<ChatCompletionResponse>()
                .await
                .map_err(|e| AdapterError::Parse(format!("completion envelope: {e}")))
        })
        .await?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        tracing::debug!(chars = text.len(), "generative response");

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| AdapterError::Parse(format!("completion is not valid JSON: {e}")))?;
        if !value.is_object() {
            return Err(AdapterError::Parse(
                "completion is not a JSON object".to_string(),
            ));
        }
        Ok(value)
    }
}

// --- Internal Serde types ---

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> GenAiHttpClient {
        GenAiHttpClient::new(
            server.uri(),
            "test-key".to_string(),
            "scout-large".to_string(),
            RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn complete_json_parses_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "scout-large",
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"variations\": [\"Benefis\"]}"}}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let value = client.complete_json("system", "user").await.unwrap();
        assert_eq!(value["variations"][0], "Benefis");
    }

    #[tokio::test]
    async fn non_json_completion_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "sorry, I cannot help with that"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.complete_json("system", "user").await.unwrap_err();
        assert!(matches!(err, AdapterError::Parse(_)));
    }

    #[tokio::test]
    async fn non_object_json_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "[1, 2, 3]"}}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.complete_json("system", "user").await.unwrap_err();
        assert!(matches!(err, AdapterError::Parse(_)));
    }

    #[tokio::test]
    async fn error_429_retries_then_degrades_to_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).append_header("retry-after", "0"))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.complete_json("system", "user").await.unwrap_err();
        assert!(matches!(err, AdapterError::Transport { .. }));
    }

    #[tokio::test]
    async fn error_401_maps_to_bad_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.complete_json("system", "user").await.unwrap_err();
        assert!(matches!(
            err,
            AdapterError::BadResponse { status: 401, .. }
        ));
    }
}
