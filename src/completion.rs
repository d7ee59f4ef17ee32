//! OpenAI-compatible chat-completion client.
//!
//! Each call asks for a JSON-object response first. Endpoints that reject
//! `response_format` get the same prompt once more without it; there is no
//! further retry.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Config, ConfigError};
use crate::traits::{CompletionClient, CompletionError};

pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Longest slice of an error body kept in [`CompletionError::Api`].
const ERROR_BODY_CHARS: usize = 500;

/// Whether the endpoint honours `response_format: json_object`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StructuredOutput {
    /// Try structured, fall back to plain once on any error.
    #[default]
    Unknown,
    /// Structured only.
    Supported,
    /// Plain only.
    Unsupported,
}

pub struct OpenAiCompletionClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    structured: StructuredOutput,
}

impl OpenAiCompletionClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingCredential`] when no API key is configured.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let api_key = config.require_openai_key()?.to_string();
        let client = Client::builder()
            .timeout(COMPLETION_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: DEFAULT_TEMPERATURE,
            structured: StructuredOutput::default(),
        })
    }

    pub fn with_structured_output(mut self, structured: StructuredOutput) -> Self {
        self.structured = structured;
        self
    }

    async fn request(&self, prompt: &str, json_mode: bool) -> Result<String, CompletionError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_CHARS).collect(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::InvalidResponse("no choices in response".to_string()))?;

        Ok(choice
            .message
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "{}".to_string()))
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        match self.structured {
            StructuredOutput::Supported => self.request(prompt, true).await,
            StructuredOutput::Unsupported => self.request(prompt, false).await,
            StructuredOutput::Unknown => match self.request(prompt, true).await {
                Ok(text) => Ok(text),
                Err(e) => {
                    debug!(error = %e, "Structured request failed; retrying as plain text");
                    self.request(prompt, false).await.inspect_err(|e| {
                        warn!(model = %self.model, error = %e, "Completion failed");
                    })
                }
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn config(base_url: String) -> Config {
        Config {
            openai_api_key: Some("test-key".to_string()),
            openai_base_url: base_url,
            ..Config::default()
        }
    }

    fn completion_body(content: serde_json::Value) -> String {
        json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] })
            .to_string()
    }

    fn structured() -> Matcher {
        Matcher::PartialJson(json!({ "response_format": { "type": "json_object" } }))
    }

    fn plain() -> Matcher {
        // response_format is the last field when present
        Matcher::Regex(r#""temperature":0\.2\}$"#.to_string())
    }

    #[test]
    fn test_new_requires_api_key() {
        let err = OpenAiCompletionClient::new(&Config::default()).err().unwrap();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn test_structured_request_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::AllOf(vec![
                structured(),
                Matcher::PartialJson(json!({
                    "model": "gpt-4o-mini",
                    "messages": [ { "role": "user", "content": "hello" } ]
                })),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body(json!("{\"summary\":\"ok\"}")))
            .expect(1)
            .create_async()
            .await;

        let client = OpenAiCompletionClient::new(&config(server.url())).unwrap();
        let text = client.complete("hello").await.unwrap();

        assert_eq!(text, "{\"summary\":\"ok\"}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_falls_back_to_plain_once() {
        let mut server = mockito::Server::new_async().await;
        let rejected = server
            .mock("POST", "/chat/completions")
            .match_body(structured())
            .with_status(400)
            .with_body(r#"{"error":{"message":"response_format is not supported"}}"#)
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("POST", "/chat/completions")
            .match_body(plain())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body(json!("plain answer")))
            .expect(1)
            .create_async()
            .await;

        let client = OpenAiCompletionClient::new(&config(server.url())).unwrap();
        assert_eq!(client.complete("hi").await.unwrap(), "plain answer");

        rejected.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn test_both_attempts_fail() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("upstream down")
            .expect(2)
            .create_async()
            .await;

        let client = OpenAiCompletionClient::new(&config(server.url())).unwrap();
        let err = client.complete("hi").await.unwrap_err();

        match err {
            CompletionError::Api { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_plain_only_mode_skips_structured_attempt() {
        let mut server = mockito::Server::new_async().await;
        let structured_mock = server
            .mock("POST", "/chat/completions")
            .match_body(structured())
            .expect(0)
            .create_async()
            .await;
        let plain_mock = server
            .mock("POST", "/chat/completions")
            .match_body(plain())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body(json!("text")))
            .expect(1)
            .create_async()
            .await;

        let client = OpenAiCompletionClient::new(&config(server.url()))
            .unwrap()
            .with_structured_output(StructuredOutput::Unsupported);
        assert_eq!(client.complete("hi").await.unwrap(), "text");

        structured_mock.assert_async().await;
        plain_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_content_defaults_to_empty_object() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body(serde_json::Value::Null))
            .create_async()
            .await;

        let client = OpenAiCompletionClient::new(&config(server.url())).unwrap();
        assert_eq!(client.complete("hi").await.unwrap(), "{}");
    }
}
