//! OpenRouter chat-completions client for vision requests.

use crate::config::RemoteConfig;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Why a completion request produced no usable text.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("API error ({status}): {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("response contained no text")]
    Empty,
}

/// OpenRouter client for chat completions.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl OpenRouterClient {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a chat completion request and return the first choice's text.
    pub async fn chat(
        &self,
        api_key: &str,
        messages: Vec<Message>,
    ) -> Result<String, CompletionError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!("Sending request to OpenRouter: model={}", request.model);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .header("HTTP-Referer", "https://github.com/llm-ocr/llm-ocr")
            .header("X-Title", "LLM OCR")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status, body });
        }

        let raw = response.text().await.map_err(|e| self.request_error(e))?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&raw)
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            info!(
                "OpenRouter response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::Empty)?;
        let content = choice
            .message
            .content
            .ok_or_else(|| CompletionError::Malformed("first choice has no content".into()))?;

        if content.trim().is_empty() {
            return Err(CompletionError::Empty);
        }
        Ok(content)
    }

    fn request_error(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Timeout(self.timeout)
        } else {
            CompletionError::Transport(e)
        }
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl Message {
    /// A user turn carrying an instruction and one image (as a data URL).
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn client_for(server: &MockServer, timeout: Duration) -> OpenRouterClient {
        let config = RemoteConfig {
            api_url: format!("{}/api/v1/chat/completions", server.uri()),
            timeout,
            ..RemoteConfig::default()
        };
        OpenRouterClient::new(&config).unwrap()
    }

    fn message() -> Vec<Message> {
        vec![Message::user_with_image(
            "Transcribe this",
            "data:image/png;base64,AAAA",
        )]
    }

    #[test]
    fn test_message_serialization() {
        let value = serde_json::to_value(&message()[0]).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "Transcribe this"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_chat_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "qwen/qwen-2-vl-72b-instruct",
                "max_tokens": 2000,
                "temperature": 0.1
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "# Title\n\nBody"}}],
                "usage": {"prompt_tokens": 900, "completion_tokens": 12, "total_tokens": 912}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let text = client.chat("sk-test", message()).await.unwrap();
        assert_eq!(text, "# Title\n\nBody");
    }

    #[tokio::test]
    async fn test_chat_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": [{"message": {"content": "late"}}]}))
                    .set_delay(Duration::from_millis(800)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_millis(100));
        let err = client.chat("sk-test", message()).await.unwrap_err();
        assert!(matches!(err, CompletionError::Timeout(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_chat_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        match client.chat("sk-bad", message()).await {
            Err(CompletionError::Status { status, body }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "invalid key");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chat_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let err = client.chat("sk-test", message()).await.unwrap_err();
        assert!(matches!(err, CompletionError::Malformed(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_chat_no_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let err = client.chat("sk-test", message()).await.unwrap_err();
        assert!(matches!(err, CompletionError::Empty), "{err:?}");
    }

    #[tokio::test]
    async fn test_chat_connection_refused() {
        let config = RemoteConfig {
            api_url: "http://127.0.0.1:9/api/v1/chat/completions".to_string(),
            timeout: Duration::from_secs(5),
            ..RemoteConfig::default()
        };
        let client = OpenRouterClient::new(&config).unwrap();
        let err = client.chat("sk-test", message()).await.unwrap_err();
        assert!(matches!(err, CompletionError::Transport(_)), "{err:?}");
    }
}
