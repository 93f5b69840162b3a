//! Text completion service
//!
//! [`CompletionService`] is the seam the reply composer calls; [`AnthropicClient`]
//! implements it against the Anthropic Messages API with one request per call,
//! no streaming and no retry.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Single request/response text completion
pub trait CompletionService {
    /// Complete `prompt`, returning the response text
    fn complete(&self, prompt: &str) -> impl Future<Output = AppResult<String>> + Send;
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [RequestMessage<'a>; 1],
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API client
#[derive(Clone)]
pub struct AnthropicClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Build a client from server config and a validated key
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the HTTP client cannot be constructed.
    pub fn new(config: &ServerConfig, api_key: SecretString) -> AppResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.socket_timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key,
            base_url: config.completion_base_url.clone(),
            model: config.completion_model.clone(),
            max_tokens: config.completion_max_tokens,
        })
    }
}

impl CompletionService for AnthropicClient {
    async fn complete(&self, prompt: &str) -> AppResult<String> {
        let url = format!("{}/messages", self.base_url);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [RequestMessage {
                role: "user",
                content: prompt,
            }],
        };
        debug!(model = %self.model, prompt_chars = prompt.len(), "sending completion request");

        let response = self
            .http
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(format!("completion request: {e}"))
                } else {
                    AppError::Completion(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "completion service returned an error status");
            return Err(AppError::Completion(format!(
                "status {status}: {}",
                api_error_message(&body)
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AppError::Completion(format!("invalid response body: {e}")))?;
        first_text(body)
    }
}

/// Extract the first non-empty text block
fn first_text(response: MessagesResponse) -> AppResult<String> {
    response
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| AppError::Completion("response contained no text".to_owned()))
}

/// Pull `error.message` out of an API error body, falling back to the raw body
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::{MessagesRequest, MessagesResponse, RequestMessage, api_error_message, first_text};

    fn parse(json: &str) -> MessagesResponse {
        serde_json::from_str(json).expect("valid response json")
    }

    #[test]
    fn takes_first_text_block() {
        let response = parse(
            r#"{"content":[{"type":"tool_use","id":"x"},{"type":"text","text":"Hi Bob"},{"type":"text","text":"later"}]}"#,
        );
        assert_eq!(first_text(response).expect("text present"), "Hi Bob");
    }

    #[test]
    fn empty_content_is_a_completion_error() {
        let err = first_text(parse(r#"{"content":[]}"#)).expect_err("must fail");
        assert!(err.to_string().starts_with("completion failed"));

        let err = first_text(parse(r#"{"content":[{"type":"text","text":"  "}]}"#))
            .expect_err("must fail");
        assert!(err.to_string().contains("no text"));
    }

    #[test]
    fn request_serializes_single_user_message() {
        let request = MessagesRequest {
            model: "m",
            max_tokens: 1024,
            messages: [RequestMessage {
                role: "user",
                content: "prompt",
            }],
        };
        let value = serde_json::to_value(&request).expect("serializes");
        assert_eq!(value["max_tokens"], 1024);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "prompt");
    }

    #[test]
    fn api_error_message_prefers_structured_error() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(api_error_message(body), "Overloaded");
        assert_eq!(api_error_message(" bad gateway \n"), "bad gateway");
    }
}
