//! Chat-completion client.
//!
//! Sends one prompt to an OpenAI-compatible `/chat/completions` endpoint
//! and returns the first choice's message content. The response body is
//! streamed into a [`ByteSink`] and decoded only once it is complete.
//! There are no retries: any failure ends the transfer.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::sink::{ByteSink, SinkError};

/// Errors that can occur while talking to the completion endpoint.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("response body: {0}")]
    Sink(#[from] SinkError),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response from API")]
    UnexpectedResponse,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
        }
    }
}

/// Request body for `/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// A single-message request carrying `prompt` as the user turn.
    pub fn new(model: &str, prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt)],
        }
    }
}

/// Response body of `/chat/completions`.
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// The `error` object returned by the API on failure.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// A successful completion.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Model that answered, as reported by the API.
    pub model: Option<String>,
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// Decode a finished response body.
///
/// An `error` object or a non-success status is reported as
/// [`ClientError::Api`]; a body without a first choice carrying content is
/// [`ClientError::UnexpectedResponse`].
pub fn parse_completion(status: StatusCode, body: &[u8]) -> Result<Completion, ClientError> {
    let response: ChatResponse = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(_) if !status.is_success() => {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: String::from_utf8_lossy(body).trim().to_string(),
            });
        }
        Err(e) => return Err(ClientError::Decode(e)),
    };

    if let Some(err) = response.error {
        let message = match err.kind {
            Some(kind) => format!("{} ({})", err.message, kind),
            None => err.message,
        };
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }

    if !status.is_success() {
        return Err(ClientError::Api {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        });
    }

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(ClientError::UnexpectedResponse)?;
    let content = choice
        .message
        .and_then(|m| m.content)
        .ok_or(ClientError::UnexpectedResponse)?;

    Ok(Completion {
        model: response.model,
        content,
        finish_reason: choice.finish_reason,
        usage: response.usage,
    })
}

/// Client for a single completion endpoint.
pub struct ChatClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_response_bytes: usize,
}

impl ChatClient {
    /// Create a client from configuration and an API key.
    pub fn new(config: &Config, api_key: String) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gpt-analyzer/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            max_response_bytes: config.max_response_bytes,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `prompt` and wait for the full answer.
    pub async fn complete(&self, prompt: &str) -> Result<Completion, ClientError> {
        let request = ChatRequest::new(&self.model, prompt);
        let body = serde_json::to_vec(&request)?;
        log::debug!(
            "POST {} ({} byte body, model {})",
            self.api_url,
            body.len(),
            self.model
        );

        let mut response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let mut sink = ByteSink::with_limit(self.max_response_bytes);
        while let Some(chunk) = response.chunk().await.map_err(map_transport_error)? {
            sink.append(&chunk)?;
        }
        log::debug!("HTTP {} with {} byte body", status, sink.len());

        parse_completion(status, sink.finish())
    }
}

fn map_transport_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Network(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest::new("gpt-4o", "look at \"this\"\n");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "look at \"this\"\n"}]
            })
        );
    }

    #[test]
    fn test_parse_first_choice() {
        let body = br#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o-2024-08-06",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "No bugs."}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "ignored"}}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }"#;

        let completion = parse_completion(StatusCode::OK, body).unwrap();
        assert_eq!(completion.content, "No bugs.");
        assert_eq!(completion.model.as_deref(), Some("gpt-4o-2024-08-06"));
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.usage.unwrap().total_tokens, 13);
    }

    #[test]
    fn test_parse_empty_choices() {
        let err = parse_completion(StatusCode::OK, br#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedResponse));
    }

    #[test]
    fn test_parse_null_content() {
        let body = br#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let err = parse_completion(StatusCode::OK, body).unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedResponse));
    }

    #[test]
    fn test_parse_api_error_object() {
        let body = br#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        let err = parse_completion(StatusCode::UNAUTHORIZED, body).unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided (invalid_request_error)");
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_non_json_error_body() {
        let err = parse_completion(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>\n")
            .unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "<html>bad gateway</html>");
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_truncated_body() {
        let err = parse_completion(StatusCode::OK, br#"{"choices": [{"mess"#).unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }
}
