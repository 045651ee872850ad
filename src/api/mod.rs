//! Wire payloads exchanged with the upstream provider and with widget clients.

use serde::{Deserialize, Serialize};

use crate::core::message::ImageDetail;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ApiMessage {
    pub role: String,
    pub content: ApiContent,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ApiImageUrl {
    pub url: String,
    pub detail: ImageDetail,
}

/// Body of a chat-completions request.
#[derive(Serialize, Clone, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub stream: bool,
}

#[derive(Deserialize, Default, Debug)]
pub struct ChatResponseDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ChatResponseChoice {
    #[serde(default)]
    pub delta: ChatResponseDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One streamed chunk. Providers report mid-stream failures in `error`.
#[derive(Deserialize, Debug)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatResponseChoice>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Deserialize, Debug)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

/// A record written to widget clients, either as one `data:` line of the
/// event stream or as the whole body of a non-streaming reply.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelayRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub done: bool,
}

impl RelayRecord {
    pub fn token(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            error: None,
            done: false,
        }
    }

    pub fn done() -> Self {
        Self::complete(String::new())
    }

    /// Terminal record carrying the full reply.
    pub fn complete(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            error: None,
            done: true,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            content: None,
            error: Some(message.into()),
            done: true,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.done || self.error.is_some()
    }

    pub fn to_sse_frame(&self) -> String {
        // Only strings and booleans, so encoding cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("data: {json}\n\n")
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    pub message: String,
    pub code: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}
