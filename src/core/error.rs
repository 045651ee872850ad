use std::error::Error as StdError;
use std::fmt;

use crate::api::{ErrorBody, ErrorDetail};

pub const CODE_INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const CODE_FILE_TOO_LARGE: &str = "FILE_TOO_LARGE";
pub const CODE_API_ERROR: &str = "API_ERROR";
pub const CODE_CHAT_ERROR: &str = "CHAT_ERROR";

/// Request-level failures. Each one ends the request and is reported once;
/// nothing here is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The client sent a request the relay cannot interpret.
    Validation(String),
    /// An uploaded part exceeded the per-file limit.
    AttachmentTooLarge { name: String, size_bytes: usize },
    /// The provider answered with a non-success status.
    Upstream { status: u16, message: String },
    /// The provider answered successfully but the body made no sense.
    MalformedUpstream(String),
    /// The provider could not be reached, or the connection dropped.
    Transport(String),
}

impl RelayError {
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::Validation(_) => 400,
            RelayError::AttachmentTooLarge { .. } => 413,
            RelayError::Upstream { status, .. } => *status,
            RelayError::MalformedUpstream(_) | RelayError::Transport(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => CODE_INVALID_REQUEST,
            RelayError::AttachmentTooLarge { .. } => CODE_FILE_TOO_LARGE,
            RelayError::Upstream { .. } | RelayError::MalformedUpstream(_) => CODE_API_ERROR,
            RelayError::Transport(_) => CODE_CHAT_ERROR,
        }
    }

    /// Message shown to widget users. Transport details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            RelayError::Transport(_) => "Failed to process chat request".to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                message: self.public_message(),
                code: self.code().to_string(),
            },
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Validation(message) => write!(f, "{message}"),
            RelayError::AttachmentTooLarge { name, size_bytes } => write!(
                f,
                "Attachment {name} is {size_bytes} bytes; the limit is {} bytes",
                crate::core::attachments::MAX_ATTACHMENT_BYTES
            ),
            RelayError::Upstream { message, .. } => write!(f, "{message}"),
            RelayError::MalformedUpstream(message) => {
                write!(f, "Malformed response from provider: {message}")
            }
            RelayError::Transport(message) => write!(f, "Transport failure: {message}"),
        }
    }
}

impl StdError for RelayError {}

/// Pull a human-readable summary out of a provider error body.
pub fn upstream_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body.trim())
        .ok()
        .and_then(|value| extract_error_summary(&value))
        .filter(|summary| !summary.is_empty())
        .unwrap_or_else(|| "API request failed".to_string())
}

pub(crate) fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_400() {
        let err = RelayError::Validation("Messages array is required".into());
        assert_eq!(err.status_code(), 400);
        let body = err.to_body();
        assert_eq!(body.error.code, "INVALID_REQUEST");
        assert_eq!(body.error.message, "Messages array is required");
    }

    #[test]
    fn upstream_errors_keep_provider_status() {
        let err = RelayError::Upstream {
            status: 429,
            message: "Rate limit reached".into(),
        };
        assert_eq!(err.status_code(), 429);
        assert_eq!(err.code(), "API_ERROR");
    }

    #[test]
    fn transport_details_are_not_exposed() {
        let err = RelayError::Transport("dns error: no such host".into());
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_body().error.message, "Failed to process chat request");
        assert_eq!(err.to_body().error.code, "CHAT_ERROR");
    }

    #[test]
    fn upstream_error_message_reads_nested_and_flat_shapes() {
        assert_eq!(
            upstream_error_message(r#"{"error":{"message":"model   overloaded","type":"x"}}"#),
            "model overloaded"
        );
        assert_eq!(upstream_error_message(r#"{"error":"bad key"}"#), "bad key");
        assert_eq!(upstream_error_message(r#"{"message":"nope"}"#), "nope");
        assert_eq!(upstream_error_message("<html>502</html>"), "API request failed");
        assert_eq!(upstream_error_message(""), "API request failed");
    }
}
