use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};

use super::{ByteStream, Upstream, UpstreamRequest};
use crate::api::ApiContent;
use crate::core::attachments::size_label;
use crate::core::error::RelayError;

const CANNED_REPLIES: &[&str] = &[
    "Hello! I'm your AI assistant. How can I help you today?",
    "That's an interesting question. Let me think about that...",
    "I understand. Could you tell me more about what you're looking for?",
    "Based on what you've told me, here's what I suggest...",
    "Is there anything else you'd like to know?",
];

/// Offline provider that answers with canned text, one word per chunk, in the
/// provider's own event-stream format.
#[derive(Debug, Clone)]
pub struct MockUpstream {
    word_delay: Duration,
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self {
            word_delay: Duration::from_millis(100),
        }
    }
}

impl MockUpstream {
    pub fn with_word_delay(word_delay: Duration) -> Self {
        Self { word_delay }
    }

    fn reply_for(request: &UpstreamRequest) -> String {
        if !request.attachments.is_empty() {
            let files = request
                .attachments
                .iter()
                .map(|file| format!("{} ({})", file.name, size_label(file.size_bytes)))
                .collect::<Vec<_>>()
                .join(", ");
            return format!(
                "I received your files: {files}. A real provider would analyze them; \
                 this mock reply only confirms that the upload worked."
            );
        }

        // Deterministic pick so identical requests get identical replies.
        let seed = request
            .body
            .messages
            .last()
            .map(|msg| match &msg.content {
                ApiContent::Text(text) => text.len(),
                ApiContent::Parts(parts) => parts.len(),
            })
            .unwrap_or(0);
        CANNED_REPLIES[seed % CANNED_REPLIES.len()].to_string()
    }
}

fn chunk_frame(content: &str) -> Bytes {
    let payload = serde_json::json!({ "choices": [{ "delta": { "content": content } }] });
    Bytes::from(format!("data: {payload}\n\n"))
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn complete(&self, request: &UpstreamRequest) -> Result<String, RelayError> {
        Ok(Self::reply_for(request))
    }

    async fn stream(&self, request: &UpstreamRequest) -> Result<ByteStream, RelayError> {
        let reply = Self::reply_for(request);
        let words: Vec<String> = reply.split(' ').map(str::to_string).collect();
        let last = words.len().saturating_sub(1);
        let mut frames: Vec<Bytes> = words
            .iter()
            .enumerate()
            .map(|(index, word)| {
                if index < last {
                    chunk_frame(&format!("{word} "))
                } else {
                    chunk_frame(word)
                }
            })
            .collect();
        frames.push(Bytes::from_static(b"data: [DONE]\n\n"));

        let delay = self.word_delay;
        let body = stream::iter(frames.into_iter().enumerate()).then(move |(index, frame)| {
            async move {
                if index > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, RelayError>(frame)
            }
        });
        Ok(body.boxed())
    }
}
