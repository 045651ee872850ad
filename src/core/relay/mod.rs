//! Relay controller: one inbound chat request drives one upstream request.
//!
//! Requests are stateless. The whole history comes in with every call and
//! nothing is retained between calls, so concurrent requests share only the
//! immutable [`Relay`] value.

mod mock;
mod openai;
mod pump;

#[cfg(test)]
mod tests;

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info};

pub use mock::MockUpstream;
pub use openai::OpenAiUpstream;
pub use pump::{pump_stream, PumpOutcome, STREAM_FAILED_MESSAGE};

use crate::api::{ChatRequest, RelayRecord};
use crate::core::attachments::{attach_to_history, AttachedFile, AttachmentSummary};
use crate::core::error::RelayError;
use crate::core::message::ConversationHistory;

/// Raw body of a streaming upstream response.
pub type ByteStream = BoxStream<'static, Result<Bytes, RelayError>>;

/// Records buffered between the pump task and the client connection.
const RECORD_BUFFER: usize = 32;

/// Fixed generation parameters sent with every upstream request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            top_p: 0.9,
        }
    }
}

/// A normalized request ready for the provider, plus what was attached.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub body: ChatRequest,
    pub attachments: Vec<AttachmentSummary>,
}

/// The provider the relay forwards to.
///
/// Both methods check the response status before returning, so a non-success
/// answer never reaches the streaming path.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send a non-streaming request and return the assistant's text.
    async fn complete(&self, request: &UpstreamRequest) -> Result<String, RelayError>;

    /// Send a streaming request and return the undecoded event stream.
    async fn stream(&self, request: &UpstreamRequest) -> Result<ByteStream, RelayError>;
}

/// One chat request from a widget.
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
    pub history: ConversationHistory,
    pub attachments: Vec<AttachedFile>,
    pub stream: bool,
}

#[derive(Clone)]
pub struct Relay {
    upstream: Arc<dyn Upstream>,
    generation: GenerationParams,
}

impl Relay {
    pub fn new(upstream: Arc<dyn Upstream>, generation: GenerationParams) -> Self {
        Self {
            upstream,
            generation,
        }
    }

    pub fn generation(&self) -> &GenerationParams {
        &self.generation
    }

    /// Fold attachments into the history and build the provider request.
    /// The attachment payloads are consumed here.
    pub fn prepare(&self, turn: ChatTurn) -> UpstreamRequest {
        let ChatTurn {
            mut history,
            attachments,
            stream,
        } = turn;

        let summaries = attachments.iter().map(AttachedFile::summary).collect();
        attach_to_history(&mut history, attachments);

        UpstreamRequest {
            body: ChatRequest {
                model: self.generation.model.clone(),
                messages: history.to_api(),
                temperature: self.generation.temperature,
                max_tokens: self.generation.max_tokens,
                top_p: self.generation.top_p,
                stream,
            },
            attachments: summaries,
        }
    }

    /// Non-streaming path: the whole reply as one terminal record.
    pub async fn complete(&self, turn: ChatTurn) -> Result<RelayRecord, RelayError> {
        let request = self.prepare(ChatTurn {
            stream: false,
            ..turn
        });
        let content = self.upstream.complete(&request).await?;
        Ok(RelayRecord::complete(content))
    }

    /// Streaming path. Upstream status failures surface here as errors,
    /// before any record has been produced.
    pub async fn open_stream(&self, turn: ChatTurn) -> Result<RelayStream, RelayError> {
        let request = self.prepare(ChatTurn {
            stream: true,
            ..turn
        });
        let upstream = self.upstream.stream(&request).await?;

        let (tx, rx) = mpsc::channel(RECORD_BUFFER);
        let cancel = CancellationToken::new();
        let pump_cancel = cancel.clone();
        tokio::spawn(async move {
            match pump_stream(upstream, tx, pump_cancel).await {
                PumpOutcome::Cancelled => info!("client disconnected; upstream read cancelled"),
                outcome => debug!(?outcome, "relay stream finished"),
            }
        });

        Ok(RelayStream {
            records: rx,
            _cancel_on_drop: cancel.drop_guard(),
        })
    }
}

/// Downstream side of an open relay stream.
///
/// Dropping it (for instance when the HTTP connection to the widget goes
/// away) cancels the upstream read.
pub struct RelayStream {
    records: mpsc::Receiver<RelayRecord>,
    _cancel_on_drop: DropGuard,
}

impl RelayStream {
    pub async fn next_record(&mut self) -> Option<RelayRecord> {
        self.records.recv().await
    }

    /// Encode records as `data:` frames for an HTTP response body.
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        stream::unfold(self, |mut relay| async move {
            let record = relay.records.recv().await?;
            let frame = Bytes::from(record.to_sse_frame());
            Some((Ok(frame), relay))
        })
    }
}
