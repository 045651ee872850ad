//! Client side of a relay stream: decode records, grow the rendered reply,
//! and freeze it into the conversation once the stream is over.

use std::error::Error as StdError;
use std::fmt;

use tracing::debug;

use crate::api::RelayRecord;
use crate::core::message::{ChatMessage, ConversationHistory};
use crate::core::sse::RecordDecoder;
use crate::ui::markdown::RenderedMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyStatus {
    Streaming,
    Completed,
    Failed(String),
}

/// The relay reported an error record for this reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFailed(pub String);

impl fmt::Display for ReplyFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for ReplyFailed {}

#[derive(Debug)]
pub struct ReplyStream {
    decoder: RecordDecoder,
    message: Option<RenderedMessage>,
    status: ReplyStatus,
}

impl Default for ReplyStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyStream {
    pub fn new() -> Self {
        Self {
            decoder: RecordDecoder::new(),
            message: None,
            status: ReplyStatus::Streaming,
        }
    }

    pub fn status(&self) -> &ReplyStatus {
        &self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status != ReplyStatus::Streaming
    }

    /// The reply rendered so far; `None` until the first token arrives.
    pub fn message(&self) -> Option<&RenderedMessage> {
        self.message.as_ref()
    }

    /// Feed raw response bytes and return the text fragments that were
    /// appended, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decoder
            .feed(chunk)
            .into_iter()
            .filter_map(|record| self.apply(record))
            .collect()
    }

    /// Apply one decoded record. Records after a terminal one are ignored.
    pub fn apply(&mut self, record: RelayRecord) -> Option<String> {
        if self.is_finished() {
            debug!("ignoring record after terminal record");
            return None;
        }

        if let Some(error) = record.error {
            self.status = ReplyStatus::Failed(error);
            return None;
        }

        let appended = record.content.filter(|content| !content.is_empty());
        if let Some(content) = &appended {
            self.message
                .get_or_insert_with(RenderedMessage::new)
                .push_str(content);
        }
        if record.done {
            self.status = ReplyStatus::Completed;
        }
        appended
    }

    /// Freeze whatever arrived into `history` as an assistant message.
    ///
    /// A stream that ends without a terminal record counts as complete. On
    /// failure the partial reply is still kept in the history.
    pub fn finish(self, history: &mut ConversationHistory) -> Result<RenderedMessage, ReplyFailed> {
        let message = self.message.unwrap_or_default();
        if !message.is_empty() {
            history.push(ChatMessage::assistant(message.source()));
        }

        match self.status {
            ReplyStatus::Failed(error) => Err(ReplyFailed(error)),
            ReplyStatus::Streaming | ReplyStatus::Completed => Ok(message),
        }
    }
}
