//! Incremental decoding of `data:` event streams.
//!
//! Bytes arrive in arbitrary chunks. [`LineBuffer`] keeps the unfinished tail
//! of the last chunk, so a record or a multi-byte character split across two
//! reads is decoded only once it is complete. [`SseParser`] turns provider
//! lines into [`StreamEvent`]s and [`RecordDecoder`] turns relay lines back
//! into [`RelayRecord`]s on the client side.

use memchr::memchr;
use tracing::{debug, warn};

use crate::api::{ChatResponse, RelayRecord};
use crate::core::error::extract_error_summary;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete line without its terminator. Lines that are not valid
    /// UTF-8 are logged and skipped.
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(line) = decode_line(&raw[..newline_pos]) {
                return Some(line);
            }
        }
        None
    }

    /// Whatever is left once the input has ended, if it is non-empty.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        decode_line(&raw)
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    match std::str::from_utf8(raw) {
        Ok(line) => Some(line.to_string()),
        Err(e) => {
            warn!("Invalid UTF-8 in stream: {e}");
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    Done,
    Error(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParserState {
    Reading,
    Done,
    Errored,
}

/// Parser for a provider's chat-completions event stream.
///
/// `Done` and `Error` are terminal: once either has been emitted the parser
/// ignores all further input.
#[derive(Debug)]
pub struct SseParser {
    lines: LineBuffer,
    state: ParserState,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            lines: LineBuffer::new(),
            state: ParserState::Reading,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.state != ParserState::Reading {
            return events;
        }

        self.lines.push(chunk);
        while self.state == ParserState::Reading {
            let Some(line) = self.lines.next_line() else {
                break;
            };
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// The upstream body ended. A trailing line without a newline is still
    /// processed; an end without `[DONE]` counts as completion.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.state != ParserState::Reading {
            return events;
        }

        if let Some(line) = self.lines.take_remainder() {
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        if self.state == ParserState::Reading {
            self.state = ParserState::Done;
            events.push(StreamEvent::Done);
        }
        events
    }

    /// The transport failed. Yields an error event unless the stream has
    /// already terminated.
    pub fn fail(&mut self, message: impl Into<String>) -> Option<StreamEvent> {
        if self.state != ParserState::Reading {
            return None;
        }
        self.state = ParserState::Errored;
        Some(StreamEvent::Error(message.into()))
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        let payload = line.strip_prefix(DATA_PREFIX)?;

        if payload == DONE_SENTINEL {
            self.state = ParserState::Done;
            return Some(StreamEvent::Done);
        }

        let response = match serde_json::from_str::<ChatResponse>(payload) {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "skipping malformed stream line");
                return None;
            }
        };

        if let Some(error) = response.error {
            let message = extract_error_summary(&serde_json::json!({ "error": error }))
                .filter(|summary| !summary.is_empty())
                .unwrap_or_else(|| "Provider reported an error".to_string());
            self.state = ParserState::Errored;
            return Some(StreamEvent::Error(message));
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(StreamEvent::Token)
    }
}

/// Client-side decoder for the relay's own `data:` records.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    lines: LineBuffer,
    finished: bool,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode complete records; nothing is returned after a terminal one.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RelayRecord> {
        let mut records = Vec::new();
        if self.finished {
            return records;
        }

        self.lines.push(chunk);
        while !self.finished {
            let Some(line) = self.lines.next_line() else {
                break;
            };
            if let Some(record) = self.decode(&line) {
                self.finished = record.is_terminal();
                records.push(record);
            }
        }
        records
    }

    fn decode(&self, line: &str) -> Option<RelayRecord> {
        let payload = line.strip_prefix(DATA_PREFIX)?;
        match serde_json::from_str::<RelayRecord>(payload) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "skipping malformed relay record");
                None
            }
        }
    }
}
