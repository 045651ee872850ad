use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ByteStream;
use crate::api::RelayRecord;
use crate::core::sse::{SseParser, StreamEvent};

/// Sent downstream when the upstream read fails; the cause stays in the logs.
pub const STREAM_FAILED_MESSAGE: &str = "Stream processing failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The provider finished and the terminal record was delivered.
    Completed,
    /// The provider or the transport failed; an error record was delivered.
    Failed,
    /// The client went away; the upstream read was abandoned.
    Cancelled,
}

/// Relay parsed upstream events to the client, in arrival order.
///
/// Returns as soon as a terminal record has been handed over, the token is
/// cancelled, or the receiving side is gone. Returning drops `upstream`,
/// which stops any further reads from the provider.
pub async fn pump_stream(
    mut upstream: ByteStream,
    tx: mpsc::Sender<RelayRecord>,
    cancel: CancellationToken,
) -> PumpOutcome {
    let mut parser = SseParser::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PumpOutcome::Cancelled,
            next = upstream.next() => next,
        };

        let events = match next {
            Some(Ok(chunk)) => parser.feed(&chunk),
            Some(Err(err)) => {
                warn!(error = %err, "upstream stream failed");
                parser.fail(STREAM_FAILED_MESSAGE).into_iter().collect()
            }
            None => parser.finish(),
        };

        for event in events {
            let (record, outcome) = match event {
                StreamEvent::Token(text) => (RelayRecord::token(text), None),
                StreamEvent::Done => (RelayRecord::done(), Some(PumpOutcome::Completed)),
                StreamEvent::Error(message) => {
                    (RelayRecord::failure(message), Some(PumpOutcome::Failed))
                }
            };

            let delivered = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                sent = tx.send(record) => sent.is_ok(),
            };
            if !delivered {
                debug!("downstream closed while relaying");
                return PumpOutcome::Cancelled;
            }
            if let Some(outcome) = outcome {
                return outcome;
            }
        }
    }
}
