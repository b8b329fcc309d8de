//! Deployment event-stream reader.
//!
//! Deployment submissions carry a correlation (topic) token; the platform
//! reports progress on a server-sent-event subscription keyed by that
//! token. This module scans the raw byte stream for `event: message`
//! frames and classifies their payloads until a terminal event arrives.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::io;
use tracing::trace;

use crate::error::{DeploymentError, Result};

use super::types::{DeploymentEvent, DeploymentEventData};

/// Event classifier for terminal deployment success.
const EVENT_DEPLOYED: i64 = 2;

/// Event classifier for terminal deployment failure.
const EVENT_FAILED: i64 = 3;

/// Reads the subscription stream until a terminal event for `topic`.
///
/// Returns the success payload on a deployed event, fails with
/// [`DeploymentError::Failed`] on a failure event, and fails with
/// [`DeploymentError::Stream`] if the stream ends or errors first.
/// Non-terminal events are logged and skipped.
pub(crate) async fn read_terminal_event<S>(
    mut chunks: S,
    topic: &str,
) -> Result<DeploymentEventData>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    let mut scanner = SseScanner::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| DeploymentError::Stream {
            message: e.to_string(),
        })?;

        scanner.push(&chunk);

        while let Some(payload) = scanner.next_payload() {
            trace!(topic, "deployment event: {payload}");

            // Payloads that do not decode as deployment events are
            // keep-alive noise on the same stream.
            let Ok(event) = serde_json::from_str::<DeploymentEvent>(&payload) else {
                continue;
            };

            match event.kind {
                EVENT_DEPLOYED => return Ok(event.data),
                EVENT_FAILED => {
                    return Err(DeploymentError::Failed {
                        topic: topic.to_string(),
                    }
                    .into());
                }
                _ => {}
            }
        }
    }

    Err(DeploymentError::Stream {
        message: String::from("stream closed before a terminal event"),
    }
    .into())
}

/// Incremental scanner for `event: message` / `data: {...}` frame pairs.
///
/// Chunks may split lines at arbitrary byte positions, so the scanner
/// buffers until a full line is available.
struct SseScanner {
    buf: String,
    in_message: bool,
}

impl SseScanner {
    const fn new() -> Self {
        Self {
            buf: String::new(),
            in_message: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
    }

    /// Pops the next data payload belonging to a message event, if a
    /// complete one is buffered.
    fn next_payload(&mut self) -> Option<String> {
        while let Some(pos) = self.buf.find('\n') {
            let raw: String = self.buf.drain(..=pos).collect();
            let line = raw.trim_end_matches(['\r', '\n']);

            if line.starts_with("event: message") {
                self.in_message = true;
                continue;
            }

            if self.in_message {
                if let Some(data) = line.strip_prefix("data: ") {
                    self.in_message = false;
                    return Some(data.to_string());
                }
            }

            // Blank lines terminate an event block; data lines outside a
            // message event are other event kinds and are skipped.
            if line.is_empty() {
                self.in_message = false;
            }
        }

        None
    }
}
