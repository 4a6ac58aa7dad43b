//! SSE line decoder for chat responses.
//!
//! The backend frames every record as a single `data: <json>\n` line. Chunk
//! boundaries are arbitrary, so bytes are buffered until a newline arrives and
//! only complete lines are decoded. `\n` never occurs inside a multi-byte UTF-8
//! sequence, which makes line-at-a-time decoding safe for split characters.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use docdeck_core::error::{DocdeckError, Result};

/// Literal prefix of an actionable line.
pub const DATA_PREFIX: &str = "data: ";

/// Longest slice of a bad line echoed into the log.
const LOG_PREVIEW_CHARS: usize = 200;

/// Incremental `data: ` line decoder.
///
/// Feed it chunks with [`push`](Self::push); it returns the JSON records of
/// every line completed by that chunk, in order.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and decode every line it completes.
    ///
    /// Lines without the `data: ` prefix are ignored. Lines whose payload is
    /// not valid JSON are logged and skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<serde_json::Value> {
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            if let Some(record) = decode_line(&self.buffer[start..end]) {
                records.push(record);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);

        records
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// End of input. An unterminated trailing line is not a record and is dropped.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            debug!(
                bytes = self.buffer.len(),
                "Discarding unterminated trailing SSE data"
            );
            self.buffer.clear();
        }
    }
}

fn decode_line(line: &[u8]) -> Option<serde_json::Value> {
    let payload = line.strip_prefix(DATA_PREFIX.as_bytes())?;
    let text = String::from_utf8_lossy(payload);
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            let preview: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
            warn!(error = %e, line = %preview, "Failed to parse SSE data");
            None
        }
    }
}

/// Decode a byte stream into JSON records.
///
/// A transport error is yielded once as [`DocdeckError::Stream`] and ends the
/// stream; records already decoded before it are delivered first.
pub fn decode_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<serde_json::Value>>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    futures::stream::unfold(
        DecodeState {
            byte_stream: Box::pin(byte_stream),
            decoder: SseLineDecoder::new(),
            ready: VecDeque::new(),
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(record) = state.ready.pop_front() {
                    return Some((Ok(record), state));
                }
                if state.finished {
                    return None;
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        let records = state.decoder.push(&chunk);
                        state.ready.extend(records);
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((
                            Err(DocdeckError::Stream(format!("SSE stream error: {e}"))),
                            state,
                        ));
                    }
                    None => {
                        state.decoder.finish();
                        state.finished = true;
                    }
                }
            }
        },
    )
}

struct DecodeState<S> {
    byte_stream: Pin<Box<S>>,
    decoder: SseLineDecoder,
    ready: VecDeque<serde_json::Value>,
    finished: bool,
}
