//! Typed interpretation of decoded SSE records.
//!
//! A record is not a tagged union: any subset of the known fields may appear
//! on one line, so each record expands into zero or more [`StreamEvent`]s.

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::warn;

use docdeck_core::error::Result;

use crate::sse::decode_stream;

/// Language assumed for a direct canvas payload without `canvas_language`.
pub const DIRECT_CANVAS_LANGUAGE: &str = "html";

/// One semantic event from the chat stream, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental assistant text. May be empty.
    ContentDelta(String),
    /// Transient progress indicator ("Searching...", "Thinking...").
    Status(String),
    /// The backend assigned or confirmed the conversation's session id.
    SessionAssigned(String),
    /// The backend named the conversation.
    TitleAssigned(String),
    /// A complete canvas delivered out of band, bypassing the embedded markers.
    CanvasPayload {
        content: String,
        language: String,
        title: Option<String>,
    },
    /// Backend-reported failure for this message.
    Error(String),
    /// The backend finished the message.
    Done,
}

/// Raw field set of one `data:` record.
#[derive(Debug, Default, Deserialize)]
pub struct StreamEnvelope {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub canvas_content: Option<String>,
    #[serde(default)]
    pub canvas_language: Option<String>,
    #[serde(default)]
    pub canvas_title: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

impl StreamEnvelope {
    /// Expand into events.
    ///
    /// Order: status, content, session, title, error, canvas, done. Empty
    /// strings count as absent for every field except `content`.
    pub fn into_events(self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(status) = non_empty(self.status) {
            events.push(StreamEvent::Status(status));
        }
        if let Some(content) = self.content {
            events.push(StreamEvent::ContentDelta(content));
        }
        if let Some(id) = non_empty(self.session_id) {
            events.push(StreamEvent::SessionAssigned(id));
        }
        if let Some(title) = non_empty(self.title) {
            events.push(StreamEvent::TitleAssigned(title));
        }
        if let Some(message) = non_empty(self.error) {
            events.push(StreamEvent::Error(message));
        }
        if let Some(content) = non_empty(self.canvas_content) {
            events.push(StreamEvent::CanvasPayload {
                content,
                language: non_empty(self.canvas_language)
                    .unwrap_or_else(|| DIRECT_CANVAS_LANGUAGE.to_string()),
                title: non_empty(self.canvas_title),
            });
        }
        if self.done == Some(true) {
            events.push(StreamEvent::Done);
        }

        events
    }
}

/// Interpret one decoded record. Records of the wrong shape yield nothing.
pub fn events_from_record(record: serde_json::Value) -> Vec<StreamEvent> {
    match serde_json::from_value::<StreamEnvelope>(record) {
        Ok(envelope) => envelope.into_events(),
        Err(e) => {
            warn!(error = %e, "Ignoring SSE record with unexpected shape");
            Vec::new()
        }
    }
}

/// Decode a byte stream all the way to [`StreamEvent`]s.
pub fn event_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<StreamEvent>>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>>,
    E: std::fmt::Display,
{
    decode_stream(byte_stream)
        .map(|record| match record {
            Ok(value) => {
                let events: Vec<Result<StreamEvent>> =
                    events_from_record(value).into_iter().map(Ok).collect();
                events
            }
            Err(e) => vec![Err(e)],
        })
        .flat_map(futures::stream::iter)
}
