//! Chat backend client and streaming chat driver.
//!
//! [`ChatDriver`] owns the state of one open conversation panel. It sends a
//! message through a [`ChatTransport`], decodes the streamed reply, mirrors any
//! canvas block into the canvas panel, and saves the finished canvas through a
//! [`CanvasStore`]. State changes are published as [`DriverEvent`]s.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use docdeck_core::error::Result;
use docdeck_core::types::{CanvasWrite, ChatRequest, ChatSession, PersistedCanvas};

pub mod backend;
pub mod driver;

pub use backend::BackendClient;
pub use driver::{CanvasPanel, ChatDriver, DriverSettings, OutgoingMessage, canvas_mode_hint};

/// Raw response body of a chat stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Opens the streaming chat endpoint.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the request and return the response body once headers arrive.
    /// A non-success status is an error.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream>;
}

/// Remote canvas persistence. The store assigns ids.
#[async_trait]
pub trait CanvasStore: Send + Sync {
    async fn create(&self, canvas: &CanvasWrite) -> Result<PersistedCanvas>;

    async fn update(&self, id: &str, canvas: &CanvasWrite) -> Result<PersistedCanvas>;

    /// All canvases visible to the user, most recently updated first.
    async fn list(&self) -> Result<Vec<PersistedCanvas>>;

    async fn list_for_session(&self, session_id: &str) -> Result<Vec<PersistedCanvas>>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Remote session list.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<ChatSession>>;
}

/// How a chat turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The stream ran to its end.
    Completed,
    /// The caller cancelled the turn.
    Aborted,
    /// Transport or stream failure.
    Failed,
}

/// Summary of one chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReport {
    pub message_id: String,
    pub outcome: TurnOutcome,
    /// Displayed assistant text when the turn ended.
    pub content: String,
    /// Canvas saved after the stream completed, if any.
    pub persisted: Option<PersistedCanvas>,
    /// Failure description for [`TurnOutcome::Failed`].
    pub error: Option<String>,
}

/// Events emitted by the driver as state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverEvent {
    /// Progress indicator changed; `None` clears it.
    StatusChanged { status: Option<String> },

    /// The assistant message text changed while streaming.
    MessageUpdated { message_id: String, content: String },

    /// Cleaned final text, ready for Markdown rendering.
    MessageFinalized { message_id: String, content: String },

    /// The canvas panel opened.
    CanvasOpened,

    /// Panel content or language changed.
    CanvasUpdated { content: String, language: String },

    /// A canvas save succeeded.
    CanvasSaved { canvas: PersistedCanvas },

    /// A new conversation received its session id.
    SessionAdopted { session_id: String },

    /// The session list was reloaded.
    SessionsRefreshed { count: usize },

    /// The turn is over and streaming indicators are cleared.
    StreamEnded {
        message_id: String,
        outcome: TurnOutcome,
    },
}
