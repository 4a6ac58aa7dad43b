use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default title for a canvas that carries none.
pub const UNTITLED: &str = "Untitled";

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A message in the open conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    pub fn assistant(id: String, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    fn new(role: Role, content: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }
}

/// Body of `POST /api/chat/stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub model_id: String,
    #[serde(default)]
    pub use_nas: bool,
    pub session_id: Option<String>,
    #[serde(default)]
    pub attached_file_ids: Vec<String>,
    #[serde(default)]
    pub canvas_mode: bool,
}

/// Session entry as listed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Backend timestamps are not guaranteed to carry an offset, so they stay opaque.
    #[serde(default)]
    pub updated_at: String,
}

/// A canvas as stored by the backend. The backend owns `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedCanvas {
    pub id: String,
    pub session_id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_title() -> String {
    UNTITLED.into()
}

/// Body for canvas create (`POST`) and update (`PUT`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasWrite {
    pub session_id: String,
    pub content: String,
    pub language: String,
    pub title: String,
}
