use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocdeckError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Canvas error: {0}")]
    Canvas(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A response is already streaming")]
    Busy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DocdeckError>;
