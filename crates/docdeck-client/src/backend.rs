//! HTTP client for the chat backend.
//!
//! Implements [`ChatTransport`], [`CanvasStore`], and [`SessionDirectory`]
//! against the backend's REST and streaming endpoints.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use docdeck_core::config::Config;
use docdeck_core::error::{DocdeckError, Result};
use docdeck_core::types::{CanvasWrite, ChatRequest, ChatSession, PersistedCanvas};

use crate::{ByteStream, CanvasStore, ChatTransport, SessionDirectory};

pub struct BackendClient {
    pub base_url: String,
    access_token: Option<String>,
    /// Used for bounded JSON calls.
    client: reqwest::Client,
    /// No overall timeout; a reply may stream for minutes.
    stream_client: reqwest::Client,
}

fn transport_error(e: reqwest::Error) -> DocdeckError {
    DocdeckError::Transport(e.to_string())
}

impl BackendClient {
    pub fn new(base_url: &str, access_token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            client: reqwest::Client::new(),
            stream_client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs()))
            .build()
            .map_err(transport_error)?;
        Ok(Self {
            base_url: config.base_url(),
            access_token: config.access_token(),
            client,
            stream_client: reqwest::Client::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DocdeckError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T> {
        let response = self.send(builder).await?;
        response.json::<T>().await.map_err(transport_error)
    }
}

#[async_trait]
impl ChatTransport for BackendClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        debug!(
            model = %request.model_id,
            session_id = ?request.session_id,
            files = request.attached_file_ids.len(),
            "Opening chat stream"
        );
        let response = self
            .send(self.stream_client.post(self.url("/api/chat/stream")).json(request))
            .await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(transport_error));
        Ok(Box::pin(body))
    }
}

#[async_trait]
impl CanvasStore for BackendClient {
    async fn create(&self, canvas: &CanvasWrite) -> Result<PersistedCanvas> {
        trace!(session_id = %canvas.session_id, "POST canvas");
        self.fetch_json(self.client.post(self.url("/api/canvases")).json(canvas))
            .await
    }

    async fn update(&self, id: &str, canvas: &CanvasWrite) -> Result<PersistedCanvas> {
        trace!(canvas_id = %id, "PUT canvas");
        self.fetch_json(
            self.client
                .put(self.url(&format!("/api/canvases/{id}")))
                .json(canvas),
        )
        .await
    }

    async fn list(&self) -> Result<Vec<PersistedCanvas>> {
        self.fetch_json(self.client.get(self.url("/api/canvases")))
            .await
    }

    async fn list_for_session(&self, session_id: &str) -> Result<Vec<PersistedCanvas>> {
        self.fetch_json(
            self.client
                .get(self.url(&format!("/api/chat/sessions/{session_id}/canvases"))),
        )
        .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.send(self.client.delete(self.url(&format!("/api/canvases/{id}"))))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionDirectory for BackendClient {
    async fn list_sessions(&self) -> Result<Vec<ChatSession>> {
        self.fetch_json(self.client.get(self.url("/api/chat/sessions")))
            .await
    }
}
