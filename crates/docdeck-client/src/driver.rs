//! Chat driver: runs one streamed chat turn at a time and applies it to
//! conversation and canvas-panel state.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use docdeck_core::error::{DocdeckError, Result};
use docdeck_core::types::{
    CanvasWrite, ChatMessage, ChatRequest, ChatSession, PersistedCanvas, UNTITLED,
};
use docdeck_stream::canvas::DEFAULT_LANGUAGE;
use docdeck_stream::{CanvasBlockExtractor, CanvasCard, StreamEvent, clean_final_text, event_stream};

use crate::{
    CanvasStore, ChatTransport, DriverEvent, SessionDirectory, TurnOutcome, TurnReport,
};

pub const STATUS_PREPARING: &str = "Preparing...";
pub const STATUS_ANALYZING_ATTACHMENTS: &str = "Analyzing attachments...";
pub const NETWORK_ERROR_MESSAGE: &str =
    "An error occurred. Please make sure the backend server is running.";

/// Whether the input asks for a canvas. Sent to the backend as `canvas_mode`.
pub fn canvas_mode_hint(text: &str) -> bool {
    text.to_lowercase().contains("canvas") || text.contains("キャンバス")
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub model_id: String,
    pub use_nas: bool,
}

/// What the user submits.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub text: String,
    /// Ids of files already uploaded and indexed by the backend.
    pub attached_file_ids: Vec<String>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attached_file_ids: Vec::new(),
        }
    }

    pub fn with_files(mut self, ids: Vec<String>) -> Self {
        self.attached_file_ids = ids;
        self
    }
}

/// The side panel that shows and edits a canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasPanel {
    pub open: bool,
    pub content: String,
    pub language: String,
    /// Backend canvas this panel is bound to; saves update it in place.
    pub current: Option<PersistedCanvas>,
}

impl Default for CanvasPanel {
    fn default() -> Self {
        Self {
            open: false,
            content: String::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            current: None,
        }
    }
}

#[derive(Debug, Clone)]
struct CanvasCapture {
    content: String,
    language: String,
    title: Option<String>,
}

/// Per-turn state, dropped when the turn ends.
struct Turn {
    message_id: String,
    cumulative: String,
    extractor: CanvasBlockExtractor,
    capture: Option<CanvasCapture>,
    session_id: Option<String>,
    /// A session was adopted during this turn; refresh once the stream ends.
    adopted_session: bool,
    title: Option<String>,
    errored: bool,
}

impl Turn {
    fn new(message_id: String, panel_open: bool) -> Self {
        Self {
            message_id,
            cumulative: String::new(),
            extractor: CanvasBlockExtractor::with_panel_open(panel_open),
            capture: None,
            session_id: None,
            adopted_session: false,
            title: None,
            errored: false,
        }
    }
}

enum TurnFailure {
    Aborted,
    Failed(DocdeckError),
}

/// Marks a turn as in flight. Dropping it clears the streaming indicators,
/// including when the `send_message` future itself is dropped mid-stream.
struct InFlight<'a> {
    driver: &'a mut ChatDriver,
}

impl<'a> InFlight<'a> {
    fn begin(driver: &'a mut ChatDriver, message_id: &str, status: &str) -> Self {
        driver.is_streaming = true;
        driver.current_ai_message_id = Some(message_id.to_string());
        driver.set_status(Some(status));
        Self { driver }
    }
}

impl Deref for InFlight<'_> {
    type Target = ChatDriver;

    fn deref(&self) -> &ChatDriver {
        self.driver
    }
}

impl DerefMut for InFlight<'_> {
    fn deref_mut(&mut self) -> &mut ChatDriver {
        self.driver
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let driver = &mut *self.driver;
        driver.is_streaming = false;
        driver.current_ai_message_id = None;
        if driver.status.is_some() {
            driver.set_status(None);
        }
    }
}

/// Owns one conversation panel: its messages, session binding, canvas panel,
/// and the in-flight turn.
pub struct ChatDriver {
    transport: Arc<dyn ChatTransport>,
    canvases: Arc<dyn CanvasStore>,
    directory: Arc<dyn SessionDirectory>,
    settings: DriverSettings,
    events: Option<mpsc::UnboundedSender<DriverEvent>>,

    messages: Vec<ChatMessage>,
    sessions: Vec<ChatSession>,
    current_session_id: Option<String>,
    panel: CanvasPanel,
    library: Vec<PersistedCanvas>,
    sidebar_open: bool,
    is_streaming: bool,
    status: Option<String>,
    current_ai_message_id: Option<String>,
}

impl ChatDriver {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        canvases: Arc<dyn CanvasStore>,
        directory: Arc<dyn SessionDirectory>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            transport,
            canvases,
            directory,
            settings,
            events: None,
            messages: Vec::new(),
            sessions: Vec::new(),
            current_session_id: None,
            panel: CanvasPanel::default(),
            library: Vec::new(),
            sidebar_open: true,
            is_streaming: false,
            status: None,
            current_ai_message_id: None,
        }
    }

    /// Publish state changes on `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<DriverEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Continue an existing conversation.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.current_session_id = Some(session_id.into());
        self
    }

    // --- accessors ---

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.current_session_id.as_deref()
    }

    pub fn panel(&self) -> &CanvasPanel {
        &self.panel
    }

    /// Canvases known locally, most recent first.
    pub fn canvases(&self) -> &[PersistedCanvas] {
        &self.library
    }

    pub fn sidebar_open(&self) -> bool {
        self.sidebar_open
    }

    pub fn set_sidebar_open(&mut self, open: bool) {
        self.sidebar_open = open;
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Id of the assistant message being streamed, if any.
    pub fn current_ai_message_id(&self) -> Option<&str> {
        self.current_ai_message_id.as_deref()
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    // --- chat turn ---

    /// Send a message and drive the streamed reply to completion.
    ///
    /// Returns `Err` only when the turn cannot start. Transport failures and
    /// cancellation end the turn normally and are reported in the
    /// [`TurnReport`]. At most one canvas save is issued, after the stream
    /// completes.
    pub async fn send_message(
        &mut self,
        outgoing: OutgoingMessage,
        cancel: CancellationToken,
    ) -> Result<TurnReport> {
        if self.is_streaming {
            return Err(DocdeckError::Busy);
        }
        if outgoing.text.trim().is_empty() && outgoing.attached_file_ids.is_empty() {
            return Err(DocdeckError::InvalidInput("message is empty".into()));
        }

        let file_count = outgoing.attached_file_ids.len();
        let display = if file_count > 0 {
            format!("{}\n\n[Attached {file_count} file(s)]", outgoing.text)
        } else {
            outgoing.text.clone()
        };
        self.messages.push(ChatMessage::user(display));

        let request = ChatRequest {
            canvas_mode: canvas_mode_hint(&outgoing.text),
            message: outgoing.text,
            model_id: self.settings.model_id.clone(),
            use_nas: self.settings.use_nas,
            session_id: self.current_session_id.clone(),
            attached_file_ids: outgoing.attached_file_ids,
        };

        let message_id = uuid::Uuid::new_v4().to_string();
        let status = if file_count > 0 {
            STATUS_ANALYZING_ATTACHMENTS
        } else {
            STATUS_PREPARING
        };
        let mut this = InFlight::begin(&mut *self, &message_id, status);
        let mut turn = Turn::new(message_id.clone(), this.panel.open);

        info!(
            message_id = %message_id,
            session_id = ?request.session_id,
            canvas_mode = request.canvas_mode,
            "Starting chat turn"
        );

        let result = this.run_turn(&request, &mut turn, &cancel).await;

        let mut persisted = None;
        let mut failure = None;
        let outcome = match result {
            Ok(()) => {
                if let Some(capture) = turn.capture.take() {
                    let session_id = turn
                        .session_id
                        .clone()
                        .or_else(|| this.current_session_id.clone());
                    persisted = this
                        .persist_canvas(&capture.content, &capture.language, session_id, capture.title)
                        .await;
                }
                TurnOutcome::Completed
            }
            Err(TurnFailure::Aborted) => {
                info!(message_id = %message_id, "Request aborted");
                TurnOutcome::Aborted
            }
            Err(TurnFailure::Failed(e)) => {
                error!(message_id = %message_id, error = %e, "Chat error");
                this.set_assistant_content(&message_id, NETWORK_ERROR_MESSAGE);
                failure = Some(e.to_string());
                TurnOutcome::Failed
            }
        };

        if turn.adopted_session && outcome != TurnOutcome::Aborted {
            this.refresh_adopted_session(&turn, &cancel).await;
        }

        drop(this);
        self.emit(DriverEvent::StreamEnded {
            message_id: message_id.clone(),
            outcome,
        });

        let content = self
            .message(&message_id)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        Ok(TurnReport {
            message_id,
            outcome,
            content,
            persisted,
            error: failure,
        })
    }

    /// Reload the session list after a new session was adopted, then re-apply
    /// a title the stream assigned to it.
    async fn refresh_adopted_session(&mut self, turn: &Turn, cancel: &CancellationToken) {
        let refreshed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Session refresh cancelled");
                return;
            }
            refreshed = self.refresh_sessions() => refreshed,
        };
        if let Err(e) = refreshed {
            warn!(error = %e, "Failed to refresh session list");
            return;
        }
        if let Some(title) = &turn.title {
            self.rename_session(turn, title.clone());
        }
    }

    async fn run_turn(
        &mut self,
        request: &ChatRequest,
        turn: &mut Turn,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), TurnFailure> {
        let transport = Arc::clone(&self.transport);
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TurnFailure::Aborted),
            opened = transport.open_stream(request) => opened.map_err(TurnFailure::Failed)?,
        };

        let mut events = std::pin::pin!(event_stream(body));
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TurnFailure::Aborted),
                next = events.next() => next,
            };

            match next {
                Some(Ok(event)) => self.apply_event(event, turn),
                Some(Err(e)) => return Err(TurnFailure::Failed(e)),
                None => return Ok(()),
            }
        }
    }

    fn apply_event(&mut self, event: StreamEvent, turn: &mut Turn) {
        match event {
            StreamEvent::Status(status) => self.set_status(Some(&status)),
            StreamEvent::ContentDelta(delta) => self.on_content(&delta, turn),
            StreamEvent::SessionAssigned(id) => self.on_session(id, turn),
            StreamEvent::TitleAssigned(title) => self.on_title(title, turn),
            StreamEvent::CanvasPayload {
                content,
                language,
                title,
            } => self.on_canvas_payload(content, language, title, turn),
            StreamEvent::Error(message) => self.on_error(&message, turn),
            StreamEvent::Done => self.on_done(turn),
        }
    }

    fn on_content(&mut self, delta: &str, turn: &mut Turn) {
        if turn.errored {
            debug!("Ignoring content after error");
            return;
        }
        turn.cumulative.push_str(delta);

        let outcome = turn.extractor.scan(&turn.cumulative);
        if outcome.open_panel {
            self.open_panel();
        }
        if let Some(block) = outcome.block {
            self.set_panel_content(&block.content, &block.language);
            turn.capture = Some(CanvasCapture {
                content: block.content,
                language: block.language,
                title: Some(block.title),
            });
        }

        let message_id = turn.message_id.clone();
        self.set_assistant_content(&message_id, &turn.cumulative);
    }

    fn on_session(&mut self, id: String, turn: &mut Turn) {
        turn.session_id = Some(id.clone());
        if self.current_session_id.is_none() {
            info!(session_id = %id, "Adopted new session");
            self.current_session_id = Some(id.clone());
            turn.adopted_session = true;
            self.emit(DriverEvent::SessionAdopted { session_id: id });
        } else {
            self.bump_session(&id);
        }
    }

    fn on_title(&mut self, title: String, turn: &mut Turn) {
        turn.title = Some(title.clone());
        self.rename_session(turn, title);
    }

    fn rename_session(&mut self, turn: &Turn, title: String) {
        let Some(id) = turn
            .session_id
            .clone()
            .or_else(|| self.current_session_id.clone())
        else {
            return;
        };
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
            session.title = title;
        }
    }

    fn on_canvas_payload(
        &mut self,
        content: String,
        language: String,
        title: Option<String>,
        turn: &mut Turn,
    ) {
        if turn.errored {
            debug!("Ignoring canvas payload after error");
            return;
        }
        self.set_panel_content(&content, &language);
        self.open_panel();
        turn.capture = Some(CanvasCapture {
            content,
            language,
            title,
        });
    }

    fn on_error(&mut self, message: &str, turn: &mut Turn) {
        warn!(message_id = %turn.message_id, error = %message, "Backend reported an error");
        turn.errored = true;
        let message_id = turn.message_id.clone();
        self.set_assistant_content(&message_id, &format!("Error: {message}"));
    }

    fn on_done(&mut self, turn: &mut Turn) {
        if turn.errored {
            return;
        }
        let cleaned = clean_final_text(&turn.cumulative);
        turn.cumulative = cleaned.clone();

        let message_id = turn.message_id.clone();
        if !cleaned.is_empty() || self.message(&message_id).is_some() {
            self.set_assistant_content(&message_id, &cleaned);
        }
        self.emit(DriverEvent::MessageFinalized {
            message_id,
            content: cleaned,
        });
    }

    // --- canvas panel ---

    /// Open the panel with the given content, e.g. from a message card or the
    /// canvas library. `canvas` binds the panel to a stored canvas.
    pub fn open_canvas(
        &mut self,
        content: &str,
        language: &str,
        canvas: Option<PersistedCanvas>,
    ) {
        self.panel.current = canvas;
        self.set_panel_content(content, language);
        self.open_panel();
    }

    /// Open a card rendered from a message. Returns false when the card has
    /// no content to show.
    pub fn open_card(&mut self, card: &CanvasCard) -> bool {
        match &card.content {
            Some(content) => {
                let content = content.clone();
                self.open_canvas(&content, &card.language, None);
                true
            }
            None => false,
        }
    }

    /// Open a canvas from the library, binding later saves to it.
    pub fn open_saved_canvas(&mut self, canvas: PersistedCanvas) {
        let content = canvas.content.clone().unwrap_or_default();
        let language = canvas
            .language
            .clone()
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        self.open_canvas(&content, &language, Some(canvas));
    }

    /// Replace the panel content with a user edit.
    pub fn edit_canvas(&mut self, content: impl Into<String>) {
        self.panel.content = content.into();
    }

    pub fn close_canvas(&mut self) {
        self.panel.open = false;
    }

    /// Save the panel's working copy. Returns `None` when nothing was saved.
    pub async fn save_canvas(&mut self) -> Result<Option<PersistedCanvas>> {
        if self.is_streaming {
            return Err(DocdeckError::Busy);
        }
        let content = self.panel.content.clone();
        let language = self.panel.language.clone();
        let session_id = self.current_session_id.clone();
        Ok(self.persist_canvas(&content, &language, session_id, None).await)
    }

    fn open_panel(&mut self) {
        if !self.panel.open {
            self.panel.open = true;
            self.emit(DriverEvent::CanvasOpened);
        }
        self.sidebar_open = false;
    }

    fn set_panel_content(&mut self, content: &str, language: &str) {
        self.panel.content = content.to_string();
        self.panel.language = language.to_string();
        self.emit(DriverEvent::CanvasUpdated {
            content: content.to_string(),
            language: language.to_string(),
        });
    }

    /// Create or update the stored canvas and reconcile local state with the
    /// store's response. Failures are logged; the working copy is kept.
    async fn persist_canvas(
        &mut self,
        content: &str,
        language: &str,
        session_id: Option<String>,
        title: Option<String>,
    ) -> Option<PersistedCanvas> {
        let Some(session_id) = session_id else {
            debug!("No session for canvas, skipping save");
            return None;
        };
        if content.is_empty() {
            debug!("Empty canvas, skipping save");
            return None;
        }

        let bound = self
            .panel
            .current
            .as_ref()
            .filter(|c| c.session_id == session_id)
            .map(|c| (c.id.clone(), c.title.clone()));

        let result = match bound {
            Some((id, existing_title)) => {
                let write = CanvasWrite {
                    session_id,
                    content: content.to_string(),
                    language: language.to_string(),
                    title: existing_title,
                };
                debug!(canvas_id = %id, "Updating canvas");
                self.canvases.update(&id, &write).await
            }
            None => {
                let write = CanvasWrite {
                    session_id,
                    content: content.to_string(),
                    language: language.to_string(),
                    title: title.unwrap_or_else(|| UNTITLED.to_string()),
                };
                debug!(session_id = %write.session_id, "Creating canvas");
                self.canvases.create(&write).await
            }
        };

        match result {
            Ok(saved) => {
                info!(canvas_id = %saved.id, "Canvas saved");
                self.panel.current = Some(saved.clone());
                self.upsert_library(saved.clone());
                self.emit(DriverEvent::CanvasSaved {
                    canvas: saved.clone(),
                });
                Some(saved)
            }
            Err(e) => {
                error!(error = %e, "Failed to auto-save canvas");
                None
            }
        }
    }

    fn upsert_library(&mut self, saved: PersistedCanvas) {
        match self.library.iter_mut().find(|c| c.id == saved.id) {
            Some(existing) => *existing = saved,
            None => self.library.insert(0, saved),
        }
    }

    // --- sessions and library ---

    /// Reload the session list from the backend.
    pub async fn refresh_sessions(&mut self) -> Result<usize> {
        let sessions = self.directory.list_sessions().await?;
        let count = sessions.len();
        self.sessions = sessions;
        self.emit(DriverEvent::SessionsRefreshed { count });
        Ok(count)
    }

    /// Reload the canvas library from the backend.
    pub async fn refresh_canvases(&mut self) -> Result<usize> {
        self.library = self.canvases.list().await?;
        Ok(self.library.len())
    }

    pub async fn session_canvases(&self, session_id: &str) -> Result<Vec<PersistedCanvas>> {
        self.canvases.list_for_session(session_id).await
    }

    pub async fn delete_canvas(&mut self, id: &str) -> Result<()> {
        self.canvases.delete(id).await?;
        self.library.retain(|c| c.id != id);
        if self.panel.current.as_ref().is_some_and(|c| c.id == id) {
            self.panel.current = None;
        }
        Ok(())
    }

    /// Start over with an empty conversation and no session.
    pub fn new_conversation(&mut self) -> Result<()> {
        if self.is_streaming {
            return Err(DocdeckError::Busy);
        }
        self.messages.clear();
        self.current_session_id = None;
        self.panel.current = None;
        Ok(())
    }

    fn bump_session(&mut self, id: &str) {
        if let Some(pos) = self.sessions.iter().position(|s| s.id == id) {
            let mut session = self.sessions.remove(pos);
            session.updated_at = Utc::now().to_rfc3339();
            self.sessions.insert(0, session);
        }
    }

    // --- helpers ---

    fn set_status(&mut self, status: Option<&str>) {
        self.status = status.map(str::to_string);
        self.emit(DriverEvent::StatusChanged {
            status: self.status.clone(),
        });
    }

    fn set_assistant_content(&mut self, message_id: &str, content: &str) {
        match self.messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => message.content = content.to_string(),
            None => self
                .messages
                .push(ChatMessage::assistant(message_id.to_string(), content)),
        }
        self.emit(DriverEvent::MessageUpdated {
            message_id: message_id.to_string(),
            content: content.to_string(),
        });
    }

    fn emit(&self, event: DriverEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::ByteStream;
    use docdeck_core::types::Role;

    // --- fakes ---

    enum Script {
        Chunks(Vec<String>),
        ChunksThenHang(Vec<String>),
        ChunksThenError(Vec<String>),
        Refuse,
    }

    /// Plays one script per turn, in order.
    struct ScriptedTransport {
        scripts: Mutex<Vec<Script>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Script) -> Arc<Self> {
            Self::turns(vec![script])
        }

        fn turns(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn lines(lines: &[serde_json::Value]) -> Arc<Self> {
            let chunks = lines.iter().map(|l| format!("data: {l}\n")).collect();
            Self::new(Script::Chunks(chunks))
        }
    }

    fn to_items(chunks: Vec<String>) -> Vec<Result<Bytes>> {
        chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect()
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
            self.requests.lock().unwrap().push(request.clone());
            let script = {
                let mut scripts = self.scripts.lock().unwrap();
                assert!(!scripts.is_empty(), "no script left for this turn");
                scripts.remove(0)
            };
            match script {
                Script::Chunks(chunks) => Ok(Box::pin(futures::stream::iter(to_items(chunks)))),
                Script::ChunksThenHang(chunks) => Ok(Box::pin(
                    futures::stream::iter(to_items(chunks)).chain(futures::stream::pending()),
                )),
                Script::ChunksThenError(chunks) => {
                    let mut items = to_items(chunks);
                    items.push(Err(DocdeckError::Transport("connection reset".into())));
                    Ok(Box::pin(futures::stream::iter(items)))
                }
                Script::Refuse => Err(DocdeckError::Http {
                    status: 502,
                    body: "bad gateway".into(),
                }),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum StoreCall {
        Create(CanvasWrite),
        Update(String, CanvasWrite),
    }

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<StoreCall>>,
        fail: bool,
    }

    impl RecordingStore {
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Self::default()
            })
        }

        fn calls(&self) -> Vec<StoreCall> {
            self.calls.lock().unwrap().clone()
        }

        fn saved(id: &str, write: &CanvasWrite) -> PersistedCanvas {
            PersistedCanvas {
                id: id.into(),
                session_id: write.session_id.clone(),
                title: write.title.clone(),
                content: Some(write.content.clone()),
                language: Some(write.language.clone()),
                created_at: None,
                updated_at: Some("2025-01-01T00:00:00".into()),
            }
        }
    }

    #[async_trait]
    impl CanvasStore for RecordingStore {
        async fn create(&self, canvas: &CanvasWrite) -> Result<PersistedCanvas> {
            self.calls.lock().unwrap().push(StoreCall::Create(canvas.clone()));
            if self.fail {
                return Err(DocdeckError::Http {
                    status: 500,
                    body: "db locked".into(),
                });
            }
            Ok(Self::saved("server-1", canvas))
        }

        async fn update(&self, id: &str, canvas: &CanvasWrite) -> Result<PersistedCanvas> {
            self.calls
                .lock()
                .unwrap()
                .push(StoreCall::Update(id.into(), canvas.clone()));
            Ok(Self::saved(id, canvas))
        }

        async fn list(&self) -> Result<Vec<PersistedCanvas>> {
            Ok(Vec::new())
        }

        async fn list_for_session(&self, _session_id: &str) -> Result<Vec<PersistedCanvas>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeDirectory {
        sessions: Vec<ChatSession>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SessionDirectory for FakeDirectory {
        async fn list_sessions(&self) -> Result<Vec<ChatSession>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.sessions.clone())
        }
    }

    /// A session list call that never completes.
    struct StalledDirectory;

    #[async_trait]
    impl SessionDirectory for StalledDirectory {
        async fn list_sessions(&self) -> Result<Vec<ChatSession>> {
            futures::future::pending().await
        }
    }

    fn session(id: &str, updated_at: &str) -> ChatSession {
        ChatSession {
            id: id.into(),
            title: format!("Session {id}"),
            updated_at: updated_at.into(),
        }
    }

    fn settings() -> DriverSettings {
        DriverSettings {
            model_id: "Fast".into(),
            use_nas: false,
        }
    }

    fn driver(
        transport: Arc<ScriptedTransport>,
        store: Arc<RecordingStore>,
        directory: Arc<FakeDirectory>,
    ) -> ChatDriver {
        ChatDriver::new(transport, store, directory, settings())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DriverEvent>) -> Vec<DriverEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // --- tests ---

    #[tokio::test]
    async fn test_incremental_canvas_is_saved_once_with_final_content() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"content": "Here is your doc.\n<<<CANVAS_START>>>\nTitle: Plan\n"}),
            json!({"content": "<<<CONTENT_START>>>\n# Plan\n"}),
            json!({"content": "- step one\n"}),
            json!({"content": "- step two\n"}),
            json!({"content": "<<<CANVAS_END>>>\nDone!"}),
            json!({"session_id": "s-1", "done": true}),
        ]);
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(transport, store.clone(), Arc::new(FakeDirectory::default()));

        let report = driver
            .send_message(OutgoingMessage::text("write a plan"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, TurnOutcome::Completed);
        let expected = "# Plan\n- step one\n- step two\n";
        assert_eq!(
            store.calls(),
            vec![StoreCall::Create(CanvasWrite {
                session_id: "s-1".into(),
                content: expected.into(),
                language: "markdown".into(),
                title: "Plan".into(),
            })]
        );
        let saved = report.persisted.unwrap();
        assert_eq!(saved.id, "server-1");
        assert_eq!(driver.panel().current.as_ref().unwrap().id, "server-1");
        assert_eq!(driver.panel().content, expected);
        assert!(driver.panel().open);
        assert!(!driver.sidebar_open());
        assert_eq!(driver.canvases().len(), 1);
    }

    #[tokio::test]
    async fn test_panel_opens_once_before_content_marker() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"content": "<<<CANVAS_START>>>\n"}),
            json!({"content": "Language: html\n"}),
            json!({"content": "<<<CONTENT_START>>>\n<p>"}),
            json!({"content": "hi</p>"}),
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut driver = driver(
            transport,
            Arc::new(RecordingStore::default()),
            Arc::new(FakeDirectory::default()),
        )
        .with_events(tx);

        driver
            .send_message(OutgoingMessage::text("make a page"), CancellationToken::new())
            .await
            .unwrap();

        let events = drain(&mut rx);
        let opened = events
            .iter()
            .filter(|e| matches!(e, DriverEvent::CanvasOpened))
            .count();
        assert_eq!(opened, 1);

        let first_open = events
            .iter()
            .position(|e| matches!(e, DriverEvent::CanvasOpened))
            .unwrap();
        let first_update = events
            .iter()
            .position(|e| matches!(e, DriverEvent::CanvasUpdated { .. }))
            .unwrap();
        assert!(first_open < first_update);
        assert_eq!(driver.panel().content, "<p>hi</p>");
        assert_eq!(driver.panel().language, "html");
    }

    #[tokio::test]
    async fn test_direct_canvas_payload_bypasses_markers() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"content": "Built it."}),
            json!({"canvas_content": "<h1>Hi</h1>", "canvas_title": "Landing"}),
            json!({"session_id": "s-9", "done": true}),
        ]);
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(transport, store.clone(), Arc::new(FakeDirectory::default()));

        driver
            .send_message(OutgoingMessage::text("build a page"), CancellationToken::new())
            .await
            .unwrap();

        assert!(driver.panel().open);
        assert_eq!(driver.panel().language, "html");
        assert_eq!(
            store.calls(),
            vec![StoreCall::Create(CanvasWrite {
                session_id: "s-9".into(),
                content: "<h1>Hi</h1>".into(),
                language: "html".into(),
                title: "Landing".into(),
            })]
        );
    }

    #[tokio::test]
    async fn test_bound_canvas_in_same_session_is_updated() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"content": "<<<CANVAS_START>>>\nTitle: New name\n<<<CONTENT_START>>>\nv2<<<CANVAS_END>>>"}),
            json!({"session_id": "s-1", "done": true}),
        ]);
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(transport, store.clone(), Arc::new(FakeDirectory::default()))
            .with_session("s-1");
        driver.open_saved_canvas(PersistedCanvas {
            id: "c-7".into(),
            session_id: "s-1".into(),
            title: "Kept title".into(),
            content: Some("v1".into()),
            language: Some("markdown".into()),
            created_at: None,
            updated_at: None,
        });

        driver
            .send_message(OutgoingMessage::text("revise"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            store.calls(),
            vec![StoreCall::Update(
                "c-7".into(),
                CanvasWrite {
                    session_id: "s-1".into(),
                    content: "v2".into(),
                    language: "markdown".into(),
                    title: "Kept title".into(),
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_canvas_from_other_session_is_not_updated() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"content": "<<<CANVAS_START>>>\n<<<CONTENT_START>>>\nfresh"}),
            json!({"done": true}),
        ]);
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(transport, store.clone(), Arc::new(FakeDirectory::default()))
            .with_session("s-2");
        driver.open_saved_canvas(PersistedCanvas {
            id: "c-1".into(),
            session_id: "s-1".into(),
            title: "Old".into(),
            content: None,
            language: None,
            created_at: None,
            updated_at: None,
        });

        driver
            .send_message(OutgoingMessage::text("again"), CancellationToken::new())
            .await
            .unwrap();

        match store.calls().as_slice() {
            [StoreCall::Create(write)] => {
                assert_eq!(write.session_id, "s-2");
                assert_eq!(write.content, "fresh");
                assert_eq!(write.title, "Untitled");
            }
            other => panic!("expected one create, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_session_means_no_save() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"content": "<<<CANVAS_START>>>\n<<<CONTENT_START>>>\norphan"}),
            json!({"done": true}),
        ]);
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(transport, store.clone(), Arc::new(FakeDirectory::default()));

        let report = driver
            .send_message(OutgoingMessage::text("hi"), CancellationToken::new())
            .await
            .unwrap();

        assert!(store.calls().is_empty());
        assert!(report.persisted.is_none());
        assert_eq!(driver.panel().content, "orphan");
    }

    #[tokio::test]
    async fn test_failed_save_keeps_working_copy() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"canvas_content": "draft", "canvas_language": "markdown"}),
            json!({"done": true}),
        ]);
        let store = RecordingStore::failing();
        let mut driver = driver(transport, store.clone(), Arc::new(FakeDirectory::default()))
            .with_session("s-1");

        let report = driver
            .send_message(OutgoingMessage::text("draft it"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, TurnOutcome::Completed);
        assert!(report.persisted.is_none());
        assert_eq!(store.calls().len(), 1);
        assert_eq!(driver.panel().content, "draft");
        assert!(driver.panel().current.is_none());
    }

    #[tokio::test]
    async fn test_done_strips_agent_logs_and_finalizes() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"content": "> 🧠 Thinking\n"}),
            json!({"content": "> 🔍 Searching docs\n\n\n\n"}),
            json!({"content": "The answer.\n"}),
            json!({"done": true}),
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut driver = driver(
            transport,
            Arc::new(RecordingStore::default()),
            Arc::new(FakeDirectory::default()),
        )
        .with_events(tx);

        let report = driver
            .send_message(OutgoingMessage::text("question"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.content, "The answer.");
        let finalized: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                DriverEvent::MessageFinalized { content, .. } => Some(content),
                _ => None,
            })
            .collect();
        assert_eq!(finalized, vec!["The answer.".to_string()]);
    }

    #[tokio::test]
    async fn test_error_event_replaces_message_and_stops_canvas() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"content": "partial"}),
            json!({"error": "model crashed"}),
            json!({"content": "<<<CANVAS_START>>>\n<<<CONTENT_START>>>\nlate"}),
            json!({"canvas_content": "late direct"}),
            json!({"done": true}),
        ]);
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(transport, store.clone(), Arc::new(FakeDirectory::default()))
            .with_session("s-1");

        let report = driver
            .send_message(OutgoingMessage::text("go"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.content, "Error: model crashed");
        assert!(!driver.panel().open);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_refused_request_shows_generic_error() {
        let transport = ScriptedTransport::new(Script::Refuse);
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(transport, store.clone(), Arc::new(FakeDirectory::default()));

        let report = driver
            .send_message(OutgoingMessage::text("hello"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, TurnOutcome::Failed);
        assert_eq!(report.content, NETWORK_ERROR_MESSAGE);
        assert!(report.error.unwrap().contains("502"));
        assert!(!driver.is_streaming());
        assert!(driver.status().is_none());
    }

    #[tokio::test]
    async fn test_stream_error_mid_reply_skips_save() {
        let transport = ScriptedTransport::new(Script::ChunksThenError(vec![
            "data: {\"canvas_content\": \"x\"}\n".into(),
        ]));
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(transport, store.clone(), Arc::new(FakeDirectory::default()))
            .with_session("s-1");

        let report = driver
            .send_message(OutgoingMessage::text("hello"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, TurnOutcome::Failed);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_text_and_clears_indicators() {
        let transport = ScriptedTransport::new(Script::ChunksThenHang(vec![
            "data: {\"content\": \"Half an ans\"}\n".into(),
            "data: {\"canvas_content\": \"unsaved\"}\n".into(),
        ]));
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(transport, store.clone(), Arc::new(FakeDirectory::default()))
            .with_session("s-1");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = driver
            .send_message(OutgoingMessage::text("long question"), cancel)
            .await
            .unwrap();

        assert_eq!(report.outcome, TurnOutcome::Aborted);
        assert_eq!(report.content, "Half an ans");
        assert!(report.error.is_none());
        assert!(store.calls().is_empty());
        assert!(!driver.is_streaming());
        assert!(driver.status().is_none());
        assert!(driver.current_ai_message_id().is_none());
    }

    #[tokio::test]
    async fn test_new_session_is_adopted_and_list_refreshed() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"session_id": "s-new"}),
            json!({"content": "hi", "done": true}),
        ]);
        let directory = Arc::new(FakeDirectory {
            sessions: vec![session("s-new", "now")],
            ..FakeDirectory::default()
        });
        let mut driver = driver(
            transport.clone(),
            Arc::new(RecordingStore::default()),
            directory.clone(),
        );

        driver
            .send_message(OutgoingMessage::text("hello"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(driver.current_session_id(), Some("s-new"));
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(driver.sessions().len(), 1);
        assert!(transport.requests.lock().unwrap()[0].session_id.is_none());
    }

    #[tokio::test]
    async fn test_known_session_is_bumped_locally() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"session_id": "s-1", "title": "Renamed"}),
            json!({"done": true}),
        ]);
        let directory = Arc::new(FakeDirectory {
            sessions: vec![session("s-0", "b"), session("s-1", "a")],
            ..FakeDirectory::default()
        });
        let mut driver = driver(
            transport.clone(),
            Arc::new(RecordingStore::default()),
            directory.clone(),
        )
        .with_session("s-1");
        driver.refresh_sessions().await.unwrap();

        driver
            .send_message(OutgoingMessage::text("more"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
        let sessions = driver.sessions();
        assert_eq!(sessions[0].id, "s-1");
        assert_eq!(sessions[0].title, "Renamed");
        assert_ne!(sessions[0].updated_at, "a");
        assert_eq!(
            transport.requests.lock().unwrap()[0].session_id.as_deref(),
            Some("s-1")
        );
    }

    #[tokio::test]
    async fn test_request_shape_and_attachment_display() {
        let transport = ScriptedTransport::new(Script::Chunks(Vec::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut driver = driver(
            transport.clone(),
            Arc::new(RecordingStore::default()),
            Arc::new(FakeDirectory::default()),
        )
        .with_events(tx);

        driver
            .send_message(
                OutgoingMessage::text("Put this in a Canvas").with_files(vec!["f-1".into()]),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let request = transport.requests.lock().unwrap()[0].clone();
        assert!(request.canvas_mode);
        assert_eq!(request.model_id, "Fast");
        assert_eq!(request.message, "Put this in a Canvas");
        assert_eq!(request.attached_file_ids, vec!["f-1".to_string()]);

        let user = &driver.messages()[0];
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "Put this in a Canvas\n\n[Attached 1 file(s)]");

        let statuses: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                DriverEvent::StatusChanged { status } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![Some(STATUS_ANALYZING_ATTACHMENTS.to_string()), None]
        );
    }

    #[tokio::test]
    async fn test_turn_in_flight_refuses_new_turn() {
        let mut driver = driver(
            ScriptedTransport::new(Script::Chunks(Vec::new())),
            Arc::new(RecordingStore::default()),
            Arc::new(FakeDirectory::default()),
        );

        {
            let mut in_flight = InFlight::begin(&mut driver, "m-1", STATUS_PREPARING);
            let err = in_flight
                .send_message(OutgoingMessage::text("hi"), CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, DocdeckError::Busy));
            assert!(matches!(in_flight.new_conversation(), Err(DocdeckError::Busy)));
            assert!(matches!(
                in_flight.save_canvas().await,
                Err(DocdeckError::Busy)
            ));
            assert!(in_flight.messages().is_empty());
        }

        assert!(!driver.is_streaming());
        let report = driver
            .send_message(OutgoingMessage::text("hi"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.outcome, TurnOutcome::Completed);
    }

    #[tokio::test]
    async fn test_dropped_turn_releases_driver() {
        let transport = ScriptedTransport::turns(vec![
            Script::ChunksThenHang(vec!["data: {\"content\": \"Half\"}\n".into()]),
            Script::Chunks(vec!["data: {\"content\": \"Whole\", \"done\": true}\n".into()]),
        ]);
        let mut driver = driver(
            transport,
            Arc::new(RecordingStore::default()),
            Arc::new(FakeDirectory::default()),
        );

        let dropped = tokio::time::timeout(
            Duration::from_millis(50),
            driver.send_message(OutgoingMessage::text("first"), CancellationToken::new()),
        )
        .await;
        assert!(dropped.is_err());

        assert!(!driver.is_streaming());
        assert!(driver.status().is_none());
        assert!(driver.current_ai_message_id().is_none());

        let report = driver
            .send_message(OutgoingMessage::text("second"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.outcome, TurnOutcome::Completed);
        assert_eq!(report.content, "Whole");
    }

    #[tokio::test]
    async fn test_cancel_reaches_stalled_session_refresh() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"session_id": "s-new"}),
            json!({"content": "hello"}),
        ]);
        let mut driver = ChatDriver::new(
            transport,
            Arc::new(RecordingStore::default()),
            Arc::new(StalledDirectory),
            settings(),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(2),
            driver.send_message(OutgoingMessage::text("hi"), cancel),
        )
        .await
        .expect("turn ends once cancelled")
        .unwrap();

        assert_eq!(report.content, "hello");
        assert_eq!(driver.current_session_id(), Some("s-new"));
        assert!(!driver.is_streaming());
        assert!(driver.status().is_none());
    }

    #[tokio::test]
    async fn test_unterminated_block_is_saved_at_stream_end() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"content": "<<<CANVAS_START>>>\nTitle: Notes\n<<<CONTENT_START>>>\n"}),
            json!({"content": "first line\nunfinish"}),
            json!({"content": "ed"}),
            json!({"done": true}),
        ]);
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(transport, store.clone(), Arc::new(FakeDirectory::default()))
            .with_session("s-1");

        let report = driver
            .send_message(OutgoingMessage::text("notes"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            store.calls(),
            vec![StoreCall::Create(CanvasWrite {
                session_id: "s-1".into(),
                content: "first line\nunfinished".into(),
                language: "markdown".into(),
                title: "Notes".into(),
            })]
        );
        assert_eq!(report.persisted.unwrap().content.as_deref(), Some("first line\nunfinished"));
    }

    #[tokio::test]
    async fn test_canvas_captured_before_error_is_still_saved() {
        use serde_json::json;
        let transport = ScriptedTransport::lines(&[
            json!({"content": "<<<CANVAS_START>>>\n<<<CONTENT_START>>>\nkept<<<CANVAS_END>>>"}),
            json!({"error": "tool failed"}),
            json!({"content": "<<<CANVAS_START>>>\n<<<CONTENT_START>>>\nignored"}),
            json!({"done": true}),
        ]);
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(transport, store.clone(), Arc::new(FakeDirectory::default()))
            .with_session("s-1");

        let report = driver
            .send_message(OutgoingMessage::text("go"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.content, "Error: tool failed");
        assert_eq!(driver.panel().content, "kept");
        match store.calls().as_slice() {
            [StoreCall::Create(write)] => {
                assert_eq!(write.content, "kept");
                assert_eq!(write.title, "Untitled");
            }
            other => panic!("expected one create, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let mut driver = driver(
            ScriptedTransport::new(Script::Chunks(Vec::new())),
            Arc::new(RecordingStore::default()),
            Arc::new(FakeDirectory::default()),
        );
        let err = driver
            .send_message(OutgoingMessage::text("   "), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DocdeckError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_manual_edit_and_save() {
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(
            ScriptedTransport::new(Script::Chunks(Vec::new())),
            store.clone(),
            Arc::new(FakeDirectory::default()),
        )
        .with_session("s-1");

        let card = CanvasCard {
            content: Some("# Notes\n".into()),
            language: "markdown".into(),
            title: None,
        };
        assert!(driver.open_card(&card));
        driver.edit_canvas("# Notes\nedited\n");

        let first = driver.save_canvas().await.unwrap().unwrap();
        assert_eq!(first.id, "server-1");
        let second = driver.save_canvas().await.unwrap().unwrap();
        assert_eq!(second.id, "server-1");

        let calls = store.calls();
        assert!(matches!(&calls[0], StoreCall::Create(w) if w.content == "# Notes\nedited\n"));
        assert!(matches!(&calls[1], StoreCall::Update(id, _) if id == "server-1"));
        assert_eq!(driver.canvases().len(), 1);

        driver.close_canvas();
        assert!(!driver.panel().open);
    }

    #[tokio::test]
    async fn test_delete_unbinds_current_canvas() {
        let store = Arc::new(RecordingStore::default());
        let mut driver = driver(
            ScriptedTransport::new(Script::Chunks(Vec::new())),
            store,
            Arc::new(FakeDirectory::default()),
        )
        .with_session("s-1");
        driver.open_canvas("x", "markdown", None);
        let saved = driver.save_canvas().await.unwrap().unwrap();

        driver.delete_canvas(&saved.id).await.unwrap();
        assert!(driver.panel().current.is_none());
        assert!(driver.canvases().is_empty());
    }

    #[test]
    fn test_canvas_mode_hint() {
        assert!(canvas_mode_hint("open a CANVAS please"));
        assert!(canvas_mode_hint("キャンバスで書いて"));
        assert!(!canvas_mode_hint("write a poem"));
    }
}
