//! Embedded canvas-block extraction.
//!
//! An assistant message may carry one canvas block:
//!
//! ```text
//! <<<CANVAS_START>>>
//! Title: <text>            (optional)
//! Language: <text>         (optional)
//! <<<CONTENT_START>>>
//! <content...>
//! <<<CANVAS_END>>>         (absent while still streaming)
//! ```
//!
//! The extractor re-scans the whole cumulative text on every delta. The
//! content capture is greedy to end of input and is then cut at the first end
//! marker, so an unterminated block yields everything received so far.

use std::sync::LazyLock;

use regex::Regex;

use docdeck_core::types::UNTITLED;

pub const CANVAS_START: &str = "<<<CANVAS_START>>>";
pub const CONTENT_START: &str = "<<<CONTENT_START>>>";
pub const CANVAS_END: &str = "<<<CANVAS_END>>>";

/// Language assumed for an embedded block without a `Language:` line.
pub const DEFAULT_LANGUAGE: &str = "markdown";

// Header captures stop at any JavaScript line terminator so stored messages
// parse the same as they did in the browser.
static CANVAS_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<<<CANVAS_START>>>\n(?:Title: ([^\n\r\x{2028}\x{2029}]*)\n)?(?:Language: ([^\n\r\x{2028}\x{2029}]*)\n)?<<<CONTENT_START>>>\n((?s:.*))(?:<<<CANVAS_END>>>|$)",
    )
    .expect("canvas block pattern is valid")
});

/// Best-known view of the canvas block in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasBlock {
    pub title: String,
    pub language: String,
    pub content: String,
    /// The end marker has been seen; `content` is complete.
    pub is_final: bool,
}

/// Extract the first canvas block from `text`, if its content has started.
pub fn extract_canvas_block(text: &str) -> Option<CanvasBlock> {
    let caps = CANVAS_BLOCK_RE.captures(text)?;

    let title = caps
        .get(1)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(UNTITLED);
    let language = caps
        .get(2)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_LANGUAGE);

    let raw = caps.get(3).map_or("", |m| m.as_str());
    let (content, is_final) = match raw.find(CANVAS_END) {
        Some(end) => (&raw[..end], true),
        None => (raw, false),
    };

    Some(CanvasBlock {
        title: title.to_string(),
        language: language.to_string(),
        content: content.to_string(),
        is_final,
    })
}

/// Canvas state for one in-flight message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasBlockState {
    /// The start marker has appeared.
    pub is_open: bool,
    pub title: Option<String>,
    pub language: String,
    pub content: String,
    pub is_final: bool,
}

impl Default for CanvasBlockState {
    fn default() -> Self {
        Self {
            is_open: false,
            title: None,
            language: DEFAULT_LANGUAGE.to_string(),
            content: String::new(),
            is_final: false,
        }
    }
}

/// Result of one re-scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanOutcome {
    /// First sighting of the start marker for this message. Fires once.
    pub open_panel: bool,
    /// Current block view, when the content marker has arrived.
    pub block: Option<CanvasBlock>,
}

/// Stateful extractor; create one per assistant message.
#[derive(Debug, Default)]
pub struct CanvasBlockExtractor {
    open_signalled: bool,
    state: CanvasBlockState,
}

impl CanvasBlockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor for a message that starts with the panel already open; the
    /// open trigger is then never raised.
    pub fn with_panel_open(panel_open: bool) -> Self {
        Self {
            open_signalled: panel_open,
            state: CanvasBlockState::default(),
        }
    }

    /// Re-scan the full cumulative text.
    pub fn scan(&mut self, cumulative: &str) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        if !self.state.is_open && cumulative.contains(CANVAS_START) {
            self.state.is_open = true;
            if !self.open_signalled {
                self.open_signalled = true;
                outcome.open_panel = true;
            }
        }

        if let Some(block) = extract_canvas_block(cumulative) {
            self.state.title = Some(block.title.clone());
            self.state.language = block.language.clone();
            self.state.content = block.content.clone();
            self.state.is_final = block.is_final;
            outcome.block = Some(block);
        }

        outcome
    }

    pub fn state(&self) -> &CanvasBlockState {
        &self.state
    }
}
