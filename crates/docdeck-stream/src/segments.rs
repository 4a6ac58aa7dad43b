//! Split a stored message into Markdown text and canvas cards for rendering.

use std::sync::LazyLock;

use regex::Regex;

use crate::canvas::DEFAULT_LANGUAGE;

static COMPLETE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<<<CANVAS_START>>>.*?<<<CANVAS_END>>>").expect("block pattern is valid")
});

static CARD_CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<<<CONTENT_START>>>\n(.*?)<<<CANVAS_END>>>").expect("card pattern is valid")
});

static CARD_LANGUAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Language: ([^\n\r\x{2028}\x{2029}]*)\n").expect("language pattern is valid")
});

static CARD_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Title: ([^\n\r\x{2028}\x{2029}]*)\n").expect("title pattern is valid")
});

/// A completed canvas block shown as a clickable card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasCard {
    /// `None` when the block has no content marker; opening it does nothing.
    pub content: Option<String>,
    pub language: String,
    pub title: Option<String>,
}

impl CanvasCard {
    fn from_block(block: &str) -> Self {
        let content = CARD_CONTENT_RE
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        let language = CARD_LANGUAGE_RE
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        let title = CARD_TITLE_RE
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|t| !t.is_empty());
        Self {
            content,
            language,
            title,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSegment {
    Markdown(String),
    Canvas(CanvasCard),
}

/// Split `content` around every complete canvas block.
///
/// Empty Markdown runs between blocks are dropped. An unterminated block is
/// left in the Markdown text untouched.
pub fn split_message(content: &str) -> Vec<MessageSegment> {
    let mut segments = Vec::new();
    let mut last = 0;

    for block in COMPLETE_BLOCK_RE.find_iter(content) {
        push_markdown(&mut segments, &content[last..block.start()]);
        segments.push(MessageSegment::Canvas(CanvasCard::from_block(block.as_str())));
        last = block.end();
    }
    push_markdown(&mut segments, &content[last..]);

    segments
}

fn push_markdown(segments: &mut Vec<MessageSegment>, text: &str) {
    if !text.is_empty() {
        segments.push(MessageSegment::Markdown(text.to_string()));
    }
}
