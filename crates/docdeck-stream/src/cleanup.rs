//! Final display-text cleanup.
//!
//! While an agent works it streams progress lines into the message as Markdown
//! quotes prefixed with a sentinel glyph: thinking (🧠), tool use (🛠️),
//! search (🔍), failure (❌). Once the message is done those lines are dropped
//! from the stored text, leaving only the answer.

use std::sync::LazyLock;

use regex::Regex;

static AGENT_LOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^>\s*(?:\x{1F9E0}|\x{1F6E0}\x{FE0F}|\x{1F50D}|\x{274C})[^\n\r\x{2028}\x{2029}]*",
    )
    .expect("agent log pattern is valid")
});

static BLANK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank run pattern is valid"));

/// Strip agent log lines, collapse 3+ newlines to 2, and trim.
pub fn clean_final_text(text: &str) -> String {
    let without_logs = AGENT_LOG_RE.replace_all(text, "");
    let collapsed = BLANK_RUN_RE.replace_all(&without_logs, "\n\n");
    collapsed.trim().to_string()
}
