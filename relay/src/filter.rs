//! Removal of model reasoning from agent output.
//!
//! Reasoning models wrap their chain of thought in `<think>` or `<thinking>`
//! blocks. Consumers only ever show what follows.

use agent_relay_core::message::Message;
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)] // Literal pattern
static CLOSED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<think\s*>.*?</think\s*>|<thinking\s*>.*?</thinking\s*>")
        .expect("valid thinking block regex")
});

#[allow(clippy::expect_used)] // Literal pattern
static STRAY_CLOSER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</think(?:ing)?\s*>").expect("valid closing tag regex"));

#[allow(clippy::expect_used)] // Literal pattern
static OPEN_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think(?:ing)?\s*>.*$").expect("valid open block regex"));

/// Remove every thinking block from `text`.
///
/// Tags match case-insensitively and blocks may span lines. An opening tag
/// without a closing one hides everything after it, since a streaming model
/// is still thinking. The result is trimmed.
///
/// ```
/// use agent_relay::filter::strip_thinking;
///
/// assert_eq!(strip_thinking("<think>hmm</think>\nHello!"), "Hello!");
/// assert_eq!(strip_thinking("Hi <THINKING>still going"), "Hi");
/// ```
#[must_use]
pub fn strip_thinking(text: &str) -> String {
    let mut current = text.to_string();
    // Removing one tag can splice two fragments into a new one
    loop {
        let next = strip_once(&current);
        if next == current {
            return next.trim().to_string();
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let without_blocks = CLOSED_BLOCK.replace_all(text, "");
    let without_closers = STRAY_CLOSER.replace_all(&without_blocks, "");
    OPEN_BLOCK.replace(&without_closers, "").into_owned()
}

/// Whether `text` contains an unterminated thinking block
#[must_use]
pub fn is_thinking(text: &str) -> bool {
    let without_blocks = CLOSED_BLOCK.replace_all(text, "");
    OPEN_BLOCK.is_match(&without_blocks)
}

/// Visible text of a response snapshot.
///
/// Joins the filtered content of every non-error message, skipping messages
/// left empty by filtering.
#[must_use]
pub fn visible_text(responses: &[Message]) -> String {
    responses
        .iter()
        .filter(|message| !message.is_error())
        .map(|message| strip_thinking(&message.content))
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
