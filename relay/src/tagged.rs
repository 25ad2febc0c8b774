//! Structured answers delimited by tags.
//!
//! Prompts can ask the agent to wrap parts of its answer in tags such as
//! `<summary>...</summary>`. [`parse_tagged`] pulls those parts out of a
//! response and [`TaggedAgent`] does it on every update of a request.

use crate::filter::visible_text;
use crate::lifecycle::{AgentHook, DispatchOptions, RequestState, StateCallback};
use agent_relay_core::message::RequestId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Tagged sections of one response text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedBlocks {
    /// Closed blocks by tag (first occurrence, trimmed)
    pub blocks: BTreeMap<String, String>,
    /// Blocks opened but not yet closed, with the content so far
    pub partial: BTreeMap<String, String>,
    /// Text outside every recognised block, trimmed
    pub untagged: String,
}

impl TaggedBlocks {
    /// Content of a closed block
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.blocks.get(tag).map(String::as_str)
    }

    /// Content of a closed block, or of an open one so far
    #[must_use]
    pub fn get_or_partial(&self, tag: &str) -> Option<&str> {
        self.get(tag)
            .or_else(|| self.partial.get(tag).map(String::as_str))
    }

    /// Whether every tag in `tags` has a closed block
    #[must_use]
    pub fn has_all<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().all(|tag| self.blocks.contains_key(tag.as_ref()))
    }
}

/// Extract the blocks for `tags` from `text`.
///
/// Only the first occurrence of each tag counts. Matching is exact and
/// case-sensitive.
///
/// ```
/// use agent_relay::tagged::parse_tagged;
///
/// let parsed = parse_tagged("Sure. <answer> 42 </answer> <why>because", &["answer", "why"]);
/// assert_eq!(parsed.get("answer"), Some("42"));
/// assert_eq!(parsed.partial.get("why").map(String::as_str), Some("because"));
/// assert_eq!(parsed.untagged, "Sure.");
/// ```
#[must_use]
pub fn parse_tagged<S: AsRef<str>>(text: &str, tags: &[S]) -> TaggedBlocks {
    let mut parsed = TaggedBlocks::default();
    let mut spans: Vec<(usize, usize)> = Vec::new();

    for tag in tags {
        let tag = tag.as_ref();
        if tag.is_empty() || parsed.blocks.contains_key(tag) || parsed.partial.contains_key(tag) {
            continue;
        }
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");

        let Some(start) = text.find(&open) else {
            continue;
        };
        let content_start = start + open.len();

        if let Some(offset) = text[content_start..].find(&close) {
            let content_end = content_start + offset;
            parsed.blocks.insert(
                tag.to_string(),
                text[content_start..content_end].trim().to_string(),
            );
            spans.push((start, content_end + close.len()));
        } else {
            parsed
                .partial
                .insert(tag.to_string(), text[content_start..].trim().to_string());
            spans.push((start, text.len()));
        }
    }

    parsed.untagged = outside_spans(text, spans);
    parsed
}

/// Text not covered by any span, with the gaps joined by a single space.
fn outside_spans(text: &str, mut spans: Vec<(usize, usize)>) -> String {
    spans.sort_unstable();

    let mut pieces = Vec::new();
    let mut cursor = 0;
    for (start, end) in spans {
        if start > cursor {
            pieces.push(text[cursor..start].trim());
        }
        cursor = cursor.max(end);
    }
    if cursor < text.len() {
        pieces.push(text[cursor..].trim());
    }

    pieces
        .into_iter()
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A request state together with the tagged blocks of its visible text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedState {
    /// Lifecycle state of the request
    pub request: RequestState,
    /// Blocks parsed from the thinking-filtered responses
    pub blocks: TaggedBlocks,
}

/// Consumer callback receiving tagged states
pub type TaggedCallback = Arc<dyn Fn(TaggedState) + Send + Sync>;

/// An [`AgentHook`] that parses tagged blocks out of every update.
pub struct TaggedAgent {
    hook: AgentHook,
}

impl TaggedAgent {
    /// Wrap a hook
    #[must_use]
    pub const fn new(hook: AgentHook) -> Self {
        Self { hook }
    }

    /// The wrapped hook
    #[must_use]
    pub const fn hook(&self) -> &AgentHook {
        &self.hook
    }

    /// Dispatch `prompt` and deliver each state with the blocks for `tags`.
    ///
    /// Blocks are parsed from [`visible_text`] of the latest responses, so
    /// thinking blocks and failed messages never leak into them.
    pub async fn ask(
        &self,
        prompt: impl Into<String>,
        tags: Vec<String>,
        callback: TaggedCallback,
        options: DispatchOptions,
    ) -> RequestId {
        let wrapped: StateCallback = Arc::new(move |request: RequestState| {
            let blocks = parse_tagged(&visible_text(request.responses()), &tags);
            callback(TaggedState { request, blocks });
        });
        self.hook.dispatch(prompt, wrapped, options).await
    }

    /// Tear down the wrapped hook
    pub async fn teardown(&self) {
        self.hook.teardown().await;
    }
}

impl fmt::Debug for TaggedAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedAgent")
            .field("hook", &self.hook)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_blocks_are_trimmed() {
        let parsed = parse_tagged(
            "<title>\n  Release notes\n</title>\n<body>Fixed bugs.</body>",
            &["title", "body"],
        );
        assert_eq!(parsed.get("title"), Some("Release notes"));
        assert_eq!(parsed.get("body"), Some("Fixed bugs."));
        assert!(parsed.partial.is_empty());
        assert_eq!(parsed.untagged, "");
        assert!(parsed.has_all(&["title", "body"]));
    }

    #[test]
    fn test_first_occurrence_wins() {
        let parsed = parse_tagged("<a>one</a> middle <a>two</a>", &["a"]);
        assert_eq!(parsed.get("a"), Some("one"));
        assert_eq!(parsed.untagged, "middle <a>two</a>");
    }

    #[test]
    fn test_unterminated_block_is_partial() {
        let parsed = parse_tagged("intro <plan>step one\nstep two", &["plan"]);
        assert_eq!(parsed.get("plan"), None);
        assert_eq!(parsed.get_or_partial("plan"), Some("step one\nstep two"));
        assert_eq!(parsed.untagged, "intro");
        assert!(!parsed.has_all(&["plan"]));
    }

    #[test]
    fn test_unrequested_and_missing_tags() {
        let parsed = parse_tagged("<x>keep</x> text", &["y", ""]);
        assert!(parsed.blocks.is_empty());
        assert!(parsed.partial.is_empty());
        assert_eq!(parsed.untagged, "<x>keep</x> text");
    }

    #[test]
    fn test_untagged_joins_gaps() {
        let parsed = parse_tagged("before <a>1</a> between <b>2</b> after", &["a", "b"]);
        assert_eq!(parsed.untagged, "before between after");
    }

    #[test]
    fn test_tags_are_case_sensitive() {
        let parsed = parse_tagged("<Answer>1</Answer>", &["answer"]);
        assert_eq!(parsed.get("answer"), None);
    }
}
