//! Message model exchanged with the host platform.
//!
//! The host delivers agent output as snapshots: every result carries the
//! full, ordered list of [`Message`]s known so far for one request. Messages
//! are immutable once received; a newer snapshot replaces an older one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier correlating a dispatch with the results routed back to it.
///
/// Generated at dispatch time, handed to the host as handler context, and
/// echoed back on every result. Never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap an existing identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Status of a single message within a response snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Still being generated
    Incomplete,
    /// Fully generated
    Complete,
    /// Generation failed for this message
    Error,
}

/// Content type of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Plain text
    #[default]
    Text,
    /// Markdown formatted text
    Markdown,
    /// HTML fragment
    Html,
}

/// A file attached to a prompt or a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// File name as shown to the user
    pub name: String,
    /// MIME type (e.g. `image/png`)
    pub mime_type: String,
    /// Raw file contents
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
}

impl Attachment {
    /// Create an attachment from its parts.
    #[must_use]
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// A single response unit produced by the remote agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message identifier assigned by the host
    pub id: String,
    /// Identifier of the sending bot or user
    pub sender_id: String,
    /// Message body
    pub content: String,
    /// Body format
    #[serde(default)]
    pub content_type: ContentType,
    /// Generation status of this message
    pub status: MessageStatus,
    /// Human-readable status detail (usually set on errors)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// Files attached to the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Create a complete plain-text message.
    #[must_use]
    pub fn text(
        id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            content_type: ContentType::Text,
            status: MessageStatus::Complete,
            status_text: None,
            attachments: Vec::new(),
        }
    }

    /// Builder: Set the status
    #[must_use]
    pub const fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder: Set the status text
    #[must_use]
    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = Some(status_text.into());
        self
    }

    /// Builder: Set the content type
    #[must_use]
    pub const fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Whether this message failed to generate
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.status, MessageStatus::Error)
    }
}

/// Overall status of a result delivered by the host.
///
/// Hosts are not trusted to stay within the documented vocabulary, so any
/// other value is preserved as [`ResultStatus::Unrecognized`] instead of
/// failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResultStatus {
    /// Generation in progress; more results follow
    Incomplete,
    /// Generation finished successfully
    Complete,
    /// Generation failed
    Error,
    /// Anything outside the documented vocabulary
    Unrecognized(String),
}

impl From<String> for ResultStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "incomplete" => Self::Incomplete,
            "complete" => Self::Complete,
            "error" => Self::Error,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<ResultStatus> for String {
    fn from(status: ResultStatus) -> Self {
        match status {
            ResultStatus::Incomplete => "incomplete".to_string(),
            ResultStatus::Complete => "complete".to_string(),
            ResultStatus::Error => "error".to_string(),
            ResultStatus::Unrecognized(other) => other,
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => f.write_str("incomplete"),
            Self::Complete => f.write_str("complete"),
            Self::Error => f.write_str("error"),
            Self::Unrecognized(other) => f.write_str(other),
        }
    }
}

/// Result delivered to the registered handler for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendUserMessageResult {
    /// Overall status of the request
    pub status: ResultStatus,
    /// Latest snapshot of response messages
    #[serde(default)]
    pub responses: Vec<Message>,
}

impl SendUserMessageResult {
    /// A streaming (incomplete) result
    #[must_use]
    pub const fn incomplete(responses: Vec<Message>) -> Self {
        Self {
            status: ResultStatus::Incomplete,
            responses,
        }
    }

    /// A successful terminal result
    #[must_use]
    pub const fn complete(responses: Vec<Message>) -> Self {
        Self {
            status: ResultStatus::Complete,
            responses,
        }
    }

    /// A failed terminal result
    #[must_use]
    pub const fn error(responses: Vec<Message>) -> Self {
        Self {
            status: ResultStatus::Error,
            responses,
        }
    }
}
