//! Host platform channel contract.
//!
//! The host exposes exactly two primitives to embedded applications:
//!
//! - register a named handler that receives every result for prompts sent
//!   with that handler name
//! - send a prompt, naming the handler and attaching an opaque context that
//!   the host echoes back with each result
//!
//! One handler is shared by all concurrent prompts, so correlating results
//! with requests is the caller's job (see the relay crate).
//!
//! # Dyn Compatibility
//!
//! `send_message` returns an explicit `Pin<Box<dyn Future>>` instead of using
//! `async fn` so the channel can be held as `Arc<dyn ExternalChannel>` and
//! captured by effects.

use crate::message::{Attachment, RequestId, SendUserMessageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Context handed to the host at send time and echoed back with every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerContext {
    /// Correlation id of the originating dispatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,

    /// Any other keys the host passes through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl HandlerContext {
    /// Context carrying a request id
    #[must_use]
    pub fn for_request(request_id: RequestId) -> Self {
        Self {
            request_id: Some(request_id),
            extra: serde_json::Map::new(),
        }
    }
}

/// Options accompanying a prompt sent through the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    /// Name of the registered handler that receives results
    pub handler: String,
    /// Whether intermediate (incomplete) results should be delivered
    pub stream: bool,
    /// Whether the host should open its chat view
    pub open_chat: bool,
    /// Files sent along with the prompt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Context echoed back with each result
    pub handler_context: HandlerContext,
}

/// Immediate acknowledgement of a send; not the agent's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendAck {
    /// Whether the host accepted the prompt for delivery
    pub success: bool,
}

impl SendAck {
    /// Prompt accepted
    #[must_use]
    pub const fn accepted() -> Self {
        Self { success: true }
    }

    /// Prompt refused without an error
    #[must_use]
    pub const fn rejected() -> Self {
        Self { success: false }
    }
}

/// Errors raised by the host when sending a prompt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The host rejected the prompt or its options
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The user declined the host's confirmation prompt
    #[error("Confirmation declined: {0}")]
    Confirmation(String),

    /// The host could not deliver the prompt
    #[error("Transport failed: {0}")]
    Transport(String),
}

/// Callback invoked by the host for every result of a handler.
pub type ResultHandler = Arc<dyn Fn(SendUserMessageResult, HandlerContext) + Send + Sync>;

/// Boxed acknowledgement future returned by [`ExternalChannel::send_message`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<SendAck, ChannelError>> + Send + 'a>>;

/// Deregistration capability returned by [`ExternalChannel::register_handler`].
///
/// Consumed on use, so a handler can be deregistered at most once.
pub struct Unregister(Option<Box<dyn FnOnce() + Send + Sync>>);

impl Unregister {
    /// Wrap a deregistration function
    #[must_use]
    pub fn new(f: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// A deregistration that does nothing
    #[must_use]
    pub const fn noop() -> Self {
        Self(None)
    }

    /// Deregister the handler
    pub fn unregister(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl fmt::Debug for Unregister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unregister")
            .field(&self.0.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// The host platform's message channel.
///
/// # Contract
///
/// - `register_handler` must be called before any send naming that handler
/// - `send_message` resolves with the host's immediate acknowledgement:
///   `Ok(SendAck { success: false })` is a non-exceptional refusal, `Err` a
///   typed failure
/// - Results are delivered later, through the registered handler, with the
///   `handler_context` from the send echoed back
pub trait ExternalChannel: Send + Sync {
    /// Register a handler under `name`, returning its deregistration
    fn register_handler(&self, name: &str, handler: ResultHandler) -> Unregister;

    /// Send a prompt to the remote agent
    fn send_message(&self, prompt: String, options: SendOptions) -> SendFuture<'_>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_handler_context_round_trips_extra_keys() {
        let json = serde_json::json!({ "requestId": "req-1", "threadId": 7 });
        let context: HandlerContext = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(context.request_id, Some(RequestId::new("req-1")));
        assert_eq!(context.extra["threadId"], 7);
        assert_eq!(serde_json::to_value(&context).unwrap(), json);
    }

    #[test]
    fn test_handler_context_without_request_id() {
        let context: HandlerContext = serde_json::from_str("{}").unwrap();
        assert!(context.request_id.is_none());
    }

    #[test]
    fn test_unregister_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let unregister = Unregister::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        unregister.unregister();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        Unregister::noop().unregister();
    }

    #[test]
    fn test_channel_error_display() {
        let err = ChannelError::Transport("Network Failed".to_string());
        assert_eq!(err.to_string(), "Transport failed: Network Failed");
    }
}
