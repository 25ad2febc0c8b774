//! In-memory host channel testing utilities
//!
//! Provides deterministic stand-ins for the host platform:
//! - [`MockChannel`]: records sends, scripts acknowledgements, and delivers
//!   results through whatever handler is registered
//! - [`CallbackRecorder`]: a consumer callback that records every state it
//!   receives and lets async tests wait for a number of deliveries

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use agent_relay_core::channel::{
    ChannelError, ExternalChannel, HandlerContext, ResultHandler, SendAck, SendFuture,
    SendOptions, Unregister,
};
use agent_relay_core::message::{RequestId, SendUserMessageResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// How the mock answers the next `send_message` calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// `Ok(SendAck { success: true })`
    Accept,
    /// `Ok(SendAck { success: false })`
    Reject,
    /// `Err(error)`
    Fail(ChannelError),
}

/// A prompt captured by [`MockChannel`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    /// Prompt text
    pub prompt: String,
    /// Options passed with the prompt
    pub options: SendOptions,
}

#[derive(Default)]
struct MockChannelInner {
    handlers: Mutex<HashMap<String, ResultHandler>>,
    sent: Mutex<Vec<SentMessage>>,
    outcome: Mutex<Option<SendOutcome>>,
    ack_delay: Mutex<Option<Duration>>,
    unregistered: AtomicUsize,
}

/// In-memory host channel for fast, deterministic testing.
///
/// Accepts every prompt unless told otherwise. Results are pushed by the test
/// through [`deliver`](Self::deliver), exactly as the host would call the
/// registered handler.
///
/// # Example
///
/// ```
/// use agent_relay_testing::{MockChannel, SendOutcome};
/// use agent_relay_core::channel::ChannelError;
///
/// let channel = MockChannel::new()
///     .with_outcome(SendOutcome::Fail(ChannelError::Transport("Network Failed".into())));
/// assert_eq!(channel.sent_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MockChannel {
    inner: Arc<MockChannelInner>,
}

impl MockChannel {
    /// Create a channel that accepts every prompt
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: Answer sends with `outcome`
    #[must_use]
    pub fn with_outcome(self, outcome: SendOutcome) -> Self {
        self.set_outcome(outcome);
        self
    }

    /// Builder: Wait `delay` before acknowledging each send
    #[must_use]
    pub fn with_ack_delay(self, delay: Duration) -> Self {
        *self.inner.ack_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Change how subsequent sends are answered
    pub fn set_outcome(&self, outcome: SendOutcome) {
        *self.inner.outcome.lock().unwrap() = Some(outcome);
    }

    /// All prompts sent so far, oldest first
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.inner.sent.lock().unwrap().clone()
    }

    /// Number of prompts sent so far
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.inner.sent.lock().unwrap().len()
    }

    /// Whether a handler is currently registered under `name`
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.handlers.lock().unwrap().contains_key(name)
    }

    /// Number of handlers deregistered so far
    #[must_use]
    pub fn unregister_count(&self) -> usize {
        self.inner.unregistered.load(Ordering::SeqCst)
    }

    /// Call the handler registered under `handler` with a result.
    ///
    /// Returns `false` when no handler is registered (the host drops the result).
    pub fn deliver(
        &self,
        handler: &str,
        result: SendUserMessageResult,
        context: HandlerContext,
    ) -> bool {
        // Clone out of the lock so the handler may call back into the mock
        let registered = self.inner.handlers.lock().unwrap().get(handler).cloned();
        match registered {
            Some(f) => {
                f(result, context);
                true
            },
            None => false,
        }
    }

    /// [`deliver`](Self::deliver) with a context naming `request_id`
    pub fn deliver_to_request(
        &self,
        handler: &str,
        request_id: &RequestId,
        result: SendUserMessageResult,
    ) -> bool {
        self.deliver(handler, result, HandlerContext::for_request(request_id.clone()))
    }
}

impl ExternalChannel for MockChannel {
    fn register_handler(&self, name: &str, handler: ResultHandler) -> Unregister {
        self.inner
            .handlers
            .lock()
            .unwrap()
            .insert(name.to_string(), handler);

        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        Unregister::new(move || {
            inner.handlers.lock().unwrap().remove(&name);
            inner.unregistered.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn send_message(&self, prompt: String, options: SendOptions) -> SendFuture<'_> {
        self.inner
            .sent
            .lock()
            .unwrap()
            .push(SentMessage { prompt, options });

        let outcome = self
            .inner
            .outcome
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(SendOutcome::Accept);
        let delay = *self.inner.ack_delay.lock().unwrap();

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match outcome {
                SendOutcome::Accept => Ok(SendAck::accepted()),
                SendOutcome::Reject => Ok(SendAck::rejected()),
                SendOutcome::Fail(error) => Err(error),
            }
        })
    }
}

/// Records every value passed to a consumer callback.
///
/// Clones share the same recording.
///
/// # Example
///
/// ```
/// use agent_relay_testing::CallbackRecorder;
///
/// let recorder = CallbackRecorder::<u32>::new();
/// let callback = recorder.callback();
/// callback(1);
/// callback(2);
/// assert_eq!(recorder.recorded(), vec![1, 2]);
/// ```
pub struct CallbackRecorder<T> {
    values: Arc<Mutex<Vec<T>>>,
    count: Arc<watch::Sender<usize>>,
}

impl<T> Clone for CallbackRecorder<T> {
    fn clone(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
            count: Arc::clone(&self.count),
        }
    }
}

impl<T> Default for CallbackRecorder<T> {
    fn default() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
            count: Arc::new(watch::channel(0).0),
        }
    }
}

impl<T> CallbackRecorder<T>
where
    T: Clone + Send + 'static,
{
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value
    pub fn record(&self, value: T) {
        let len = {
            let mut values = self.values.lock().unwrap();
            values.push(value);
            values.len()
        };
        self.count.send_replace(len);
    }

    /// A callback that records into this recorder
    #[must_use]
    pub fn callback(&self) -> Arc<dyn Fn(T) + Send + Sync> {
        let recorder = self.clone();
        Arc::new(move |value| recorder.record(value))
    }

    /// Everything recorded so far, oldest first
    #[must_use]
    pub fn recorded(&self) -> Vec<T> {
        self.values.lock().unwrap().clone()
    }

    /// Number of values recorded so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().unwrap().len()
    }

    /// Whether nothing has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recent value
    #[must_use]
    pub fn last(&self) -> Option<T> {
        self.values.lock().unwrap().last().cloned()
    }

    /// Wait until at least `n` values are recorded.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let mut rx = self.count.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|count| *count >= n))
            .await
            .is_ok_and(|result| result.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_relay_core::message::Message;

    fn options(request: &str) -> SendOptions {
        SendOptions {
            handler: "relay".to_string(),
            stream: true,
            open_chat: false,
            attachments: Vec::new(),
            handler_context: HandlerContext::for_request(RequestId::new(request)),
        }
    }

    #[tokio::test]
    async fn test_send_records_and_accepts() {
        let channel = MockChannel::new();
        let ack = channel
            .send_message("hello".to_string(), options("r1"))
            .await
            .unwrap();

        assert!(ack.success);
        assert_eq!(channel.sent_count(), 1);
        assert_eq!(channel.sent()[0].prompt, "hello");
    }

    #[tokio::test]
    async fn test_scripted_outcomes() {
        let channel = MockChannel::new().with_outcome(SendOutcome::Reject);
        let ack = channel.send_message("a".into(), options("r1")).await.unwrap();
        assert!(!ack.success);

        channel.set_outcome(SendOutcome::Fail(ChannelError::Transport("down".into())));
        let err = channel.send_message("b".into(), options("r2")).await.unwrap_err();
        assert_eq!(err, ChannelError::Transport("down".into()));
    }

    #[test]
    fn test_deliver_reaches_registered_handler_until_unregistered() {
        let channel = MockChannel::new();
        let recorder = CallbackRecorder::<(SendUserMessageResult, HandlerContext)>::new();
        let sink = recorder.clone();
        let unregister = channel.register_handler(
            "relay",
            Arc::new(move |result, context| sink.record((result, context))),
        );

        let result = SendUserMessageResult::complete(vec![Message::text("m1", "Bot", "hi")]);
        assert!(channel.deliver_to_request("relay", &RequestId::new("r1"), result.clone()));
        assert!(!channel.deliver_to_request("other", &RequestId::new("r1"), result.clone()));

        unregister.unregister();
        assert!(!channel.is_registered("relay"));
        assert!(!channel.deliver_to_request("relay", &RequestId::new("r1"), result));
        assert_eq!(channel.unregister_count(), 1);

        let recorded = recorder.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].1.request_id, Some(RequestId::new("r1")));
    }

    #[tokio::test]
    async fn test_recorder_wait_for() {
        let recorder = CallbackRecorder::<u8>::new();
        let callback = recorder.callback();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            callback(1);
            callback(2);
        });

        assert!(recorder.wait_for(2, Duration::from_secs(1)).await);
        assert_eq!(recorder.last(), Some(2));
        assert!(!recorder.wait_for(3, Duration::from_millis(20)).await);
    }
}
