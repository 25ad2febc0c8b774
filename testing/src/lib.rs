//! # Agent Relay Testing
//!
//! Testing utilities and helpers for the agent relay.
//!
//! This crate provides:
//! - Deterministic implementations of Environment traits
//! - A scriptable in-memory host channel
//! - A recording consumer callback with async waiting
//! - A step-by-step reducer driver that fires delayed effects on demand
//!
//! ## Example
//!
//! ```ignore
//! use agent_relay_testing::{CallbackRecorder, MockChannel};
//!
//! #[tokio::test]
//! async fn test_dispatch_through_channel() {
//!     let channel = MockChannel::new();
//!     let hook = AgentHook::with_channel(channel.clone(), options);
//!     let recorder = CallbackRecorder::new();
//!
//!     let id = hook.dispatch("hi", recorder.callback(), DispatchOptions::default()).await;
//!     channel.deliver_to_request("agent-relay", &id, SendUserMessageResult::complete(vec![]));
//!
//!     assert!(recorder.wait_for(2, Duration::from_secs(1)).await);
//! }
//! ```

use agent_relay_core::environment::{Clock, IdGenerator, RandomSource};
use agent_relay_core::message::RequestId;
use chrono::{DateTime, Utc};

/// Deterministic implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, RandomSource, RequestId, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use agent_relay_testing::mocks::FixedClock;
    /// use agent_relay_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable request ids: `req-test-1`, `req-test-2`, ...
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Create a generator starting at 1
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU64::new(1),
            }
        }
    }

    impl Default for SequentialIdGenerator {
        fn default() -> Self {
            Self::new()
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_request_id(&self) -> RequestId {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            RequestId::new(format!("req-test-{n}"))
        }
    }

    /// Random source replaying a script of values, then a fallback
    ///
    /// # Example
    ///
    /// ```
    /// use agent_relay_testing::mocks::ScriptedRandom;
    /// use agent_relay_core::environment::RandomSource;
    ///
    /// let random = ScriptedRandom::new([0.9, 0.1]).with_fallback(0.5);
    /// assert!((random.next_f64() - 0.9).abs() < f64::EPSILON);
    /// assert!((random.next_f64() - 0.1).abs() < f64::EPSILON);
    /// assert!((random.next_f64() - 0.5).abs() < f64::EPSILON);
    /// ```
    #[derive(Debug)]
    pub struct ScriptedRandom {
        script: Mutex<VecDeque<f64>>,
        fallback: f64,
    }

    impl ScriptedRandom {
        /// Replay `values` in order, then return `0.0`
        #[must_use]
        pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
            Self {
                script: Mutex::new(values.into_iter().collect()),
                fallback: 0.0,
            }
        }

        /// Always return `value`
        #[must_use]
        pub fn constant(value: f64) -> Self {
            Self::new([]).with_fallback(value)
        }

        /// Builder: Set the value returned once the script runs out
        #[must_use]
        pub const fn with_fallback(mut self, value: f64) -> Self {
            self.fallback = value;
            self
        }
    }

    impl RandomSource for ScriptedRandom {
        fn next_f64(&self) -> f64 {
            self.script
                .lock()
                .ok()
                .and_then(|mut script| script.pop_front())
                .unwrap_or(self.fallback)
        }
    }
}

/// Property-based testing strategies for relay types
pub mod properties {
    use agent_relay_core::message::{Message, MessageStatus};
    use proptest::prelude::*;

    /// Any message status
    pub fn arb_message_status() -> impl Strategy<Value = MessageStatus> {
        prop_oneof![
            Just(MessageStatus::Incomplete),
            Just(MessageStatus::Complete),
            Just(MessageStatus::Error),
        ]
    }

    /// A plain-text message with arbitrary sender, content and status
    pub fn arb_message() -> impl Strategy<Value = Message> {
        (
            "[a-z0-9]{1,8}",
            "[A-Za-z]{0,12}",
            ".{0,64}",
            arb_message_status(),
            proptest::option::of("[ -~]{0,24}"),
        )
            .prop_map(|(id, sender, content, status, status_text)| {
                let message = Message::text(id, sender, content).with_status(status);
                match status_text {
                    Some(text) => message.with_status_text(text),
                    None => message,
                }
            })
    }

    /// A response snapshot of up to `max` messages
    pub fn arb_responses(max: usize) -> impl Strategy<Value = Vec<Message>> {
        proptest::collection::vec(arb_message(), 0..=max)
    }
}

/// Scriptable host channel and recording callbacks
pub mod channel_mocks;


// Re-export commonly used items
pub use channel_mocks::{CallbackRecorder, MockChannel, SendOutcome, SentMessage};
pub use mocks::{test_clock, FixedClock, ScriptedRandom, SequentialIdGenerator};
pub use reducer_test::{assertions, ReducerTest};
