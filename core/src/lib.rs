//! # Agent Relay Core
//!
//! Core traits and types for the agent relay.
//!
//! The relay sits between an application embedded in a host messaging platform
//! and a remote AI agent reachable only through the host's message channel.
//! This crate holds the pieces every other crate shares:
//!
//! - **Reducer**: Pure transition function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies (clock, id generator, randomness)
//! - **Channel**: The host platform's send/register contract
//! - **Message**: The response model delivered by the host
//! - **Catch**: Panic-to-value wrappers used around consumer callbacks
//!
//! ## Example
//!
//! ```ignore
//! use agent_relay_core::*;
//!
//! impl Reducer for RelayReducer {
//!     type State = RelayState;
//!     type Action = RelayAction;
//!     type Environment = RelayEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut RelayState,
//!         action: RelayAction,
//!         env: &RelayEnvironment,
//!     ) -> SmallVec<[Effect<RelayAction>; 4]> {
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

/// Panic-catching result wrappers
pub mod catch;

/// Host platform channel contract
pub mod channel;

/// Message model exchanged with the host platform
pub mod message;

/// Reducer module - The core trait for transition logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all transition logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for transition logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for TimeoutReducer {
    ///     type State = Pending;
    ///     type Action = TimeoutAction;
    ///     type Environment = Duration;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut Pending,
    ///         action: TimeoutAction,
    ///         after: &Duration,
    ///     ) -> SmallVec<[Effect<TimeoutAction>; 4]> {
    ///         match action {
    ///             TimeoutAction::Start(id) => {
    ///                 state.insert(id.clone());
    ///                 smallvec![Effect::Delay {
    ///                     duration: *after,
    ///                     action: Box::new(TimeoutAction::Expire(id)),
    ///                 }]
    ///             },
    ///             TimeoutAction::Expire(id) => {
    ///                 state.remove(&id);
    ///                 smallvec![Effect::None]
    ///             },
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Most actions produce at most a handful of effects, so the return
        /// type is a `SmallVec` that stays on the stack for up to four.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution); a reducer returns several when it needs more than one.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Delayed action (simulation timers)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Whether this effect does nothing
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All sources of non-determinism (time, identifiers, randomness) are
/// abstracted behind traits and injected via the Environment parameter.
/// Production implementations live here; deterministic ones live in the
/// testing crate.
pub mod environment {
    use crate::message::RequestId;
    use chrono::{DateTime, Utc};
    use rand::Rng;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use agent_relay_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Generates request identifiers
    ///
    /// Identifiers must never repeat for the lifetime of the process.
    pub trait IdGenerator: Send + Sync {
        /// Produce the next request identifier
        fn next_request_id(&self) -> RequestId;
    }

    /// Timestamp + sequence + random suffix identifiers (`req-<ms>-<seq>-<suffix>`)
    ///
    /// The per-generator sequence makes ids from one generator unique even when
    /// two requests land in the same millisecond; the random suffix keeps
    /// separate generators (separate hook instances) apart.
    #[derive(Debug, Default)]
    pub struct TimestampIdGenerator {
        sequence: AtomicU64,
    }

    impl TimestampIdGenerator {
        /// Create a new generator
        #[must_use]
        pub const fn new() -> Self {
            Self {
                sequence: AtomicU64::new(0),
            }
        }
    }

    impl IdGenerator for TimestampIdGenerator {
        fn next_request_id(&self) -> RequestId {
            const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let mut rng = rand::thread_rng();
            let suffix: String = (0..8)
                .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
                .collect();

            RequestId::new(format!(
                "req-{}-{seq}-{suffix}",
                Utc::now().timestamp_millis()
            ))
        }
    }

    /// Source of uniform random values in `[0, 1)`
    pub trait RandomSource: Send + Sync {
        /// Draw the next value
        fn next_f64(&self) -> f64;
    }

    /// Thread-local RNG from the `rand` crate
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ThreadRandom;

    impl RandomSource for ThreadRandom {
        fn next_f64(&self) -> f64 {
            rand::thread_rng().r#gen::<f64>()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::environment::{IdGenerator, RandomSource, ThreadRandom, TimestampIdGenerator};
    use super::effect::Effect;
    use std::collections::HashSet;

    #[test]
    fn test_timestamp_ids_are_unique() {
        let generator = TimestampIdGenerator::new();
        let ids: HashSet<_> = (0..1000).map(|_| generator.next_request_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_timestamp_id_shape() {
        let id = TimestampIdGenerator::new().next_request_id();
        let parts: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "req");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2], "0");
        assert_eq!(parts[3].len(), 8);
    }

    #[test]
    fn test_thread_random_in_unit_interval() {
        let random = ThreadRandom;
        for _ in 0..1000 {
            let value = random.next_f64();
            assert!((0.0..1.0).contains(&value));
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_ids_unique_across_generators(generators in 1usize..5, per in 1usize..50) {
            let generators: Vec<_> = (0..generators).map(|_| TimestampIdGenerator::new()).collect();
            let mut seen = HashSet::new();
            for _ in 0..per {
                for generator in &generators {
                    proptest::prop_assert!(seen.insert(generator.next_request_id()));
                }
            }
        }
    }

    #[test]
    fn test_effect_is_none() {
        assert!(Effect::<()>::None.is_none());
        let delay = Effect::Delay {
            duration: std::time::Duration::from_millis(5),
            action: Box::new(()),
        };
        assert!(!delay.is_none());
        assert_eq!(
            format!("{delay:?}"),
            "Effect::Delay { duration: 5ms, action: () }"
        );
    }
}
