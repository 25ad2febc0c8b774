//! Panic-to-value wrappers.
//!
//! Consumer callbacks are foreign code: a panic inside one must not unwind
//! through the relay and poison its state. These helpers run a closure (or
//! future) and turn a panic into an ordinary `Err` value.
//!
//! ```
//! use agent_relay_core::catch::try_catch;
//!
//! let ok = try_catch(|| 2 + 2);
//! assert_eq!(ok.ok(), Some(4));
//! ```

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// A panic captured by [`try_catch`] or [`try_catch_async`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("panicked: {message}")]
pub struct CaughtPanic {
    /// Panic payload rendered as text
    pub message: String,
}

impl CaughtPanic {
    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self { message }
    }
}

/// Failure of a fallible operation run through [`try_catch_result`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Caught<E> {
    /// The operation returned an error
    #[error("{0}")]
    Failed(E),
    /// The operation panicked
    #[error(transparent)]
    Panicked(CaughtPanic),
}

/// Run `f`, converting a panic into `Err(CaughtPanic)`.
///
/// # Errors
///
/// Returns [`CaughtPanic`] if `f` panics.
pub fn try_catch<T, F>(f: F) -> Result<T, CaughtPanic>
where
    F: FnOnce() -> T,
{
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| CaughtPanic::from_payload(&*payload))
}

/// Run a fallible `f`, folding both its error and a panic into one `Err`.
///
/// # Errors
///
/// Returns [`Caught::Failed`] if `f` returns an error, [`Caught::Panicked`] if it panics.
pub fn try_catch_result<T, E, F>(f: F) -> Result<T, Caught<E>>
where
    F: FnOnce() -> Result<T, E>,
{
    match try_catch(f) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Caught::Failed(error)),
        Err(caught) => Err(Caught::Panicked(caught)),
    }
}

/// Await `fut`, converting a panic during polling into `Err(CaughtPanic)`.
///
/// # Errors
///
/// Returns [`CaughtPanic`] if the future panics.
pub async fn try_catch_async<T, Fut>(fut: Fut) -> Result<T, CaughtPanic>
where
    Fut: Future<Output = T>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| CaughtPanic::from_payload(&*payload))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)] // Panics are the subject under test

    use super::*;

    #[test]
    fn test_try_catch_passes_value_through() {
        assert_eq!(try_catch(|| "value"), Ok("value"));
    }

    #[test]
    fn test_try_catch_captures_str_payload() {
        let result: Result<(), _> = try_catch(|| panic!("callback blew up"));
        assert_eq!(
            result,
            Err(CaughtPanic {
                message: "callback blew up".to_string()
            })
        );
    }

    #[test]
    fn test_try_catch_captures_formatted_payload() {
        let code = 42;
        let result: Result<(), _> = try_catch(|| panic!("code {code}"));
        assert_eq!(result.map_err(|e| e.message), Err("code 42".to_string()));
    }

    #[test]
    fn test_try_catch_result_distinguishes_failures() {
        let failed: Result<(), Caught<&str>> = try_catch_result(|| Err("nope"));
        assert_eq!(failed, Err(Caught::Failed("nope")));

        let panicked: Result<(), Caught<&str>> = try_catch_result(|| panic!("boom"));
        assert!(matches!(panicked, Err(Caught::Panicked(_))));

        let ok: Result<u8, Caught<&str>> = try_catch_result(|| Ok(1));
        assert_eq!(ok, Ok(1));
    }

    #[tokio::test]
    async fn test_try_catch_async() {
        assert_eq!(try_catch_async(async { 7 }).await, Ok(7));

        let result: Result<(), _> = try_catch_async(async { panic!("async boom") }).await;
        assert_eq!(result.map_err(|e| e.to_string()), Err("panicked: async boom".to_string()));
    }
}
