//! Actions for request lifecycle tracking.

use crate::lifecycle::types::{DispatchOptions, StateCallback};
use agent_relay_core::channel::HandlerContext;
use agent_relay_core::message::{Message, RequestId, SendUserMessageResult};
use std::fmt;

/// Actions processed by the [`RelayReducer`](crate::lifecycle::RelayReducer).
///
/// `Dispatch`, `ResultReceived` and `TearDown` come from the hook; the rest
/// are fed back by effects.
#[derive(Clone)]
pub enum RelayAction {
    /// Start tracking a new request and send (or simulate) its prompt.
    Dispatch {
        /// Freshly generated correlation id
        request_id: RequestId,

        /// Prompt text, passed to the host unvalidated
        prompt: String,

        /// Consumer callback for this request
        callback: StateCallback,

        /// Per-dispatch options
        options: DispatchOptions,
    },

    /// A result arrived through the registered handler.
    ResultReceived {
        /// Result as delivered by the host
        result: SendUserMessageResult,

        /// Context echoed back by the host
        context: HandlerContext,
    },

    /// The host refused the prompt or failed to acknowledge it.
    DispatchFailed {
        /// Request whose send failed
        request_id: RequestId,

        /// Failure description (without the dispatch prefix)
        error: String,
    },

    /// The simulation timer of a request fired.
    SimulationElapsed {
        /// Request being simulated
        request_id: RequestId,

        /// Messages to return instead of the configured ones
        override_messages: Option<Vec<Message>>,
    },

    /// The owning context is gone: orphan every in-flight request.
    TearDown,
}

impl fmt::Debug for RelayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispatch {
                request_id,
                prompt,
                options,
                ..
            } => f
                .debug_struct("Dispatch")
                .field("request_id", request_id)
                .field("prompt", prompt)
                .field("options", options)
                .finish_non_exhaustive(),
            Self::ResultReceived { result, context } => f
                .debug_struct("ResultReceived")
                .field("result", result)
                .field("context", context)
                .finish(),
            Self::DispatchFailed { request_id, error } => f
                .debug_struct("DispatchFailed")
                .field("request_id", request_id)
                .field("error", error)
                .finish(),
            Self::SimulationElapsed {
                request_id,
                override_messages,
            } => f
                .debug_struct("SimulationElapsed")
                .field("request_id", request_id)
                .field("override_messages", override_messages)
                .finish(),
            Self::TearDown => write!(f, "TearDown"),
        }
    }
}
