//! Per-request AI response lifecycle tracking.
//!
//! The host platform gives an embedded application a single result handler
//! shared by every prompt it sends. This module turns that into one logical
//! stream of states per request.
//!
//! # Architecture
//!
//! ```text
//! AgentHook::dispatch ──► RelayAction::Dispatch
//!                          ↓
//!                          registry.put + callback(pending)
//!                          ↓
//!          ┌───────────────┼──────────────────────┐
//!          ▼               ▼                      ▼
//!    Effect::Delay    Effect::Future         no channel:
//!    (simulation)     (send + await ack)     terminal error
//!          │               │ refused / failed
//!          │               ▼
//!          │         DispatchFailed ──► terminal error
//!          ▼
//!    SimulationElapsed ─┐
//!                       ├──► router: next_state → callback → evict if terminal
//! host handler ─► queue ┘    (ResultReceived)
//! ```
//!
//! # Key Insight
//!
//! **Routing is a reducer.** Every registry access happens inside the store's
//! write lock, so the router is one critical section no matter how many tasks
//! deliver results. The async plumbing (acknowledgements, timers, the handler
//! queue) only ever produces actions.

pub mod actions;
pub mod environment;
pub mod guard;
pub mod hook;
pub mod reducer;
pub mod simulator;
pub mod types;

pub use actions::RelayAction;
pub use environment::RelayEnvironment;
pub use guard::LifecycleGuard;
pub use hook::{AgentHook, RelayStore};
pub use reducer::RelayReducer;
pub use types::{
    DispatchOptions, RelayState, RequestRecord, RequestState, RequestStatus, StateCallback,
};
