//! Per-request AI response tracking over a shared host message channel.
//!
//! An embedded application sends prompts to a remote agent through a host
//! platform that exposes a single result handler for everything it sends.
//! This crate correlates each result back to the prompt that caused it and
//! delivers one ordered stream of states per request.
//!
//! ## Modules
//!
//! - `lifecycle`: request registry, response router, simulator and the
//!   consumer-facing [`AgentHook`]
//! - `config`: [`RelayConfig`] (TOML or environment) and per-hook [`HookOptions`]
//! - `logger`: leveled diagnostics sink ([`TracingLogger`], [`MemoryLogger`])
//! - `filter`: strips `<think>` blocks from agent output
//! - `metrics`: request lifecycle metrics ([`RelayMetrics`])
//! - `persistence`: versioned JSON files with atomic saves
//! - `tagged`: extracts `<tag>` blocks from responses ([`TaggedAgent`])
//!
//! ## Example
//!
//! ```no_run
//! use agent_relay::{AgentHook, DispatchOptions, HookOptions, RequestState, RequestStatus};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let hook = AgentHook::simulated(HookOptions::default());
//!
//! hook.dispatch(
//!     "@Bot summarize the thread",
//!     Arc::new(|state: RequestState| {
//!         if state.status == RequestStatus::Complete {
//!             println!("{}", agent_relay::filter::visible_text(state.responses()));
//!         }
//!     }),
//!     DispatchOptions::default(),
//! )
//! .await;
//! # }
//! ```

pub mod config;
pub mod filter;
pub mod lifecycle;
pub mod logger;
pub mod metrics;
pub mod persistence;
pub mod tagged;

// Re-export commonly used types
pub use config::{ConfigError, HookOptions, RelayConfig};
pub use lifecycle::{
    AgentHook, DispatchOptions, RelayAction, RelayEnvironment, RequestState, RequestStatus,
    StateCallback,
};
pub use logger::{LogEntry, LogLevel, Logger, MemoryLogger, TracingLogger};
pub use metrics::RelayMetrics;
pub use persistence::{PersistenceError, VersionedFile};
pub use tagged::{TaggedAgent, TaggedBlocks, TaggedState};

pub use agent_relay_core::catch::{try_catch, try_catch_async, try_catch_result, CaughtPanic};
pub use agent_relay_core::channel::{
    ChannelError, ExternalChannel, HandlerContext, SendAck, SendOptions,
};
pub use agent_relay_core::message::{
    Attachment, ContentType, Message, MessageStatus, RequestId, ResultStatus,
    SendUserMessageResult,
};
