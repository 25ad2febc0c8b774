//! Core types for request lifecycle tracking.

use agent_relay_core::message::{Attachment, Message, RequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Status of a tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Dispatched, nothing received yet
    Pending,

    /// Partial results are arriving
    Streaming,

    /// Finished successfully (terminal)
    Complete,

    /// Failed at dispatch or during generation (terminal)
    Error,
}

impl RequestStatus {
    /// Whether no further updates follow this status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Lowercase name, as used in metrics labels
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one request, as delivered to its consumer callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestState {
    /// Correlation id of the request
    pub request_id: RequestId,

    /// True while more updates are expected from the agent
    pub generating: bool,

    /// Lifecycle status
    pub status: RequestStatus,

    /// Failure description, set only when `status` is `Error`
    pub error: Option<String>,

    /// Latest response snapshot, if any was received
    pub responses: Option<Vec<Message>>,
}

impl RequestState {
    /// The state handed to the callback at dispatch time
    #[must_use]
    pub const fn pending(request_id: RequestId) -> Self {
        Self {
            request_id,
            generating: true,
            status: RequestStatus::Pending,
            error: None,
            responses: None,
        }
    }

    /// Whether the request has finished
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Latest responses, or an empty slice
    #[must_use]
    pub fn responses(&self) -> &[Message] {
        self.responses.as_deref().unwrap_or_default()
    }
}

/// Consumer callback receiving every state of one request.
pub type StateCallback = Arc<dyn Fn(RequestState) + Send + Sync>;

/// Per-dispatch options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Ask the host for intermediate results (default `true`)
    pub stream: bool,

    /// Ask the host to open its chat view (default `false`)
    pub open_chat: bool,

    /// Files sent along with the prompt
    pub attachments: Vec<Attachment>,

    /// Messages a successful simulation returns instead of the configured ones
    pub simulated_response_override: Option<Vec<Message>>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            stream: true,
            open_chat: false,
            attachments: Vec::new(),
            simulated_response_override: None,
        }
    }
}

impl DispatchOptions {
    /// Builder: Set streaming
    #[must_use]
    pub const fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Builder: Set whether the host opens its chat view
    #[must_use]
    pub const fn with_open_chat(mut self, open_chat: bool) -> Self {
        self.open_chat = open_chat;
        self
    }

    /// Builder: Attach a file
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Builder: Override the simulated response
    #[must_use]
    pub fn with_simulated_response(mut self, messages: Vec<Message>) -> Self {
        self.simulated_response_override = Some(messages);
        self
    }
}

/// Registry entry: the latest state of a request and who to tell about changes.
#[derive(Clone)]
pub struct RequestRecord {
    /// Latest state
    pub state: RequestState,

    /// Consumer callback
    pub callback: StateCallback,

    /// When the request was dispatched
    pub dispatched_at: DateTime<Utc>,
}

impl fmt::Debug for RequestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRecord")
            .field("state", &self.state)
            .field("dispatched_at", &self.dispatched_at)
            .finish_non_exhaustive()
    }
}

/// State of the relay: the request registry plus lifecycle bookkeeping.
///
/// The registry is the sole authority on which requests are active. It holds
/// at most one record per request id, and a record is never resurrected once
/// removed.
#[derive(Debug, Clone, Default)]
pub struct RelayState {
    registry: HashMap<RequestId, RequestRecord>,
    torn_down: bool,
    simulations: u64,
}

impl RelayState {
    /// Create an empty, active state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning any record it replaced
    pub fn put(&mut self, request_id: RequestId, record: RequestRecord) -> Option<RequestRecord> {
        self.registry.insert(request_id, record)
    }

    /// Look up a record
    #[must_use]
    pub fn get(&self, request_id: &RequestId) -> Option<&RequestRecord> {
        self.registry.get(request_id)
    }

    /// Look up a record mutably
    pub fn get_mut(&mut self, request_id: &RequestId) -> Option<&mut RequestRecord> {
        self.registry.get_mut(request_id)
    }

    /// Remove a record
    pub fn delete(&mut self, request_id: &RequestId) -> Option<RequestRecord> {
        self.registry.remove(request_id)
    }

    /// Remove every record, returning how many were orphaned
    pub fn clear(&mut self) -> usize {
        let orphaned = self.registry.len();
        self.registry.clear();
        orphaned
    }

    /// Whether a request is active
    #[must_use]
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.registry.contains_key(request_id)
    }

    /// Number of active requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether no requests are active
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Ids of all active requests
    #[must_use]
    pub fn request_ids(&self) -> Vec<RequestId> {
        self.registry.keys().cloned().collect()
    }

    /// Whether teardown has run
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Record that teardown has run
    pub fn mark_torn_down(&mut self) {
        self.torn_down = true;
    }

    /// Number the next simulated response (1-based)
    pub fn next_simulation_number(&mut self) -> u64 {
        self.simulations += 1;
        self.simulations
    }
}
