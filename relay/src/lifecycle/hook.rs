//! The consumer-facing hook.

use crate::config::HookOptions;
use crate::lifecycle::{
    DispatchOptions, RelayAction, RelayEnvironment, RelayReducer, RelayState, RequestState,
    StateCallback,
};
use crate::metrics::RelayMetrics;
use agent_relay_core::channel::{ExternalChannel, HandlerContext, ResultHandler, Unregister};
use agent_relay_core::message::{RequestId, SendUserMessageResult};
use agent_relay_runtime::{Store, StoreError};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Store type driving a hook
pub type RelayStore = Store<RelayState, RelayAction, RelayEnvironment, RelayReducer>;

/// Dispatches prompts to a remote agent and tracks each request's lifecycle.
///
/// One hook owns one registry and registers one handler with the host. Results
/// delivered to that handler are queued and reduced one at a time, so the
/// updates of any single request reach its callback in arrival order.
///
/// # Example
///
/// ```no_run
/// use agent_relay::{AgentHook, DispatchOptions, HookOptions, RequestState};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let hook = AgentHook::simulated(HookOptions::default());
///
/// hook.dispatch(
///     "@Bot hi",
///     Arc::new(|state: RequestState| println!("{:?}: {:?}", state.status, state.responses)),
///     DispatchOptions::default(),
/// )
/// .await;
///
/// // ... later, when the owning view goes away
/// hook.teardown().await;
/// # }
/// ```
///
/// # Runtime
///
/// Constructing a hook with a channel spawns a task on the current Tokio
/// runtime, so it must happen inside one.
pub struct AgentHook {
    store: RelayStore,
    env: RelayEnvironment,
    unregister: Mutex<Option<Unregister>>,
}

impl AgentHook {
    /// Create a hook over an optional host channel.
    ///
    /// Without a channel (and without an explicit simulation flag) the hook
    /// simulates every response.
    #[must_use]
    pub fn new(channel: Option<Arc<dyn ExternalChannel>>, options: HookOptions) -> Self {
        Self::from_environment(RelayEnvironment::new(options, channel))
    }

    /// Create a hook over a host channel
    #[must_use]
    pub fn with_channel(channel: impl ExternalChannel + 'static, options: HookOptions) -> Self {
        Self::new(Some(Arc::new(channel)), options)
    }

    /// Create a hook without a host channel
    #[must_use]
    pub fn simulated(options: HookOptions) -> Self {
        Self::new(None, options)
    }

    /// Create a hook over a prepared environment (custom clock, ids or randomness)
    #[must_use]
    pub fn from_environment(env: RelayEnvironment) -> Self {
        let store = Store::new(RelayState::new(), RelayReducer::new(), env.clone());

        let unregister = match env.channel() {
            Some(channel) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let handler: ResultHandler = Arc::new(move |result, context| {
                    // A closed queue means the hook is gone; the host may still call
                    let _ = tx.send((result, context));
                });
                let unregister = channel.register_handler(&env.config().handler_id, handler);
                tokio::spawn(pump_results(store.clone(), rx));
                unregister
            },
            None => Unregister::noop(),
        };

        tracing::debug!(
            handler_id = %env.config().handler_id,
            simulation = env.simulation(),
            "Agent hook created"
        );

        Self {
            store,
            env,
            unregister: Mutex::new(Some(unregister)),
        }
    }

    /// Dispatch a prompt and track its lifecycle through `callback`.
    ///
    /// `callback` receives the pending state before this returns, then one
    /// state per routed result until the request is complete or failed. When
    /// sending through the host, this also waits for the host's
    /// acknowledgement, so a refused prompt has already been reported as an
    /// error by the time it returns.
    ///
    /// After [`teardown`](Self::teardown) nothing is dispatched and the
    /// callback is never invoked; the returned id is not tracked.
    pub async fn dispatch(
        &self,
        prompt: impl Into<String>,
        callback: StateCallback,
        options: DispatchOptions,
    ) -> RequestId {
        let request_id = self.env.ids().next_request_id();

        if !self.env.guard().is_active() {
            self.env.logger().warn(&format!(
                "Dispatch of request {request_id} after teardown; ignoring"
            ));
            return request_id;
        }

        let action = RelayAction::Dispatch {
            request_id: request_id.clone(),
            prompt: prompt.into(),
            callback,
            options,
        };

        match self.store.send(action).await {
            Ok(mut handle) => {
                if !self.env.simulation() {
                    handle.wait().await;
                }
            },
            Err(StoreError::Closed | StoreError::Timeout) => {
                self.env.logger().warn(&format!(
                    "Dispatch of request {request_id} after teardown; ignoring"
                ));
            },
        }

        request_id
    }

    /// Route a result as if the host had delivered it to the handler.
    ///
    /// Results without a request id, for unknown or finished requests, or
    /// arriving after teardown are discarded.
    pub async fn route(&self, result: SendUserMessageResult, context: HandlerContext) {
        let _ = self
            .store
            .send(RelayAction::ResultReceived { result, context })
            .await;
    }

    /// Tear the hook down.
    ///
    /// In order: deregister from the host, deactivate the lifecycle guard,
    /// clear the registry. In-flight requests are orphaned and their callbacks
    /// never fire again. Idempotent.
    pub async fn teardown(&self) {
        self.unregister_handler();
        if !self.env.guard().deactivate() {
            return;
        }

        let _ = self.store.send(RelayAction::TearDown).await;
        self.store.close();

        tracing::debug!(handler_id = %self.env.config().handler_id, "Agent hook torn down");
    }

    /// Whether the hook has not been torn down
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.env.guard().is_active()
    }

    /// Whether results are fabricated locally
    #[must_use]
    pub const fn is_simulation(&self) -> bool {
        self.env.simulation()
    }

    /// Name of the handler registered with the host
    #[must_use]
    pub fn handler_id(&self) -> &str {
        &self.env.config().handler_id
    }

    /// Number of requests in flight
    pub async fn active_requests(&self) -> usize {
        self.store.state(RelayState::len).await
    }

    /// Latest state of an in-flight request
    pub async fn request_state(&self, request_id: &RequestId) -> Option<RequestState> {
        self.store
            .state(|state| state.get(request_id).map(|record| record.state.clone()))
            .await
    }

    fn unregister_handler(&self) {
        let unregister = self
            .unregister
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(unregister) = unregister {
            unregister.unregister();
        }
    }
}

/// Synchronous teardown: unregister, deactivate, then clear the registry.
///
/// Clearing drops every in-flight record and its callback right away, even
/// while delayed simulation tasks still hold the store.
impl Drop for AgentHook {
    fn drop(&mut self) {
        self.unregister_handler();
        self.env.guard().deactivate();

        let handler_id = self.env.config().handler_id.clone();
        self.store.close_with(move |state| {
            state.mark_torn_down();
            state.clear();
            RelayMetrics::record_active(&handler_id, 0);
        });
    }
}

impl fmt::Debug for AgentHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHook")
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

/// Feed handler deliveries into the store, one at a time.
///
/// Ends when the handler is dropped by the host or the store closes.
async fn pump_results(
    store: RelayStore,
    mut rx: mpsc::UnboundedReceiver<(SendUserMessageResult, HandlerContext)>,
) {
    while let Some((result, context)) = rx.recv().await {
        if store
            .send(RelayAction::ResultReceived { result, context })
            .await
            .is_err()
        {
            break;
        }
    }
    tracing::trace!("Result pump stopped");
}
