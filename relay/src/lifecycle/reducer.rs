//! Reducer for request lifecycle tracking.
//!
//! Every registry read and write happens here, inside the store's write lock,
//! so the router is a single critical section even though results arrive
//! from many tasks. Consumer callbacks are invoked inside that section, which
//! is what keeps per-request deliveries in order.

use crate::lifecycle::simulator;
use crate::lifecycle::{
    DispatchOptions, RelayAction, RelayEnvironment, RelayState, RequestRecord, RequestState,
    RequestStatus, StateCallback,
};
use crate::logger::Logger;
use agent_relay_core::catch::{try_catch, try_catch_async};
use agent_relay_core::channel::{HandlerContext, SendOptions};
use agent_relay_core::message::{Message, RequestId, ResultStatus, SendUserMessageResult};
use agent_relay_core::{effect::Effect, reducer::Reducer};
use crate::metrics::RelayMetrics;
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

/// Prefix distinguishing dispatch-time failures from generation-time ones
pub const DISPATCH_FAILURE_PREFIX: &str = "Dispatch failed: ";

/// Error reported when dispatching without a channel outside simulation
pub const CHANNEL_UNAVAILABLE: &str = "channel unavailable";

/// Error reported when the agent fails without any failed message to cite
pub const GENERIC_GENERATION_ERROR: &str = "The agent reported an error without details";

/// Reducer tracking every in-flight request of one hook.
///
/// Handles:
/// - Dispatch: seed the registry, deliver the pending state, then send or simulate
/// - Routing: turn each result into the next state and deliver it
/// - Eviction: drop a record the moment its state is terminal
/// - Teardown: orphan everything still in flight
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayReducer;

impl RelayReducer {
    /// Create a new relay reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn dispatch(
        state: &mut RelayState,
        request_id: RequestId,
        prompt: String,
        callback: StateCallback,
        options: DispatchOptions,
        env: &RelayEnvironment,
    ) -> SmallVec<[Effect<RelayAction>; 4]> {
        if state.is_torn_down() || !env.guard().is_active() {
            env.logger()
                .warn(&format!("Dispatch of request {request_id} after teardown; ignoring"));
            return smallvec![Effect::None];
        }

        let pending = RequestState::pending(request_id.clone());
        let replaced = state.put(
            request_id.clone(),
            RequestRecord {
                state: pending.clone(),
                callback: Arc::clone(&callback),
                dispatched_at: env.clock().now(),
            },
        );
        if replaced.is_some() {
            env.logger()
                .warn(&format!("Request id {request_id} was reused; previous request orphaned"));
        }
        RelayMetrics::record_active(&env.config().handler_id, state.len());

        invoke_callback(&callback, pending.clone(), &request_id, env.logger());

        if env.simulation() {
            RelayMetrics::record_dispatch("simulated");
            env.logger().debug(&format!(
                "Simulating request {request_id} ({}ms)",
                env.config().simulation_delay_ms
            ));
            return smallvec![Effect::Delay {
                duration: env.config().simulation_delay(),
                action: Box::new(RelayAction::SimulationElapsed {
                    request_id,
                    override_messages: options.simulated_response_override,
                }),
            }];
        }

        let Some(channel) = env.channel() else {
            RelayMetrics::record_dispatch("unavailable");
            env.logger()
                .error(&format!("Cannot dispatch request {request_id}: {CHANNEL_UNAVAILABLE}"));
            let failed = dispatch_failure(&pending, CHANNEL_UNAVAILABLE);
            apply_transition(state, &request_id, failed, env);
            return smallvec![Effect::None];
        };

        RelayMetrics::record_dispatch("channel");
        let channel = Arc::clone(channel);
        let send_options = SendOptions {
            handler: env.config().handler_id.clone(),
            stream: options.stream,
            open_chat: options.open_chat,
            attachments: options.attachments,
            handler_context: HandlerContext::for_request(request_id.clone()),
        };

        smallvec![Effect::Future(Box::pin(async move {
            match try_catch_async(channel.send_message(prompt, send_options)).await {
                Ok(Ok(ack)) if ack.success => None,
                Ok(Ok(_)) => Some(RelayAction::DispatchFailed {
                    request_id,
                    error: "the host refused the prompt".to_string(),
                }),
                Ok(Err(error)) => Some(RelayAction::DispatchFailed {
                    request_id,
                    error: error.to_string(),
                }),
                Err(panic) => Some(RelayAction::DispatchFailed {
                    request_id,
                    error: panic.to_string(),
                }),
            }
        }))]
    }

    fn dispatch_failed(
        state: &mut RelayState,
        request_id: &RequestId,
        error: &str,
        env: &RelayEnvironment,
    ) {
        if state.is_torn_down() || !env.guard().is_active() {
            return;
        }
        let Some(record) = state.get(request_id) else {
            env.logger().debug(&format!(
                "Dispatch failure for inactive request {request_id}: {error}"
            ));
            return;
        };

        env.logger()
            .error(&format!("Dispatch of request {request_id} failed: {error}"));
        let failed = dispatch_failure(&record.state, error);
        apply_transition(state, request_id, failed, env);
    }

    fn simulation_elapsed(
        state: &mut RelayState,
        request_id: RequestId,
        override_messages: Option<Vec<Message>>,
        env: &RelayEnvironment,
    ) {
        if state.is_torn_down() || !env.guard().is_active() {
            return;
        }
        if !state.contains(&request_id) {
            env.logger()
                .debug(&format!("Simulation of evicted request {request_id} skipped"));
            return;
        }

        let sequence = state.next_simulation_number();
        let roll = env.random().next_f64();
        let result = simulator::fabricate(
            sequence,
            roll,
            env.config().error_probability(),
            override_messages,
            &env.config().simulated_messages,
        );

        route(state, result, HandlerContext::for_request(request_id), env);
    }
}

impl Reducer for RelayReducer {
    type State = RelayState;
    type Action = RelayAction;
    type Environment = RelayEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            RelayAction::Dispatch {
                request_id,
                prompt,
                callback,
                options,
            } => Self::dispatch(state, request_id, prompt, callback, options, env),

            RelayAction::ResultReceived { result, context } => {
                route(state, result, context, env);
                smallvec![Effect::None]
            },

            RelayAction::DispatchFailed { request_id, error } => {
                Self::dispatch_failed(state, &request_id, &error, env);
                smallvec![Effect::None]
            },

            RelayAction::SimulationElapsed {
                request_id,
                override_messages,
            } => {
                Self::simulation_elapsed(state, request_id, override_messages, env);
                smallvec![Effect::None]
            },

            RelayAction::TearDown => {
                state.mark_torn_down();
                let orphaned = state.clear();
                RelayMetrics::record_active(&env.config().handler_id, 0);
                if orphaned > 0 {
                    env.logger()
                        .info(&format!("Torn down with {orphaned} request(s) in flight"));
                }
                smallvec![Effect::None]
            },
        }
    }
}

/// Route one result (real or simulated) to its request.
///
/// Checks run in order: a result without a request id is logged and dropped;
/// once the hook is torn down every result is dropped silently, before any
/// registry lookup, so late deliveries from a discarded view are not reported
/// as unknown ids; otherwise an id missing from the registry is logged as
/// unknown and dropped.
fn route(
    state: &mut RelayState,
    result: SendUserMessageResult,
    context: HandlerContext,
    env: &RelayEnvironment,
) {
    let Some(request_id) = context.request_id else {
        RelayMetrics::record_discard("missing_request_id");
        env.logger().warn(&format!(
            "Received a {} result without a requestId; discarding",
            result.status
        ));
        return;
    };

    if state.is_torn_down() || !env.guard().is_active() {
        RelayMetrics::record_discard("torn_down");
        return;
    }

    let Some(record) = state.get(&request_id) else {
        RelayMetrics::record_discard("unknown_request");
        env.logger().warn(&format!(
            "Received a {} result for unknown request {request_id}; discarding",
            result.status
        ));
        return;
    };

    let next = next_state(&record.state, result, env.logger());
    apply_transition(state, &request_id, next, env);
}

/// Compute the state following `previous` once `result` arrives.
///
/// - `generating` is true only while the result is incomplete
/// - an unrecognized status is treated as an error
/// - a non-empty snapshot replaces the previous responses; an empty one keeps them
/// - `error` is set only for error results
#[must_use]
pub fn next_state(
    previous: &RequestState,
    result: SendUserMessageResult,
    logger: &dyn Logger,
) -> RequestState {
    let (status, diagnostic) = match result.status {
        ResultStatus::Incomplete => (RequestStatus::Streaming, None),
        ResultStatus::Complete => (RequestStatus::Complete, None),
        ResultStatus::Error => (RequestStatus::Error, None),
        ResultStatus::Unrecognized(other) => {
            logger.warn(&format!(
                "Unrecognized result status {other:?} for request {}; treating as error",
                previous.request_id
            ));
            (
                RequestStatus::Error,
                Some(format!("Unrecognized result status: {other}")),
            )
        },
    };

    let error = (status == RequestStatus::Error).then(|| {
        aggregate_errors(&result.responses)
            .or(diagnostic)
            .unwrap_or_else(|| GENERIC_GENERATION_ERROR.to_string())
    });

    let responses = if result.responses.is_empty() {
        previous.responses.clone()
    } else {
        Some(result.responses)
    };

    RequestState {
        request_id: previous.request_id.clone(),
        generating: status == RequestStatus::Streaming,
        status,
        error,
        responses,
    }
}

/// One `[<sender> Error]: <text>` line per failed message, or `None` if none failed.
#[must_use]
pub fn aggregate_errors(responses: &[Message]) -> Option<String> {
    let lines: Vec<String> = responses
        .iter()
        .filter(|message| message.is_error())
        .map(|message| {
            let sender = if message.sender_id.is_empty() {
                "Bot"
            } else {
                message.sender_id.as_str()
            };
            let text = message
                .status_text
                .as_deref()
                .filter(|text| !text.is_empty())
                .unwrap_or("Unknown error");
            format!("[{sender} Error]: {text}")
        })
        .collect();

    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn dispatch_failure(previous: &RequestState, error: &str) -> RequestState {
    RequestState {
        request_id: previous.request_id.clone(),
        generating: false,
        status: RequestStatus::Error,
        error: Some(format!("{DISPATCH_FAILURE_PREFIX}{error}")),
        responses: previous.responses.clone(),
    }
}

/// Persist `next`, deliver it, and evict the record if `next` is terminal.
///
/// The only eviction path besides teardown.
fn apply_transition(
    state: &mut RelayState,
    request_id: &RequestId,
    next: RequestState,
    env: &RelayEnvironment,
) {
    let Some(record) = state.get_mut(request_id) else {
        return;
    };
    record.state = next.clone();
    let callback = Arc::clone(&record.callback);
    let dispatched_at = record.dispatched_at;

    let terminal = next.is_terminal();
    let status = next.status;
    invoke_callback(&callback, next, request_id, env.logger());

    if terminal {
        state.delete(request_id);
        RelayMetrics::record_completion(status.as_str());
        RelayMetrics::record_active(&env.config().handler_id, state.len());

        let elapsed = env.clock().now() - dispatched_at;
        env.logger().debug(&format!(
            "Request {request_id} finished with status {status} after {}ms",
            elapsed.num_milliseconds()
        ));
    }
}

fn invoke_callback(
    callback: &StateCallback,
    request_state: RequestState,
    request_id: &RequestId,
    logger: &dyn Logger,
) {
    if let Err(panic) = try_catch(|| callback(request_state)) {
        RelayMetrics::record_callback_panic();
        logger.error(&format!("State callback for request {request_id} {panic}"));
    }
}
