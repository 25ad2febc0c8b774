//! End-to-end lifecycle tests through `AgentHook`.
//!
//! Results travel the same path as in production: the mock channel calls the
//! registered handler, which queues them for the store.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use agent_relay::config::DEFAULT_HANDLER_ID;
use agent_relay::tagged::{TaggedAgent, TaggedState};
use agent_relay::{
    AgentHook, ChannelError, DispatchOptions, HandlerContext, HookOptions, LogLevel,
    MemoryLogger, Message, MessageStatus, RequestState, RequestStatus, SendUserMessageResult,
};
use agent_relay_testing::{CallbackRecorder, MockChannel, SendOutcome};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn options(logger: &Arc<MemoryLogger>) -> HookOptions {
    HookOptions::default()
        .with_logger(logger.clone())
        .with_simulation_delay(Duration::from_millis(10))
}

fn bot(content: &str) -> Message {
    Message::text("m1", "Bot", content)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn scenario_a_simulated_success() {
    let logger = Arc::new(MemoryLogger::default());
    let hook = AgentHook::simulated(options(&logger).with_error_chance(0.0));
    assert!(hook.is_simulation());

    let recorder = CallbackRecorder::<RequestState>::new();
    let id = hook
        .dispatch("@Bot hi", recorder.callback(), DispatchOptions::default())
        .await;

    // Pending is delivered before dispatch returns
    assert_eq!(recorder.recorded(), vec![RequestState::pending(id.clone())]);

    assert!(recorder.wait_for(2, WAIT).await);
    let states = recorder.recorded();
    let done = &states[1];
    assert_eq!(done.request_id, id);
    assert!(!done.generating);
    assert_eq!(done.status, RequestStatus::Complete);
    assert!(done.error.is_none());
    assert_eq!(done.responses().len(), 1);
    assert_eq!(done.responses()[0].sender_id, "SimulatedAI");
    assert!(done.responses()[0].content.contains("simulated message #1"));

    assert_eq!(hook.active_requests().await, 0);
    assert!(logger.entries_at_least(LogLevel::Warn).is_empty());
}

#[tokio::test]
async fn scenario_b_channel_failure() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new().with_outcome(SendOutcome::Fail(ChannelError::Transport(
        "Network Failed".to_string(),
    )));
    let hook = AgentHook::with_channel(channel.clone(), options(&logger));
    assert!(!hook.is_simulation());

    let recorder = CallbackRecorder::<RequestState>::new();
    hook.dispatch("@Bot hi", recorder.callback(), DispatchOptions::default())
        .await;

    // The acknowledgement is awaited, so the failure is already reported
    let states = recorder.recorded();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0].status, RequestStatus::Pending);
    assert!(!states[1].generating);
    assert_eq!(states[1].status, RequestStatus::Error);
    assert!(states[1].error.as_deref().unwrap().contains("Network Failed"));

    assert_eq!(channel.sent_count(), 1);
    assert_eq!(hook.active_requests().await, 0);
}

#[tokio::test]
async fn scenario_c_streaming_replaces_responses() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new();
    let hook = AgentHook::with_channel(channel.clone(), options(&logger));

    let recorder = CallbackRecorder::<RequestState>::new();
    let id = hook
        .dispatch("@Bot think", recorder.callback(), DispatchOptions::default())
        .await;

    assert!(channel.deliver_to_request(
        DEFAULT_HANDLER_ID,
        &id,
        SendUserMessageResult::incomplete(vec![
            bot("Thinking...").with_status(MessageStatus::Incomplete)
        ]),
    ));
    assert!(channel.deliver_to_request(
        DEFAULT_HANDLER_ID,
        &id,
        SendUserMessageResult::complete(vec![bot("Thinking... Done!")]),
    ));

    assert!(recorder.wait_for(3, WAIT).await);
    let states = recorder.recorded();
    assert_eq!(states.len(), 3);

    assert_eq!(states[1].status, RequestStatus::Streaming);
    assert!(states[1].generating);
    assert_eq!(states[1].responses()[0].content, "Thinking...");

    assert_eq!(states[2].status, RequestStatus::Complete);
    assert!(!states[2].generating);
    assert_eq!(states[2].responses().len(), 1);
    assert_eq!(states[2].responses()[0].content, "Thinking... Done!");
}

#[tokio::test]
async fn scenario_d_result_without_request_id() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new();
    let hook = AgentHook::with_channel(channel.clone(), options(&logger));

    let recorder = CallbackRecorder::<RequestState>::new();
    let id = hook
        .dispatch("@Bot hi", recorder.callback(), DispatchOptions::default())
        .await;

    channel.deliver(
        DEFAULT_HANDLER_ID,
        SendUserMessageResult::complete(vec![bot("orphan")]),
        HandlerContext::default(),
    );
    // Results are routed in order, so once this lands the orphan was handled
    channel.deliver_to_request(
        DEFAULT_HANDLER_ID,
        &id,
        SendUserMessageResult::complete(vec![bot("mine")]),
    );

    assert!(recorder.wait_for(2, WAIT).await);
    let states = recorder.recorded();
    assert_eq!(states.len(), 2);
    assert_eq!(states[1].responses()[0].content, "mine");
    assert_eq!(logger.entries_at_least(LogLevel::Warn).len(), 1);
}

// ============================================================================
// Properties over repeated trials
// ============================================================================

async fn run_trials(error_chance: f64, trials: usize) -> Vec<RequestState> {
    let logger = Arc::new(MemoryLogger::default());
    let hook = AgentHook::simulated(options(&logger).with_error_chance(error_chance));

    let mut recorders = Vec::new();
    for i in 0..trials {
        let recorder = CallbackRecorder::<RequestState>::new();
        hook.dispatch(
            format!("prompt {i}"),
            recorder.callback(),
            DispatchOptions::default(),
        )
        .await;
        recorders.push(recorder);
    }

    let mut finals = Vec::new();
    for recorder in recorders {
        assert!(recorder.wait_for(2, WAIT).await);
        assert_eq!(recorder.len(), 2, "exactly one terminal state");
        finals.push(recorder.last().unwrap());
    }
    finals
}

#[tokio::test]
async fn certain_error_chance_always_fails() {
    for state in run_trials(100.0, 25).await {
        assert_eq!(state.status, RequestStatus::Error);
        assert!(state.error.is_some());
        assert!(!state.generating);
    }
}

#[tokio::test]
async fn zero_error_chance_always_succeeds() {
    for state in run_trials(0.0, 25).await {
        assert_eq!(state.status, RequestStatus::Complete);
        assert!(state.error.is_none());
    }
}

#[tokio::test]
async fn simulated_responses_are_numbered_per_hook() {
    let finals = run_trials(0.0, 3).await;
    let ids: HashSet<_> = finals
        .iter()
        .map(|state| state.responses()[0].id.clone())
        .collect();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn request_ids_are_unique() {
    let logger = Arc::new(MemoryLogger::default());
    let hook = AgentHook::simulated(
        options(&logger).with_simulation_delay(Duration::from_secs(60)),
    );

    let mut ids = HashSet::new();
    for _ in 0..200 {
        let id = hook
            .dispatch("hi", Arc::new(|_: RequestState| {}), DispatchOptions::default())
            .await;
        assert!(ids.insert(id));
    }
    assert_eq!(hook.active_requests().await, 200);
    hook.teardown().await;
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn concurrent_requests_are_routed_independently() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new();
    let hook = AgentHook::with_channel(channel.clone(), options(&logger));

    let first = CallbackRecorder::<RequestState>::new();
    let second = CallbackRecorder::<RequestState>::new();
    let a = hook
        .dispatch("@Bot one", first.callback(), DispatchOptions::default())
        .await;
    let b = hook
        .dispatch("@Bot two", second.callback(), DispatchOptions::default())
        .await;
    assert_ne!(a, b);
    assert_eq!(hook.active_requests().await, 2);

    channel.deliver_to_request(DEFAULT_HANDLER_ID, &b, SendUserMessageResult::incomplete(vec![bot("b1")]));
    channel.deliver_to_request(DEFAULT_HANDLER_ID, &a, SendUserMessageResult::complete(vec![bot("a")]));
    channel.deliver_to_request(DEFAULT_HANDLER_ID, &b, SendUserMessageResult::complete(vec![bot("b2")]));

    assert!(first.wait_for(2, WAIT).await);
    assert!(second.wait_for(3, WAIT).await);

    assert!(first.recorded().iter().all(|state| state.request_id == a));
    assert!(second.recorded().iter().all(|state| state.request_id == b));
    assert_eq!(first.last().unwrap().responses()[0].content, "a");
    assert_eq!(second.last().unwrap().responses()[0].content, "b2");
    assert_eq!(hook.active_requests().await, 0);
}

#[tokio::test]
async fn late_results_after_completion_are_ignored() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new();
    let hook = AgentHook::with_channel(channel.clone(), options(&logger));

    let recorder = CallbackRecorder::<RequestState>::new();
    let id = hook
        .dispatch("@Bot hi", recorder.callback(), DispatchOptions::default())
        .await;
    channel.deliver_to_request(DEFAULT_HANDLER_ID, &id, SendUserMessageResult::complete(vec![]));
    channel.deliver_to_request(DEFAULT_HANDLER_ID, &id, SendUserMessageResult::error(vec![]));

    // A second request flushes the queue behind the late result
    let marker = CallbackRecorder::<RequestState>::new();
    let marker_id = hook
        .dispatch("@Bot marker", marker.callback(), DispatchOptions::default())
        .await;
    channel.deliver_to_request(DEFAULT_HANDLER_ID, &marker_id, SendUserMessageResult::complete(vec![]));
    assert!(marker.wait_for(2, WAIT).await);

    assert_eq!(recorder.len(), 2);
    assert_eq!(recorder.last().unwrap().status, RequestStatus::Complete);
}

#[tokio::test]
async fn request_state_tracks_latest_update() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new();
    let hook = AgentHook::with_channel(channel.clone(), options(&logger));

    let recorder = CallbackRecorder::<RequestState>::new();
    let id = hook
        .dispatch("@Bot hi", recorder.callback(), DispatchOptions::default())
        .await;
    assert_eq!(
        hook.request_state(&id).await.unwrap().status,
        RequestStatus::Pending
    );

    channel.deliver_to_request(DEFAULT_HANDLER_ID, &id, SendUserMessageResult::incomplete(vec![bot("so far")]));
    assert!(recorder.wait_for(2, WAIT).await);
    let current = hook.request_state(&id).await.unwrap();
    assert_eq!(current.status, RequestStatus::Streaming);
    assert_eq!(current.responses()[0].content, "so far");
}

#[tokio::test]
async fn panicking_callback_does_not_affect_other_requests() {
    let logger = Arc::new(MemoryLogger::default());
    let hook = AgentHook::simulated(options(&logger));

    #[allow(clippy::panic)] // The panic is the subject under test
    let bad = Arc::new(|_: RequestState| panic!("consumer bug"));
    hook.dispatch("bad", bad, DispatchOptions::default()).await;

    let good = CallbackRecorder::<RequestState>::new();
    hook.dispatch("good", good.callback(), DispatchOptions::default())
        .await;

    assert!(good.wait_for(2, WAIT).await);
    assert_eq!(good.last().unwrap().status, RequestStatus::Complete);
    assert!(hook.is_active());
    assert!(!logger.entries_at_least(LogLevel::Error).is_empty());
}

#[tokio::test]
async fn refused_prompt_is_reported() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new().with_outcome(SendOutcome::Reject);
    let hook = AgentHook::with_channel(channel, options(&logger));

    let recorder = CallbackRecorder::<RequestState>::new();
    hook.dispatch("@Bot hi", recorder.callback(), DispatchOptions::default())
        .await;

    let last = recorder.last().unwrap();
    assert_eq!(last.status, RequestStatus::Error);
    assert!(last.error.unwrap().starts_with("Dispatch failed: "));
}

#[tokio::test]
async fn forced_simulation_with_channel_never_sends() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new();
    let hook = AgentHook::with_channel(channel.clone(), options(&logger).with_simulation(true));
    assert!(hook.is_simulation());

    let recorder = CallbackRecorder::<RequestState>::new();
    hook.dispatch("@Bot hi", recorder.callback(), DispatchOptions::default())
        .await;

    assert!(recorder.wait_for(2, WAIT).await);
    assert_eq!(channel.sent_count(), 0);
    assert_eq!(recorder.last().unwrap().status, RequestStatus::Complete);
}

#[tokio::test]
async fn dispatch_options_reach_the_channel() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new();
    let hook = AgentHook::with_channel(channel.clone(), options(&logger).with_handler_id("panel"));
    assert_eq!(hook.handler_id(), "panel");
    assert!(channel.is_registered("panel"));

    let id = hook
        .dispatch(
            "@Bot hi",
            Arc::new(|_: RequestState| {}),
            DispatchOptions::default().with_stream(false).with_open_chat(true),
        )
        .await;

    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].options.handler, "panel");
    assert!(!sent[0].options.stream);
    assert!(sent[0].options.open_chat);
    assert_eq!(sent[0].options.handler_context.request_id, Some(id));
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn teardown_silences_in_flight_requests() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new();
    let hook = AgentHook::with_channel(channel.clone(), options(&logger));

    let recorder = CallbackRecorder::<RequestState>::new();
    let id = hook
        .dispatch("@Bot hi", recorder.callback(), DispatchOptions::default())
        .await;

    hook.teardown().await;
    assert!(!hook.is_active());
    assert!(!channel.is_registered(DEFAULT_HANDLER_ID));
    assert_eq!(hook.active_requests().await, 0);

    // The host no longer reaches the hook
    assert!(!channel.deliver_to_request(
        DEFAULT_HANDLER_ID,
        &id,
        SendUserMessageResult::complete(vec![bot("late")]),
    ));
    // Nor do results routed by hand
    hook.route(
        SendUserMessageResult::complete(vec![bot("late")]),
        HandlerContext::for_request(id),
    )
    .await;

    assert_eq!(recorder.len(), 1);
}

#[tokio::test]
async fn teardown_cancels_pending_simulations() {
    let logger = Arc::new(MemoryLogger::default());
    let hook = AgentHook::simulated(options(&logger));

    let recorder = CallbackRecorder::<RequestState>::new();
    hook.dispatch("@Bot hi", recorder.callback(), DispatchOptions::default())
        .await;
    hook.teardown().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.len(), 1);
}

#[tokio::test]
async fn teardown_is_idempotent_and_blocks_dispatch() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new();
    let hook = AgentHook::with_channel(channel.clone(), options(&logger));

    hook.teardown().await;
    hook.teardown().await;
    assert_eq!(channel.unregister_count(), 1);

    let recorder = CallbackRecorder::<RequestState>::new();
    hook.dispatch("@Bot hi", recorder.callback(), DispatchOptions::default())
        .await;
    assert!(recorder.is_empty());
    assert_eq!(channel.sent_count(), 0);
}

#[tokio::test]
async fn dropping_the_hook_unregisters() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new();
    let hook = AgentHook::with_channel(channel.clone(), options(&logger));
    assert!(channel.is_registered(DEFAULT_HANDLER_ID));

    drop(hook);
    assert!(!channel.is_registered(DEFAULT_HANDLER_ID));
}

#[tokio::test]
async fn blank_handler_id_registers_under_the_default() {
    let logger = Arc::new(MemoryLogger::default());
    let channel = MockChannel::new();
    let hook = AgentHook::with_channel(channel.clone(), options(&logger).with_handler_id(""));

    assert_eq!(hook.handler_id(), DEFAULT_HANDLER_ID);
    assert!(channel.is_registered(DEFAULT_HANDLER_ID));
    assert!(!channel.is_registered(""));
    assert_eq!(logger.entries_at_least(LogLevel::Warn).len(), 1);
}

#[tokio::test]
async fn dropping_the_hook_releases_in_flight_callbacks() {
    let logger = Arc::new(MemoryLogger::default());
    let hook = AgentHook::simulated(
        options(&logger).with_simulation_delay(Duration::from_secs(5)),
    );

    let sentinel = Arc::new(());
    let held = Arc::clone(&sentinel);
    hook.dispatch(
        "@Bot take your time",
        Arc::new(move |_: RequestState| {
            let _ = &held;
        }),
        DispatchOptions::default(),
    )
    .await;
    assert_eq!(hook.active_requests().await, 1);
    assert_eq!(Arc::strong_count(&sentinel), 2);

    // The delayed simulation task still holds the store, not the callback
    drop(hook);
    assert_eq!(Arc::strong_count(&sentinel), 1);
}

// ============================================================================
// Tagged responses
// ============================================================================

#[tokio::test]
async fn tagged_agent_parses_visible_text() {
    let logger = Arc::new(MemoryLogger::default());
    let agent = TaggedAgent::new(AgentHook::simulated(options(&logger)));

    let recorder = CallbackRecorder::<TaggedState>::new();
    agent
        .ask(
            "@Bot plan",
            vec!["summary".to_string(), "steps".to_string()],
            recorder.callback(),
            DispatchOptions::default().with_simulated_response(vec![bot(
                "<think><summary>draft</summary></think>Here you go. \
                 <summary>Ship it</summary><steps>1. Tag",
            )]),
        )
        .await;

    assert!(recorder.wait_for(2, WAIT).await);
    let pending = &recorder.recorded()[0];
    assert!(pending.blocks.blocks.is_empty());

    let done = recorder.last().unwrap();
    assert_eq!(done.request.status, RequestStatus::Complete);
    assert_eq!(done.blocks.get("summary"), Some("Ship it"));
    assert_eq!(done.blocks.get("steps"), None);
    assert_eq!(done.blocks.get_or_partial("steps"), Some("1. Tag"));
    assert_eq!(done.blocks.untagged, "Here you go.");

    agent.teardown().await;
    assert!(!agent.hook().is_active());
}
