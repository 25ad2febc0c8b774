//! Simulated chat demo
//!
//! Runs the agent relay without a host channel: every response is fabricated
//! locally after the configured delay.
//!
//! # Running the Example
//!
//! ```bash
//! RELAY_SIMULATION_DELAY_MS=300 RELAY_SIMULATION_ERROR_CHANCE=25 cargo run -p simulated-chat
//! ```

#![allow(missing_docs)]

use agent_relay::filter::visible_text;
use agent_relay::persistence::VersionedFile;
use agent_relay::tagged::{TaggedAgent, TaggedState};
use agent_relay::{
    AgentHook, DispatchOptions, HookOptions, Message, RelayConfig, RequestState, RequestStatus,
};
use agent_relay_runtime::metrics::MetricsRecorder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TRANSCRIPT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TranscriptEntry {
    prompt: String,
    status: RequestStatus,
    text: String,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simulated_chat=debug,agent_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut metrics = MetricsRecorder::new();
    metrics.install()?;
    agent_relay::metrics::describe_metrics();

    let config = RelayConfig::from_env()?;
    config.validate()?;
    tracing::info!(?config, "Loaded relay configuration");

    println!("=== Simulated Chat: Agent Relay ===\n");

    // Plain requests
    let hook = AgentHook::simulated(HookOptions::new(config.clone()));
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, RequestState)>();

    let prompts = [
        "@Bot what is the capital of France?",
        "@Bot write a haiku about borrow checking",
        "@Bot summarize the last meeting",
    ];
    for prompt in prompts {
        let tx = tx.clone();
        let label = prompt.to_string();
        let id = hook
            .dispatch(
                prompt,
                Arc::new(move |state: RequestState| {
                    let _ = tx.send((label.clone(), state));
                }),
                DispatchOptions::default(),
            )
            .await;
        println!(">>> Dispatched {id}: {prompt}");
    }
    drop(tx);

    let mut transcript = Vec::new();
    while let Some((prompt, state)) = rx.recv().await {
        println!("    {} -> {}", state.request_id, state.status);
        if state.is_terminal() {
            transcript.push(TranscriptEntry {
                prompt,
                status: state.status,
                text: visible_text(state.responses()),
                error: state.error.clone(),
            });
        }
        if transcript.len() == prompts.len() {
            break;
        }
    }
    hook.teardown().await;

    for entry in &transcript {
        println!("\n[{}] {}", entry.status, entry.prompt);
        match &entry.error {
            Some(error) => println!("  error: {error}"),
            None => println!("  {}", entry.text),
        }
    }

    // Tagged request
    let tagged = TaggedAgent::new(AgentHook::simulated(
        HookOptions::new(config).with_error_chance(0.0),
    ));
    let (tagged_tx, mut tagged_rx) = mpsc::unbounded_channel::<TaggedState>();
    tagged
        .ask(
            "@Bot plan the release. Answer in <summary> and <steps>.",
            vec!["summary".to_string(), "steps".to_string()],
            Arc::new(move |state| {
                let _ = tagged_tx.send(state);
            }),
            DispatchOptions::default().with_simulated_response(vec![Message::text(
                "plan-1",
                "Bot",
                "<think>Keep it short.</think>\
                 <summary>Ship on Friday.</summary>\
                 <steps>1. Freeze\n2. Tag\n3. Publish</steps>",
            )]),
        )
        .await;

    while let Some(state) = tagged_rx.recv().await {
        if state.request.is_terminal() {
            println!("\n[tagged] summary: {:?}", state.blocks.get("summary"));
            println!("[tagged] steps:\n{}", state.blocks.get("steps").unwrap_or("-"));
            break;
        }
    }
    tagged.teardown().await;

    // Persist the transcript
    let file = VersionedFile::<Vec<TranscriptEntry>>::new(
        std::env::temp_dir().join("simulated-chat/transcript.json"),
        TRANSCRIPT_VERSION,
    );
    file.save(&transcript).await?;
    let reloaded = file.load().await?.unwrap_or_default();
    println!(
        "\nSaved {} transcript entries to {}",
        reloaded.len(),
        file.path().display()
    );

    if let Some(rendered) = metrics.render() {
        println!("\n=== Metrics ===\n{rendered}");
    }

    Ok(())
}
