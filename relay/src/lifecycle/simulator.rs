//! Local fabrication of agent results.
//!
//! Used when the host channel is unavailable or simulation is forced. A
//! simulation produces a single terminal result; there are no streaming ticks.

use agent_relay_core::message::{Message, MessageStatus, SendUserMessageResult};

/// Sender id of fabricated messages
pub const SIMULATED_SENDER: &str = "SimulatedAI";

/// Build the result of the `sequence`-th simulation.
///
/// `roll` is a uniform draw in `[0, 1)`; the result is an error when it falls
/// below `error_probability`. Otherwise the first non-empty of
/// `override_messages` and `defaults` is returned, falling back to a single
/// placeholder message.
#[must_use]
pub fn fabricate(
    sequence: u64,
    roll: f64,
    error_probability: f64,
    override_messages: Option<Vec<Message>>,
    defaults: &[Message],
) -> SendUserMessageResult {
    if roll < error_probability {
        return SendUserMessageResult::error(vec![
            Message::text(
                format!("simulated-error-{sequence}"),
                SIMULATED_SENDER,
                "The simulated agent failed to respond.",
            )
            .with_status(MessageStatus::Error)
            .with_status_text(format!(
                "Simulated error (rolled {roll:.3} against error probability {error_probability:.3})"
            )),
        ]);
    }

    let messages = match override_messages {
        Some(messages) if !messages.is_empty() => messages,
        _ if !defaults.is_empty() => defaults.to_vec(),
        _ => vec![placeholder(sequence)],
    };
    SendUserMessageResult::complete(messages)
}

/// Generic stand-in response, unique per simulation
#[must_use]
pub fn placeholder(sequence: u64) -> Message {
    Message::text(
        format!("simulated-{sequence}"),
        SIMULATED_SENDER,
        format!(
            "This is simulated message #{sequence}. No agent channel is connected, \
             so this response was generated locally."
        ),
    )
}
