//! Configuration for the relay.
//!
//! [`RelayConfig`] is plain data that can come from code, environment
//! variables or a TOML document. [`HookOptions`] pairs it with the
//! [`Logger`] instance the hook reports through.
//!
//! # Example
//!
//! ```
//! use agent_relay::config::RelayConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::from_toml_str(
//!     r#"
//!     simulation = true
//!     simulation_delay_ms = 250
//!     simulation_error_chance = 10
//!     "#,
//! )?;
//! assert!((config.error_probability() - 0.1).abs() < 1e-9);
//! # Ok(())
//! # }
//! ```
//!
//! # Environment variables
//!
//! | variable | field |
//! |---|---|
//! | `RELAY_SIMULATION` | `simulation` (`true`/`false`/`1`/`0`/`yes`/`no`) |
//! | `RELAY_SIMULATION_DELAY_MS` | `simulation_delay_ms` |
//! | `RELAY_SIMULATION_ERROR_CHANCE` | `simulation_error_chance` (percent) |
//! | `RELAY_HANDLER_ID` | `handler_id` |

use crate::logger::{Logger, TracingLogger};
use agent_relay_core::message::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default delay before a simulated response arrives
pub const DEFAULT_SIMULATION_DELAY_MS: u64 = 1000;

/// Default handler name registered with the host
pub const DEFAULT_HANDLER_ID: &str = "agent-relay";

/// Configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable holds an unparseable value
    #[error("Invalid value for {var}: {value}")]
    InvalidEnvVar {
        /// Variable name
        var: String,
        /// Offending value
        value: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),

    /// Failed to parse a configuration document
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Instance-wide relay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Force simulation on or off; `None` simulates only when no channel is available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<bool>,

    /// Delay before a simulated response arrives, in milliseconds
    pub simulation_delay_ms: u64,

    /// Chance that a simulated response is an error, in percent (0-100)
    pub simulation_error_chance: f64,

    /// Name of the handler registered with the host
    pub handler_id: String,

    /// Messages returned by successful simulations
    pub simulated_messages: Vec<Message>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            simulation: None,
            simulation_delay_ms: DEFAULT_SIMULATION_DELAY_MS,
            simulation_error_chance: 0.0,
            handler_id: DEFAULT_HANDLER_ID.to_string(),
            simulated_messages: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the handler id is blank or the error chance is not
    /// a number between 0 and 100.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handler_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "handler_id cannot be empty".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.simulation_error_chance) {
            return Err(ConfigError::Validation(format!(
                "simulation_error_chance must be between 0 and 100, got {}",
                self.simulation_error_chance
            )));
        }
        Ok(())
    }

    /// Copy with invalid fields replaced: a blank handler id becomes
    /// [`DEFAULT_HANDLER_ID`] and the error chance is clamped to `0..=100`
    /// (`NaN` becomes 0).
    #[must_use]
    pub fn repaired(mut self) -> Self {
        if self.handler_id.trim().is_empty() {
            self.handler_id = DEFAULT_HANDLER_ID.to_string();
        }
        self.simulation_error_chance = if self.simulation_error_chance.is_nan() {
            0.0
        } else {
            self.simulation_error_chance.clamp(0.0, 100.0)
        };
        self
    }

    /// Error chance normalised to a probability in `[0, 1]`
    #[must_use]
    pub fn error_probability(&self) -> f64 {
        if self.simulation_error_chance.is_nan() {
            return 0.0;
        }
        (self.simulation_error_chance / 100.0).clamp(0.0, 1.0)
    }

    /// Simulation delay as Duration
    #[must_use]
    pub const fn simulation_delay(&self) -> Duration {
        Duration::from_millis(self.simulation_delay_ms)
    }

    /// Load from `RELAY_*` environment variables over the defaults
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from `RELAY_*` variables resolved through `lookup`
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("RELAY_SIMULATION") {
            config.simulation = Some(parse_bool("RELAY_SIMULATION", &value)?);
        }
        if let Some(value) = lookup("RELAY_SIMULATION_DELAY_MS") {
            config.simulation_delay_ms = value.trim().parse().map_err(|_| {
                ConfigError::InvalidEnvVar {
                    var: "RELAY_SIMULATION_DELAY_MS".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = lookup("RELAY_SIMULATION_ERROR_CHANCE") {
            config.simulation_error_chance = value.trim().parse().map_err(|_| {
                ConfigError::InvalidEnvVar {
                    var: "RELAY_SIMULATION_ERROR_CHANCE".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = lookup("RELAY_HANDLER_ID") {
            config.handler_id = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or the result is invalid.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Options for one [`AgentHook`](crate::AgentHook) instance.
#[derive(Clone)]
pub struct HookOptions {
    /// Relay settings
    pub config: RelayConfig,
    /// Where diagnostics go
    pub logger: Arc<dyn Logger>,
}

impl HookOptions {
    /// Options from a configuration, logging through `tracing`
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            logger: Arc::new(TracingLogger),
        }
    }

    /// Builder: Use `logger` for diagnostics
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Builder: Force simulation on or off
    #[must_use]
    pub const fn with_simulation(mut self, simulation: bool) -> Self {
        self.config.simulation = Some(simulation);
        self
    }

    /// Builder: Set the simulation delay
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Delays beyond u64 millis are not meaningful
    pub const fn with_simulation_delay(mut self, delay: Duration) -> Self {
        self.config.simulation_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Builder: Set the simulated error chance in percent
    #[must_use]
    pub const fn with_error_chance(mut self, percent: f64) -> Self {
        self.config.simulation_error_chance = percent;
        self
    }

    /// Builder: Set the default simulated messages
    #[must_use]
    pub fn with_simulated_messages(mut self, messages: Vec<Message>) -> Self {
        self.config.simulated_messages = messages;
        self
    }

    /// Builder: Set the handler identifier
    #[must_use]
    pub fn with_handler_id(mut self, handler_id: impl Into<String>) -> Self {
        self.config.handler_id = handler_id.into();
        self
    }

    /// Whether the hook simulates, given whether a host channel exists
    #[must_use]
    pub const fn resolve_simulation(&self, channel_available: bool) -> bool {
        match self.config.simulation {
            Some(explicit) => explicit,
            None => !channel_available,
        }
    }
}

impl Default for HookOptions {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl fmt::Debug for HookOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookOptions")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
