//! Environment for the relay reducer.

use crate::config::{ConfigError, HookOptions, RelayConfig};
use crate::lifecycle::guard::LifecycleGuard;
use crate::logger::Logger;
use agent_relay_core::channel::ExternalChannel;
use agent_relay_core::environment::{
    Clock, IdGenerator, RandomSource, SystemClock, ThreadRandom, TimestampIdGenerator,
};
use std::fmt;
use std::sync::Arc;

/// Injected dependencies of the relay reducer.
///
/// Production uses the system clock, timestamp ids and the thread RNG; tests
/// swap them for the deterministic versions in `agent-relay-testing`.
///
/// Clones share everything, including the lifecycle guard.
#[derive(Clone)]
pub struct RelayEnvironment {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    random: Arc<dyn RandomSource>,
    channel: Option<Arc<dyn ExternalChannel>>,
    logger: Arc<dyn Logger>,
    config: Arc<RelayConfig>,
    simulation: bool,
    guard: LifecycleGuard,
}

impl RelayEnvironment {
    /// Create a production environment.
    ///
    /// Simulation is resolved here, once: the explicit flag if configured,
    /// otherwise on exactly when `channel` is `None`.
    ///
    /// An invalid configuration is reported through the configured logger
    /// and repaired: a blank handler id falls back to
    /// [`DEFAULT_HANDLER_ID`](crate::config::DEFAULT_HANDLER_ID), and the error chance is clamped to
    /// `0..=100` (`NaN` becomes 0). Use [`try_new`](Self::try_new) to reject
    /// it instead.
    #[must_use]
    pub fn new(mut options: HookOptions, channel: Option<Arc<dyn ExternalChannel>>) -> Self {
        if let Err(error) = options.config.validate() {
            options
                .logger
                .warn(&format!("{error}; using repaired settings"));
            options.config = options.config.repaired();
        }
        Self::assemble(options, channel)
    }

    /// Like [`new`](Self::new), but an invalid configuration is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the configuration is invalid.
    pub fn try_new(
        options: HookOptions,
        channel: Option<Arc<dyn ExternalChannel>>,
    ) -> Result<Self, ConfigError> {
        options.config.validate()?;
        Ok(Self::assemble(options, channel))
    }

    fn assemble(options: HookOptions, channel: Option<Arc<dyn ExternalChannel>>) -> Self {
        let simulation = options.resolve_simulation(channel.is_some());
        Self {
            clock: Arc::new(SystemClock),
            ids: Arc::new(TimestampIdGenerator::new()),
            random: Arc::new(ThreadRandom),
            channel,
            logger: options.logger,
            config: Arc::new(options.config),
            simulation,
            guard: LifecycleGuard::new(),
        }
    }

    /// Builder: Use `clock` for timestamps
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builder: Use `ids` for request identifiers
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Builder: Use `random` for simulated error rolls
    #[must_use]
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Clock for timestamps
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Request id generator
    #[must_use]
    pub fn ids(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }

    /// Random source for simulated error rolls
    #[must_use]
    pub fn random(&self) -> &dyn RandomSource {
        self.random.as_ref()
    }

    /// Host channel, if one is available
    #[must_use]
    pub const fn channel(&self) -> Option<&Arc<dyn ExternalChannel>> {
        self.channel.as_ref()
    }

    /// Diagnostics sink
    #[must_use]
    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    /// Relay settings
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Whether results are fabricated locally
    #[must_use]
    pub const fn simulation(&self) -> bool {
        self.simulation
    }

    /// Lifecycle token of the owning hook
    #[must_use]
    pub const fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }
}

impl fmt::Debug for RelayEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayEnvironment")
            .field("config", &self.config)
            .field("simulation", &self.simulation)
            .field("channel", &self.channel.is_some())
            .field("active", &self.guard.is_active())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use crate::config::DEFAULT_HANDLER_ID;
    use crate::logger::{LogLevel, MemoryLogger};

    fn options(logger: &Arc<MemoryLogger>) -> HookOptions {
        HookOptions::default().with_logger(logger.clone())
    }

    #[test]
    fn test_valid_config_is_used_silently() {
        let logger = Arc::new(MemoryLogger::default());
        let env = RelayEnvironment::new(options(&logger).with_error_chance(40.0), None);

        assert!((env.config().error_probability() - 0.4).abs() < f64::EPSILON);
        assert!(logger.entries_at_least(LogLevel::Warn).is_empty());
    }

    #[test]
    fn test_invalid_config_is_reported_and_repaired() {
        let logger = Arc::new(MemoryLogger::default());
        let env = RelayEnvironment::new(
            options(&logger).with_error_chance(150.0).with_handler_id(" "),
            None,
        );

        let warnings = logger.entries_at_least(LogLevel::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("handler_id cannot be empty"));
        assert_eq!(env.config().handler_id, DEFAULT_HANDLER_ID);
        assert!((env.config().simulation_error_chance - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_nan_error_chance_is_reported() {
        let logger = Arc::new(MemoryLogger::default());
        let env = RelayEnvironment::new(options(&logger).with_error_chance(f64::NAN), None);

        assert_eq!(logger.entries_at_least(LogLevel::Warn).len(), 1);
        assert!(env.config().simulation_error_chance.abs() < f64::EPSILON);
    }

    #[test]
    fn test_try_new_rejects_invalid_config() {
        let logger = Arc::new(MemoryLogger::default());
        let err = RelayEnvironment::try_new(options(&logger).with_error_chance(-1.0), None)
            .unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(logger.entries().is_empty());
        assert!(RelayEnvironment::try_new(options(&logger), None).is_ok());
    }
}
