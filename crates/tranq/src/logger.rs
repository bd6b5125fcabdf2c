use log::LevelFilter;
use std::time::Duration;
use std::time::Instant;

/// Controls how transaction lifecycles are logged.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct LogSettings {
    pub lifecycle_level: LevelFilter,
    pub slow_transactions_level: LevelFilter,
    pub slow_transactions_duration: Duration,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            lifecycle_level: LevelFilter::Debug,
            slow_transactions_level: LevelFilter::Warn,
            slow_transactions_duration: Duration::from_secs(30),
        }
    }
}

impl LogSettings {
    pub fn log_lifecycle(&mut self, level: LevelFilter) {
        self.lifecycle_level = level;
    }

    pub fn log_slow_transactions(&mut self, level: LevelFilter, duration: Duration) {
        self.slow_transactions_level = level;
        self.slow_transactions_duration = duration;
    }

    /// Returns `true` if any logging level is enabled.
    pub fn is_enabled(&self) -> bool {
        self.lifecycle_level != LevelFilter::Off
            || self.slow_transactions_level != LevelFilter::Off
    }
}

// Yes these look silly. `tracing` doesn't currently support dynamic levels
// https://github.com/tokio-rs/tracing/issues/372
#[doc(hidden)]
macro_rules! private_tracing_dynamic_enabled {
    (target: $target:expr, $level:expr) => {{
        use ::tracing::Level;

        match $level {
            Level::ERROR => ::tracing::enabled!(target: $target, Level::ERROR),
            Level::WARN => ::tracing::enabled!(target: $target, Level::WARN),
            Level::INFO => ::tracing::enabled!(target: $target, Level::INFO),
            Level::DEBUG => ::tracing::enabled!(target: $target, Level::DEBUG),
            Level::TRACE => ::tracing::enabled!(target: $target, Level::TRACE),
        }
    }};
    ($level:expr) => {{
        $crate::private_tracing_dynamic_enabled!(target: module_path!(), $level)
    }};
}

#[doc(hidden)]
macro_rules! private_tracing_dynamic_event {
    (target: $target:expr, $level:expr, $($args:tt)*) => {{
        use ::tracing::Level;

        match $level {
            Level::ERROR => ::tracing::event!(target: $target, Level::ERROR, $($args)*),
            Level::WARN => ::tracing::event!(target: $target, Level::WARN, $($args)*),
            Level::INFO => ::tracing::event!(target: $target, Level::INFO, $($args)*),
            Level::DEBUG => ::tracing::event!(target: $target, Level::DEBUG, $($args)*),
            Level::TRACE => ::tracing::event!(target: $target, Level::TRACE, $($args)*),
        }
    }};
}

#[doc(hidden)]
pub(crate) fn private_level_filter_to_levels(
    filter: log::LevelFilter,
) -> Option<(tracing::Level, log::Level)> {
    let tracing_level = match filter {
        log::LevelFilter::Error => Some(tracing::Level::ERROR),
        log::LevelFilter::Warn => Some(tracing::Level::WARN),
        log::LevelFilter::Info => Some(tracing::Level::INFO),
        log::LevelFilter::Debug => Some(tracing::Level::DEBUG),
        log::LevelFilter::Trace => Some(tracing::Level::TRACE),
        log::LevelFilter::Off => None,
    };

    tracing_level.zip(filter.to_level())
}

/// Records one transaction's lifecycle and emits a single event when the
/// transaction completes. Slow transactions are reported at the configured
/// slow-transaction level instead of the lifecycle level.
pub(crate) struct TransactionLogger {
    name: Option<String>,
    propagation: &'static str,
    start: Instant,
    settings: LogSettings,
}

impl TransactionLogger {
    pub fn new(name: Option<String>, propagation: &'static str, settings: LogSettings) -> Self {
        Self {
            name,
            propagation,
            start: Instant::now(),
            settings,
        }
    }

    pub fn finish(self, outcome: &'static str) {
        let elapsed = self.start.elapsed();

        let lvl = if elapsed >= self.settings.slow_transactions_duration {
            self.settings.slow_transactions_level
        } else {
            self.settings.lifecycle_level
        };

        if let Some((tracing_level, log_level)) = private_level_filter_to_levels(lvl) {
            // The enabled level could be set from either tracing world or log world, so check both
            // to see if logging should be enabled for our level
            let log_is_enabled = log::log_enabled!(target: "transaction", log_level)
                || private_tracing_dynamic_enabled!(target: "transaction", tracing_level);
            if log_is_enabled {
                let name = self.name.as_deref().unwrap_or("<unnamed>");

                private_tracing_dynamic_event!(
                    target: "transaction",
                    tracing_level,
                    transaction = name,
                    propagation = self.propagation,
                    outcome,
                    ?elapsed,
                );
            }
        }
    }
}
