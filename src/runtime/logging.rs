// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured logging of remote calls.
//!
//! A [`RequestLogger`] is the log sink handed to the client when it is dialed.
//! Every round trip to the session (property retrieval, method invocation,
//! subscription primitives) is timed and logged, and counted in
//! [`CallMetrics`].
//!
//! # Example
//!
//! ```
//! use vsphere_api_rs::runtime::{LogLevel, LoggingConfig, RequestLogger};
//!
//! let logger = RequestLogger::with_config(
//!     LoggingConfig::new()
//!         .with_success_level(LogLevel::Debug)
//!         .with_error_level(LogLevel::Warn),
//! );
//!
//! let span = logger.start("RetrieveProperties");
//! logger.finish_success(span);
//! assert_eq!(logger.metrics().successful_calls(), 1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

const TARGET: &str = "vsphere_api::session";

/// Log level for call logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Trace level - most verbose.
    Trace,
    /// Debug level.
    #[default]
    Debug,
    /// Info level.
    Info,
    /// Warn level.
    Warn,
    /// Error level - only errors.
    Error,
    /// Disabled - no logging.
    Off,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Off => write!(f, "OFF"),
        }
    }
}

fn emit(level: LogLevel, msg: &str) {
    match level {
        LogLevel::Trace => trace!(target: TARGET, "{}", msg),
        LogLevel::Debug => debug!(target: TARGET, "{}", msg),
        LogLevel::Info => info!(target: TARGET, "{}", msg),
        LogLevel::Warn => warn!(target: TARGET, "{}", msg),
        LogLevel::Error => error!(target: TARGET, "{}", msg),
        LogLevel::Off => {}
    }
}

/// Configuration for call logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level for completed calls.
    pub success_level: LogLevel,
    /// Log level for failed calls.
    pub error_level: LogLevel,
    /// Whether to log the start of each call as well as its completion.
    pub log_start: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            success_level: LogLevel::Debug,
            error_level: LogLevel::Warn,
            log_start: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the success log level.
    #[must_use]
    pub fn with_success_level(mut self, level: LogLevel) -> Self {
        self.success_level = level;
        self
    }

    /// Set the error log level.
    #[must_use]
    pub fn with_error_level(mut self, level: LogLevel) -> Self {
        self.error_level = level;
        self
    }

    /// Enable or disable logging when a call starts.
    #[must_use]
    pub fn with_start(mut self, enabled: bool) -> Self {
        self.log_start = enabled;
        self
    }

    /// Log every call, including its start.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            success_level: LogLevel::Trace,
            error_level: LogLevel::Error,
            log_start: true,
        }
    }

    /// Only log failures.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            success_level: LogLevel::Off,
            error_level: LogLevel::Warn,
            log_start: false,
        }
    }
}

/// Call counters.
#[derive(Debug, Default)]
pub struct CallMetrics {
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
}

impl CallMetrics {
    /// Create a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.successful_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Total number of calls.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    /// Number of successful calls.
    #[must_use]
    pub fn successful_calls(&self) -> u64 {
        self.successful_calls.load(Ordering::Relaxed)
    }

    /// Number of failed calls.
    #[must_use]
    pub fn failed_calls(&self) -> u64 {
        self.failed_calls.load(Ordering::Relaxed)
    }

    /// Success rate (0.0 to 1.0).
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.total_calls.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        let successful = self.successful_calls.load(Ordering::Relaxed);
        successful as f64 / total as f64
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.total_calls.store(0, Ordering::Relaxed);
        self.successful_calls.store(0, Ordering::Relaxed);
        self.failed_calls.store(0, Ordering::Relaxed);
    }
}

/// Times, logs and counts remote calls.
#[derive(Debug, Default)]
pub struct RequestLogger {
    config: LoggingConfig,
    metrics: CallMetrics,
}

impl RequestLogger {
    /// Create a logger with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logger with a custom configuration.
    #[must_use]
    pub fn with_config(config: LoggingConfig) -> Self {
        Self {
            config,
            metrics: CallMetrics::new(),
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    /// The call counters.
    #[must_use]
    pub fn metrics(&self) -> &CallMetrics {
        &self.metrics
    }

    /// Start tracking a call.
    #[must_use]
    pub fn start(&self, method: &str) -> RequestSpan {
        if self.config.log_start {
            emit(self.config.success_level, &format!("call: {method}"));
        }
        RequestSpan {
            method: method.to_string(),
            start: Instant::now(),
        }
    }

    /// Finish tracking a call that succeeded.
    pub fn finish_success(&self, span: RequestSpan) {
        self.metrics.record_success();
        if self.config.success_level == LogLevel::Off {
            return;
        }
        emit(
            self.config.success_level,
            &format!("call: {} completed in {:?}", span.method, span.elapsed()),
        );
    }

    /// Finish tracking a call that failed.
    pub fn finish_error(&self, span: RequestSpan, error: &str) {
        self.metrics.record_failure();
        if self.config.error_level == LogLevel::Off {
            return;
        }
        emit(
            self.config.error_level,
            &format!(
                "call: {} failed in {:?}: {}",
                span.method,
                span.elapsed(),
                error
            ),
        );
    }
}

/// An in-flight call.
#[derive(Debug)]
pub struct RequestSpan {
    method: String,
    start: Instant,
}

impl RequestSpan {
    /// The method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Time since the call started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "TRACE");
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
        assert_eq!(LogLevel::Off.to_string(), "OFF");
    }

    #[test]
    fn test_logging_config_presets() {
        let verbose = LoggingConfig::verbose();
        assert_eq!(verbose.success_level, LogLevel::Trace);
        assert!(verbose.log_start);

        let quiet = LoggingConfig::quiet();
        assert_eq!(quiet.success_level, LogLevel::Off);
        assert_eq!(quiet.error_level, LogLevel::Warn);
        assert!(!quiet.log_start);
    }

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::new()
            .with_success_level(LogLevel::Info)
            .with_error_level(LogLevel::Error)
            .with_start(true);

        assert_eq!(config.success_level, LogLevel::Info);
        assert_eq!(config.error_level, LogLevel::Error);
        assert!(config.log_start);
    }

    #[test]
    fn test_call_metrics() {
        let metrics = CallMetrics::new();
        assert_eq!(metrics.success_rate(), 1.0);

        metrics.record_success();
        metrics.record_success();
        metrics.record_failure();

        assert_eq!(metrics.total_calls(), 3);
        assert_eq!(metrics.successful_calls(), 2);
        assert_eq!(metrics.failed_calls(), 1);
        assert!((metrics.success_rate() - 0.666_666_666_666_666_6).abs() < 0.001);

        metrics.reset();
        assert_eq!(metrics.total_calls(), 0);
    }

    #[test]
    fn test_request_logger_counts() {
        let logger = RequestLogger::with_config(LoggingConfig::quiet());

        let span = logger.start("WaitForUpdatesEx");
        assert_eq!(span.method(), "WaitForUpdatesEx");
        logger.finish_success(span);

        let span = logger.start("Destroy_Task");
        logger.finish_error(span, "NotAuthenticated");

        assert_eq!(logger.metrics().total_calls(), 2);
        assert_eq!(logger.metrics().failed_calls(), 1);
    }
}
