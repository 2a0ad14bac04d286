//! Rotation options shared by both sink variants.

use std::time::Duration;

use crate::error::SinkError;

/// When to roll over to the next generation. Every option is independent;
/// `None` or zero disables that trigger.
#[derive(Debug, Clone, Default)]
pub struct RotationOptions {
    /// Rotate every `interval`, regardless of traffic.
    pub interval: Option<Duration>,
    /// Rotate after `timeout` without a successful write.
    pub timeout: Option<Duration>,
    /// Rotate once a generation holds this many bytes (0 disables).
    pub max_size: u64,
    /// Rotate once a generation holds this many writes (0 disables).
    pub max_count: u64,
    /// Keep zero-byte generations on disk instead of deleting them after
    /// close.
    pub keep_empty: bool,
}

impl RotationOptions {
    pub fn with_interval(mut self, every: Duration) -> Self {
        self.interval = Some(every);
        self
    }

    pub fn with_timeout(mut self, after: Duration) -> Self {
        self.timeout = Some(after);
        self
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn with_max_count(mut self, records: u64) -> Self {
        self.max_count = records;
        self
    }

    pub fn with_keep_empty(mut self, keep: bool) -> Self {
        self.keep_empty = keep;
        self
    }

    /// Whether the byte/record threshold source should run at all.
    pub(crate) fn threshold_enabled(&self) -> bool {
        self.max_size > 0 || self.max_count > 0
    }

    pub(crate) fn validate(&self) -> Result<(), SinkError> {
        if matches!(self.interval, Some(d) if d.is_zero()) {
            return Err(SinkError::config("interval must be greater than zero"));
        }
        if matches!(self.timeout, Some(d) if d.is_zero()) {
            return Err(SinkError::config("timeout must be greater than zero"));
        }
        Ok(())
    }
}
