/**
 * Configuration constants for the informer caches and the client facade
 */
use crate::error::{Error, Result};
use std::time::Duration;

/// Period of the list poller when nothing asks for an earlier resync
pub const DEFAULT_LIST_POLL_SECONDS: u64 = 30;

/// How long `get`/`list` wait for an outstanding resync before giving up
pub const DEFAULT_SYNC_TIMEOUT_SECONDS: u64 = 30;

/// Facade heartbeat period while started
pub const DEFAULT_HEARTBEAT_SECONDS: u64 = 5;

/// Smallest period accepted for the list poller and the heartbeat
pub const MIN_PERIOD_MILLIS: u64 = 10;

/// Resync requests waiting for a poller. One slot keeps a writer blocked
/// until the poller has taken the previous request.
pub const RESYNC_CHANNEL_CAPACITY: usize = 1;

/// Configuration for one informer cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InformerConfig {
    /// Period of the list poller
    pub list_poll_interval: Duration,
    /// Default bound on waiting for a resync in `get`/`list`
    pub sync_timeout: Duration,
}

impl Default for InformerConfig {
    fn default() -> Self {
        Self {
            list_poll_interval: Duration::from_secs(DEFAULT_LIST_POLL_SECONDS),
            sync_timeout: Duration::from_secs(DEFAULT_SYNC_TIMEOUT_SECONDS),
        }
    }
}

impl InformerConfig {
    #[must_use]
    pub const fn with_list_poll_interval(mut self, interval: Duration) -> Self {
        self.list_poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] if the poll interval is below
    /// [`MIN_PERIOD_MILLIS`].
    pub fn validate(&self) -> Result<()> {
        check_period("list poll interval", self.list_poll_interval)
    }
}

/// # Errors
///
/// Returns [`Error::Config`] if `period` is below [`MIN_PERIOD_MILLIS`].
pub fn check_period(name: &str, period: Duration) -> Result<()> {
    if period < Duration::from_millis(MIN_PERIOD_MILLIS) {
        return Err(Error::Config(format!(
            "{name} must be at least {MIN_PERIOD_MILLIS}ms, got {period:?}"
        )));
    }
    Ok(())
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(DEFAULT_LIST_POLL_SECONDS > 0, "DEFAULT_LIST_POLL_SECONDS must be greater than 0");
    assert!(DEFAULT_SYNC_TIMEOUT_SECONDS > 0, "DEFAULT_SYNC_TIMEOUT_SECONDS must be greater than 0");
    assert!(DEFAULT_HEARTBEAT_SECONDS > 0, "DEFAULT_HEARTBEAT_SECONDS must be greater than 0");
    assert!(MIN_PERIOD_MILLIS > 0, "MIN_PERIOD_MILLIS must be greater than 0");
    assert!(RESYNC_CHANNEL_CAPACITY > 0, "RESYNC_CHANNEL_CAPACITY must be greater than 0");
};
