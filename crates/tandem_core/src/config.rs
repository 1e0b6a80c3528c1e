use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for a bound document.
///
/// All fields have defaults; hosts that deserialize a partial config get the
/// defaults for anything omitted. Loading a config from disk is the host's
/// job, not this crate's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Trailing-edge delay for drift reconciliation, in milliseconds.
    ///
    /// Edits restart this timer; reconciliation runs once the document has
    /// been quiet for this long.
    #[serde(default = "default_resync_debounce_ms")]
    pub resync_debounce_ms: u64,

    /// Maximum reconciliation delay, in milliseconds.
    ///
    /// A continuous stream of edits cannot postpone reconciliation past this
    /// ceiling, measured from the first edit of the burst.
    #[serde(default = "default_resync_max_wait_ms")]
    pub resync_max_wait_ms: u64,

    /// Attempts before giving up on an editor `apply_edit`.
    ///
    /// Each retry recomputes the edit against the current document snapshot.
    /// Exhaustion schedules a resync rather than raising.
    #[serde(default = "default_max_edit_retries")]
    pub max_edit_retries: u32,

    /// Forced periodic reconciliation tick, in milliseconds.
    ///
    /// Reconciliation runs at least this often even when no edits arrive,
    /// catching drift introduced entirely out of band.
    #[serde(default = "default_resync_timer_ms")]
    pub resync_timer_ms: u64,
}

fn default_resync_debounce_ms() -> u64 {
    100
}

fn default_resync_max_wait_ms() -> u64 {
    500
}

fn default_max_edit_retries() -> u32 {
    20
}

fn default_resync_timer_ms() -> u64 {
    10_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            resync_debounce_ms: default_resync_debounce_ms(),
            resync_max_wait_ms: default_resync_max_wait_ms(),
            max_edit_retries: default_max_edit_retries(),
            resync_timer_ms: default_resync_timer_ms(),
        }
    }
}

impl SyncConfig {
    /// Trailing-edge reconciliation delay as a [`Duration`].
    pub fn resync_debounce(&self) -> Duration {
        Duration::from_millis(self.resync_debounce_ms)
    }

    /// Reconciliation delay ceiling as a [`Duration`].
    pub fn resync_max_wait(&self) -> Duration {
        Duration::from_millis(self.resync_max_wait_ms)
    }

    /// Forced reconciliation interval as a [`Duration`].
    pub fn resync_timer(&self) -> Duration {
        Duration::from_millis(self.resync_timer_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.resync_debounce_ms, 100);
        assert_eq!(config.resync_max_wait_ms, 500);
        assert_eq!(config.max_edit_retries, 20);
        assert_eq!(config.resync_timer_ms, 10_000);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"max_edit_retries": 3}"#).unwrap();
        assert_eq!(config.max_edit_retries, 3);
        assert_eq!(config.resync_debounce_ms, 100);
        assert_eq!(config.resync_timer_ms, 10_000);
    }

    #[test]
    fn test_duration_accessors() {
        let config = SyncConfig::default();
        assert_eq!(config.resync_debounce(), Duration::from_millis(100));
        assert_eq!(config.resync_max_wait(), Duration::from_millis(500));
        assert_eq!(config.resync_timer(), Duration::from_secs(10));
    }
}
