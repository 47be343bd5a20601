//! Sync core configuration.

use serde::{Deserialize, Serialize};

/// Tunables for the sync core.
///
/// All fields have serde defaults so a partial JSON blob (or
/// `SyncConfig::default()`) yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base reconnect delay in milliseconds.
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
    /// Cap on the reconnect delay in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Capacity of the broadcast event bus.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backoff_ms: 500,
            max_backoff_ms: 10_000,
            bus_capacity: 256,
        }
    }
}

fn default_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    10_000
}

fn default_bus_capacity() -> usize {
    256
}
