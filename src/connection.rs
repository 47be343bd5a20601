//! Transport lifecycle: connect, detect drops, reconnect with backoff.
//!
//! The manager is an explicit state machine (`Disconnected -> Connecting ->
//! Connected`) driven by a single run loop per principal. Reconnection
//! retries indefinitely with capped exponential backoff; the attempt
//! counter resets only on a successful connection, so callers can watch it
//! to decide when to surface a degraded-connectivity warning.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trellis_types::SyncEvent;

use crate::client::SyncShared;
use crate::config::SyncConfig;
use crate::reconcile;
use crate::transport::Transport;

/// Connection FSM phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot of the connection manager's state.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub reconnect_attempts: u32,
}

impl ConnectionState {
    pub fn connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }
}

struct Run {
    principal_id: String,
    task: JoinHandle<()>,
}

pub(crate) struct ConnectionManager {
    transport: Arc<dyn Transport>,
    state: Arc<RwLock<ConnectionState>>,
    run: Mutex<Option<Run>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: Arc::new(RwLock::new(ConnectionState {
                phase: ConnectionPhase::Disconnected,
                reconnect_attempts: 0,
            })),
            run: Mutex::new(None),
        }
    }

    /// Open the transport bound to a principal. Idempotent: a second call
    /// for the same principal while the run loop is alive is a no-op; a
    /// different principal tears the old loop down first.
    pub fn connect(&self, principal_id: &str, shared: Arc<SyncShared>) {
        let mut run = self.run.lock().expect("connection run slot poisoned");
        if let Some(existing) = run.as_ref() {
            if existing.principal_id == principal_id && !existing.task.is_finished() {
                debug!("already connected for {}", principal_id);
                return;
            }
        }
        if let Some(existing) = run.take() {
            existing.task.abort();
        }

        info!("connecting transport for {}", principal_id);
        let task = tokio::spawn(run_loop(
            self.transport.clone(),
            principal_id.to_string(),
            self.state.clone(),
            shared,
        ));
        *run = Some(Run {
            principal_id: principal_id.to_string(),
            task,
        });
    }

    /// Tear down the transport and stop reconnecting. Pending optimistic
    /// updates are untouched; they resume reconciliation on reconnect.
    pub async fn disconnect(&self, shared: &SyncShared) {
        let existing = self.run.lock().expect("connection run slot poisoned").take();
        let Some(existing) = existing else {
            return;
        };
        existing.task.abort();

        let was_connected = {
            let mut state = self.state.write().await;
            let was_connected = state.phase == ConnectionPhase::Connected;
            state.phase = ConnectionPhase::Disconnected;
            was_connected
        };
        if was_connected {
            shared.bus.publish(SyncEvent::Disconnected);
        }
        info!("transport disconnected by caller");
    }

    pub async fn status(&self) -> ConnectionState {
        self.state.read().await.clone()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // Deterministic teardown: the run loop must not outlive its client.
        if let Ok(mut run) = self.run.lock() {
            if let Some(existing) = run.take() {
                existing.task.abort();
            }
        }
    }
}

/// Connect/receive/reconnect loop for one principal.
async fn run_loop(
    transport: Arc<dyn Transport>,
    principal_id: String,
    state: Arc<RwLock<ConnectionState>>,
    shared: Arc<SyncShared>,
) {
    loop {
        state.write().await.phase = ConnectionPhase::Connecting;

        match transport.connect(&principal_id).await {
            Ok(mut conn) => {
                {
                    let mut state = state.write().await;
                    state.phase = ConnectionPhase::Connected;
                    state.reconnect_attempts = 0;
                }
                info!("transport connected for {}", principal_id);
                shared.bus.publish(SyncEvent::Connected);

                while let Some(event) = conn.recv().await {
                    reconcile::handle_event(&shared, event).await;
                }

                warn!("transport dropped for {}", principal_id);
                {
                    let mut state = state.write().await;
                    state.phase = ConnectionPhase::Disconnected;
                    state.reconnect_attempts += 1;
                }
                shared.bus.publish(SyncEvent::Disconnected);
            }
            Err(err) => {
                warn!("transport connect failed for {}: {}", principal_id, err);
                let mut state = state.write().await;
                state.phase = ConnectionPhase::Disconnected;
                state.reconnect_attempts += 1;
            }
        }

        let attempts = state.read().await.reconnect_attempts;
        let delay = backoff_delay(&shared.config, attempts);
        info!(
            "reconnecting for {} in {}ms (attempt {})",
            principal_id,
            delay.as_millis(),
            attempts
        );
        tokio::time::sleep(delay).await;
    }
}

/// Delay before the next reconnect attempt: `backoff_ms * 2^(n-1)`, capped
/// at `max_backoff_ms`. The exponent is clamped so the shift cannot
/// overflow on long outages.
pub(crate) fn backoff_delay(config: &SyncConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = std::cmp::min(
        config.backoff_ms.saturating_mul(2u64.pow(exponent)),
        config.max_backoff_ms,
    );
    Duration::from_millis(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_the_cap() {
        let config = SyncConfig::default();
        let delays: Vec<u64> = (1..=7)
            .map(|attempt| backoff_delay(&config, attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn backoff_is_stable_for_very_long_outages() {
        let config = SyncConfig::default();
        assert_eq!(
            backoff_delay(&config, 1_000),
            Duration::from_millis(config.max_backoff_ms)
        );
    }
}
