//! Sync facade: the single entry point for consumers.
//!
//! A `SyncClient` is an explicitly constructed service instance (no
//! module-level singleton): build one per sync session, `connect` it, and
//! drop it for deterministic teardown. It composes the event bus, ledger,
//! reconciler, conflict registry, and connection manager; all
//! inter-component notification flows through the bus.

use std::sync::Arc;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use trellis_types::{
    ItemKey, OptimisticUpdate, RealtimeEvent, RealtimeEventType, ResolutionStrategy, SyncError,
    SyncEvent, SyncResult,
};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::conflict::{ConflictRegistry, MergeFn};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::events::EventBus;
use crate::ledger::{self, Ledger};
use crate::store::ItemStore;
use crate::transport::Transport;

/// State shared by the engine's components. Each field is owned by one
/// component; everyone else goes through that component's methods.
pub(crate) struct SyncShared {
    pub config: SyncConfig,
    pub bus: EventBus,
    pub ledger: RwLock<Ledger>,
    pub conflicts: RwLock<ConflictRegistry>,
    pub store: Arc<dyn ItemStore>,
    pub merge_fn: RwLock<Option<MergeFn>>,
}

pub struct SyncClient {
    shared: Arc<SyncShared>,
    connection: ConnectionManager,
}

impl SyncClient {
    pub fn new(
        store: Arc<dyn ItemStore>,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Self {
        let bus = EventBus::new(config.bus_capacity);
        let shared = Arc::new(SyncShared {
            config,
            bus,
            ledger: RwLock::new(Ledger::new()),
            conflicts: RwLock::new(ConflictRegistry::new()),
            store,
            merge_fn: RwLock::new(None),
        });
        Self {
            connection: ConnectionManager::new(transport),
            shared,
        }
    }

    /// Open the transport bound to a principal. Idempotent for the same
    /// principal.
    pub fn connect(&self, principal_id: &str) {
        self.connection.connect(principal_id, self.shared.clone());
    }

    /// Tear down the transport. Pending optimistic updates survive and
    /// resume reconciliation on the next `connect`.
    pub async fn disconnect(&self) {
        self.connection.disconnect(&self.shared).await;
    }

    /// Subscribe to the typed event stream. Handlers are plain receivers;
    /// match on `SyncEvent` exhaustively.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.bus.subscribe()
    }

    /// Register the reconciliation function used by
    /// `ResolutionStrategy::Merge`.
    pub async fn set_merge_fn(&self, merge_fn: MergeFn) {
        *self.shared.merge_fn.write().await = Some(merge_fn);
    }

    /// Apply a mutation locally and record it as pending.
    ///
    /// Returns once the update is recorded in the ledger and the
    /// speculative state has been broadcast, not once the server confirms:
    /// the store write happens out of band, and confirmation or rejection
    /// is reported through the event stream.
    pub async fn send_optimistic_update(
        &self,
        event_type: RealtimeEventType,
        item_type: impl Into<String>,
        item_id: impl Into<String>,
        original_data: Value,
        optimistic_data: Value,
    ) -> SyncResult<Uuid> {
        match event_type {
            RealtimeEventType::ItemCreated
            | RealtimeEventType::ItemUpdated
            | RealtimeEventType::ItemDeleted => {}
            other => return Err(SyncError::InvalidMutation(other)),
        }

        let key = ItemKey::new(item_type, item_id);
        let update = OptimisticUpdate::new(event_type, key, original_data, optimistic_data);
        let update_id = update.id;

        self.shared.ledger.write().await.insert(update.clone());
        self.shared
            .bus
            .publish(SyncEvent::OptimisticApplied(update.clone()));
        tokio::spawn(ledger::run_store_write(self.shared.clone(), update));

        Ok(update_id)
    }

    /// Decide an outstanding conflict. `manual_resolution` is required for
    /// `ResolutionStrategy::Manual` and ignored otherwise.
    pub async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        strategy: ResolutionStrategy,
        manual_resolution: Option<Value>,
    ) -> SyncResult<()> {
        crate::conflict::resolve(&self.shared, conflict_id, strategy, manual_resolution).await
    }

    /// Current connection phase and reconnect attempt count.
    pub async fn connection_status(&self) -> ConnectionState {
        self.connection.status().await
    }

    /// Snapshot of pending updates, submission order within each item.
    pub async fn pending_updates(&self) -> Vec<OptimisticUpdate> {
        self.shared.ledger.read().await.pending_snapshot()
    }

    /// Current outstanding conflicts.
    pub async fn conflicts(&self) -> Vec<RealtimeEvent> {
        self.shared.conflicts.read().await.snapshot()
    }
}
