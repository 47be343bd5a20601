//! Conflict registry and resolution.
//!
//! A conflict pairs a pending optimistic update with the divergent state a
//! concurrent writer produced for the same item. Conflicts are held until
//! the caller decides; while one is outstanding its item's queue is blocked
//! (the reconciler only matches queue heads, and the head stays put).

use std::collections::HashMap;
use std::sync::Arc;
use serde_json::{json, Value};
use tracing::{debug, info};
use trellis_types::{
    EventData, ItemKey, RealtimeEvent, RealtimeEventType, ResolutionStrategy, SyncError,
    SyncEvent, SyncResult, UpdateStatus,
};
use uuid::Uuid;

use crate::client::SyncShared;
use crate::ledger;

/// Caller-supplied reconciliation function for `ResolutionStrategy::Merge`:
/// `(server_state, optimistic_state) -> merged_state`.
pub type MergeFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// An undecided conflict held in the registry.
#[derive(Debug, Clone)]
pub(crate) struct PendingConflict {
    /// The synthesized `sync_conflict` event, as published to consumers.
    pub conflict: RealtimeEvent,
    /// The blocked ledger entry.
    pub update_id: Uuid,
    /// State the concurrent writer reported (JSON null for a deletion).
    pub server_state: Value,
    /// The inbound event that raised the conflict, republished verbatim
    /// when the resolution adopts the server's state.
    pub source: RealtimeEvent,
}

#[derive(Debug, Default)]
pub(crate) struct ConflictRegistry {
    conflicts: HashMap<Uuid, PendingConflict>,
    /// At most one outstanding conflict per item.
    by_item: HashMap<ItemKey, Uuid>,
}

impl ConflictRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_for_item(&self, key: &ItemKey) -> bool {
        self.by_item.contains_key(key)
    }

    /// Synthesize a `sync_conflict` event for a divergent inbound event and
    /// register it. Returns the event for publication.
    pub fn raise(&mut self, update_id: Uuid, source: &RealtimeEvent) -> RealtimeEvent {
        let key = source.key();
        let server_state = source.data.state.clone().unwrap_or(Value::Null);

        let mut data = EventData::new(&key, Some(server_state.clone()));
        data.extra
            .insert("update_id".to_string(), json!(update_id));
        data.extra
            .insert("source_event_id".to_string(), json!(source.id));
        let conflict = RealtimeEvent::new(RealtimeEventType::SyncConflict, data);

        self.by_item.insert(key, conflict.id);
        self.conflicts.insert(
            conflict.id,
            PendingConflict {
                conflict: conflict.clone(),
                update_id,
                server_state,
                source: source.clone(),
            },
        );
        conflict
    }

    /// Remove and return a conflict by id.
    pub fn take(&mut self, conflict_id: Uuid) -> Option<PendingConflict> {
        let pending = self.conflicts.remove(&conflict_id)?;
        self.by_item.remove(&pending.conflict.key());
        Some(pending)
    }

    /// Drop the conflict attached to a ledger entry, if any. Used when the
    /// entry fails outright and there is nothing left to resolve.
    pub fn remove_by_update(&mut self, update_id: Uuid) {
        let ids: Vec<Uuid> = self
            .conflicts
            .iter()
            .filter(|(_, c)| c.update_id == update_id)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            debug!("dropping conflict {} for failed update {}", id, update_id);
            self.take(id);
        }
    }

    /// Current outstanding conflicts.
    pub fn snapshot(&self) -> Vec<RealtimeEvent> {
        self.conflicts.values().map(|c| c.conflict.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }
}

/// Apply an explicit resolution decision to an outstanding conflict.
///
/// On completion the conflict is removed from the registry, the blocked
/// ledger entry is resolved (or re-armed to await its confirming echo), and
/// entries queued behind it unblock.
pub(crate) async fn resolve(
    shared: &Arc<SyncShared>,
    conflict_id: Uuid,
    strategy: ResolutionStrategy,
    manual_resolution: Option<Value>,
) -> SyncResult<()> {
    // Validate the decision's inputs before consuming the conflict, so a
    // rejected call leaves it outstanding and retryable.
    if strategy == ResolutionStrategy::Manual && manual_resolution.is_none() {
        return Err(SyncError::MissingResolution);
    }
    let merge_fn = if strategy == ResolutionStrategy::Merge {
        Some(
            shared
                .merge_fn
                .read()
                .await
                .clone()
                .ok_or(SyncError::MissingMergeFn)?,
        )
    } else {
        None
    };

    let pending = shared
        .conflicts
        .write()
        .await
        .take(conflict_id)
        .ok_or(SyncError::UnknownConflict(conflict_id))?;
    let update_id = pending.update_id;
    info!(
        "resolving conflict {} for update {} with {:?}",
        conflict_id, update_id, strategy
    );

    match strategy {
        ResolutionStrategy::ServerWins => {
            let mut events = Vec::new();
            {
                let mut ledger = shared.ledger.write().await;
                let update = ledger
                    .take_resolved(update_id, UpdateStatus::Failed)
                    .ok_or(SyncError::UnknownUpdate(update_id))?;
                let key = update.key.clone();
                events.push(SyncEvent::RevertOptimistic {
                    update_id,
                    key: key.clone(),
                    original_data: update.original_data,
                });
                // Adopt the server's reported state by replaying the event
                // that raised the conflict.
                events.push(SyncEvent::Realtime(pending.source));
                for (failed, reason) in ledger.drain_deferred(&key) {
                    ledger::push_failure_events(&mut events, failed, reason);
                }
            }
            for event in events {
                shared.bus.publish(event);
            }
            Ok(())
        }
        ResolutionStrategy::ClientWins => {
            let update = shared
                .ledger
                .read()
                .await
                .get(update_id)
                .cloned()
                .ok_or(SyncError::UnknownUpdate(update_id))?;
            // Re-issue the pending mutation; the entry stays pending and the
            // confirming echo arrives through the normal event stream.
            tokio::spawn(ledger::run_store_write(shared.clone(), update));
            Ok(())
        }
        ResolutionStrategy::Merge => {
            let merge_fn = merge_fn.ok_or(SyncError::MissingMergeFn)?;
            let update = shared
                .ledger
                .read()
                .await
                .get(update_id)
                .cloned()
                .ok_or(SyncError::UnknownUpdate(update_id))?;
            let merged = merge_fn(&pending.server_state, &update.optimistic_data);
            rearm_with(shared, update_id, merged).await
        }
        ResolutionStrategy::Manual => {
            let resolved = manual_resolution.ok_or(SyncError::MissingResolution)?;
            rearm_with(shared, update_id, resolved).await
        }
    }
}

/// Replace the blocked entry's speculative state and re-issue its write, so
/// the confirming echo matches the resolved state.
async fn rearm_with(shared: &Arc<SyncShared>, update_id: Uuid, resolved: Value) -> SyncResult<()> {
    let update = {
        let mut ledger = shared.ledger.write().await;
        if !ledger.set_optimistic_data(update_id, resolved) {
            return Err(SyncError::UnknownUpdate(update_id));
        }
        ledger
            .get(update_id)
            .cloned()
            .ok_or(SyncError::UnknownUpdate(update_id))?
    };
    // Consumers render the resolved state the same way they rendered the
    // original speculative state.
    shared.bus.publish(SyncEvent::OptimisticApplied(update.clone()));
    tokio::spawn(ledger::run_store_write(shared.clone(), update));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_event(title: &str) -> RealtimeEvent {
        let key = ItemKey::new("note", "n1");
        RealtimeEvent::new(
            RealtimeEventType::ItemUpdated,
            EventData::new(&key, Some(json!({"title": title}))),
        )
    }

    #[test]
    fn raise_registers_one_conflict_per_item() {
        let mut registry = ConflictRegistry::new();
        let key = ItemKey::new("note", "n1");
        assert!(!registry.has_for_item(&key));

        let update_id = Uuid::new_v4();
        let conflict = registry.raise(update_id, &source_event("C"));

        assert!(registry.has_for_item(&key));
        assert_eq!(registry.len(), 1);
        assert_eq!(conflict.event_type, RealtimeEventType::SyncConflict);
        assert_eq!(conflict.data.state, Some(json!({"title": "C"})));
        assert_eq!(conflict.data.extra["update_id"], json!(update_id));
    }

    #[test]
    fn take_clears_the_item_slot() {
        let mut registry = ConflictRegistry::new();
        let key = ItemKey::new("note", "n1");
        let conflict = registry.raise(Uuid::new_v4(), &source_event("C"));

        let pending = registry.take(conflict.id).unwrap();
        assert_eq!(pending.server_state, json!({"title": "C"}));
        assert!(!registry.has_for_item(&key));
        assert!(registry.take(conflict.id).is_none());
    }

    #[test]
    fn remove_by_update_drops_attached_conflicts() {
        let mut registry = ConflictRegistry::new();
        let update_id = Uuid::new_v4();
        registry.raise(update_id, &source_event("C"));

        registry.remove_by_update(Uuid::new_v4());
        assert_eq!(registry.len(), 1);

        registry.remove_by_update(update_id);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn deletion_conflicts_record_null_server_state() {
        let mut registry = ConflictRegistry::new();
        let key = ItemKey::new("note", "n1");
        let source = RealtimeEvent::new(RealtimeEventType::ItemDeleted, EventData::new(&key, None));

        let conflict = registry.raise(Uuid::new_v4(), &source);
        let pending = registry.take(conflict.id).unwrap();
        assert_eq!(pending.server_state, Value::Null);
    }
}
