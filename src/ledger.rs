//! Optimistic ledger: bookkeeping for locally-applied, unconfirmed mutations.
//!
//! Records live in an arena addressed by update id, with a per-item FIFO
//! queue maintained alongside. The queue is what enforces submission-order
//! resolution: the reconciler only ever matches the queue head, and a
//! store-write failure for a non-head entry is deferred until every earlier
//! entry for that item has resolved.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use trellis_types::{ItemKey, OptimisticUpdate, SyncEvent, UpdateStatus};
use uuid::Uuid;

use crate::client::SyncShared;

#[derive(Debug, Default)]
pub(crate) struct Ledger {
    updates: HashMap<Uuid, OptimisticUpdate>,
    queues: HashMap<ItemKey, VecDeque<Uuid>>,
    /// Store-write failures waiting for earlier entries of the same item.
    deferred_failures: HashMap<Uuid, String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending update in both indices.
    pub fn insert(&mut self, update: OptimisticUpdate) {
        self.queues
            .entry(update.key.clone())
            .or_default()
            .push_back(update.id);
        self.updates.insert(update.id, update);
    }

    pub fn get(&self, id: Uuid) -> Option<&OptimisticUpdate> {
        self.updates.get(&id)
    }

    /// The oldest pending entry for an item, i.e. the only entry the
    /// reconciler may confirm or conflict.
    pub fn oldest_pending(&self, key: &ItemKey) -> Option<&OptimisticUpdate> {
        let id = self.queues.get(key)?.front()?;
        self.updates.get(id)
    }

    /// Whether the given update is at the head of its item's queue.
    pub fn is_oldest(&self, id: Uuid) -> bool {
        let Some(update) = self.updates.get(&id) else {
            return false;
        };
        self.queues
            .get(&update.key)
            .and_then(|q| q.front())
            .is_some_and(|head| *head == id)
    }

    /// Replace the speculative state of a pending entry (merge/manual
    /// resolution re-arms the entry so the confirming echo matches).
    pub fn set_optimistic_data(&mut self, id: Uuid, data: serde_json::Value) -> bool {
        match self.updates.get_mut(&id) {
            Some(update) => {
                update.optimistic_data = data;
                true
            }
            None => false,
        }
    }

    /// Remove an entry from both indices, stamping its terminal status.
    pub fn take_resolved(&mut self, id: Uuid, status: UpdateStatus) -> Option<OptimisticUpdate> {
        let mut update = self.updates.remove(&id)?;
        if let Some(queue) = self.queues.get_mut(&update.key) {
            queue.retain(|queued| *queued != id);
            if queue.is_empty() {
                self.queues.remove(&update.key);
            }
        }
        self.deferred_failures.remove(&id);
        update.status = status;
        Some(update)
    }

    /// Record a store-write failure for an entry that is not yet at the
    /// head of its queue. It fails once everything ahead of it resolves.
    pub fn defer_failure(&mut self, id: Uuid, reason: String) {
        self.deferred_failures.insert(id, reason);
    }

    /// Pop queue heads that carry a deferred failure, in order. Called
    /// after any head resolution so rejections settle in submission order.
    pub fn drain_deferred(&mut self, key: &ItemKey) -> Vec<(OptimisticUpdate, String)> {
        let mut failed = Vec::new();
        while let Some(head) = self.queues.get(key).and_then(|q| q.front()).copied() {
            let Some(reason) = self.deferred_failures.remove(&head) else {
                break;
            };
            if let Some(update) = self.take_resolved(head, UpdateStatus::Failed) {
                failed.push((update, reason));
            }
        }
        failed
    }

    /// Snapshot of all pending entries, ordered by submission time within
    /// each item group, then by item.
    pub fn pending_snapshot(&self) -> Vec<OptimisticUpdate> {
        let mut keys: Vec<&ItemKey> = self.queues.keys().collect();
        keys.sort_by_key(|key| (key.item_type.clone(), key.item_id.clone()));

        let mut snapshot = Vec::with_capacity(self.updates.len());
        for key in keys {
            if let Some(queue) = self.queues.get(key) {
                snapshot.extend(queue.iter().filter_map(|id| self.updates.get(id)).cloned());
            }
        }
        snapshot
    }

    pub fn pending_len(&self) -> usize {
        self.updates.len()
    }
}

/// Issue the store write for a freshly-recorded update, out of band from
/// `send_optimistic_update`'s return. Write success does not transition the
/// entry: confirmation must come from the event stream so ordering with
/// concurrent writers is preserved.
pub(crate) async fn run_store_write(shared: Arc<SyncShared>, update: OptimisticUpdate) {
    let payload = update.optimistic_data.clone();
    match shared
        .store
        .write(update.event_type, &update.key, payload)
        .await
    {
        Ok(_) => {
            debug!(
                "store accepted write for {} (update {}), awaiting confirmation event",
                update.key, update.id
            );
        }
        Err(err) => {
            warn!("store rejected update {} for {}: {}", update.id, update.key, err);
            report_write_failure(&shared, update.id, err.to_string()).await;
        }
    }
}

/// Settle a store-write rejection against the per-item queue.
///
/// A head entry fails immediately: status transition, `OptimisticFailed`,
/// then `RevertOptimistic` carrying the submission-time snapshot, then
/// removal. A non-head entry only records the failure; it settles when the
/// queue drains down to it.
pub(crate) async fn report_write_failure(shared: &SyncShared, update_id: Uuid, reason: String) {
    let mut events = Vec::new();
    {
        let mut ledger = shared.ledger.write().await;
        if ledger.is_oldest(update_id) {
            if let Some(update) = ledger.take_resolved(update_id, UpdateStatus::Failed) {
                let key = update.key.clone();
                // A conflict on this entry has nothing left to resolve.
                shared.conflicts.write().await.remove_by_update(update_id);
                push_failure_events(&mut events, update, reason);
                for (update, reason) in ledger.drain_deferred(&key) {
                    push_failure_events(&mut events, update, reason);
                }
            }
        } else if ledger.get(update_id).is_some() {
            debug!(
                "deferring failure of update {} until earlier entries resolve",
                update_id
            );
            ledger.defer_failure(update_id, reason);
        }
    }
    for event in events {
        shared.bus.publish(event);
    }
}

/// The observable failure sequence for one entry: failed, then revert.
pub(crate) fn push_failure_events(
    events: &mut Vec<SyncEvent>,
    update: OptimisticUpdate,
    reason: String,
) {
    events.push(SyncEvent::OptimisticFailed {
        update_id: update.id,
        key: update.key.clone(),
        reason,
    });
    events.push(SyncEvent::RevertOptimistic {
        update_id: update.id,
        key: update.key,
        original_data: update.original_data,
    });
}
