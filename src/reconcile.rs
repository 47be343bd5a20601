//! Reconciliation of transport-delivered events against the ledger.
//!
//! Every inbound event is classified exactly once, against the oldest
//! pending entry for its item: an unrelated external change, a confirmation
//! of our own write echoed back, a divergent concurrent write (conflict),
//! or a protocol anomaly. Classification is pure; the surrounding handler
//! owns the locking and bus publication.

use std::sync::Arc;
use serde_json::Value;
use tracing::{debug, warn};
use trellis_types::{OptimisticUpdate, RealtimeEvent, RealtimeEventType, SyncEvent, UpdateStatus};
use uuid::Uuid;

use crate::client::SyncShared;
use crate::ledger;

/// Disposition of one inbound event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// No pending local counterpart; forward to consumers as-is.
    External,
    /// Reported state equals the oldest pending entry's speculative state:
    /// our own mutation echoed back.
    Confirmation(Uuid),
    /// Reported state diverges from both the original and speculative
    /// state of the oldest pending entry: a concurrent writer.
    Conflict { update_id: Uuid },
    /// Unclassifiable shape; logged, never applied to the ledger.
    Anomaly(&'static str),
}

/// Classify an event against the oldest pending entry for its item.
///
/// A missing `state` field compares as JSON null, which is also what an
/// optimistic deletion records as its speculative state, so deletion echoes
/// confirm like any other mutation.
pub(crate) fn classify(event: &RealtimeEvent, oldest: Option<&OptimisticUpdate>) -> Disposition {
    let Some(update) = oldest else {
        return Disposition::External;
    };
    let reported = event.data.state.as_ref().unwrap_or(&Value::Null);
    if *reported == update.optimistic_data {
        Disposition::Confirmation(update.id)
    } else if *reported == update.original_data {
        Disposition::Anomaly("reported state matches the pre-update snapshot (stale echo)")
    } else {
        Disposition::Conflict { update_id: update.id }
    }
}

/// Consume one transport-delivered event.
///
/// Duplicate deliveries are no-ops for the ledger: once a confirmation has
/// removed its entry, a second identical delivery classifies as external
/// (or as a duplicate conflict, which is dropped while one is outstanding).
pub(crate) async fn handle_event(shared: &Arc<SyncShared>, event: RealtimeEvent) {
    debug!("transport event {}: {:?} {}", event.id, event.event_type, event.key());

    match event.event_type {
        // Presence/activity notifications carry no item state and never
        // interact with the ledger.
        RealtimeEventType::UserActivity => {
            shared.bus.publish(SyncEvent::Realtime(event));
            return;
        }
        // Conflicts are synthesized locally; the server never originates them.
        RealtimeEventType::SyncConflict => {
            warn!(
                "protocol anomaly: server-originated sync_conflict event {} ignored",
                event.id
            );
            return;
        }
        RealtimeEventType::ItemCreated
        | RealtimeEventType::ItemUpdated
        | RealtimeEventType::ItemDeleted => {}
    }

    let key = event.key();
    let mut published = Vec::new();
    {
        let mut ledger = shared.ledger.write().await;
        let disposition = classify(&event, ledger.oldest_pending(&key));

        // An item with an undecided conflict is frozen: no further event may
        // confirm or re-conflict its queue head until the caller resolves.
        let frozen = match disposition {
            Disposition::Confirmation(_) | Disposition::Conflict { .. } => {
                shared.conflicts.read().await.has_for_item(&key)
            }
            Disposition::External | Disposition::Anomaly(_) => false,
        };
        if frozen {
            debug!(
                "holding event {} for {}: conflict outstanding",
                event.id, key
            );
            return;
        }

        match disposition {
            Disposition::External => {
                published.push(SyncEvent::Realtime(event.clone()));
            }
            Disposition::Confirmation(update_id) => {
                if let Some(update) = ledger.take_resolved(update_id, UpdateStatus::Confirmed) {
                    debug!("event {} confirmed update {}", event.id, update.id);
                    published.push(SyncEvent::OptimisticConfirmed {
                        update_id: update.id,
                        key: update.key,
                    });
                    for (failed, reason) in ledger.drain_deferred(&key) {
                        ledger::push_failure_events(&mut published, failed, reason);
                    }
                }
            }
            Disposition::Conflict { update_id } => {
                warn!(
                    "conflict on {}: event {} diverges from pending update {}",
                    key, event.id, update_id
                );
                let conflict_event = shared.conflicts.write().await.raise(update_id, &event);
                published.push(SyncEvent::Conflict(conflict_event));
            }
            Disposition::Anomaly(reason) => {
                warn!("protocol anomaly for {}: {} (event {})", key, reason, event.id);
            }
        }
    }

    for event in published {
        shared.bus.publish(event);
    }
}
