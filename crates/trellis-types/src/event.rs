//! Realtime event types.
//!
//! A `RealtimeEvent` is an immutable record of something that happened,
//! either pushed by the server over the transport or synthesized internally
//! (conflict notifications). Events are fire-and-forget: they are published
//! once on the event bus and never replayed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identity of a synced item: an opaque `(item_type, item_id)` pair.
///
/// The core is domain-agnostic; `item_type` is whatever namespace the
/// embedding application uses ("project", "area", "resource", "note", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub item_type: String,
    pub item_id: String,
}

impl ItemKey {
    pub fn new(item_type: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            item_type: item_type.into(),
            item_id: item_id.into(),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.item_type, self.item_id)
    }
}

/// Closed set of event kinds carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeEventType {
    ItemCreated,
    ItemUpdated,
    ItemDeleted,
    UserActivity,
    SyncConflict,
}

/// Payload of a realtime event.
///
/// `state` carries the full item state reported by the sender. Deletions
/// omit it (the reconciler treats a missing state as JSON null). Extra
/// fields are preserved so internal notifications can attach context
/// without widening the wire schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub item_type: String,
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl EventData {
    pub fn new(key: &ItemKey, state: Option<Value>) -> Self {
        Self {
            item_type: key.item_type.clone(),
            item_id: key.item_id.clone(),
            state,
            extra: serde_json::Map::new(),
        }
    }

    /// The `(item_type, item_id)` pair this event is about.
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.item_type.clone(), self.item_id.clone())
    }
}

/// An immutable record of something that happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: RealtimeEventType,
    pub data: EventData,
    pub timestamp: DateTime<Utc>,
}

impl RealtimeEvent {
    /// Create a new event stamped with a fresh id and the current time.
    pub fn new(event_type: RealtimeEventType, data: EventData) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn key(&self) -> ItemKey {
        self.data.key()
    }
}

/// Bus-level notification fanned out to subscribers.
///
/// This is the closed, typed replacement for string-keyed handler
/// registration: subscribers hold a `broadcast::Receiver<SyncEvent>` and
/// match exhaustively.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Transport established (or re-established).
    Connected,
    /// Transport dropped; reconnection is underway.
    Disconnected,
    /// An external change with no pending local counterpart.
    Realtime(RealtimeEvent),
    /// A local mutation was applied speculatively and recorded in the ledger.
    OptimisticApplied(crate::update::OptimisticUpdate),
    /// The server's event stream confirmed a pending mutation.
    OptimisticConfirmed { update_id: Uuid, key: ItemKey },
    /// The item store rejected a pending mutation.
    OptimisticFailed {
        update_id: Uuid,
        key: ItemKey,
        reason: String,
    },
    /// Roll the item back to the exact state captured at submission.
    RevertOptimistic {
        update_id: Uuid,
        key: ItemKey,
        original_data: Value,
    },
    /// A concurrent writer diverged from a pending mutation; needs an
    /// explicit resolution decision.
    Conflict(RealtimeEvent),
}
