//! Optimistic update records.

use crate::event::{ItemKey, RealtimeEventType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle state of an optimistic update.
///
/// Entries enter the ledger as `Pending` and leave it on the transition to
/// `Confirmed` or `Failed`; the terminal states are only ever observed in
/// bus events and snapshots taken at transition time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Pending,
    Confirmed,
    Failed,
}

/// A locally-applied, not-yet-confirmed mutation.
///
/// `original_data` is the full snapshot of the item before the speculative
/// mutation; it is what `RevertOptimistic` broadcasts on failure, so it must
/// be captured exactly at submission. For deletions `optimistic_data` is
/// JSON null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimisticUpdate {
    pub id: Uuid,
    pub event_type: RealtimeEventType,
    pub key: ItemKey,
    pub original_data: Value,
    pub optimistic_data: Value,
    pub status: UpdateStatus,
    pub submitted_at: DateTime<Utc>,
}

impl OptimisticUpdate {
    /// Create a pending update stamped with a fresh id and submission time.
    pub fn new(
        event_type: RealtimeEventType,
        key: ItemKey,
        original_data: Value,
        optimistic_data: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            key,
            original_data,
            optimistic_data,
            status: UpdateStatus::Pending,
            submitted_at: Utc::now(),
        }
    }
}

/// Decision applied to an outstanding conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Discard the pending mutation and adopt the server's reported state.
    ServerWins,
    /// Re-issue the pending mutation, overwriting the server's change.
    ClientWins,
    /// Combine both states with the registered merge function.
    Merge,
    /// The caller supplies the final state directly.
    Manual,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_updates_start_pending() {
        let update = OptimisticUpdate::new(
            RealtimeEventType::ItemUpdated,
            ItemKey::new("note", "n1"),
            json!({"title": "A"}),
            json!({"title": "B"}),
        );
        assert_eq!(update.status, UpdateStatus::Pending);
        assert_ne!(update.original_data, update.optimistic_data);
    }

    #[test]
    fn strategy_names_match_wire_strings() {
        assert_eq!(
            serde_json::to_value(ResolutionStrategy::ServerWins).unwrap(),
            "server_wins"
        );
        assert_eq!(
            serde_json::to_value(ResolutionStrategy::ClientWins).unwrap(),
            "client_wins"
        );
    }
}
