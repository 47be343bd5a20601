//! Stage 0 sync harness tests.
//!
//! These tests exercise the optimistic ledger invariants through the public
//! facade, with no transport attached: applying speculative state, exact
//! rollback on store rejection, and snapshot ordering.

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use trellis_sync::{
    ItemKey, ItemStore, MemoryHub, RealtimeEventType, StoreError, SyncClient, SyncConfig,
    SyncEvent,
};

const TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("trellis_sync=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// In-memory item store: records writes, rejects payloads it was told to.
#[derive(Default)]
struct TestStore {
    writes: Mutex<Vec<(RealtimeEventType, ItemKey, Value)>>,
    reject_payloads: Mutex<Vec<Value>>,
}

impl TestStore {
    fn reject_payload(&self, payload: Value) {
        self.reject_payloads.lock().unwrap().push(payload);
    }

    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl ItemStore for TestStore {
    async fn write(
        &self,
        event_type: RealtimeEventType,
        key: &ItemKey,
        payload: Value,
    ) -> Result<Value, StoreError> {
        if self.reject_payloads.lock().unwrap().contains(&payload) {
            return Err(StoreError::Rejected {
                status: 422,
                detail: "rejected by test store".to_string(),
            });
        }
        self.writes
            .lock()
            .unwrap()
            .push((event_type, key.clone(), payload.clone()));
        Ok(payload)
    }
}

fn test_client(store: Arc<TestStore>) -> SyncClient {
    init_tracing();
    SyncClient::new(store, Arc::new(MemoryHub::new()), SyncConfig::default())
}

async fn recv_event(rx: &mut broadcast::Receiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timeout waiting for sync event")
        .expect("event bus closed")
}

#[tokio::test]
async fn optimistic_update_is_applied_and_recorded() {
    let store = Arc::new(TestStore::default());
    let client = test_client(store.clone());
    let mut rx = client.subscribe();

    let update_id = client
        .send_optimistic_update(
            RealtimeEventType::ItemUpdated,
            "note",
            "n1",
            json!({"title": "A"}),
            json!({"title": "B"}),
        )
        .await
        .unwrap();

    match recv_event(&mut rx).await {
        SyncEvent::OptimisticApplied(update) => {
            assert_eq!(update.id, update_id);
            assert_eq!(update.optimistic_data, json!({"title": "B"}));
        }
        other => panic!("expected optimistic_update, got {:?}", other),
    }

    let pending = client.pending_updates().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, update_id);
}

#[tokio::test]
async fn rejected_write_reverts_to_exact_original() {
    let store = Arc::new(TestStore::default());
    // Original carries nested structure; rollback must be byte-exact.
    let original = json!({"title": "A", "tags": ["para", "inbox"], "rank": 3});
    store.reject_payload(json!({"title": "B"}));

    let client = test_client(store.clone());
    let mut rx = client.subscribe();

    let update_id = client
        .send_optimistic_update(
            RealtimeEventType::ItemUpdated,
            "note",
            "n1",
            original.clone(),
            json!({"title": "B"}),
        )
        .await
        .unwrap();

    assert!(matches!(
        recv_event(&mut rx).await,
        SyncEvent::OptimisticApplied(_)
    ));
    match recv_event(&mut rx).await {
        SyncEvent::OptimisticFailed { update_id: id, .. } => assert_eq!(id, update_id),
        other => panic!("expected optimistic_failed, got {:?}", other),
    }
    match recv_event(&mut rx).await {
        SyncEvent::RevertOptimistic { original_data, .. } => {
            assert_eq!(original_data, original);
        }
        other => panic!("expected revert_optimistic, got {:?}", other),
    }

    assert!(client.pending_updates().await.is_empty());
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn pending_snapshot_orders_within_and_across_items() {
    let store = Arc::new(TestStore::default());
    let client = test_client(store);

    let n1_first = client
        .send_optimistic_update(
            RealtimeEventType::ItemUpdated,
            "note",
            "n1",
            json!({"v": 0}),
            json!({"v": 1}),
        )
        .await
        .unwrap();
    let a1 = client
        .send_optimistic_update(
            RealtimeEventType::ItemUpdated,
            "area",
            "a1",
            json!({"v": 0}),
            json!({"v": 1}),
        )
        .await
        .unwrap();
    let n1_second = client
        .send_optimistic_update(
            RealtimeEventType::ItemUpdated,
            "note",
            "n1",
            json!({"v": 1}),
            json!({"v": 2}),
        )
        .await
        .unwrap();

    let ids: Vec<_> = client.pending_updates().await.iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![a1, n1_first, n1_second]);
}

#[tokio::test]
async fn activity_events_are_not_mutations() {
    let store = Arc::new(TestStore::default());
    let client = test_client(store);

    let result = client
        .send_optimistic_update(
            RealtimeEventType::UserActivity,
            "note",
            "n1",
            Value::Null,
            Value::Null,
        )
        .await;
    assert!(result.is_err());
    assert!(client.pending_updates().await.is_empty());
}
