//! In-memory transport for tests and in-process embedding.
//!
//! The hub hands out channel-backed connections and lets a test inject
//! events, sever live connections (simulating a transport drop), or refuse
//! the next dials (simulating an unreachable server).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use tokio::sync::mpsc;
use trellis_types::{RealtimeEvent, TransportError};

use super::{Transport, TransportConnection};

#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    connections: Mutex<Vec<mpsc::UnboundedSender<RealtimeEvent>>>,
    refuse_dials: AtomicU32,
    dials: AtomicU32,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every live connection.
    pub fn push(&self, event: RealtimeEvent) {
        let connections = self.inner.connections.lock().unwrap();
        for conn in connections.iter() {
            let _ = conn.send(event.clone());
        }
    }

    /// Drop every live connection; receivers observe a channel close.
    pub fn sever(&self) {
        self.inner.connections.lock().unwrap().clear();
    }

    /// Make the next `n` dials fail with a connect error.
    pub fn refuse_next_dials(&self, n: u32) {
        self.inner.refuse_dials.store(n, Ordering::SeqCst);
    }

    /// Live connections (severed and dropped ones are pruned on push).
    pub fn connection_count(&self) -> usize {
        let mut connections = self.inner.connections.lock().unwrap();
        connections.retain(|conn| !conn.is_closed());
        connections.len()
    }

    /// Total dial attempts observed, successful or refused.
    pub fn dial_count(&self) -> u32 {
        self.inner.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryHub {
    async fn connect(
        &self,
        _principal_id: &str,
    ) -> Result<Box<dyn TransportConnection>, TransportError> {
        self.inner.dials.fetch_add(1, Ordering::SeqCst);

        let refusals = self.inner.refuse_dials.load(Ordering::SeqCst);
        if refusals > 0 {
            self.inner.refuse_dials.store(refusals - 1, Ordering::SeqCst);
            return Err(TransportError::Connect("refused by test hub".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.lock().unwrap().push(tx);
        Ok(Box::new(MemoryConnection { rx }))
    }
}

struct MemoryConnection {
    rx: mpsc::UnboundedReceiver<RealtimeEvent>,
}

#[async_trait]
impl TransportConnection for MemoryConnection {
    async fn recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_types::{EventData, ItemKey, RealtimeEventType};

    fn some_event() -> RealtimeEvent {
        let key = ItemKey::new("note", "n1");
        RealtimeEvent::new(
            RealtimeEventType::ItemUpdated,
            EventData::new(&key, Some(json!({"title": "B"}))),
        )
    }

    #[tokio::test]
    async fn pushed_events_reach_live_connections() {
        let hub = MemoryHub::new();
        let mut conn = hub.connect("someone").await.unwrap();

        let event = some_event();
        hub.push(event.clone());
        assert_eq!(conn.recv().await.unwrap().id, event.id);
    }

    #[tokio::test]
    async fn sever_closes_connections() {
        let hub = MemoryHub::new();
        let mut conn = hub.connect("someone").await.unwrap();
        hub.sever();
        assert!(conn.recv().await.is_none());
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn refused_dials_error_then_recover() {
        let hub = MemoryHub::new();
        hub.refuse_next_dials(2);

        assert!(hub.connect("someone").await.is_err());
        assert!(hub.connect("someone").await.is_err());
        assert!(hub.connect("someone").await.is_ok());
        assert_eq!(hub.dial_count(), 3);
    }
}
