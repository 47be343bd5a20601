//! Transport layer: the server's push channel.
//!
//! The channel delivers an ordered, at-least-once stream of server events.
//! No deduplication is assumed; the reconciler tolerates duplicate
//! deliveries. Implementations:
//! - WebSocket client for production (websocket.rs)
//! - In-memory hub for tests and in-process embedding (memory.rs)

pub mod memory;
pub mod websocket;

pub use memory::MemoryHub;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use trellis_types::{RealtimeEvent, TransportError};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the push channel bound to a principal.
    async fn connect(
        &self,
        principal_id: &str,
    ) -> Result<Box<dyn TransportConnection>, TransportError>;
}

/// One established channel. `recv` returns `None` when the channel closes;
/// the connection manager treats that as a drop and reconnects.
#[async_trait]
pub trait TransportConnection: Send {
    async fn recv(&mut self) -> Option<RealtimeEvent>;
}
