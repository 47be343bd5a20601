//! Real-time synchronization core for Trellis.
//!
//! The engine applies local mutations immediately (optimistic updates),
//! tracks them in a ledger until the server's event stream confirms or
//! rejects them, reconciles pushed events against in-flight local state,
//! detects conflicts between concurrent writers, and manages a lossy,
//! reconnecting transport.
//!
//! Data flow: a UI intent enters through [`SyncClient`], lands in the
//! optimistic ledger (applied speculatively, broadcast on the bus), and is
//! written to the item store out of band. Server events arrive over the
//! transport and are reconciled per item: a confirmation removes the
//! pending entry, a divergent concurrent write raises a conflict that
//! blocks the item until resolved, and anything else is forwarded to
//! consumers as an external change.

pub mod client;
pub mod config;
mod conflict;
pub mod connection;
pub mod events;
mod ledger;
mod reconcile;
pub mod store;
pub mod transport;

pub use client::SyncClient;
pub use config::SyncConfig;
pub use conflict::MergeFn;
pub use connection::{ConnectionPhase, ConnectionState};
pub use events::EventBus;
pub use store::{HttpItemStore, ItemStore};
pub use transport::{MemoryHub, Transport, WebSocketTransport};

pub use trellis_types::{
    EventData, ItemKey, OptimisticUpdate, RealtimeEvent, RealtimeEventType, ResolutionStrategy,
    StoreError, SyncError, SyncEvent, SyncResult, TransportError, UpdateStatus,
};
