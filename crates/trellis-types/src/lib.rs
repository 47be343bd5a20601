//! Shared types for the Trellis sync ecosystem.
//!
//! These are the wire and bookkeeping types exchanged between the sync core
//! and the application components that embed it: realtime events as the
//! server pushes them, optimistic update records as the ledger tracks them,
//! and the error taxonomy for store/transport failures.

pub mod error;
pub mod event;
pub mod update;

pub use error::{StoreError, SyncError, SyncResult, TransportError};
pub use event::{EventData, ItemKey, RealtimeEvent, RealtimeEventType, SyncEvent};
pub use update::{OptimisticUpdate, ResolutionStrategy, UpdateStatus};
