//! Error taxonomy for the sync core.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using the sync core's error.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced from facade operations.
///
/// Transport failures never appear here: they are recovered by the
/// connection manager and surfaced only as status events on the bus.
/// Store rejections are likewise reported through the bus, per update.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No outstanding conflict with the given id.
    #[error("unknown conflict: {0}")]
    UnknownConflict(Uuid),

    /// The conflict referenced a ledger entry that is no longer pending.
    #[error("unknown pending update: {0}")]
    UnknownUpdate(Uuid),

    /// `Manual` resolution was requested without a final state.
    #[error("manual resolution requires a resolved state")]
    MissingResolution,

    /// `Merge` resolution was requested but no merge function is registered.
    #[error("merge resolution requires a registered merge function")]
    MissingMergeFn,

    /// The event type does not describe a store mutation.
    #[error("{0:?} is not a mutation and cannot be sent optimistically")]
    InvalidMutation(crate::event::RealtimeEventType),
}

/// Errors from the item store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never produced a usable response.
    #[error("item store request failed: {0}")]
    Http(String),

    /// The store refused the mutation. Terminal for that update.
    #[error("item store rejected the write ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The response body could not be interpreted.
    #[error("invalid item store response: {0}")]
    InvalidPayload(String),
}

/// Errors from the transport channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect transport: {0}")]
    Connect(String),

    #[error("transport closed: {0}")]
    Closed(String),

    #[error("transport protocol error: {0}")]
    Protocol(String),
}
