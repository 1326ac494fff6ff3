//! Error types for the sync engine and its collaborator boundaries.

use thiserror::Error;
use uuid::Uuid;

/// Result type for sync engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for directory client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by a directory client implementation.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The requested entry does not exist in the directory.
    #[error("entry '{0}' not found")]
    EntryNotFound(String),

    /// The entry exists but does not carry the requested attribute.
    #[error("attribute '{attribute}' not found on entry '{entry}'")]
    AttributeNotFound {
        /// DN of the entry that was read.
        entry: String,
        /// Name of the missing attribute.
        attribute: String,
    },

    /// Communication with the remote directory failed.
    ///
    /// A single generic wrapper for all transport-level failures; the engine
    /// performs no retries at this layer.
    #[error("directory communication failed: {message}")]
    Communication {
        /// Description of the underlying transport failure.
        message: String,
    },
}

impl ClientError {
    /// Creates a communication error from any displayable failure.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    /// Returns true if this is a transport-level failure rather than a
    /// missing entry or attribute.
    pub fn is_communication(&self) -> bool {
        matches!(self, Self::Communication { .. })
    }
}

/// Errors raised by an affiliation store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record is stored under the requested key.
    #[error("affiliation record not found")]
    NotFound,

    /// The backing medium failed.
    #[error("affiliation store failure: {0}")]
    Backend(String),
}

/// Errors raised by the synchronization engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The affiliation store holds no record under the engine's key.
    #[error("affiliation record not found")]
    AffiliationNotFound,

    /// Incremental sync was requested but no full sync has recorded a
    /// watermark yet. The remedy is to run a full sync.
    #[error("no full synchronization has been performed for this affiliation yet")]
    InitialFullSyncRequired,

    /// The remote directory reports a different invocation id than the one
    /// recorded at the last sync, meaning it was restored from a backup and
    /// the recorded watermark is no longer trustworthy. The remedy is to run
    /// a full sync.
    #[error("remote invocation id {actual} does not match the recorded {expected}")]
    InvocationIdMismatch {
        /// Invocation id recorded on the affiliation record.
        expected: Uuid,
        /// Invocation id the remote directory currently reports.
        actual: Uuid,
    },

    /// The remote directory returned metadata the engine cannot work with
    /// (missing or non-numeric sequence counter, undecodable invocation id,
    /// unresolvable deleted-objects container).
    #[error("remote directory state invalid: {0}")]
    RemoteStateInvalid(String),

    /// A directory client operation failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The affiliation store failed to load or persist the record.
    #[error(transparent)]
    Store(StoreError),
}

impl SyncError {
    /// Returns true exactly for the errors whose remedy is running a full
    /// sync: the incremental watermark is absent or untrustworthy, but the
    /// remote directory itself is healthy.
    pub fn requires_full_sync(&self) -> bool {
        matches!(
            self,
            Self::InitialFullSyncRequired | Self::InvocationIdMismatch { .. }
        )
    }
}
