use containers::{BlockId, Height};
use thiserror::Error;

use crate::schema::ValidationErrors;

/// Broad category of a [`SyncError`], for callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or network payload. Not worth retrying with the same data.
    Validation,
    /// The synchronizer cannot accept work right now.
    Concurrency,
    /// A configured mechanism is incomplete. Fatal to startup configuration.
    MechanismContract,
    /// Failure reported by storage, network or a mechanism, passed through untouched.
    Collaborator,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("A block must be provided to the Synchronizer in order to run")]
    MissingBlock,

    #[error("block failed validation: {0}")]
    InvalidBlock(ValidationErrors),

    #[error("response does not match schema {schema}: {errors}")]
    Schema {
        schema: &'static str,
        errors: ValidationErrors,
    },

    #[error("Synchronizer is already running")]
    AlreadyRunning,

    #[error("Synchronizer has not been initialized")]
    NotInitialized,

    #[error("Mechanism Object should implement \"{operation}\" method")]
    MechanismContract {
        mechanism: String,
        operation: &'static str,
    },

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::MissingBlock | SyncError::InvalidBlock(_) | SyncError::Schema { .. } => {
                ErrorKind::Validation
            }
            SyncError::AlreadyRunning | SyncError::NotInitialized => ErrorKind::Concurrency,
            SyncError::MechanismContract { .. } => ErrorKind::MechanismContract,
            SyncError::Collaborator(_) => ErrorKind::Collaborator,
        }
    }

    /// Field-addressed errors carried by validation failures.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            SyncError::InvalidBlock(errors) | SyncError::Schema { errors, .. } => Some(errors),
            _ => None,
        }
    }
}

/// Failure while reconciling the temporary block table at startup.
///
/// Never leaves `Synchronizer::init`; it is logged there and the node keeps running.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("failed to read the temporary block table")]
    ReadTempBlocks(#[source] anyhow::Error),

    #[error("failed to read the canonical chain")]
    ReadCanonical(#[source] anyhow::Error),

    #[error("temporary block table is not a single chain anchored in the canonical chain: block {id} at height {height} does not follow its predecessor")]
    BrokenTempChain { height: Height, id: BlockId },

    #[error("failed to delete the canonical block at height {height}")]
    Rollback {
        height: Height,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to replay temporary block {id} at height {height}")]
    Replay {
        height: Height,
        id: BlockId,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to clear the temporary block table")]
    Clear(#[source] anyhow::Error),
}
