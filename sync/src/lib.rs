pub mod block_sync;
pub mod config;
pub mod error;
/// Block synchronization and fork resolution.
///
/// This crate brings the local chain tip into agreement with the network. It
/// includes:
///
/// - **Synchronizer**: Entry point for received blocks, selects and runs a mechanism
/// - **Run Guard**: Guarantees at most one synchronization runs at a time
/// - **Mechanisms**: Pluggable strategies, checked in registration order
/// - **Startup Recovery**: Reconciles the temporary block table after a restart
/// - **Block Sync**: Catch-up mechanism downloading missing blocks from a peer
/// - **Pending Transactions**: Seeds the transaction pool from a peer
///
/// ## Architecture
///
/// 1. `Synchronizer::init` runs startup recovery once, before any sync
/// 2. A received block is handed to `Synchronizer::run` with its sender
/// 3. The first mechanism whose `is_valid_for` holds runs the reconciliation
/// 4. The guard is released on every exit path
///
/// Storage, block processing, transport and the transaction pool are external.
/// They are reached through the traits in [`types`].
pub mod mechanism;
pub mod recovery;
pub mod schema;
pub mod states;
pub mod synchronizer;
pub mod transactions;
pub mod types;

pub use block_sync::BlockSyncMechanism;
pub use config::*;
pub use error::{ErrorKind, RecoveryError, SyncError};
pub use mechanism::{DynamicMechanism, Mechanism, MechanismDefinition};
pub use recovery::{RecoveryOutcome, StartupRecovery};
pub use schema::{FieldError, ValidationErrors};
pub use states::{RunGuard, RunPermit, SyncState};
pub use synchronizer::{Synchronizer, SynchronizerBuilder};
pub use transactions::PendingTransactionsReport;
pub use types::*;

#[cfg(test)]
mod tests;
