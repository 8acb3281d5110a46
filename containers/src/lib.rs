pub mod block;
pub mod height;
pub mod serde_helpers;
pub mod transaction;
pub mod types;

pub use block::{Block, BlockHeader, RawBlock, TempBlock};
pub use height::Height;
pub use transaction::Transaction;
pub use types::{BlockId, Bytes32, TransactionId};
