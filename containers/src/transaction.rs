use crate::serde_helpers::hex_bytes;
use crate::{Bytes32, TransactionId};
use serde::{Deserialize, Serialize};

/// An unconfirmed transaction as received from a peer.
///
/// The transaction body is opaque to synchronization; only its id is derived here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
}

impl Transaction {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            id: Bytes32::digest(&bytes),
            bytes,
        }
    }

    /// Decode a transaction from its hex wire form.
    pub fn from_hex(encoded: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self::new(hex::decode(encoded.trim_start_matches("0x"))?))
    }
}
