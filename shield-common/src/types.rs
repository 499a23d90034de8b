use std::{collections::HashMap, fmt};

use alloy::primitives::{Address, Bytes, TxHash, B256};
use serde::{Deserialize, Serialize};

use crate::handle::{is_zero, Handle, ZERO_HANDLE};

/// The pair of ciphertext handles making up a swap order, as returned by
/// `getMyOrder()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedOrder {
    pub from_amount: Handle,
    pub to_amount: Handle,
}

impl EncryptedOrder {
    /// The value read for an account that never submitted an order.
    pub const EMPTY: Self = Self {
        from_amount: ZERO_HANDLE,
        to_amount: ZERO_HANDLE,
    };

    pub fn new(from_amount: Handle, to_amount: Handle) -> Self {
        Self {
            from_amount,
            to_amount,
        }
    }

    /// True iff both handles are the zero handle.
    pub fn is_empty(&self) -> bool {
        is_zero(&self.from_amount) && is_zero(&self.to_amount)
    }

    /// True iff both handles reference a ciphertext.
    pub fn is_complete(&self) -> bool {
        !is_zero(&self.from_amount) && !is_zero(&self.to_amount)
    }
}

/// A decrypted swap order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClearOrder {
    pub from: u32,
    pub to: u32,
}

impl fmt::Display for ClearOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from={} to={}", self.from, self.to)
    }
}

/// Result of encrypting one input batch: one handle per added value and a
/// single proof covering all of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedInput {
    pub handles: Vec<Handle>,
    pub input_proof: Bytes,
}

/// A handle together with the contract it is meant to be decrypted through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleContractPair {
    pub handle: Handle,
    pub contract_address: Address,
}

/// Clear values keyed by the handle they were decrypted from.
pub type ClearValues = HashMap<Handle, u64>;

/// Everything the decryption oracle needs to authorize a user decryption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDecryptRequest {
    pub public_key: Bytes,
    pub private_key: Bytes,
    pub signature: Bytes,
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

/// Decoded `OrderCreated(address indexed user, uint256 timestamp)` log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedLog {
    pub contract: Address,
    pub user: Address,
    pub timestamp: u64,
}

/// Receipt of a mined transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub block_hash: B256,
    pub status: bool,
    pub orders_created: Vec<OrderCreatedLog>,
}
