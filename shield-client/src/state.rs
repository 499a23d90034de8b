use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use shield_common::{ClearOrder, EncryptedOrder, TxReceipt};

use crate::oplog::OperationLog;

/// Readiness of the FHE encryption instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FhevmStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error(String),
}

impl FhevmStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, FhevmStatus::Ready)
    }
}

/// A clear order together with the handles it was decrypted from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedOrder {
    pub handles: EncryptedOrder,
    pub clear: ClearOrder,
}

/// Everything the sync layer exposes to its readers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub chain_id: Option<u64>,
    pub chain_name: Option<String>,
    pub account: Option<Address>,
    /// ShieldSwap deployment on the active chain.
    pub contract: Option<Address>,
    pub fhevm_status: FhevmStatus,
    /// Last handles read for the active account; `None` until the first
    /// successful read.
    pub handles: Option<EncryptedOrder>,
    pub decrypted: Option<DecryptedOrder>,
    /// Receipt of the last order submitted under the active context.
    pub last_receipt: Option<TxReceipt>,
    pub is_refreshing: bool,
    pub is_decrypting: bool,
    pub is_submitting: bool,
    pub message: String,
    pub log: OperationLog,
}

impl SyncState {
    pub fn is_deployed(&self) -> bool {
        self.contract.is_some()
    }

    pub fn can_get_order(&self) -> bool {
        self.contract.is_some() && self.account.is_some() && !self.is_refreshing
    }

    pub fn can_submit(&self) -> bool {
        self.contract.is_some()
            && self.fhevm_status.is_ready()
            && self.account.is_some()
            && !self.is_refreshing
            && !self.is_submitting
    }

    pub fn can_decrypt(&self) -> bool {
        self.contract.is_some()
            && self.fhevm_status.is_ready()
            && self.account.is_some()
            && !self.is_refreshing
            && !self.is_decrypting
            && self.handles.is_some_and(|handles| handles.is_complete())
            && !self.is_decrypted()
    }

    /// Whether the cached clear order belongs to the mirrored handles.
    pub fn is_decrypted(&self) -> bool {
        matches!(
            (&self.decrypted, &self.handles),
            (Some(decrypted), Some(handles)) if decrypted.handles == *handles
        )
    }

    /// The clear order, only while it matches the mirrored handles.
    pub fn clear_order(&self) -> Option<ClearOrder> {
        self.decrypted
            .filter(|_| self.is_decrypted())
            .map(|decrypted| decrypted.clear)
    }

    pub fn is_busy(&self) -> bool {
        self.is_refreshing || self.is_decrypting || self.is_submitting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;

    fn ready() -> SyncState {
        SyncState {
            chain_id: Some(31337),
            account: Some(Address::repeat_byte(1)),
            contract: Some(Address::repeat_byte(2)),
            fhevm_status: FhevmStatus::Ready,
            ..Default::default()
        }
    }

    #[test]
    fn decrypt_needs_complete_handles() {
        let mut state = ready();
        assert!(state.can_submit());
        assert!(!state.can_decrypt());

        state.handles = Some(EncryptedOrder::EMPTY);
        assert!(!state.can_decrypt());

        state.handles = Some(EncryptedOrder::new(keccak256(b"a"), keccak256(b"b")));
        assert!(state.can_decrypt());

        state.fhevm_status = FhevmStatus::Loading;
        assert!(!state.can_decrypt());
        assert!(!state.can_submit());
    }

    #[test]
    fn clear_order_follows_the_handles() {
        let mut state = ready();
        let first = EncryptedOrder::new(keccak256(b"a"), keccak256(b"b"));
        state.handles = Some(first);
        state.decrypted = Some(DecryptedOrder {
            handles: first,
            clear: ClearOrder { from: 1, to: 2 },
        });
        assert!(state.is_decrypted());
        assert!(!state.can_decrypt());
        assert_eq!(state.clear_order(), Some(ClearOrder { from: 1, to: 2 }));

        state.handles = Some(EncryptedOrder::new(keccak256(b"c"), keccak256(b"d")));
        assert!(!state.is_decrypted());
        assert!(state.can_decrypt());
        assert_eq!(state.clear_order(), None);
    }

    #[test]
    fn in_flight_operations_gate_actions() {
        let mut state = ready();
        state.is_refreshing = true;
        assert!(!state.can_get_order());
        assert!(!state.can_submit());
        assert!(state.is_busy());

        state.is_refreshing = false;
        state.is_submitting = true;
        assert!(state.can_get_order());
        assert!(!state.can_submit());
    }
}
