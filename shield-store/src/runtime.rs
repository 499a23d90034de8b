use alloy::primitives::Address;
use shield_common::{FheType, Handle};

use crate::error::StoreError;

/// Execution context of a contract call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    /// `msg.sender`
    pub sender: Address,
    /// `address(this)`
    pub contract: Address,
    /// `block.timestamp`, in seconds since the epoch
    pub block_timestamp: u64,
    /// `block.chainid`
    pub chain_id: u64,
}

/// The FHE facilities a contract relies on: input verification and the
/// access control list.
///
/// Grants issued during a call only become effective if the call succeeds.
pub trait FheRuntime {
    /// Check that `handle` is covered by `proof`, was encrypted as
    /// `expected` for the calling contract and sender, and return the
    /// handle usable by the contract.
    fn from_external(
        &self,
        handle: Handle,
        expected: FheType,
        proof: &[u8],
        ctx: &CallContext,
    ) -> Result<Handle, StoreError>;

    /// Allow the calling contract itself to use `handle`.
    fn allow_this(&mut self, handle: Handle, ctx: &CallContext);

    /// Allow `account` to use `handle`, including off-chain decryption.
    fn allow(&mut self, handle: Handle, account: Address);
}
