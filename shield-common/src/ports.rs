//! Ports through which clients reach the order store and the FHE services.
//!
//! Implementations:
//! - `fhevm_local::LocalNode`, an in-process devnet used by tests and the CLI
//! - `shield_client::rpc::RpcOrderStore`, alloy bindings against a live node
use std::future::Future;

use alloy::{
    primitives::{Address, Bytes, TxHash},
    signers::local::PrivateKeySigner,
    sol_types::Eip712Domain,
};

use crate::{
    error::{ChainError, ServiceError},
    handle::FheType,
    types::{
        ClearValues, EncryptedInput, EncryptedOrder, HandleContractPair, TxReceipt,
        UserDecryptRequest,
    },
};

/// Access to deployed ShieldSwap contracts.
///
/// Read calls are scoped by `caller`, which plays the role of `msg.sender`.
pub trait OrderStorePort: Send + Sync {
    fn get_my_order(
        &self,
        contract: Address,
        caller: Address,
    ) -> impl Future<Output = Result<EncryptedOrder, ChainError>> + Send;

    fn has_order(
        &self,
        contract: Address,
        caller: Address,
    ) -> impl Future<Output = Result<bool, ChainError>> + Send;

    fn get_my_order_timestamp(
        &self,
        contract: Address,
        caller: Address,
    ) -> impl Future<Output = Result<u64, ChainError>> + Send;

    fn protocol_id(&self, contract: Address)
        -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Send a `setOrder` transaction signed by `signer`, returning once the
    /// transaction has been accepted by the endpoint.
    fn send_set_order(
        &self,
        contract: Address,
        signer: &PrivateKeySigner,
        order: EncryptedOrder,
        input_proof: Bytes,
    ) -> impl Future<Output = Result<TxHash, ChainError>> + Send;

    /// Wait for the transaction to be mined.
    fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;
}

/// The FHE encryption service.
pub trait EncryptionService: Send + Sync {
    /// Encrypt `values` as one input batch bound to `contract` and `user`.
    fn encrypt(
        &self,
        contract: Address,
        user: Address,
        values: &[(FheType, u64)],
    ) -> impl Future<Output = Result<EncryptedInput, ServiceError>> + Send;

    /// Start an input batch bound to `contract` and `user`.
    fn create_encrypted_input(
        &self,
        contract: Address,
        user: Address,
    ) -> EncryptedInputBuilder<'_, Self>
    where
        Self: Sized,
    {
        EncryptedInputBuilder {
            service: self,
            contract,
            user,
            values: Vec::new(),
        }
    }
}

/// The off-chain decryption oracle.
pub trait DecryptionOracle: Send + Sync {
    /// EIP-712 domain users sign their decryption requests under.
    fn eip712_domain(&self) -> Eip712Domain;

    /// Decrypt every handle in `pairs` in one batch for the user named in
    /// `request`.
    fn user_decrypt(
        &self,
        pairs: &[HandleContractPair],
        request: &UserDecryptRequest,
    ) -> impl Future<Output = Result<ClearValues, ServiceError>> + Send;
}

/// Collects the plaintexts of one input batch before encryption.
pub struct EncryptedInputBuilder<'a, E: EncryptionService> {
    service: &'a E,
    contract: Address,
    user: Address,
    values: Vec<(FheType, u64)>,
}

impl<E: EncryptionService> EncryptedInputBuilder<'_, E> {
    pub fn add32(&mut self, value: u32) -> &mut Self {
        self.values.push((FheType::Uint32, value as u64));
        self
    }

    pub fn add64(&mut self, value: u64) -> &mut Self {
        self.values.push((FheType::Uint64, value));
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub async fn encrypt(&self) -> Result<EncryptedInput, ServiceError> {
        self.service
            .encrypt(self.contract, self.user, &self.values)
            .await
    }
}
