use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use alloy::{
    primitives::{Address, Bytes, TxHash},
    signers::local::PrivateKeySigner,
    sol_types::Eip712Domain,
};
use anyhow::{Context, Result};
use log::{debug, info};
use shield_common::{
    eip712::decryption_domain,
    ports::{DecryptionOracle, EncryptionService, OrderStorePort},
    ChainError, ClearValues, EncryptedInput, EncryptedOrder, FheType, HandleContractPair,
    ServiceError, TxReceipt, UserDecryptRequest,
};
use tokio::sync::RwLock;

use crate::{chain::LocalChain, config::HostConfig};

/// Error message a browser wallet surfaces when its RPC is down.
const OFFLINE_MESSAGE: &str = "Failed to fetch";

/// Shared handle on a [`LocalChain`], serving the order store, the
/// encryption service and the decryption oracle.
///
/// Clones share the same chain.
#[derive(Clone, Debug)]
pub struct LocalNode {
    chain: Arc<RwLock<LocalChain>>,
    config: HostConfig,
    offline: Arc<AtomicBool>,
}

impl Default for LocalNode {
    fn default() -> Self {
        Self::new(LocalChain::default())
    }
}

impl LocalNode {
    pub fn new(chain: LocalChain) -> Self {
        Self {
            config: *chain.config(),
            chain: Arc::new(RwLock::new(chain)),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Restore a devnet saved with [`LocalNode::save`], or start a fresh one
    /// if `path` does not exist.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            info!("no devnet state at {}, starting a fresh chain", path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading devnet state from {}", path.display()))?;
        let chain: LocalChain = serde_json::from_slice(&content)
            .with_context(|| format!("parsing devnet state from {}", path.display()))?;
        debug!(
            "loaded devnet at block {} from {}",
            chain.block_number(),
            path.display()
        );
        Ok(Self::new(chain))
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_vec_pretty(&*self.chain.read().await)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("writing devnet state to {}", path.display()))
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// A copy of the current chain state.
    pub async fn snapshot(&self) -> LocalChain {
        self.chain.read().await.clone()
    }

    pub async fn read<T, F: FnOnce(&LocalChain) -> T>(&self, f: F) -> T {
        f(&*self.chain.read().await)
    }

    pub async fn write<T, F: FnOnce(&mut LocalChain) -> T>(&self, f: F) -> T {
        f(&mut *self.chain.write().await)
    }

    /// Simulate an unreachable endpoint: every port call fails with a
    /// transport error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), ChainError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ChainError::Transport(OFFLINE_MESSAGE.to_string()))
        } else {
            Ok(())
        }
    }

    fn ensure_service_online(&self) -> Result<(), ServiceError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ServiceError::Transport(OFFLINE_MESSAGE.to_string()))
        } else {
            Ok(())
        }
    }
}

impl OrderStorePort for LocalNode {
    async fn get_my_order(
        &self,
        contract: Address,
        caller: Address,
    ) -> Result<EncryptedOrder, ChainError> {
        self.ensure_online()?;
        self.chain.read().await.get_my_order(contract, caller)
    }

    async fn has_order(&self, contract: Address, caller: Address) -> Result<bool, ChainError> {
        self.ensure_online()?;
        self.chain.read().await.has_order(contract, caller)
    }

    async fn get_my_order_timestamp(
        &self,
        contract: Address,
        caller: Address,
    ) -> Result<u64, ChainError> {
        self.ensure_online()?;
        self.chain
            .read()
            .await
            .get_my_order_timestamp(contract, caller)
    }

    async fn protocol_id(&self, contract: Address) -> Result<u64, ChainError> {
        self.ensure_online()?;
        self.chain.read().await.protocol_id(contract)
    }

    async fn send_set_order(
        &self,
        contract: Address,
        signer: &PrivateKeySigner,
        order: EncryptedOrder,
        input_proof: Bytes,
    ) -> Result<TxHash, ChainError> {
        self.ensure_online()?;
        let receipt = self.chain.write().await.set_order(
            signer.address(),
            contract,
            order,
            &input_proof,
        )?;
        Ok(receipt.tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        self.ensure_online()?;
        self.chain
            .read()
            .await
            .receipt(&tx_hash)
            .cloned()
            .ok_or(ChainError::TxNotFound(tx_hash))
    }
}

impl EncryptionService for LocalNode {
    async fn encrypt(
        &self,
        contract: Address,
        user: Address,
        values: &[(FheType, u64)],
    ) -> Result<EncryptedInput, ServiceError> {
        self.ensure_service_online()?;
        self.chain.write().await.encrypt(contract, user, values)
    }
}

impl DecryptionOracle for LocalNode {
    fn eip712_domain(&self) -> Eip712Domain {
        decryption_domain(self.config.gateway_chain_id, self.config.decryption_contract)
    }

    async fn user_decrypt(
        &self,
        pairs: &[HandleContractPair],
        request: &UserDecryptRequest,
    ) -> Result<ClearValues, ServiceError> {
        self.ensure_service_online()?;
        self.chain.read().await.user_decrypt(pairs, request)
    }
}
