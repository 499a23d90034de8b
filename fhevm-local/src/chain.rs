use std::{
    collections::{BTreeMap, HashMap},
    time::{SystemTime, UNIX_EPOCH},
};

use alloy::primitives::{keccak256, Address, Bytes, TxHash, B256};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use shield_common::{
    ChainError, ClearValues, EncryptedInput, EncryptedOrder, FheType, Handle, HandleContractPair,
    OrderCreatedLog, ServiceError, TxReceipt, UserDecryptRequest,
};
use shield_store::{CallContext, FheRuntime, ShieldSwap, StoreError};

use crate::{
    acl::Acl, config::HostConfig, coprocessor::Coprocessor, input_verifier::InputVerifier,
    kms::Kms,
};

/// Source of the devnet's notion of "now".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clock {
    /// Wall-clock time.
    System,
    /// A frozen instant, moved only explicitly.
    Fixed(u64),
}

impl Clock {
    pub fn now(&self) -> u64 {
        match self {
            Clock::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            Clock::Fixed(ts) => *ts,
        }
    }
}

/// The FHE runtime seen by contracts during one call. Grants are buffered
/// and only applied to the ACL once the call succeeded.
struct HostRuntime<'a> {
    verifier: &'a InputVerifier,
    grants: Vec<(Handle, Address)>,
}

impl FheRuntime for HostRuntime<'_> {
    fn from_external(
        &self,
        handle: Handle,
        expected: FheType,
        proof: &[u8],
        ctx: &CallContext,
    ) -> Result<Handle, StoreError> {
        self.verifier.verify(handle, expected, proof, ctx)
    }

    fn allow_this(&mut self, handle: Handle, ctx: &CallContext) {
        self.grants.push((handle, ctx.contract));
    }

    fn allow(&mut self, handle: Handle, account: Address) {
        self.grants.push((handle, account));
    }
}

/// Complete state of the devnet.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalChain {
    config: HostConfig,
    clock: Clock,
    block_number: u64,
    last_timestamp: u64,
    next_timestamp: Option<u64>,
    acl: Acl,
    input_verifier: InputVerifier,
    coprocessor: Coprocessor,
    kms: Kms,
    nonces: HashMap<Address, u64>,
    contracts: HashMap<Address, ShieldSwap>,
    deployments: BTreeMap<String, Address>,
    receipts: HashMap<TxHash, TxReceipt>,
}

impl Default for LocalChain {
    fn default() -> Self {
        Self::with_coprocessor(HostConfig::default(), Coprocessor::random())
    }
}

impl LocalChain {
    pub fn new(config: HostConfig) -> Self {
        Self::with_coprocessor(config, Coprocessor::random())
    }

    pub fn with_coprocessor(config: HostConfig, coprocessor: Coprocessor) -> Self {
        let signers = coprocessor.signer_address().into_iter().collect();
        Self {
            config,
            clock: Clock::System,
            block_number: 0,
            last_timestamp: 0,
            next_timestamp: None,
            acl: Acl::default(),
            input_verifier: InputVerifier::new(&config, signers),
            coprocessor,
            kms: Kms::new(&config),
            nonces: HashMap::new(),
            contracts: HashMap::new(),
            deployments: BTreeMap::new(),
            receipts: HashMap::new(),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    /// Timestamp of the latest block, 0 before the first one.
    pub fn latest_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Freeze the clock at `timestamp`.
    pub fn set_time(&mut self, timestamp: u64) {
        self.clock = Clock::Fixed(timestamp);
    }

    /// Move a frozen clock forward; freezes a wall clock at its current value
    /// first.
    pub fn advance_time(&mut self, seconds: u64) {
        self.clock = Clock::Fixed(self.clock.now() + seconds);
    }

    /// Force the timestamp of the next mined block.
    pub fn set_next_block_timestamp(&mut self, timestamp: u64) {
        self.next_timestamp = Some(timestamp);
    }

    pub fn acl(&self) -> &Acl {
        &self.acl
    }

    pub fn coprocessor(&self) -> &Coprocessor {
        &self.coprocessor
    }

    pub fn kms(&self) -> &Kms {
        &self.kms
    }

    fn pending_block_timestamp(&self) -> u64 {
        self.next_timestamp
            .unwrap_or_else(|| self.clock.now())
            .max(self.last_timestamp + 1)
    }

    fn mine(&mut self, timestamp: u64) -> B256 {
        self.next_timestamp = None;
        self.block_number += 1;
        self.last_timestamp = timestamp;
        let mut preimage = self.block_number.to_be_bytes().to_vec();
        preimage.extend_from_slice(&timestamp.to_be_bytes());
        keccak256(&preimage)
    }

    fn bump_nonce(&mut self, account: Address) -> u64 {
        let nonce = self.nonces.entry(account).or_default();
        let current = *nonce;
        *nonce += 1;
        current
    }

    /// Deploy a new ShieldSwap contract from `deployer`.
    pub fn deploy(&mut self, deployer: Address) -> Address {
        let nonce = self.bump_nonce(deployer);
        let address = deployer.create(nonce);
        let timestamp = self.pending_block_timestamp();
        self.mine(timestamp);
        self.contracts.insert(address, ShieldSwap::new(address));
        info!("deployed ShieldSwap at {address} (block {})", self.block_number);
        address
    }

    /// Deploy under `name` unless a deployment with that name already
    /// exists. Returns the address and whether it was newly deployed.
    pub fn deploy_named(&mut self, name: &str, deployer: Address) -> (Address, bool) {
        if let Some(address) = self.deployment(name) {
            if self.contracts.contains_key(&address) {
                return (address, false);
            }
        }
        let address = self.deploy(deployer);
        self.deployments.insert(name.to_string(), address);
        (address, true)
    }

    pub fn deployment(&self, name: &str) -> Option<Address> {
        self.deployments.get(name).copied()
    }

    pub fn contract(&self, address: &Address) -> Result<&ShieldSwap, ChainError> {
        self.contracts
            .get(address)
            .ok_or(ChainError::NotDeployed(*address))
    }

    pub fn get_my_order(
        &self,
        contract: Address,
        caller: Address,
    ) -> Result<EncryptedOrder, ChainError> {
        Ok(self.contract(&contract)?.get_my_order(caller))
    }

    pub fn has_order(&self, contract: Address, caller: Address) -> Result<bool, ChainError> {
        Ok(self.contract(&contract)?.has_order(caller))
    }

    pub fn get_my_order_timestamp(
        &self,
        contract: Address,
        caller: Address,
    ) -> Result<u64, ChainError> {
        Ok(self.contract(&contract)?.get_my_order_timestamp(caller))
    }

    pub fn protocol_id(&self, contract: Address) -> Result<u64, ChainError> {
        self.contract(&contract)?;
        Ok(ShieldSwap::protocol_id())
    }

    /// Execute `setOrder` from `sender` and mine it. A reverting call is not
    /// mined and leaves no trace.
    pub fn set_order(
        &mut self,
        sender: Address,
        contract: Address,
        order: EncryptedOrder,
        input_proof: &Bytes,
    ) -> Result<TxReceipt, ChainError> {
        let block_timestamp = self.pending_block_timestamp();
        let ctx = CallContext {
            sender,
            contract,
            block_timestamp,
            chain_id: self.config.chain_id,
        };

        let store = self
            .contracts
            .get_mut(&contract)
            .ok_or(ChainError::NotDeployed(contract))?;
        let mut runtime = HostRuntime {
            verifier: &self.input_verifier,
            grants: Vec::new(),
        };
        let event = store
            .set_order(
                &mut runtime,
                &ctx,
                order.from_amount,
                order.to_amount,
                input_proof,
            )
            .map_err(|e| ChainError::Reverted(e.to_string()))?;
        for (handle, account) in runtime.grants {
            self.acl.allow(handle, account);
        }

        let nonce = self.bump_nonce(sender);
        let mut preimage = sender.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(contract.as_slice());
        preimage.extend_from_slice(input_proof);
        let tx_hash = keccak256(&preimage);
        let block_hash = self.mine(block_timestamp);

        let receipt = TxReceipt {
            tx_hash,
            block_number: self.block_number,
            block_hash,
            status: true,
            orders_created: vec![OrderCreatedLog {
                contract,
                user: event.user,
                timestamp: event.timestamp,
            }],
        };
        self.receipts.insert(tx_hash, receipt.clone());
        debug!("setOrder from {sender} mined in block {}", self.block_number);

        Ok(receipt)
    }

    pub fn receipt(&self, tx_hash: &TxHash) -> Option<&TxReceipt> {
        self.receipts.get(tx_hash)
    }

    pub fn encrypt(
        &mut self,
        contract: Address,
        user: Address,
        values: &[(FheType, u64)],
    ) -> Result<EncryptedInput, ServiceError> {
        self.coprocessor.encrypt(&self.config, contract, user, values)
    }

    pub fn user_decrypt(
        &self,
        pairs: &[HandleContractPair],
        request: &UserDecryptRequest,
    ) -> Result<ClearValues, ServiceError> {
        self.kms
            .user_decrypt(&self.acl, &self.coprocessor, pairs, request, self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::dev_signer;
    use anyhow::Result;

    #[test]
    fn deploy_named_is_idempotent() {
        let mut chain = LocalChain::default();
        let deployer = dev_signer(0).unwrap().address();

        let (first, fresh) = chain.deploy_named("ShieldSwap", deployer);
        assert!(fresh);
        let (second, fresh) = chain.deploy_named("ShieldSwap", deployer);
        assert!(!fresh);
        assert_eq!(first, second);
        assert_eq!(first, deployer.create(0));
        assert_eq!(chain.block_number(), 1);
    }

    #[test]
    fn blocks_timestamps_strictly_increase() -> Result<()> {
        let mut chain = LocalChain::default();
        chain.set_time(1_000);
        let user = dev_signer(1).unwrap().address();
        let contract = chain.deploy(dev_signer(0).unwrap().address());
        assert_eq!(chain.latest_timestamp(), 1_000);

        let input = chain.encrypt(contract, user, &[(FheType::Uint32, 1), (FheType::Uint32, 2)])?;
        let order = EncryptedOrder::new(input.handles[0], input.handles[1]);
        let receipt = chain.set_order(user, contract, order, &input.input_proof)?;
        assert_eq!(receipt.orders_created[0].timestamp, 1_001);

        chain.set_next_block_timestamp(5_000);
        let input = chain.encrypt(contract, user, &[(FheType::Uint32, 3), (FheType::Uint32, 4)])?;
        let order = EncryptedOrder::new(input.handles[0], input.handles[1]);
        chain.set_order(user, contract, order, &input.input_proof)?;
        assert_eq!(chain.get_my_order_timestamp(contract, user)?, 5_000);
        Ok(())
    }

    #[test]
    fn reverted_calls_are_not_mined() -> Result<()> {
        let mut chain = LocalChain::default();
        let user = dev_signer(1).unwrap().address();
        let contract = chain.deploy(dev_signer(0).unwrap().address());
        let block = chain.block_number();

        let input = chain.encrypt(contract, user, &[(FheType::Uint32, 1), (FheType::Uint32, 2)])?;
        let order = EncryptedOrder::new(input.handles[0], input.handles[1]);
        let err = chain
            .set_order(user, contract, order, &Bytes::new())
            .unwrap_err();

        assert!(matches!(err, ChainError::Reverted(ref msg) if msg.starts_with("Invalid proof")));
        assert_eq!(chain.block_number(), block);
        assert!(!chain.acl().is_allowed(&input.handles[0], &user));
        assert!(!chain.has_order(contract, user)?);
        Ok(())
    }

    #[test]
    fn unknown_contract() {
        let chain = LocalChain::default();
        let nowhere = Address::repeat_byte(9);
        assert_eq!(
            chain.get_my_order(nowhere, Address::ZERO),
            Err(ChainError::NotDeployed(nowhere))
        );
    }
}
