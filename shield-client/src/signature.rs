//! User-signed decryption authorizations and their persistent cache.
use std::io;

use alloy::{
    primitives::{keccak256, Address, Bytes, B256},
    signers::{local::PrivateKeySigner, SignerSync},
    sol_types::SolStruct,
};
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use shield_common::{
    eip712::UserDecryptRequestVerification, ports::DecryptionOracle, UserDecryptRequest,
    MAX_CONTRACTS, MAX_DURATION_DAYS, SECONDS_PER_DAY,
};
use thiserror::Error;

use crate::storage::StringStorage;

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("invalid decryption authorization: {0}")]
    Invalid(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("signature storage: {0}")]
    Storage(#[from] io::Error),

    #[error("malformed cached signature: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A time-bounded grant letting the holder of `private_key` decrypt the
/// user's handles in `contract_addresses`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionSignature {
    pub public_key: Bytes,
    pub private_key: Bytes,
    pub signature: Bytes,
    /// Sorted and deduplicated.
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

/// Sort and deduplicate a contract set.
pub fn normalize_contracts(contracts: &[Address]) -> Vec<Address> {
    contracts.iter().copied().sorted().dedup().collect()
}

/// Storage key of the authorization `user` holds over `contracts`.
pub fn cache_key(user: Address, contracts: &[Address]) -> String {
    let mut preimage = user.to_vec();
    for contract in normalize_contracts(contracts) {
        preimage.extend_from_slice(contract.as_slice());
    }
    format!("0x{}", hex::encode(keccak256(preimage)))
}

impl DecryptionSignature {
    /// Generate a fresh keypair and sign a grant over `contracts`, valid from
    /// `now` for `duration_days`.
    pub fn sign<D: DecryptionOracle>(
        oracle: &D,
        contracts: &[Address],
        signer: &PrivateKeySigner,
        duration_days: u64,
        now: u64,
    ) -> Result<Self, SignatureError> {
        let contract_addresses = normalize_contracts(contracts);
        if contract_addresses.is_empty() || contract_addresses.len() > MAX_CONTRACTS {
            return Err(SignatureError::Invalid(format!(
                "between 1 and {MAX_CONTRACTS} contracts required, got {}",
                contract_addresses.len()
            )));
        }
        if duration_days == 0 || duration_days > MAX_DURATION_DAYS {
            return Err(SignatureError::Invalid(format!(
                "duration of {duration_days} days outside 1..={MAX_DURATION_DAYS}"
            )));
        }

        let private_key = B256::from(rand::random::<[u8; 32]>());
        let public_key = keccak256(private_key);
        let payload = UserDecryptRequestVerification::for_grant(
            Bytes::from(public_key.to_vec()),
            &contract_addresses,
            now,
            duration_days,
        );
        let signature = signer
            .sign_hash_sync(&payload.eip712_signing_hash(&oracle.eip712_domain()))
            .map_err(|e| SignatureError::Signing(e.to_string()))?;

        Ok(Self {
            public_key: Bytes::from(public_key.to_vec()),
            private_key: Bytes::from(private_key.to_vec()),
            signature: Bytes::from(signature.as_bytes().to_vec()),
            contract_addresses,
            user_address: signer.address(),
            start_timestamp: now,
            duration_days,
        })
    }

    /// Reuse the cached authorization of `signer` over `contracts` if it is
    /// still valid at `now`, otherwise sign and cache a new one. Expired or
    /// unreadable entries are removed.
    pub fn load_or_sign<D: DecryptionOracle>(
        oracle: &D,
        storage: &dyn StringStorage,
        contracts: &[Address],
        signer: &PrivateKeySigner,
        duration_days: u64,
        now: u64,
    ) -> Result<Self, SignatureError> {
        let user = signer.address();
        let key = cache_key(user, contracts);

        if let Some(raw) = storage.get_item(&key)? {
            match serde_json::from_str::<DecryptionSignature>(&raw) {
                Ok(cached) if cached.is_valid(now) && cached.covers(user, contracts) => {
                    debug!("reusing decryption signature {key}");
                    return Ok(cached);
                }
                _ => {
                    debug!("dropping stale decryption signature {key}");
                    storage.remove_item(&key)?;
                }
            }
        }

        let fresh = Self::sign(oracle, contracts, signer, duration_days, now)?;
        storage.set_item(&key, &serde_json::to_string(&fresh)?)?;
        debug!("cached new decryption signature {key}");
        Ok(fresh)
    }

    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    pub fn is_valid(&self, now: u64) -> bool {
        self.start_timestamp <= now && now < self.expires_at()
    }

    fn covers(&self, user: Address, contracts: &[Address]) -> bool {
        self.user_address == user && self.contract_addresses == normalize_contracts(contracts)
    }

    pub fn to_request(&self) -> UserDecryptRequest {
        UserDecryptRequest {
            public_key: self.public_key.clone(),
            private_key: self.private_key.clone(),
            signature: self.signature.clone(),
            contract_addresses: self.contract_addresses.clone(),
            user_address: self.user_address,
            start_timestamp: self.start_timestamp,
            duration_days: self.duration_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use fhevm_local::{accounts::dev_signer, LocalNode};
    use shield_common::eip712::recover_signer;

    const NOW: u64 = 1_750_000_000;

    #[test]
    fn contract_order_does_not_matter() {
        let (a, b) = (Address::repeat_byte(1), Address::repeat_byte(2));
        let user = Address::repeat_byte(9);
        assert_eq!(cache_key(user, &[a, b]), cache_key(user, &[b, a, b]));
        assert_ne!(cache_key(user, &[a]), cache_key(user, &[a, b]));
        assert_ne!(cache_key(user, &[a]), cache_key(Address::repeat_byte(8), &[a]));
    }

    #[test]
    fn signs_under_the_oracle_domain() -> anyhow::Result<()> {
        let node = LocalNode::default();
        let signer = dev_signer(1).unwrap();
        let contract = Address::repeat_byte(1);

        let sig = DecryptionSignature::sign(&node, &[contract], &signer, 7, NOW)?;
        let payload = UserDecryptRequestVerification::for_grant(
            sig.public_key.clone(),
            &sig.contract_addresses,
            sig.start_timestamp,
            sig.duration_days,
        );
        assert_eq!(
            recover_signer(&payload, &node.eip712_domain(), &sig.signature),
            Some(signer.address())
        );
        assert!(sig.is_valid(NOW));
        assert!(sig.is_valid(NOW + 7 * SECONDS_PER_DAY - 1));
        assert!(!sig.is_valid(NOW + 7 * SECONDS_PER_DAY));
        assert!(!sig.is_valid(NOW - 1));
        Ok(())
    }

    #[test]
    fn cached_signature_is_reused_until_expiry() -> anyhow::Result<()> {
        let node = LocalNode::default();
        let storage = InMemoryStorage::default();
        let signer = dev_signer(1).unwrap();
        let contracts = [Address::repeat_byte(1)];

        let first =
            DecryptionSignature::load_or_sign(&node, &storage, &contracts, &signer, 1, NOW)?;
        let again =
            DecryptionSignature::load_or_sign(&node, &storage, &contracts, &signer, 1, NOW + 60)?;
        assert_eq!(first, again);
        assert_eq!(storage.len(), 1);

        let later = NOW + SECONDS_PER_DAY;
        let renewed =
            DecryptionSignature::load_or_sign(&node, &storage, &contracts, &signer, 1, later)?;
        assert_ne!(first, renewed);
        assert_eq!(renewed.start_timestamp, later);
        assert_eq!(storage.len(), 1);
        Ok(())
    }

    #[test]
    fn garbage_in_the_cache_is_replaced() -> anyhow::Result<()> {
        let node = LocalNode::default();
        let storage = InMemoryStorage::default();
        let signer = dev_signer(2).unwrap();
        let contracts = [Address::repeat_byte(1)];
        storage.set_item(&cache_key(signer.address(), &contracts), "not json")?;

        let sig = DecryptionSignature::load_or_sign(&node, &storage, &contracts, &signer, 1, NOW)?;
        let stored = storage
            .get_item(&cache_key(signer.address(), &contracts))?
            .unwrap();
        assert_eq!(serde_json::from_str::<DecryptionSignature>(&stored)?, sig);
        Ok(())
    }

    #[test]
    fn out_of_range_requests_are_refused() {
        let node = LocalNode::default();
        let signer = dev_signer(1).unwrap();
        let many = (1..=11u8).map(Address::repeat_byte).collect::<Vec<_>>();

        assert!(DecryptionSignature::sign(&node, &[], &signer, 1, NOW).is_err());
        assert!(DecryptionSignature::sign(&node, &many, &signer, 1, NOW).is_err());
        assert!(DecryptionSignature::sign(&node, &many[..1], &signer, 366, NOW).is_err());
        assert!(DecryptionSignature::sign(&node, &many[..1], &signer, 0, NOW).is_err());
    }
}
