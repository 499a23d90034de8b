//! Where ShieldSwap is deployed, per chain.
use std::{collections::BTreeMap, path::Path};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shield_common::eth::chain_name;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEntry {
    pub address: Address,
    pub chain_id: u64,
    pub chain_name: String,
}

/// Deployment registry keyed by chain id, loadable from JSON of the form
/// `{"31337": {"address": "0x..", "chainId": 31337, "chainName": "hardhat"}}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deployments(BTreeMap<u64, DeploymentEntry>);

impl Deployments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parsing deployment registry")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading deployment registry {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Register `address` for `chain_id`, naming the chain after its id when
    /// it is a well-known one.
    pub fn with(mut self, chain_id: u64, address: Address) -> Self {
        self.insert(chain_id, address);
        self
    }

    pub fn insert(&mut self, chain_id: u64, address: Address) {
        let chain_name = chain_name(chain_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("chain-{chain_id}"));
        self.0.insert(
            chain_id,
            DeploymentEntry {
                address,
                chain_id,
                chain_name,
            },
        );
    }

    /// The deployment on `chain_id`; entries holding the zero address count
    /// as missing.
    pub fn resolve(&self, chain_id: u64) -> Option<&DeploymentEntry> {
        self.0
            .get(&chain_id)
            .filter(|entry| entry.address != Address::ZERO)
    }

    pub fn is_deployed(&self, chain_id: u64) -> bool {
        self.resolve(chain_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn resolves_from_json() -> Result<()> {
        let registry = Deployments::from_json(
            r#"{
                "11155111": {
                    "address": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
                    "chainId": 11155111,
                    "chainName": "sepolia"
                },
                "31337": {
                    "address": "0x0000000000000000000000000000000000000000",
                    "chainId": 31337,
                    "chainName": "hardhat"
                }
            }"#,
        )?;

        let sepolia = registry.resolve(11155111).unwrap();
        assert_eq!(
            sepolia.address,
            address!("5FbDB2315678afecb367f032d93F642f64180aa3")
        );
        assert_eq!(sepolia.chain_name, "sepolia");
        assert!(!registry.is_deployed(31337));
        assert!(!registry.is_deployed(1));
        Ok(())
    }

    #[test]
    fn well_known_chains_are_named() {
        let registry = Deployments::new()
            .with(31337, Address::repeat_byte(1))
            .with(7, Address::repeat_byte(2));
        assert_eq!(registry.resolve(31337).unwrap().chain_name, "Localhost");
        assert_eq!(registry.resolve(7).unwrap().chain_name, "chain-7");
    }
}
