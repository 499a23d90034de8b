use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use shield_common::eth::LOCALHOST_CHAIN_ID;

/// Chain id of the gateway chain the FHE services sign under.
pub const GATEWAY_CHAIN_ID: u64 = 55815;

/// Contract named as verifying contract in input proofs.
pub const INPUT_VERIFICATION_ADDRESS: Address =
    address!("7048c39f048125eda9d678aebadfb22f7900a29f");

/// Contract named as verifying contract in user decryption requests.
pub const DECRYPTION_ADDRESS: Address = address!("b6e160b1ff80d67bfe90a85ee06ce0a2613607d1");

/// Static parameters of the devnet and its FHE services.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    pub chain_id: u64,
    pub gateway_chain_id: u64,
    pub input_verification_contract: Address,
    pub decryption_contract: Address,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            chain_id: LOCALHOST_CHAIN_ID,
            gateway_chain_id: GATEWAY_CHAIN_ID,
            input_verification_contract: INPUT_VERIFICATION_ADDRESS,
            decryption_contract: DECRYPTION_ADDRESS,
        }
    }
}

impl HostConfig {
    pub fn with_chain_id(chain_id: u64) -> Self {
        Self {
            chain_id,
            ..Default::default()
        }
    }
}
