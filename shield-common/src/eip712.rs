//! EIP-712 payloads signed by the coprocessor (input proofs) and by users
//! (decryption authorizations).
use std::borrow::Cow;

use alloy::{
    primitives::{Address, Bytes, Signature, B256, U256},
    sol,
    sol_types::{Eip712Domain, SolStruct},
};

use crate::handle::Handle;

sol! {
    /// Attestation that a batch of handles was encrypted by `userAddress` for
    /// `contractAddress`.
    struct CiphertextVerification {
        bytes32[] ctHandles;
        address userAddress;
        address contractAddress;
        uint256 contractChainId;
        bytes extraData;
    }

    /// Grant allowing the holder of `publicKey` to decrypt handles of the
    /// listed contracts during the validity window.
    struct UserDecryptRequestVerification {
        bytes publicKey;
        address[] contractAddresses;
        uint256 startTimestamp;
        uint256 durationDays;
        bytes extraData;
    }
}

/// Domain under which input proofs are signed.
pub fn input_verification_domain(chain_id: u64, verifying_contract: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed("InputVerification")),
        Some(Cow::Borrowed("1")),
        Some(U256::from(chain_id)),
        Some(verifying_contract),
        None,
    )
}

/// Domain under which user decryption requests are signed.
pub fn decryption_domain(chain_id: u64, verifying_contract: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed("Decryption")),
        Some(Cow::Borrowed("1")),
        Some(U256::from(chain_id)),
        Some(verifying_contract),
        None,
    )
}

impl CiphertextVerification {
    pub fn for_batch(
        handles: &[Handle],
        user: Address,
        contract: Address,
        chain_id: u64,
        extra_data: Bytes,
    ) -> Self {
        Self {
            ctHandles: handles.to_vec(),
            userAddress: user,
            contractAddress: contract,
            contractChainId: U256::from(chain_id),
            extraData: extra_data,
        }
    }
}

impl UserDecryptRequestVerification {
    pub fn for_grant(
        public_key: Bytes,
        contracts: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Self {
        Self {
            publicKey: public_key,
            contractAddresses: contracts.to_vec(),
            startTimestamp: U256::from(start_timestamp),
            durationDays: U256::from(duration_days),
            extraData: Bytes::new(),
        }
    }
}

/// Recover the address that signed `payload` under `domain`.
pub fn recover_signer<T: SolStruct>(
    payload: &T,
    domain: &Eip712Domain,
    signature: &[u8],
) -> Option<Address> {
    let signature = Signature::try_from(signature).ok()?;
    let hash: B256 = payload.eip712_signing_hash(domain);
    signature.recover_address_from_prehash(&hash).ok()
}
