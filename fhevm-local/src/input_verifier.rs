use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use shield_common::{
    eip712::{input_verification_domain, recover_signer, CiphertextVerification},
    handle::HANDLE_VERSION,
    proof::InputProof,
    FheType, Handle, HandleMeta,
};
use shield_store::{CallContext, StoreError};

use crate::config::HostConfig;

/// Verifies that external handles are attested by a coprocessor signer for
/// the calling contract and sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputVerifier {
    gateway_chain_id: u64,
    verifying_contract: Address,
    signers: Vec<Address>,
}

impl InputVerifier {
    pub fn new(config: &HostConfig, signers: Vec<Address>) -> Self {
        Self {
            gateway_chain_id: config.gateway_chain_id,
            verifying_contract: config.input_verification_contract,
            signers,
        }
    }

    pub fn signers(&self) -> &[Address] {
        &self.signers
    }

    pub fn verify(
        &self,
        handle: Handle,
        expected: FheType,
        proof: &[u8],
        ctx: &CallContext,
    ) -> Result<Handle, StoreError> {
        let proof =
            InputProof::decode(proof).map_err(|e| StoreError::invalid_proof(e.to_string()))?;

        let meta = HandleMeta::parse(&handle);
        if proof.handles.get(meta.index as usize) != Some(&handle) {
            return Err(StoreError::invalid_proof(format!(
                "handle {handle} is not covered by the proof"
            )));
        }
        if meta.chain_id != ctx.chain_id {
            return Err(StoreError::invalid_proof(format!(
                "handle issued for chain {} used on chain {}",
                meta.chain_id, ctx.chain_id
            )));
        }
        if meta.fhe_type != Some(expected) {
            return Err(StoreError::invalid_proof(format!(
                "handle of type {:?} where {expected:?} is expected",
                meta.fhe_type
            )));
        }
        if meta.version != HANDLE_VERSION {
            return Err(StoreError::invalid_proof(format!(
                "unsupported handle version {}",
                meta.version
            )));
        }
        if proof.signatures.is_empty() {
            return Err(StoreError::invalid_proof("proof carries no signature"));
        }

        let payload = CiphertextVerification::for_batch(
            &proof.handles,
            ctx.sender,
            ctx.contract,
            ctx.chain_id,
            proof.extra_data.clone(),
        );
        let domain = input_verification_domain(self.gateway_chain_id, self.verifying_contract);
        for signature in &proof.signatures {
            match recover_signer(&payload, &domain, signature) {
                Some(signer) if self.signers.contains(&signer) => {}
                _ => {
                    return Err(StoreError::invalid_proof(
                        "proof not signed by a coprocessor for this contract and sender",
                    ))
                }
            }
        }

        Ok(handle)
    }
}
