use std::collections::HashMap;

use alloy::{
    primitives::{keccak256, Address, Bytes, B256},
    signers::{local::PrivateKeySigner, SignerSync},
    sol_types::SolStruct,
};
use log::debug;
use serde::{Deserialize, Serialize};
use shield_common::{
    eip712::{input_verification_domain, CiphertextVerification},
    handle::compute_handle,
    proof::InputProof,
    EncryptedInput, FheType, Handle, ServiceError,
};

use crate::config::HostConfig;

/// Largest number of values one input batch may carry.
pub const MAX_BATCH_SIZE: usize = 254;

const HANDLE_DOMAIN_SEPARATOR: &[u8] = b"ZK-w_hdl";

/// A value held by the coprocessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plaintext {
    pub fhe_type: FheType,
    pub value: u64,
}

/// Encrypts input batches, signs their proofs and keeps the plaintext behind
/// every handle it issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coprocessor {
    signer_key: B256,
    ciphertexts: HashMap<Handle, Plaintext>,
    nonce: u64,
}

impl Coprocessor {
    pub fn new(signer_key: B256) -> Self {
        Self {
            signer_key,
            ciphertexts: HashMap::new(),
            nonce: 0,
        }
    }

    /// A coprocessor with a freshly generated signing key.
    pub fn random() -> Self {
        Self::new(PrivateKeySigner::random().to_bytes())
    }

    fn signer(&self) -> Result<PrivateKeySigner, ServiceError> {
        PrivateKeySigner::from_bytes(&self.signer_key)
            .map_err(|e| ServiceError::internal(format!("invalid coprocessor key: {e}")))
    }

    pub fn signer_address(&self) -> Result<Address, ServiceError> {
        Ok(self.signer()?.address())
    }

    /// Encrypt `values` as one batch bound to `contract` and `user`.
    pub fn encrypt(
        &mut self,
        config: &HostConfig,
        contract: Address,
        user: Address,
        values: &[(FheType, u64)],
    ) -> Result<EncryptedInput, ServiceError> {
        if values.is_empty() {
            return Err(ServiceError::rejected("empty input batch"));
        }
        if values.len() > MAX_BATCH_SIZE {
            return Err(ServiceError::rejected(format!(
                "input batch of {} values exceeds {MAX_BATCH_SIZE}",
                values.len()
            )));
        }
        if let Some((ty, value)) = values.iter().find(|(ty, value)| *value > ty.max_value()) {
            return Err(ServiceError::rejected(format!(
                "value {value} does not fit in {ty:?}"
            )));
        }

        let mut preimage = Vec::with_capacity(HANDLE_DOMAIN_SEPARATOR.len() + 2 * 20 + 16);
        preimage.extend_from_slice(HANDLE_DOMAIN_SEPARATOR);
        preimage.extend_from_slice(contract.as_slice());
        preimage.extend_from_slice(user.as_slice());
        preimage.extend_from_slice(&config.chain_id.to_be_bytes());
        preimage.extend_from_slice(&self.nonce.to_be_bytes());
        let batch_digest = keccak256(&preimage);

        let handles = values
            .iter()
            .enumerate()
            .map(|(index, (ty, _))| {
                compute_handle(&batch_digest, index as u8, config.chain_id, *ty)
            })
            .collect::<Vec<_>>();

        let payload = CiphertextVerification::for_batch(
            &handles,
            user,
            contract,
            config.chain_id,
            Bytes::new(),
        );
        let domain =
            input_verification_domain(config.gateway_chain_id, config.input_verification_contract);
        let signature = self
            .signer()?
            .sign_hash_sync(&payload.eip712_signing_hash(&domain))
            .map_err(|e| ServiceError::internal(format!("signing input proof: {e}")))?;
        let input_proof = InputProof {
            handles: handles.clone(),
            signatures: vec![signature.as_bytes()],
            extra_data: Bytes::new(),
        }
        .encode()
        .map_err(|e| ServiceError::internal(e.to_string()))?;

        self.nonce += 1;
        for (handle, (fhe_type, value)) in handles.iter().zip(values) {
            self.ciphertexts.insert(
                *handle,
                Plaintext {
                    fhe_type: *fhe_type,
                    value: *value,
                },
            );
        }
        debug!(
            "encrypted {} values for {user} on {contract}",
            handles.len()
        );

        Ok(EncryptedInput {
            handles,
            input_proof,
        })
    }

    pub fn plaintext(&self, handle: &Handle) -> Option<Plaintext> {
        self.ciphertexts.get(handle).copied()
    }
}
