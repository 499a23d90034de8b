use alloy::{primitives::Address, sol_types::Eip712Domain};
use log::debug;
use serde::{Deserialize, Serialize};
use shield_common::{
    eip712::{decryption_domain, recover_signer, UserDecryptRequestVerification},
    ClearValues, HandleContractPair, ServiceError, UserDecryptRequest, MAX_CONTRACTS,
    MAX_DURATION_DAYS, SECONDS_PER_DAY,
};

use crate::{acl::Acl, config::HostConfig, coprocessor::Coprocessor};

/// The decryption oracle: releases plaintexts to users holding both an ACL
/// grant and a valid signed decryption request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kms {
    gateway_chain_id: u64,
    verifying_contract: Address,
}

impl Kms {
    pub fn new(config: &HostConfig) -> Self {
        Self {
            gateway_chain_id: config.gateway_chain_id,
            verifying_contract: config.decryption_contract,
        }
    }

    pub fn domain(&self) -> Eip712Domain {
        decryption_domain(self.gateway_chain_id, self.verifying_contract)
    }

    /// Check `request` at time `now` and decrypt all of `pairs`, or nothing.
    pub fn user_decrypt(
        &self,
        acl: &Acl,
        coprocessor: &Coprocessor,
        pairs: &[HandleContractPair],
        request: &UserDecryptRequest,
        now: u64,
    ) -> Result<ClearValues, ServiceError> {
        if pairs.is_empty() {
            return Err(ServiceError::rejected("no handle to decrypt"));
        }
        let contracts = request.contract_addresses.len();
        if contracts == 0 || contracts > MAX_CONTRACTS {
            return Err(ServiceError::rejected(format!(
                "a decryption request must name between 1 and {MAX_CONTRACTS} contracts"
            )));
        }
        if request.duration_days == 0 || request.duration_days > MAX_DURATION_DAYS {
            return Err(ServiceError::rejected(format!(
                "duration of {} days outside 1..={MAX_DURATION_DAYS}",
                request.duration_days
            )));
        }
        let expiry = request
            .start_timestamp
            .saturating_add(request.duration_days * SECONDS_PER_DAY);
        if now < request.start_timestamp || now >= expiry {
            return Err(ServiceError::unauthorized(format!(
                "decryption request valid from {} to {expiry}, now is {now}",
                request.start_timestamp
            )));
        }

        let payload = UserDecryptRequestVerification::for_grant(
            request.public_key.clone(),
            &request.contract_addresses,
            request.start_timestamp,
            request.duration_days,
        );
        let signer = recover_signer(&payload, &self.domain(), &request.signature);
        if signer != Some(request.user_address) {
            return Err(ServiceError::unauthorized(format!(
                "request not signed by {}",
                request.user_address
            )));
        }

        let mut clear = ClearValues::with_capacity(pairs.len());
        for pair in pairs {
            if pair.contract_address == request.user_address {
                return Err(ServiceError::rejected(
                    "user address and contract address must differ",
                ));
            }
            if !request.contract_addresses.contains(&pair.contract_address) {
                return Err(ServiceError::unauthorized(format!(
                    "contract {} is not covered by the signed request",
                    pair.contract_address
                )));
            }
            if !acl.is_allowed(&pair.handle, &request.user_address)
                || !acl.is_allowed(&pair.handle, &pair.contract_address)
            {
                return Err(ServiceError::unauthorized(format!(
                    "{} is not allowed to decrypt {}",
                    request.user_address, pair.handle
                )));
            }
            let plaintext = coprocessor
                .plaintext(&pair.handle)
                .ok_or_else(|| ServiceError::rejected(format!("unknown handle {}", pair.handle)))?;
            clear.insert(pair.handle, plaintext.value);
        }
        debug!(
            "decrypted {} handles for {}",
            clear.len(),
            request.user_address
        );

        Ok(clear)
    }
}
