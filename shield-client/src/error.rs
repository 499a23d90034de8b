use shield_common::{ChainError, ServiceError};
use thiserror::Error;

use crate::signature::SignatureError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("ShieldSwap deployment not found for chainId={0}.")]
    NotDeployed(u64),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// The account, chain or signer changed while the operation was running.
    #[error("operation outlived its context")]
    Stale,

    #[error("sync actor has shut down")]
    Closed,
}

impl SyncError {
    pub fn is_transport(&self) -> bool {
        match self {
            SyncError::Chain(e) => e.is_transport(),
            SyncError::Service(e) => e.is_transport(),
            _ => false,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, SyncError::Stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_recognized_through_layers() {
        let err = SyncError::from(ChainError::from_rpc("error sending request for url"));
        assert!(err.is_transport());

        let err = SyncError::from(ChainError::from_rpc("nonce too low"));
        assert!(!err.is_transport());

        let err = SyncError::from(ServiceError::Transport("Failed to fetch".into()));
        assert!(err.is_transport());
    }

    #[test]
    fn not_deployed_message() {
        assert_eq!(
            SyncError::NotDeployed(11155111).to_string(),
            "ShieldSwap deployment not found for chainId=11155111."
        );
    }
}
