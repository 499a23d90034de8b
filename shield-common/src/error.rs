use alloy::primitives::{Address, TxHash};
use thiserror::Error;

use crate::eth::is_transport_failure;

/// Failures reported by an order store endpoint, be it a live RPC node or
/// the local devnet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The endpoint could not be reached at all.
    #[error("transport error: {0}")]
    Transport(String),

    /// The call reached the chain and was reverted.
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// No ShieldSwap contract lives at this address.
    #[error("no contract deployed at {0}")]
    NotDeployed(Address),

    /// The transaction is unknown to the endpoint.
    #[error("transaction {0} not found")]
    TxNotFound(TxHash),

    /// Any other error returned by the endpoint.
    #[error("RPC error: {0}")]
    Rpc(String),
}

impl ChainError {
    /// Classify an error message coming from an RPC client.
    pub fn from_rpc<S: AsRef<str>>(msg: S) -> Self {
        let msg = msg.as_ref();
        if is_transport_failure(msg) {
            ChainError::Transport(msg.to_string())
        } else {
            ChainError::Rpc(msg.to_string())
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ChainError::Transport(_))
    }
}

/// Failures of the off-chain FHE services: the encryption service and the
/// decryption oracle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    /// The request was understood and refused.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The authorization attached to the request does not grant access.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn rejected<S: AsRef<str>>(msg: S) -> Self {
        ServiceError::Rejected(msg.as_ref().to_string())
    }

    pub fn unauthorized<S: AsRef<str>>(msg: S) -> Self {
        ServiceError::Unauthorized(msg.as_ref().to_string())
    }

    pub fn internal<S: AsRef<str>>(msg: S) -> Self {
        ServiceError::Internal(msg.as_ref().to_string())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ServiceError::Transport(_))
    }
}
