use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The input proof does not attest the handles for this contract and
    /// caller. The whole call reverts.
    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    /// The execution environment handed the contract an incoherent context;
    /// this is a bug in the host.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn invalid_proof<S: AsRef<str>>(msg: S) -> Self {
        StoreError::InvalidProof(msg.as_ref().to_string())
    }

    pub fn internal<S: AsRef<str>>(msg: S) -> Self {
        StoreError::Internal(msg.as_ref().to_string())
    }
}

pub fn ensure<S: AsRef<str>>(cond: bool, msg: S) -> Result<(), StoreError> {
    if cond {
        Ok(())
    } else {
        Err(StoreError::internal(msg))
    }
}
