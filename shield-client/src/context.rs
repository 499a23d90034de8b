//! Staleness detection for asynchronous operations.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::error::SyncError;

/// Counter bumped every time the active account, chain or signer changes.
#[derive(Clone, Debug, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Invalidate every token issued so far.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn token(&self) -> GenerationToken {
        GenerationToken {
            generation: self.clone(),
            captured: self.current(),
        }
    }
}

/// The generation an operation started in.
#[derive(Clone, Debug)]
pub struct GenerationToken {
    generation: Generation,
    captured: u64,
}

impl GenerationToken {
    pub fn is_current(&self) -> bool {
        self.generation.current() == self.captured
    }

    /// Fail with [`SyncError::Stale`] once the context moved on.
    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(SyncError::Stale)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_expire_on_bump() {
        let generation = Generation::default();
        let token = generation.token();
        assert!(token.check().is_ok());

        generation.bump();
        assert!(!token.is_current());
        assert!(token.check().unwrap_err().is_stale());
        assert!(generation.token().is_current());
    }
}
