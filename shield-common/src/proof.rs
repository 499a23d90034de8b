//! Wire format of input proofs.
//!
//! ```text
//! n_handles: u8 | n_signers: u8
//!   | handles: n_handles * 32 | signatures: n_signers * 65 | extra_data
//! ```
use alloy::primitives::{Bytes, B256};
use thiserror::Error;

use crate::handle::Handle;

const HANDLE_LEN: usize = 32;
const SIGNATURE_LEN: usize = 65;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("empty proof")]
    Empty,

    #[error("proof truncated: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("too many {what} for one proof: {count}")]
    TooMany { what: &'static str, count: usize },
}

/// A decoded input proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputProof {
    pub handles: Vec<Handle>,
    pub signatures: Vec<[u8; SIGNATURE_LEN]>,
    pub extra_data: Bytes,
}

impl InputProof {
    pub fn encode(&self) -> Result<Bytes, ProofError> {
        let n_handles = u8::try_from(self.handles.len()).map_err(|_| ProofError::TooMany {
            what: "handles",
            count: self.handles.len(),
        })?;
        let n_signers = u8::try_from(self.signatures.len()).map_err(|_| ProofError::TooMany {
            what: "signatures",
            count: self.signatures.len(),
        })?;

        let mut out = Vec::with_capacity(
            2 + self.handles.len() * HANDLE_LEN
                + self.signatures.len() * SIGNATURE_LEN
                + self.extra_data.len(),
        );
        out.push(n_handles);
        out.push(n_signers);
        for handle in &self.handles {
            out.extend_from_slice(handle.as_slice());
        }
        for signature in &self.signatures {
            out.extend_from_slice(signature);
        }
        out.extend_from_slice(&self.extra_data);
        Ok(out.into())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProofError> {
        if bytes.is_empty() {
            return Err(ProofError::Empty);
        }
        if bytes.len() < 2 {
            return Err(ProofError::Truncated {
                expected: 2,
                got: bytes.len(),
            });
        }
        let n_handles = bytes[0] as usize;
        let n_signers = bytes[1] as usize;
        let body_len = 2 + n_handles * HANDLE_LEN + n_signers * SIGNATURE_LEN;
        if bytes.len() < body_len {
            return Err(ProofError::Truncated {
                expected: body_len,
                got: bytes.len(),
            });
        }

        let handles_end = 2 + n_handles * HANDLE_LEN;
        let handles = bytes[2..handles_end]
            .chunks_exact(HANDLE_LEN)
            .map(B256::from_slice)
            .collect();
        let signatures = bytes[handles_end..body_len]
            .chunks_exact(SIGNATURE_LEN)
            .map(|chunk| {
                let mut signature = [0u8; SIGNATURE_LEN];
                signature.copy_from_slice(chunk);
                signature
            })
            .collect();

        Ok(Self {
            handles,
            signatures,
            extra_data: Bytes::copy_from_slice(&bytes[body_len..]),
        })
    }

    /// Position of `handle` in the proof, if covered.
    pub fn position(&self, handle: &Handle) -> Option<usize> {
        self.handles.iter().position(|h| h == handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;

    fn sample() -> InputProof {
        InputProof {
            handles: vec![keccak256(b"a"), keccak256(b"b")],
            signatures: vec![[7u8; SIGNATURE_LEN]],
            extra_data: Bytes::from(vec![0xde, 0xad]),
        }
    }

    #[test]
    fn layout_matches_the_wire_format() -> anyhow::Result<()> {
        let proof = sample();
        let bytes = proof.encode()?;
        assert_eq!(bytes.len(), 2 + 2 * 32 + 65 + 2);
        assert_eq!(bytes[0], 2);
        assert_eq!(bytes[1], 1);
        assert_eq!(&bytes[2..34], proof.handles[0].as_slice());
        assert_eq!(InputProof::decode(&bytes)?, proof);
        Ok(())
    }

    #[test]
    fn rejects_empty_and_truncated_proofs() -> anyhow::Result<()> {
        assert_eq!(InputProof::decode(&[]), Err(ProofError::Empty));

        let bytes = sample().encode()?;
        let cut = &bytes[..40];
        assert!(matches!(
            InputProof::decode(cut),
            Err(ProofError::Truncated { expected: 131, got: 40 })
        ));
        Ok(())
    }

    #[test]
    fn finds_covered_handles() {
        let proof = sample();
        assert_eq!(proof.position(&keccak256(b"b")), Some(1));
        assert_eq!(proof.position(&keccak256(b"c")), None);
    }
}
