//! Ciphertext handles.
//!
//! A handle is an opaque 32-byte reference to a ciphertext held by the FHE
//! coprocessor. Its trailing bytes carry metadata:
//!
//! | bytes    | content                                  |
//! |----------|------------------------------------------|
//! | `0..21`  | digest prefix identifying the ciphertext |
//! | `21`     | index of the value in its input batch    |
//! | `22..30` | chain id, big-endian                     |
//! | `30`     | FHE type tag                             |
//! | `31`     | handle format version                    |
use alloy::primitives::{keccak256, B256};
use serde::{Deserialize, Serialize};

pub type Handle = B256;

/// The handle standing for "no value".
pub const ZERO_HANDLE: Handle = B256::ZERO;

/// Current handle format version.
pub const HANDLE_VERSION: u8 = 0;

const INDEX_BYTE: usize = 21;
const CHAIN_ID_RANGE: std::ops::Range<usize> = 22..30;
const TYPE_BYTE: usize = 30;
const VERSION_BYTE: usize = 31;

/// Encrypted integer types understood by the coprocessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FheType {
    Bool = 0,
    Uint8 = 2,
    Uint16 = 3,
    Uint32 = 4,
    Uint64 = 5,
}

impl FheType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Bool),
            2 => Some(Self::Uint8),
            3 => Some(Self::Uint16),
            4 => Some(Self::Uint32),
            5 => Some(Self::Uint64),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Width of the plaintext in bits.
    pub fn bits(self) -> u32 {
        match self {
            Self::Bool => 1,
            Self::Uint8 => 8,
            Self::Uint16 => 16,
            Self::Uint32 => 32,
            Self::Uint64 => 64,
        }
    }

    /// Largest plaintext representable by this type.
    pub fn max_value(self) -> u64 {
        match self {
            Self::Uint64 => u64::MAX,
            other => (1u64 << other.bits()) - 1,
        }
    }
}

/// Metadata decoded from the trailing bytes of a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleMeta {
    pub index: u8,
    pub chain_id: u64,
    pub fhe_type: Option<FheType>,
    pub version: u8,
}

impl HandleMeta {
    pub fn parse(handle: &Handle) -> Self {
        let mut chain_id = [0u8; 8];
        chain_id.copy_from_slice(&handle[CHAIN_ID_RANGE]);
        Self {
            index: handle[INDEX_BYTE],
            chain_id: u64::from_be_bytes(chain_id),
            fhe_type: FheType::from_tag(handle[TYPE_BYTE]),
            version: handle[VERSION_BYTE],
        }
    }
}

/// Build the handle of the `index`-th value of an input batch whose
/// ciphertexts are identified by `batch_digest`.
pub fn compute_handle(batch_digest: &B256, index: u8, chain_id: u64, fhe_type: FheType) -> Handle {
    let mut preimage = Vec::with_capacity(B256::len_bytes() + 1);
    preimage.extend_from_slice(batch_digest.as_slice());
    preimage.push(index);
    let mut handle = keccak256(&preimage);
    handle[INDEX_BYTE] = index;
    handle[CHAIN_ID_RANGE].copy_from_slice(&chain_id.to_be_bytes());
    handle[TYPE_BYTE] = fhe_type.tag();
    handle[VERSION_BYTE] = HANDLE_VERSION;
    handle
}

pub fn is_zero(handle: &Handle) -> bool {
    *handle == ZERO_HANDLE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn metadata_survives_handle_construction() {
        let digest = keccak256(b"batch");
        let handle = compute_handle(&digest, 1, 11155111, FheType::Uint32);
        let meta = HandleMeta::parse(&handle);

        assert_eq!(meta.index, 1);
        assert_eq!(meta.chain_id, 11155111);
        assert_eq!(meta.fhe_type, Some(FheType::Uint32));
        assert_eq!(meta.version, HANDLE_VERSION);
        assert!(!is_zero(&handle));
    }

    #[test]
    fn handles_of_one_batch_differ() {
        let digest = keccak256(b"batch");
        let first = compute_handle(&digest, 0, 31337, FheType::Uint32);
        let second = compute_handle(&digest, 1, 31337, FheType::Uint32);
        assert_ne!(first, second);
    }

    #[rstest]
    #[case(FheType::Bool, 1)]
    #[case(FheType::Uint8, 255)]
    #[case(FheType::Uint16, 65_535)]
    #[case(FheType::Uint32, 4_294_967_295)]
    #[case(FheType::Uint64, u64::MAX)]
    fn max_values(#[case] ty: FheType, #[case] expected: u64) {
        assert_eq!(ty.max_value(), expected);
        assert_eq!(FheType::from_tag(ty.tag()), Some(ty));
    }

    #[test]
    fn zero_handle_carries_bool_tag() {
        let meta = HandleMeta::parse(&ZERO_HANDLE);
        assert_eq!(meta.fhe_type, Some(FheType::Bool));
        assert!(is_zero(&ZERO_HANDLE));
    }
}
