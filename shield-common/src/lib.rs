//! Types and interfaces shared by the ShieldSwap order store, the local FHE
//! devnet and the client synchronization layer.

pub mod bindings;
pub mod eip712;
pub mod error;
pub mod eth;
pub mod handle;
pub mod ports;
pub mod proof;
pub mod types;

pub use error::{ChainError, ServiceError};
pub use handle::{FheType, Handle, HandleMeta, ZERO_HANDLE};
pub use types::{
    ClearOrder, ClearValues, EncryptedInput, EncryptedOrder, HandleContractPair, OrderCreatedLog,
    TxReceipt, UserDecryptRequest,
};

/// Identifier returned by `protocolId()` on every ShieldSwap deployment.
pub const PROTOCOL_ID: u64 = 10001;

/// Number of seconds in one day, the unit of decryption authorization windows.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Longest validity window of a user decryption grant, in days.
pub const MAX_DURATION_DAYS: u64 = 365;

/// Most contracts one user decryption grant may name.
pub const MAX_CONTRACTS: usize = 10;
