//! Client synchronization layer for ShieldSwap.
//!
//! A [`SyncHandle`] drives a background actor that mirrors the connected
//! account's encrypted order, encrypts and submits new orders, and decrypts
//! the mirrored handles through the decryption oracle with a cached,
//! user-signed authorization. Results of operations started under an account
//! or chain that is no longer active are discarded.

pub mod actor;
pub mod config;
pub mod context;
pub mod deployments;
pub mod error;
pub mod oplog;
pub mod rpc;
pub mod signature;
pub mod state;
pub mod storage;

pub use actor::{Services, SyncHandle};
pub use config::ClientConfig;
pub use deployments::{DeploymentEntry, Deployments};
pub use error::SyncError;
pub use oplog::{LogEntry, LogKind, OperationLog};
pub use signature::DecryptionSignature;
pub use state::{DecryptedOrder, FhevmStatus, SyncState};
pub use storage::{FileStorage, InMemoryStorage, StringStorage};
