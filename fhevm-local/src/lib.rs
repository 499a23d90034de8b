//! A local FHE-enabled development chain.
//!
//! Plays the part a mocked FHEVM node plays for contract development: it
//! hosts ShieldSwap deployments, mines one block per transaction, and runs
//! the FHE collaborators the order store relies on (access control list,
//! input verifier, coprocessor and decryption oracle). Plaintexts are kept in
//! the clear inside the coprocessor, so nothing here is confidential; what is
//! faithful is the protocol: handle formats, signed input proofs, ACL checks
//! and EIP-712 authorized user decryption.
//!
//! [`LocalNode`] exposes the devnet through the `shield_common::ports`
//! traits and can be saved to and restored from a JSON file.

pub mod accounts;
pub mod acl;
pub mod chain;
pub mod config;
pub mod coprocessor;
pub mod input_verifier;
pub mod kms;
pub mod log;
pub mod node;

pub use chain::{Clock, LocalChain};
pub use config::HostConfig;
pub use node::LocalNode;
