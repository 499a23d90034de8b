//! The ShieldSwap order store.
//!
//! Holds at most one encrypted swap order per account. An order is a pair of
//! `euint32` handles plus the timestamp of the block that wrote it; every
//! successful `set_order` overwrites the caller's previous order. The store
//! never sees plaintexts: it validates external handles against their input
//! proof and grants the caller decryption rights through an [`FheRuntime`].

pub mod error;
pub mod runtime;
pub mod shield_swap;

pub use error::StoreError;
pub use runtime::{CallContext, FheRuntime};
pub use shield_swap::{Order, OrderCreated, ShieldSwap};
