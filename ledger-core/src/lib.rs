//! Native-currency ledger, gas settlement and the built-in Token721
//! non-fungible-token ABI set for a deterministic smart-contract host.
//!
//! This crate models the part of a blockchain virtual machine that a
//! running contract calls into to move native balances, mint and
//! trade NFTs, and account gas costs. It does not execute contract
//! bytecode, sign transactions, or persist anything to disk: those
//! are the host's job. [`store::StateStore`] is the seam between this
//! crate and that host; [`store::MemoryStateStore`] is an in-memory
//! reference implementation used by the test suite and by any
//! embedder that does not (yet) have a trie-backed store.

pub mod auth;
pub mod cost;
pub mod fixed;
pub mod identity;
pub mod store;
pub mod teller;
pub mod token721;

#[cfg(test)]
pub mod test_support;

pub use auth::ExecutionContext;
pub use cost::Cost;
pub use fixed::Fixed;
pub use identity::Identity;
pub use store::{MemoryStateStore, StateStore, StoreValue};
pub use teller::{Teller, TellerError, TellerResult};
pub use token721::{Token721, Token721Error, Token721Result};
