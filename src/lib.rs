//! A single-node proof-of-work ledger.
//!
//! Accounts sign transfers with RSA-PSS, the blockchain pools verified
//! transactions, seals them into hash-linked blocks by proof of work and can
//! replay the whole chain to check its integrity.

pub mod blockchain;
pub mod config;

pub use blockchain::{Account, Block, Blockchain, HashTarget, Transaction};
pub use config::LedgerConfig;
