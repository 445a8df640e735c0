// Blockchain module
//
// This module contains the core ledger implementation including:
// - Accounts and their signing keys
// - Signed transactions and their canonical encoding
// - Blocks and the proof of work search
// - The blockchain itself: pending pool, block sealing and validation

pub mod account;
pub mod block;
pub mod chain;
pub mod crypto;
pub mod transaction;

// Re-export main components for easier access
pub use account::{Account, AccountId};
pub use block::{Block, BlockError, HashTarget, HashTargetError};
pub use chain::{AccountBalance, Blockchain, BlockchainError, ValidationError};
pub use crypto::{CryptoError, DigitalSignature, PublicKeyPem};
pub use transaction::{Transaction, TransactionMessage};
