//! Ledger configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fs;
use std::path::Path;

use crate::blockchain::account::DEFAULT_BALANCE;
use crate::blockchain::block::HashTarget;
use crate::blockchain::crypto::DEFAULT_KEY_BITS;

/// Headline embedded in the Bitcoin genesis block, reused as our genesis seed
pub const GENESIS_MESSAGE: &str =
    "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Difficulty for newly mined blocks, as a hex threshold
    #[serde(default = "default_hash_target")]
    pub hash_target: HashTarget,

    /// Opening balance for accounts created from this config
    #[serde(default = "default_initial_balance")]
    pub initial_balance: u64,

    /// RSA modulus size for new accounts
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,

    #[serde(default = "default_genesis_message")]
    pub genesis_message: String,

    /// Reject transactions whose nonce does not increase per sender
    #[serde(default = "default_enforce_nonce_order")]
    pub enforce_nonce_order: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            hash_target: default_hash_target(),
            initial_balance: default_initial_balance(),
            key_bits: default_key_bits(),
            genesis_message: default_genesis_message(),
            enforce_nonce_order: default_enforce_nonce_order(),
        }
    }
}

fn default_hash_target() -> HashTarget {
    HashTarget::from_leading_zero_bits(16)
}

fn default_initial_balance() -> u64 {
    DEFAULT_BALANCE
}

fn default_key_bits() -> usize {
    DEFAULT_KEY_BITS
}

fn default_genesis_message() -> String {
    GENESIS_MESSAGE.to_string()
}

fn default_enforce_nonce_order() -> bool {
    true
}

impl LedgerConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
