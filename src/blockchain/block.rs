use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt;
use std::str::FromStr;

use super::transaction::Transaction;

/// Errors that can occur while sealing a block
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("Hash target {0} can never be met")]
    UnreachableTarget(HashTarget),

    #[error("Exhausted the nonce space without meeting target {0}")]
    NonceSpaceExhausted(HashTarget),
}

/// Errors that can occur while parsing a hash target
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashTargetError {
    #[error("Invalid hex in hash target: {0}")]
    InvalidHex(String),

    #[error("Hash target is wider than 256 bits: {0} hex digits")]
    TooWide(usize),
}

/// A 256-bit big-endian threshold. A block is valid when its SHA-256 digest,
/// read as an unsigned integer, is strictly below the target.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HashTarget([u8; 32]);

impl HashTarget {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        HashTarget(bytes)
    }

    /// Target whose top `bits` bits are zero and the rest are ones
    pub fn from_leading_zero_bits(bits: u32) -> Self {
        let bits = bits.min(256) as usize;
        let mut bytes = [0xffu8; 32];

        let full = bits / 8;
        for byte in bytes.iter_mut().take(full) {
            *byte = 0;
        }
        if full < 32 {
            bytes[full] = 0xff >> (bits % 8);
        }

        HashTarget(bytes)
    }

    /// Big-endian byte arrays of equal width compare like the integers they encode
    pub fn is_met_by(&self, digest: &[u8; 32]) -> bool {
        digest < &self.0
    }

    pub fn is_reachable(&self) -> bool {
        self.0.iter().any(|&b| b != 0)
    }

    /// Rough number of hashes needed to meet this target (2^256 / target)
    pub fn expected_attempts(&self) -> u128 {
        let mut high = [0u8; 16];
        high.copy_from_slice(&self.0[..16]);
        let high = u128::from_be_bytes(high);

        if high == 0 {
            u128::MAX
        } else {
            u128::MAX / high
        }
    }
}

impl fmt::Display for HashTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for HashTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashTarget({})", self)
    }
}

impl FromStr for HashTarget {
    type Err = HashTargetError;

    /// Parses hex, with or without a `0x` prefix. Short strings are
    /// left-padded with zeros, as an integer literal would be.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() {
            return Err(HashTargetError::InvalidHex(s.to_string()));
        }
        if digits.len() > 64 {
            return Err(HashTargetError::TooWide(digits.len()));
        }

        let padded = format!("{:0>64}", digits);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&padded, &mut bytes)
            .map_err(|e| HashTargetError::InvalidHex(format!("{}: {}", s, e)))?;

        Ok(HashTarget(bytes))
    }
}

impl TryFrom<String> for HashTarget {
    type Error = HashTargetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HashTarget> for String {
    fn from(target: HashTarget) -> Self {
        target.to_string()
    }
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Transactions sealed into this block, in pool order
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block; `None` only for genesis
    pub previous_hash: Option<String>,

    /// Target this block was mined under; `None` only for genesis
    pub hash_target: Option<HashTarget>,

    /// Proof of work (nonce)
    pub nonce: u64,

    /// Hash of the sealed contents, or the seed message for genesis
    pub hash: String,

    /// Number of hashes tried while mining; not part of the sealed contents
    #[serde(skip)]
    pub attempts: u64,
}

impl Block {
    /// Creates the genesis block. Its hash is the seed message itself and it
    /// is never mined.
    pub fn genesis(message: &str) -> Self {
        Block {
            index: 0,
            transactions: Vec::new(),
            previous_hash: None,
            hash_target: None,
            nonce: 0,
            hash: message.to_string(),
            attempts: 0,
        }
    }

    /// Mines a new block: tries nonces from zero upwards until the digest is
    /// below `hash_target`
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `transactions` - The transactions to seal
    /// * `previous_hash` - The hash of the previous block
    /// * `hash_target` - The difficulty to mine under
    ///
    /// # Returns
    ///
    /// The sealed block
    pub fn mine(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: String,
        hash_target: HashTarget,
    ) -> Result<Self, BlockError> {
        if !hash_target.is_reachable() {
            return Err(BlockError::UnreachableTarget(hash_target));
        }

        // The body is fixed for the whole search; only the nonce suffix changes
        let prefix = body_hasher(index, &transactions, &previous_hash);

        let mut attempts = 0u64;
        for nonce in 0..=u64::MAX {
            attempts = attempts.saturating_add(1);
            let digest = digest_with_nonce(&prefix, nonce);

            if hash_target.is_met_by(&digest) {
                return Ok(Block {
                    index,
                    transactions,
                    previous_hash: Some(previous_hash),
                    hash_target: Some(hash_target),
                    nonce,
                    hash: hex::encode(digest),
                    attempts,
                });
            }
        }

        Err(BlockError::NonceSpaceExhausted(hash_target))
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_none()
    }

    /// Recomputes the digest of the sealed fields. `None` for genesis.
    pub fn digest(&self) -> Option<[u8; 32]> {
        let previous_hash = self.previous_hash.as_ref()?;
        let prefix = body_hasher(self.index, &self.transactions, previous_hash);
        Some(digest_with_nonce(&prefix, self.nonce))
    }

    /// Recomputes the block hash from its contents, without mining
    pub fn hash_block(&self) -> String {
        match self.digest() {
            Some(digest) => hex::encode(digest),
            None => self.hash.clone(),
        }
    }

    /// Whether the recomputed digest is below this block's own target
    pub fn meets_target(&self) -> bool {
        match (self.digest(), &self.hash_target) {
            (Some(digest), Some(target)) => target.is_met_by(&digest),
            _ => false,
        }
    }
}

/// Canonical bytes of everything but the nonce: a sorted-key JSON object
fn body_bytes(index: u64, transactions: &[Transaction], previous_hash: &str) -> Vec<u8> {
    let mut fields = Map::new();
    fields.insert("index".to_string(), Value::from(index));
    fields.insert(
        "previous_block_hash".to_string(),
        Value::from(previous_hash.to_string()),
    );
    fields.insert(
        "transactions".to_string(),
        Value::Array(transactions.iter().map(Transaction::to_canonical_value).collect()),
    );
    Value::Object(fields).to_string().into_bytes()
}

fn body_hasher(index: u64, transactions: &[Transaction], previous_hash: &str) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(body_bytes(index, transactions, previous_hash));
    hasher
}

// Block digest = SHA-256(body || nonce as 8 big-endian bytes)
fn digest_with_nonce(prefix: &Sha256, nonce: u64) -> [u8; 32] {
    let mut hasher = prefix.clone();
    hasher.update(nonce.to_be_bytes());
    hasher.finalize().into()
}
