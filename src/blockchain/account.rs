use log::debug;
use serde::{Deserialize, Serialize};

use std::borrow::Borrow;
use std::fmt;

use super::crypto::{CryptoError, KeyPair, PublicKeyPem, DEFAULT_KEY_BITS};
use super::transaction::{Transaction, TransactionMessage};
use crate::config::LedgerConfig;

/// Balance given to accounts created without an explicit one
pub const DEFAULT_BALANCE: u64 = 100;

/// Identifies an account in the ledger
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for AccountId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        AccountId(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        AccountId(id)
    }
}

/// Represents an account holder: a balance, a nonce and a signing key.
///
/// The balance is only ever changed by the blockchain while sealing a block;
/// the holder can read it but has no way to mutate it.
#[derive(Debug)]
pub struct Account {
    id: AccountId,
    balance: u64,
    nonce: u64,
    keys: KeyPair,
}

impl Account {
    /// Creates a new account with a freshly generated key pair
    ///
    /// # Arguments
    ///
    /// * `id` - The account's identifier
    /// * `balance` - The opening balance
    ///
    /// # Returns
    ///
    /// A new Account instance, or an error if key generation failed
    pub fn new(id: impl Into<AccountId>, balance: u64) -> Result<Self, CryptoError> {
        Self::with_key_bits(id, balance, DEFAULT_KEY_BITS)
    }

    /// Creates a new account with the default opening balance
    pub fn with_default_balance(id: impl Into<AccountId>) -> Result<Self, CryptoError> {
        Self::new(id, DEFAULT_BALANCE)
    }

    /// Creates a new account using the configured opening balance and key size
    pub fn with_config(id: impl Into<AccountId>, config: &LedgerConfig) -> Result<Self, CryptoError> {
        Self::with_key_bits(id, config.initial_balance, config.key_bits)
    }

    fn with_key_bits(
        id: impl Into<AccountId>,
        balance: u64,
        key_bits: usize,
    ) -> Result<Self, CryptoError> {
        let id = id.into();
        let keys = KeyPair::generate(key_bits)?;
        debug!("Generated {}-bit key pair for account {}", key_bits, id);

        Ok(Account {
            id,
            balance,
            nonce: 0,
            keys,
        })
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Number of transactions this account has signed so far
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn public_key(&self) -> &PublicKeyPem {
        self.keys.public_key()
    }

    /// Creates and signs a transfer to `receiver`
    ///
    /// # Arguments
    ///
    /// * `receiver` - The receiving account's id
    /// * `value` - The amount to transfer
    /// * `metadata` - Free-form text attached to the transfer
    ///
    /// # Returns
    ///
    /// The signed transaction. The nonce advances only when signing succeeds,
    /// whether or not the transaction is ever accepted by a chain.
    pub fn create_transaction(
        &mut self,
        receiver: impl Into<AccountId>,
        value: u64,
        metadata: impl Into<String>,
    ) -> Result<Transaction, CryptoError> {
        let nonce = self.nonce + 1;
        let message = TransactionMessage {
            sender: self.id.clone(),
            receiver: receiver.into(),
            value,
            metadata: metadata.into(),
            nonce,
        };

        let transaction = Transaction::sign(message, &self.keys)?;
        self.nonce = nonce;

        Ok(transaction)
    }

    // No bounds checking; the blockchain dry-runs debits and credits
    // (funds and overflow) before calling these.
    pub(crate) fn increase_balance(&mut self, value: u64) {
        self.balance = self.balance.saturating_add(value);
    }

    pub(crate) fn decrease_balance(&mut self, value: u64) {
        self.balance = self.balance.saturating_sub(value);
    }
}
