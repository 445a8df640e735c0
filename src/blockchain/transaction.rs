use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::account::AccountId;
use super::crypto::{self, CryptoError, DigitalSignature, KeyPair, PublicKeyPem};

/// The signed part of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMessage {
    /// Sender's account id
    pub sender: AccountId,

    /// Receiver's account id
    pub receiver: AccountId,

    /// Amount being transferred
    pub value: u64,

    /// Free-form text carried along with the transfer
    #[serde(default)]
    pub metadata: String,

    /// The sender's account nonce at signing time
    pub nonce: u64,
}

impl TransactionMessage {
    /// Canonical JSON object for this message.
    ///
    /// Keys live in a sorted map, so the same logical message always encodes
    /// to the same bytes no matter how the struct is declared.
    pub fn to_canonical_value(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("metadata".to_string(), Value::from(self.metadata.clone()));
        fields.insert("nonce".to_string(), Value::from(self.nonce));
        fields.insert("receiver".to_string(), Value::from(self.receiver.0.clone()));
        fields.insert("sender".to_string(), Value::from(self.sender.0.clone()));
        fields.insert("value".to_string(), Value::from(self.value));
        Value::Object(fields)
    }

    /// Bytes that get hashed and signed
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.to_canonical_value().to_string().into_bytes()
    }

    /// SHA-256 over the canonical bytes
    pub fn digest(&self) -> [u8; 32] {
        crypto::sha256(&self.canonical_bytes())
    }
}

/// Represents a signed transfer between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub message: TransactionMessage,

    /// Base64 RSA-PSS signature over the message digest
    pub signature: DigitalSignature,
}

impl Transaction {
    /// Signs a message with the given key pair
    ///
    /// # Arguments
    ///
    /// * `message` - The message to sign
    /// * `keys` - The sender's key pair
    ///
    /// # Returns
    ///
    /// The signed transaction
    pub fn sign(message: TransactionMessage, keys: &KeyPair) -> Result<Self, CryptoError> {
        let signature = keys.sign_digest(&message.digest())?;
        Ok(Transaction { message, signature })
    }

    /// Verifies the signature against the sender's public key.
    ///
    /// A well-formed but wrong signature gives `Ok(false)`; an undecodable
    /// key or signature gives `Err`.
    pub fn verify(&self, public_key: &PublicKeyPem) -> Result<bool, CryptoError> {
        crypto::verify_digest(&self.message.digest(), &self.signature, public_key)
    }

    /// Hex digest of the message, used to refer to the transaction in logs
    pub fn id(&self) -> String {
        hex::encode(self.message.digest())
    }

    /// Canonical JSON object including the signature, as committed to by blocks
    pub fn to_canonical_value(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("message".to_string(), self.message.to_canonical_value());
        fields.insert("signature".to_string(), Value::from(self.signature.0.clone()));
        Value::Object(fields)
    }

    pub fn sender(&self) -> &AccountId {
        &self.message.sender
    }

    pub fn receiver(&self) -> &AccountId {
        &self.message.receiver
    }

    pub fn value(&self) -> u64 {
        self.message.value
    }
}
