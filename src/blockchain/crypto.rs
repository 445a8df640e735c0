use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt;

/// Modulus size used when no configuration says otherwise
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Failed to generate keypair: {0}")]
    KeyGeneration(String),

    #[error("Failed to sign message: {0}")]
    Signing(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),
}

/// SHA-256 digest of an arbitrary byte string
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Represents a public key in SubjectPublicKeyInfo PEM form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyPem(pub String);

impl PublicKeyPem {
    /// Encodes an RSA public key as PEM
    pub fn from_public_key(public_key: &RsaPublicKey) -> Result<Self, CryptoError> {
        public_key
            .to_public_key_pem(LineEnding::LF)
            .map(PublicKeyPem)
            .map_err(|e| CryptoError::Encoding(e.to_string()))
    }

    /// Parses the PEM back into a usable public key
    pub fn to_public_key(&self) -> Result<RsaPublicKey, CryptoError> {
        RsaPublicKey::from_public_key_pem(&self.0)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for PublicKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a digital signature (raw signature bytes in base64)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Encodes raw signature bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        DigitalSignature(STANDARD.encode(bytes))
    }

    /// Decodes the base64 text back into raw signature bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        STANDARD
            .decode(&self.0)
            .map_err(|e| CryptoError::Decoding(e.to_string()))
    }
}

impl fmt::Display for DigitalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An RSA key pair. The private half never leaves this struct; signing is
/// the only operation that touches it.
pub struct KeyPair {
    private_key: RsaPrivateKey,
    public_pem: PublicKeyPem,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_pem", &self.public_pem)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generates a fresh key pair with a modulus of `bits` bits
    ///
    /// # Arguments
    ///
    /// * `bits` - The modulus size, 2048 unless configured otherwise
    ///
    /// # Returns
    ///
    /// The new key pair, or a `KeyGeneration` error
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let mut csprng = OsRng;
        let private_key = RsaPrivateKey::new(&mut csprng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public_pem = PublicKeyPem::from_public_key(&RsaPublicKey::from(&private_key))?;

        Ok(KeyPair {
            private_key,
            public_pem,
        })
    }

    /// Gets the PEM encoded public key
    pub fn public_key(&self) -> &PublicKeyPem {
        &self.public_pem
    }

    /// Signs a SHA-256 digest with RSA-PSS.
    ///
    /// PSS salts every signature, so signing the same digest twice yields
    /// two different signatures that both verify. The salt is digest-sized
    /// (32 bytes) rather than the maximum length; `verify_digest` expects
    /// the same.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<DigitalSignature, CryptoError> {
        let mut csprng = OsRng;
        let signature = self
            .private_key
            .sign_with_rng(&mut csprng, Pss::new::<Sha256>(), digest)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;

        Ok(DigitalSignature::from_bytes(&signature))
    }
}

/// Verifies an RSA-PSS signature over a SHA-256 digest
///
/// # Returns
///
/// `Ok(false)` when the signature does not match, `Err` when the key or the
/// signature encoding cannot even be decoded
pub fn verify_digest(
    digest: &[u8; 32],
    signature: &DigitalSignature,
    public_key: &PublicKeyPem,
) -> Result<bool, CryptoError> {
    let public_key = public_key.to_public_key()?;
    let signature = signature.to_bytes()?;

    match public_key.verify(Pss::new::<Sha256>(), digest, &signature) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}
