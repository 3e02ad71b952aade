//! Error types for the drive-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Invalid key format or length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The passphrase does not unlock the private key
    #[error("wrong passphrase for key {0}")]
    WrongPassphrase(String),

    /// Armor envelope is missing or malformed
    #[error("invalid armor: {0}")]
    InvalidArmor(String),

    /// Packet stream is truncated or has an unexpected layout
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// None of the supplied keys matches a key packet recipient
    #[error("no matching key: {0}")]
    NoMatchingKey(String),

    /// Signature verification failed
    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    /// Hash verification failed
    #[error("hash verification failed: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Streaming operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Base64 decode error
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Hex decode error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

impl CryptoError {
    /// Whether the error came from signature checking rather than decryption
    pub fn is_signature_error(&self) -> bool {
        matches!(self, Self::SignatureVerification(_))
    }
}
