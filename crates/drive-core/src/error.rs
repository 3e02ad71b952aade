//! Error types for the drive-core crate

use drive_crypto::CryptoError;
use thiserror::Error;

/// Result type alias using `DriveError`
pub type Result<T> = std::result::Result<T, DriveError>;

/// Errors that can occur while decoding or encoding drive entities
#[derive(Error, Debug)]
pub enum DriveError {
    /// Wrong key, malformed ciphertext or unusable key material
    #[error("decryption of {context} failed: {source}")]
    Decryption {
        context: String,
        #[source]
        source: CryptoError,
    },

    /// Ciphertext does not match its stored content hash
    #[error("tampered content in {context}: expected hash {expected}, got {actual}")]
    TamperedContent {
        context: String,
        expected: String,
        actual: String,
    },

    /// The key provider has no keys for this identity
    #[error("missing key material for {0}")]
    MissingKeyMaterial(String),

    /// Neither a parent node nor an owning share can unlock the node
    #[error("no parent key material for node {0}")]
    NoParentKeyMaterial(String),

    /// The revision carries no manifest signature
    #[error("revision {0} has no manifest signature")]
    NoManifestSignature(String),

    /// Operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Node not found in the tree
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Share not found in the tree
    #[error("share not found: {0}")]
    ShareNotFound(String),

    /// Revision not found in the tree
    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    /// Node is missing a field required by the operation
    #[error("invalid node {id}: {reason}")]
    InvalidNode { id: String, reason: String },

    /// Ancestor chain exceeds the configured depth
    #[error("ancestry of node {node} exceeds {max_depth} levels")]
    AncestryTooDeep { node: String, max_depth: usize },

    /// Ancestor chain loops back on itself
    #[error("ancestry of node {node} loops through {repeated}")]
    AncestryCycle { node: String, repeated: String },

    /// Encrypted thumbnail exceeds the size limit
    #[error("thumbnail is {size} bytes, limit is {max}")]
    ThumbnailTooLarge { size: usize, max: usize },

    /// Block cleartext exceeds the size limit
    #[error("block {index} is {size} bytes, limit is {max}")]
    BlockTooLarge { index: u32, size: usize, max: usize },

    /// Crypto error outside of a decryption context
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DriveError {
    /// Wrap a crypto error raised while decrypting `context`.
    ///
    /// Cancellation keeps its own variant.
    pub fn decryption(context: impl Into<String>, source: CryptoError) -> Self {
        match source {
            CryptoError::Cancelled => Self::Cancelled,
            source => Self::Decryption {
                context: context.into(),
                source,
            },
        }
    }

    /// Whether a later retry may succeed, e.g. once address keys are synced
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MissingKeyMaterial(_))
    }

    /// Whether the error signals tampered ciphertext
    pub fn is_tampered(&self) -> bool {
        matches!(self, Self::TamperedContent { .. })
    }
}
