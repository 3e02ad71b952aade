//! Collaborators supplied by the caller: key material and ciphertext sources

use crate::{model::BlockRef, DriveError, Result};
use dashmap::DashMap;
use drive_crypto::KeyPack;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

/// Resolves keys for an email address
pub trait KeyMaterialProvider: Send + Sync {
    /// Armored public keys currently active for `email`
    fn public_keys(&self, email: &str) -> Result<Vec<String>>;

    /// Private address keys of the acting user for `email`
    fn address_keys(&self, email: &str) -> Result<Vec<KeyPack>>;

    /// Key used to sign on behalf of `email`
    fn signing_key(&self, email: &str) -> Result<KeyPack> {
        self.address_keys(email)?
            .into_iter()
            .next()
            .ok_or_else(|| DriveError::MissingKeyMaterial(email.to_string()))
    }
}

#[derive(Default)]
struct Identity {
    public_keys: Vec<String>,
    address_keys: Vec<KeyPack>,
}

/// In-memory [`KeyMaterialProvider`]
#[derive(Default)]
pub struct InMemoryKeyMaterial {
    identities: DashMap<String, Identity>,
}

impl InMemoryKeyMaterial {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a private address key; its public half becomes resolvable too.
    ///
    /// The first key registered for an email is its signing key.
    pub fn add_address_key(&self, email: &str, key: KeyPack) -> Result<()> {
        let public = key.public_key()?.to_armored();
        let mut identity = self.identities.entry(email.to_string()).or_default();
        identity.public_keys.push(public);
        identity.address_keys.push(key);
        Ok(())
    }

    /// Register a public key of another user
    pub fn add_public_key(&self, email: &str, armored: impl Into<String>) {
        self.identities
            .entry(email.to_string())
            .or_default()
            .public_keys
            .push(armored.into());
    }

    /// Forget everything known about `email`
    pub fn remove(&self, email: &str) {
        self.identities.remove(email);
    }
}

impl KeyMaterialProvider for InMemoryKeyMaterial {
    fn public_keys(&self, email: &str) -> Result<Vec<String>> {
        match self.identities.get(email) {
            Some(identity) if !identity.public_keys.is_empty() => Ok(identity.public_keys.clone()),
            _ => Err(DriveError::MissingKeyMaterial(email.to_string())),
        }
    }

    fn address_keys(&self, email: &str) -> Result<Vec<KeyPack>> {
        match self.identities.get(email) {
            Some(identity) if !identity.address_keys.is_empty() => Ok(identity.address_keys.clone()),
            _ => Err(DriveError::MissingKeyMaterial(email.to_string())),
        }
    }
}

/// Source of block ciphertext, typically a download cache
pub trait BlockSource: Send + Sync {
    /// Whole ciphertext of a block
    fn fetch_ciphertext(&self, block: &BlockRef) -> Result<Vec<u8>>;

    /// Reader over the ciphertext of a block; may be opened more than once
    fn open_ciphertext(&self, block: &BlockRef) -> Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(Cursor::new(self.fetch_ciphertext(block)?)))
    }
}

/// [`BlockSource`] holding ciphertext in memory
#[derive(Default)]
pub struct InMemoryBlockSource {
    blocks: DashMap<(String, u32), Vec<u8>>,
}

impl InMemoryBlockSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the ciphertext for a block
    pub fn insert(&self, block: &BlockRef, ciphertext: Vec<u8>) {
        self.blocks
            .insert((block.revision.to_string(), block.index), ciphertext);
    }
}

impl BlockSource for InMemoryBlockSource {
    fn fetch_ciphertext(&self, block: &BlockRef) -> Result<Vec<u8>> {
        self.blocks
            .get(&(block.revision.to_string(), block.index))
            .map(|c| c.clone())
            .ok_or_else(|| {
                DriveError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no ciphertext for block {} of revision {}", block.index, block.revision),
                ))
            })
    }
}

/// [`BlockSource`] reading `<root>/<revision>/<index>` files
#[derive(Clone, Debug)]
pub struct DirectoryBlockSource {
    root: PathBuf,
}

impl DirectoryBlockSource {
    /// Serve blocks stored below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File that holds a block's ciphertext
    pub fn path_of(&self, block: &BlockRef) -> PathBuf {
        self.root
            .join(block.revision.as_str())
            .join(block.index.to_string())
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BlockSource for DirectoryBlockSource {
    fn fetch_ciphertext(&self, block: &BlockRef) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.path_of(block))?)
    }

    fn open_ciphertext(&self, block: &BlockRef) -> Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(BufReader::new(File::open(self.path_of(block))?)))
    }
}
