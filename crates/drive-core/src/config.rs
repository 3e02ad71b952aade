//! Codec configuration

use serde::{Deserialize, Serialize};

/// How revision blocks are decrypted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptMode {
    /// Whole block buffers, one block at a time
    #[default]
    InMemory,
    /// Bounded-memory streaming per block
    Streaming,
    /// Blocks decrypted concurrently, written in index order
    Parallel,
}

/// Codec configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Maximum number of ancestors walked when resolving node keys
    pub max_tree_depth: usize,
    /// Read buffer for streaming block decryption (bytes)
    pub stream_chunk_size: usize,
    /// Maximum cleartext block size (bytes)
    pub max_block_size: usize,
    /// Maximum encrypted thumbnail size (bytes)
    pub thumbnail_max_size: usize,
    /// Block decryption strategy
    pub decrypt_mode: DecryptMode,
    /// Serve repeated decryptions from the side-cache
    pub cache_decrypted: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: 1024,
            stream_chunk_size: 64 * 1024,       // 64 KiB
            max_block_size: 4 * 1024 * 1024,    // 4 MiB
            thumbnail_max_size: 60 * 1024,      // 60 KiB
            decrypt_mode: DecryptMode::InMemory,
            cache_decrypted: true,
        }
    }
}

impl CodecConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ancestor walk cap
    pub fn with_max_tree_depth(mut self, depth: usize) -> Self {
        self.max_tree_depth = depth;
        self
    }

    /// Set the streaming read buffer
    pub fn with_stream_chunk_size(mut self, size: usize) -> Self {
        self.stream_chunk_size = size;
        self
    }

    /// Set the block size limit
    pub fn with_max_block_size(mut self, size: usize) -> Self {
        self.max_block_size = size;
        self
    }

    /// Set the thumbnail size limit
    pub fn with_thumbnail_max_size(mut self, size: usize) -> Self {
        self.thumbnail_max_size = size;
        self
    }

    /// Set the block decryption strategy
    pub fn with_decrypt_mode(mut self, mode: DecryptMode) -> Self {
        self.decrypt_mode = mode;
        self
    }

    /// Disable the side-cache
    pub fn without_cache(mut self) -> Self {
        self.cache_decrypted = false;
        self
    }
}
