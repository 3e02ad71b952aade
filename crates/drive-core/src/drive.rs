//! The codec facade
//!
//! [`DriveCrypto`] bundles the engine, the key provider, the side-cache and
//! the configuration. The codecs are implemented as methods on it, one
//! module per codec.

use crate::{
    cache::{CacheSlot, DecryptedCache},
    config::CodecConfig,
    provider::KeyMaterialProvider,
    verification::{SignatureFailure, Verified, VerificationStatus},
    Result,
};
use drive_crypto::{ContentHash, CryptoEngine};
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry point to every codec
pub struct DriveCrypto {
    pub(crate) engine: Arc<dyn CryptoEngine>,
    pub(crate) keys: Arc<dyn KeyMaterialProvider>,
    cache: DecryptedCache,
    pub(crate) config: CodecConfig,
}

impl DriveCrypto {
    /// Create with the default configuration
    pub fn new(engine: Arc<dyn CryptoEngine>, keys: Arc<dyn KeyMaterialProvider>) -> Self {
        Self::with_config(engine, keys, CodecConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(
        engine: Arc<dyn CryptoEngine>,
        keys: Arc<dyn KeyMaterialProvider>,
        config: CodecConfig,
    ) -> Self {
        Self {
            engine,
            keys,
            cache: DecryptedCache::new(),
            config,
        }
    }

    /// The crypto engine
    pub fn engine(&self) -> &dyn CryptoEngine {
        self.engine.as_ref()
    }

    /// The key provider
    pub fn keys(&self) -> &dyn KeyMaterialProvider {
        self.keys.as_ref()
    }

    /// The decrypted side-cache
    pub fn cache(&self) -> &DecryptedCache {
        &self.cache
    }

    /// Active configuration
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Forget cached values of an entity, e.g. after its ciphertext changed
    pub fn invalidate(&self, entity: &str) {
        self.cache.invalidate(entity);
    }

    pub(crate) fn cached_string(
        &self,
        entity: &str,
        slot: CacheSlot,
        ciphertext: &str,
    ) -> Option<Verified<String>> {
        if !self.config.cache_decrypted {
            return None;
        }
        let hit = self.cache.get(entity, slot, ciphertext.as_bytes())?;
        let value = String::from_utf8(hit.value.to_vec()).ok()?;
        debug!(entity, ?slot, "served from cache");
        Some(Verified::new(value, hit.status))
    }

    pub(crate) fn cached_bytes(
        &self,
        entity: &str,
        slot: CacheSlot,
        ciphertext: &str,
    ) -> Option<Verified<Vec<u8>>> {
        if !self.config.cache_decrypted {
            return None;
        }
        let hit = self.cache.get(entity, slot, ciphertext.as_bytes())?;
        debug!(entity, ?slot, "served from cache");
        Some(Verified::new(hit.value.to_vec(), hit.status))
    }

    pub(crate) fn remember(
        &self,
        entity: &str,
        slot: CacheSlot,
        ciphertext: &str,
        value: &[u8],
        status: &VerificationStatus,
    ) {
        if self.config.cache_decrypted {
            self.cache
                .insert(entity, slot, ciphertext.as_bytes(), value, status.clone());
        }
    }

    /// Log an unverified status and pass it through
    pub(crate) fn report(
        &self,
        entity: &str,
        what: &'static str,
        status: VerificationStatus,
    ) -> VerificationStatus {
        if let VerificationStatus::Unverified(reason) = &status {
            warn!(entity, what, %reason, "signature not verified");
        }
        status
    }

    /// Public keys of `email`, or none when no signer is recorded
    pub(crate) fn verification_keys(&self, email: Option<&str>) -> Result<Vec<String>> {
        match email {
            Some(email) if !email.is_empty() => self.keys.public_keys(email),
            _ => Ok(Vec::new()),
        }
    }

    /// Check an optional armored detached signature over `data`
    pub(crate) fn check_detached(
        &self,
        data: &[u8],
        signature: Option<&str>,
        keys: &[String],
    ) -> VerificationStatus {
        let Some(signature) = signature else {
            return VerificationStatus::Unverified(SignatureFailure::Missing);
        };
        if keys.is_empty() {
            return VerificationStatus::Unverified(SignatureFailure::NoVerificationKeys);
        }
        match self.engine.verify_detached(data, signature, keys) {
            Ok(()) => VerificationStatus::Verified,
            Err(e) => VerificationStatus::Unverified(SignatureFailure::Invalid(e.to_string())),
        }
    }
}

/// Compare ciphertext against its stored base64 SHA-256
pub(crate) fn check_content_hash(context: &str, expected: &str, ciphertext: &[u8]) -> Result<()> {
    let actual = ContentHash::of(ciphertext).to_base64();
    if actual != expected {
        return Err(crate::DriveError::TamperedContent {
            context: context.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
