//! Re-targeting encrypted messages at a new key without touching their payload

use crate::{DriveCrypto, DriveError, Result};
use drive_crypto::{KeyPack, SplitMessage};
use std::slice;
use tracing::instrument;

impl DriveCrypto {
    /// Replace the key packets of an armored message with one for `new_key`.
    ///
    /// The data packet is carried over byte for byte.
    #[instrument(skip_all)]
    pub fn reencrypt_key_packet(&self, armored: &str, old: &KeyPack, new_key: &str) -> Result<String> {
        let split = self.engine.split_message(armored)?;
        let key_packets = self.reencrypt_session_key_packet(&split.key_packets, old, new_key)?;
        Ok(self.engine.join_message(&SplitMessage {
            key_packets,
            data_packet: split.data_packet,
        }))
    }

    /// Grant `new_key` access to an armored message, keeping the existing recipients
    #[instrument(skip_all)]
    pub fn add_recipient_key_packet(&self, armored: &str, old: &KeyPack, new_key: &str) -> Result<String> {
        let mut split = self.engine.split_message(armored)?;
        let added = self.reencrypt_session_key_packet(&split.key_packets, old, new_key)?;
        split.key_packets.extend_from_slice(&added);
        Ok(self.engine.join_message(&split))
    }

    /// Unwrap binary key packets with `old` and wrap the session key to `new_key`
    pub fn reencrypt_session_key_packet(&self, key_packets: &[u8], old: &KeyPack, new_key: &str) -> Result<Vec<u8>> {
        let session_key = self
            .engine
            .decrypt_session_key(key_packets, slice::from_ref(old))
            .map_err(|e| DriveError::decryption("key packet for re-encryption", e))?;
        Ok(self.engine.encrypt_session_key(&session_key, new_key)?)
    }
}
