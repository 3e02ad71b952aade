//! ASCII armor for messages, signatures and keys

use crate::{CryptoError, Result};
use base64::Engine;

/// Base64 body line width
const LINE_WIDTH: usize = 64;

/// Kind of armored block, selecting the header line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArmorKind {
    /// Encrypted message (key packets + data packet)
    Message,
    /// Detached signature
    Signature,
    /// Public key
    PublicKey,
    /// Passphrase-locked private key
    PrivateKey,
}

impl ArmorKind {
    /// Label used in the BEGIN/END lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::Message => "PGP MESSAGE",
            Self::Signature => "PGP SIGNATURE",
            Self::PublicKey => "PGP PUBLIC KEY BLOCK",
            Self::PrivateKey => "PGP PRIVATE KEY BLOCK",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        [Self::Message, Self::Signature, Self::PublicKey, Self::PrivateKey]
            .into_iter()
            .find(|kind| kind.label() == label)
    }
}

/// Armor binary data
pub fn armor(kind: ArmorKind, data: &[u8]) -> String {
    let body = base64::engine::general_purpose::STANDARD.encode(data);
    let mut out = String::with_capacity(body.len() + body.len() / LINE_WIDTH + 80);
    out.push_str("-----BEGIN ");
    out.push_str(kind.label());
    out.push_str("-----\n\n");
    for line in body.as_bytes().chunks(LINE_WIDTH) {
        // base64 output is ASCII
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out.push_str("-----END ");
    out.push_str(kind.label());
    out.push_str("-----\n");
    out
}

/// Decode an armored block of the expected kind
pub fn dearmor(expected: ArmorKind, text: &str) -> Result<Vec<u8>> {
    let (kind, data) = dearmor_any(text)?;
    if kind != expected {
        return Err(CryptoError::InvalidArmor(format!(
            "expected {}, found {}",
            expected.label(),
            kind.label()
        )));
    }
    Ok(data)
}

/// Decode an armored block of any kind
pub fn dearmor_any(text: &str) -> Result<(ArmorKind, Vec<u8>)> {
    let mut lines = text.trim().lines().map(str::trim);

    let begin = lines
        .next()
        .ok_or_else(|| CryptoError::InvalidArmor("empty input".into()))?;
    let label = begin
        .strip_prefix("-----BEGIN ")
        .and_then(|rest| rest.strip_suffix("-----"))
        .ok_or_else(|| CryptoError::InvalidArmor("missing BEGIN line".into()))?;
    let kind = ArmorKind::from_label(label)
        .ok_or_else(|| CryptoError::InvalidArmor(format!("unknown block type {}", label)))?;
    let end = format!("-----END {}-----", label);

    let mut body = String::new();
    let mut in_headers = true;
    let mut closed = false;
    for line in lines {
        if line == end {
            closed = true;
            break;
        }
        if in_headers {
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            if line.contains(": ") {
                continue;
            }
            in_headers = false;
        }
        // checksum line
        if line.starts_with('=') && line.len() == 5 {
            continue;
        }
        body.push_str(line);
    }
    if !closed {
        return Err(CryptoError::InvalidArmor("missing END line".into()));
    }

    let data = base64::engine::general_purpose::STANDARD.decode(body.as_bytes())?;
    Ok((kind, data))
}

/// Cheap check for an armor envelope, without decoding
pub fn is_armored(text: &str) -> bool {
    text.trim_start().starts_with("-----BEGIN ")
}
