//! Packet layer
//!
//! A message is one or more key packets followed by exactly one data packet.
//! Every packet is framed as `tag (u8) | body length (u32 BE) | body`.
//!
//! ## Key packet
//!
//! `version | recipient key id (8) | ephemeral X25519 public (32) | nonce (12) |
//! wrapped session key (48)`. The wrapping key comes from an X25519 agreement
//! between the ephemeral key and the recipient, run through BLAKE3 key
//! derivation.
//!
//! ## Data packet
//!
//! `version | cipher | flags | chunk size (u32 BE) | nonce prefix (7) | chunks`.
//! Chunks follow the STREAM construction: chunk `i` is sealed under the nonce
//! `prefix | i (u32 BE) | last`, with the 14-byte header as associated data,
//! so truncation, reordering and header edits all fail authentication. When
//! the signed flag is set, the cleartext stream ends with a signature body.

use crate::{
    hashing::derive_key,
    keys::{KeyId, PrivateKey, PublicKey, SessionKey, KEY_ID_SIZE},
    signature::{DetachedSignature, SIGNATURE_BODY_SIZE},
    symmetric::{random_nonce, Aead, AeadCipher, NONCE_SIZE, TAG_SIZE},
    CryptoError, Result,
};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

/// Packet tag of a public-key encrypted session key
pub const TAG_KEY_PACKET: u8 = 1;

/// Packet tag of a session-key encrypted data packet
pub const TAG_DATA_PACKET: u8 = 18;

/// Size of the frame header preceding every packet body
pub const FRAME_HEADER_SIZE: usize = 5;

/// Size of the data packet header
pub const DATA_HEADER_SIZE: usize = 14;

/// Largest chunk size accepted from a packet header (16 MiB)
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

const KEY_PACKET_VERSION: u8 = 1;
const DATA_PACKET_VERSION: u8 = 1;
const FLAG_SIGNED: u8 = 0b0000_0001;
const NONCE_PREFIX_SIZE: usize = 7;
const KEY_PACKET_BODY_SIZE: usize = 1 + KEY_ID_SIZE + 32 + NONCE_SIZE + 32 + TAG_SIZE;
const WRAP_CONTEXT: &str = "drive-crypto 2024-06 session key wrap";

// ═══════════════════════════════════════════════════════════════════════════
// Framing
// ═══════════════════════════════════════════════════════════════════════════

/// A framed packet borrowed from a buffer
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Packet tag
    pub tag: u8,
    /// Packet body
    pub body: &'a [u8],
}

/// Append a framed packet to `out`
pub fn write_frame(out: &mut Vec<u8>, tag: u8, body: &[u8]) -> Result<()> {
    let len = u32::try_from(body.len()).map_err(|_| {
        CryptoError::InvalidPacket(format!("packet body of {} bytes is too large", body.len()))
    })?;
    out.push(tag);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(body);
    Ok(())
}

/// Split a buffer into frames
pub fn read_frames(bytes: &[u8]) -> Result<Vec<Frame<'_>>> {
    let mut frames = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let (tag, len) = parse_frame_header(rest)?;
        let end = FRAME_HEADER_SIZE + len;
        if rest.len() < end {
            return Err(CryptoError::InvalidPacket(format!(
                "packet tag {} truncated: need {} bytes, have {}",
                tag,
                end,
                rest.len()
            )));
        }
        frames.push(Frame {
            tag,
            body: &rest[FRAME_HEADER_SIZE..end],
        });
        rest = &rest[end..];
    }
    Ok(frames)
}

/// Parse the tag and body length of a frame header
pub fn parse_frame_header(bytes: &[u8]) -> Result<(u8, usize)> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(CryptoError::InvalidPacket("truncated frame header".into()));
    }
    let mut len = [0u8; 4];
    len.copy_from_slice(&bytes[1..FRAME_HEADER_SIZE]);
    Ok((bytes[0], u32::from_be_bytes(len) as usize))
}

// ═══════════════════════════════════════════════════════════════════════════
// Key packets
// ═══════════════════════════════════════════════════════════════════════════

/// A session key encrypted to one recipient
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPacket {
    recipient: KeyId,
    ephemeral: [u8; 32],
    nonce: [u8; NONCE_SIZE],
    wrapped: Vec<u8>,
}

impl KeyPacket {
    /// Wrap `session_key` for `recipient`
    pub fn seal(session_key: &SessionKey, recipient: &PublicKey) -> Result<Self> {
        let ephemeral_secret = StaticSecret::random_from_rng(OsRng);
        let ephemeral = *X25519Public::from(&ephemeral_secret).as_bytes();
        let shared = ephemeral_secret.diffie_hellman(&X25519Public::from(*recipient.encryption_key()));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidKey("non-contributory recipient key".into()));
        }

        let recipient_id = recipient.key_id();
        let wrap_key = wrap_key(shared.as_bytes(), &ephemeral, recipient.encryption_key());
        let nonce = random_nonce();
        let wrapped = Aead::new_default(&wrap_key).seal(
            &nonce,
            session_key.as_bytes(),
            &key_packet_aad(&recipient_id),
        )?;

        Ok(Self {
            recipient: recipient_id,
            ephemeral,
            nonce,
            wrapped,
        })
    }

    /// Unwrap the session key with the recipient's private key
    pub fn open(&self, key: &PrivateKey) -> Result<SessionKey> {
        let shared = key.agree(&self.ephemeral)?;
        let public = key.public_key();
        let wrap_key = wrap_key(&shared, &self.ephemeral, public.encryption_key());
        let raw = zeroize::Zeroizing::new(
            Aead::new_default(&wrap_key)
                .open(&self.nonce, &self.wrapped, &key_packet_aad(&self.recipient))
                .map_err(|_| {
                    CryptoError::Decryption(format!(
                        "key packet for {} does not open with key {}",
                        self.recipient,
                        public.key_id()
                    ))
                })?,
        );
        SessionKey::from_bytes(&raw)
    }

    /// Key id of the intended recipient
    pub fn recipient(&self) -> KeyId {
        self.recipient
    }

    /// Serialize as a framed packet
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(KEY_PACKET_BODY_SIZE);
        body.push(KEY_PACKET_VERSION);
        body.extend_from_slice(self.recipient.as_bytes());
        body.extend_from_slice(&self.ephemeral);
        body.extend_from_slice(&self.nonce);
        body.extend_from_slice(&self.wrapped);
        let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
        write_frame(&mut out, TAG_KEY_PACKET, &body)?;
        Ok(out)
    }

    /// Parse a key packet body
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() != KEY_PACKET_BODY_SIZE {
            return Err(CryptoError::InvalidPacket(format!(
                "key packet must be {} bytes, got {}",
                KEY_PACKET_BODY_SIZE,
                body.len()
            )));
        }
        if body[0] != KEY_PACKET_VERSION {
            return Err(CryptoError::InvalidPacket(format!(
                "unsupported key packet version {}",
                body[0]
            )));
        }
        let mut offset = 1;
        let recipient = KeyId::from_bytes(&body[offset..offset + KEY_ID_SIZE])?;
        offset += KEY_ID_SIZE;
        let mut ephemeral = [0u8; 32];
        ephemeral.copy_from_slice(&body[offset..offset + 32]);
        offset += 32;
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&body[offset..offset + NONCE_SIZE]);
        offset += NONCE_SIZE;
        Ok(Self {
            recipient,
            ephemeral,
            nonce,
            wrapped: body[offset..].to_vec(),
        })
    }
}

/// Parse a buffer holding only framed key packets
pub fn parse_key_packets(bytes: &[u8]) -> Result<Vec<KeyPacket>> {
    let packets = read_frames(bytes)?
        .into_iter()
        .map(|frame| {
            if frame.tag != TAG_KEY_PACKET {
                return Err(CryptoError::InvalidPacket(format!(
                    "expected key packet, found tag {}",
                    frame.tag
                )));
            }
            KeyPacket::parse(frame.body)
        })
        .collect::<Result<Vec<_>>>()?;
    if packets.is_empty() {
        return Err(CryptoError::InvalidPacket("no key packet".into()));
    }
    Ok(packets)
}

fn wrap_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; 32] {
    let mut material = zeroize::Zeroizing::new([0u8; 96]);
    material[..32].copy_from_slice(shared);
    material[32..64].copy_from_slice(ephemeral);
    material[64..].copy_from_slice(recipient);
    derive_key(WRAP_CONTEXT, &material[..])
}

fn key_packet_aad(recipient: &KeyId) -> [u8; 1 + KEY_ID_SIZE] {
    let mut aad = [0u8; 1 + KEY_ID_SIZE];
    aad[0] = KEY_PACKET_VERSION;
    aad[1..].copy_from_slice(recipient.as_bytes());
    aad
}

// ═══════════════════════════════════════════════════════════════════════════
// Data packets
// ═══════════════════════════════════════════════════════════════════════════

/// Parsed data packet header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataHeader {
    /// Cipher protecting the chunks
    pub cipher: AeadCipher,
    /// Whether the cleartext stream ends with a signature body
    pub signed: bool,
    /// Cleartext bytes per chunk (the last chunk may be shorter)
    pub chunk_size: u32,
    nonce_prefix: [u8; NONCE_PREFIX_SIZE],
}

impl DataHeader {
    fn new(cipher: AeadCipher, signed: bool, chunk_size: u32) -> Self {
        let mut nonce_prefix = [0u8; NONCE_PREFIX_SIZE];
        nonce_prefix.copy_from_slice(&random_nonce()[..NONCE_PREFIX_SIZE]);
        Self {
            cipher,
            signed,
            chunk_size,
            nonce_prefix,
        }
    }

    /// Serialize the header
    pub fn to_bytes(&self) -> [u8; DATA_HEADER_SIZE] {
        let mut out = [0u8; DATA_HEADER_SIZE];
        out[0] = DATA_PACKET_VERSION;
        out[1] = self.cipher.id();
        out[2] = if self.signed { FLAG_SIGNED } else { 0 };
        out[3..7].copy_from_slice(&self.chunk_size.to_be_bytes());
        out[7..].copy_from_slice(&self.nonce_prefix);
        out
    }

    /// Parse a header
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DATA_HEADER_SIZE {
            return Err(CryptoError::InvalidPacket("truncated data packet header".into()));
        }
        if bytes[0] != DATA_PACKET_VERSION {
            return Err(CryptoError::InvalidPacket(format!(
                "unsupported data packet version {}",
                bytes[0]
            )));
        }
        let cipher = AeadCipher::from_id(bytes[1])?;
        let mut size = [0u8; 4];
        size.copy_from_slice(&bytes[3..7]);
        let chunk_size = u32::from_be_bytes(size);
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(CryptoError::InvalidPacket(format!(
                "chunk size {} out of range",
                chunk_size
            )));
        }
        let mut nonce_prefix = [0u8; NONCE_PREFIX_SIZE];
        nonce_prefix.copy_from_slice(&bytes[7..DATA_HEADER_SIZE]);
        Ok(Self {
            cipher,
            signed: bytes[2] & FLAG_SIGNED != 0,
            chunk_size,
            nonce_prefix,
        })
    }

    /// Nonce of chunk `index`
    pub fn chunk_nonce(&self, index: u32, last: bool) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..NONCE_PREFIX_SIZE].copy_from_slice(&self.nonce_prefix);
        nonce[NONCE_PREFIX_SIZE..NONCE_SIZE - 1].copy_from_slice(&index.to_be_bytes());
        nonce[NONCE_SIZE - 1] = u8::from(last);
        nonce
    }

    /// Sealed size of a full chunk
    pub fn sealed_chunk_size(&self) -> usize {
        self.chunk_size as usize + TAG_SIZE
    }

    /// Sizes of the sealed chunks making up `body_len` bytes after the header
    pub fn chunk_layout(&self, body_len: usize) -> Result<ChunkLayout> {
        let sealed = self.sealed_chunk_size();
        if body_len < TAG_SIZE {
            return Err(CryptoError::InvalidPacket("data packet has no chunks".into()));
        }
        let count = body_len.div_ceil(sealed);
        let last = body_len - (count - 1) * sealed;
        if last < TAG_SIZE {
            return Err(CryptoError::InvalidPacket("truncated final chunk".into()));
        }
        let count = u32::try_from(count)
            .map_err(|_| CryptoError::InvalidPacket("too many chunks".into()))?;
        Ok(ChunkLayout {
            count,
            full: sealed,
            last,
        })
    }
}

/// How the sealed body of a data packet splits into chunks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLayout {
    /// Number of chunks
    pub count: u32,
    /// Sealed size of every chunk but the last
    pub full: usize,
    /// Sealed size of the last chunk
    pub last: usize,
}

impl ChunkLayout {
    /// Sealed size of chunk `index`
    pub fn sealed_len(&self, index: u32) -> usize {
        if index + 1 == self.count {
            self.last
        } else {
            self.full
        }
    }
}

/// Cleartext and embedded signature of an opened data packet
#[derive(Debug)]
pub struct OpenedData {
    /// Literal cleartext
    pub literal: Vec<u8>,
    /// Signature carried inside the encrypted stream, if any
    pub signature: Option<DetachedSignature>,
}

/// Encrypt `literal` under `session_key` as a framed data packet
pub fn seal_data_packet(
    session_key: &SessionKey,
    cipher: AeadCipher,
    chunk_size: u32,
    literal: &[u8],
    signer: Option<&PrivateKey>,
) -> Result<Vec<u8>> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(CryptoError::Encryption(format!(
            "chunk size {} out of range",
            chunk_size
        )));
    }
    let header = DataHeader::new(cipher, signer.is_some(), chunk_size);
    let header_bytes = header.to_bytes();
    let aead = Aead::new(session_key.as_bytes(), cipher);

    let signature = signer.map(|key| DetachedSignature::sign(key, literal).to_bytes());
    let trailer: &[u8] = signature.as_ref().map(|s| &s[..]).unwrap_or(&[]);
    let total = literal.len() + trailer.len();

    let chunk = chunk_size as usize;
    let count = total.div_ceil(chunk).max(1);
    let mut body = Vec::with_capacity(DATA_HEADER_SIZE + total + count * TAG_SIZE);
    body.extend_from_slice(&header_bytes);

    let mut buf = Vec::with_capacity(chunk.min(total));
    for i in 0..count {
        let start = i * chunk;
        let end = (start + chunk).min(total);
        buf.clear();
        copy_range(literal, trailer, start, end, &mut buf);
        let index =
            u32::try_from(i).map_err(|_| CryptoError::Encryption("too many chunks".into()))?;
        let nonce = header.chunk_nonce(index, i + 1 == count);
        body.extend_from_slice(&aead.seal(&nonce, &buf, &header_bytes)?);
    }

    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    write_frame(&mut out, TAG_DATA_PACKET, &body)?;
    Ok(out)
}

/// Decrypt a framed data packet held in memory
pub fn open_data_packet(framed: &[u8], session_key: &SessionKey) -> Result<OpenedData> {
    let frames = read_frames(framed)?;
    let body = match frames.as_slice() {
        [frame] if frame.tag == TAG_DATA_PACKET => frame.body,
        _ => {
            return Err(CryptoError::InvalidPacket(
                "expected a single data packet".into(),
            ))
        }
    };
    let header = DataHeader::parse(body)?;
    let header_bytes = &body[..DATA_HEADER_SIZE];
    let sealed = &body[DATA_HEADER_SIZE..];
    let layout = header.chunk_layout(sealed.len())?;
    let aead = Aead::new(session_key.as_bytes(), header.cipher);

    let mut cleartext = Vec::with_capacity(sealed.len());
    let mut offset = 0;
    for index in 0..layout.count {
        let len = layout.sealed_len(index);
        let nonce = header.chunk_nonce(index, index + 1 == layout.count);
        cleartext.extend_from_slice(&aead.open(&nonce, &sealed[offset..offset + len], header_bytes)?);
        offset += len;
    }

    split_signature(&header, cleartext)
}

fn split_signature(header: &DataHeader, mut cleartext: Vec<u8>) -> Result<OpenedData> {
    if !header.signed {
        return Ok(OpenedData {
            literal: cleartext,
            signature: None,
        });
    }
    if cleartext.len() < SIGNATURE_BODY_SIZE {
        return Err(CryptoError::InvalidPacket(
            "signed data packet too short for its signature".into(),
        ));
    }
    let trailer = cleartext.split_off(cleartext.len() - SIGNATURE_BODY_SIZE);
    Ok(OpenedData {
        literal: cleartext,
        signature: Some(DetachedSignature::from_bytes(&trailer)?),
    })
}

fn copy_range(first: &[u8], second: &[u8], start: usize, end: usize, out: &mut Vec<u8>) {
    if start < first.len() {
        out.extend_from_slice(&first[start..end.min(first.len())]);
    }
    if end > first.len() {
        let from = start.max(first.len()) - first.len();
        out.extend_from_slice(&second[from..end - first.len()]);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Messages
// ═══════════════════════════════════════════════════════════════════════════

/// A message split into its key packets and its data packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitMessage {
    /// One or more framed key packets, concatenated
    pub key_packets: Vec<u8>,
    /// The framed data packet
    pub data_packet: Vec<u8>,
}

impl SplitMessage {
    /// Split a binary message
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let frames = read_frames(bytes)?;
        let (data, keys) = frames
            .split_last()
            .ok_or_else(|| CryptoError::InvalidPacket("empty message".into()))?;
        if data.tag != TAG_DATA_PACKET {
            return Err(CryptoError::InvalidPacket(
                "message does not end with a data packet".into(),
            ));
        }
        if keys.is_empty() {
            return Err(CryptoError::InvalidPacket("message has no key packet".into()));
        }
        let mut key_packets = Vec::new();
        for frame in keys {
            if frame.tag != TAG_KEY_PACKET {
                return Err(CryptoError::InvalidPacket(format!(
                    "unexpected packet tag {} before data packet",
                    frame.tag
                )));
            }
            write_frame(&mut key_packets, frame.tag, frame.body)?;
        }
        let mut data_packet = Vec::with_capacity(FRAME_HEADER_SIZE + data.body.len());
        write_frame(&mut data_packet, data.tag, data.body)?;
        Ok(Self {
            key_packets,
            data_packet,
        })
    }

    /// Recompose the binary message
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.key_packets.len() + self.data_packet.len());
        out.extend_from_slice(&self.key_packets);
        out.extend_from_slice(&self.data_packet);
        out
    }

    /// Parsed key packets
    pub fn parsed_key_packets(&self) -> Result<Vec<KeyPacket>> {
        parse_key_packets(&self.key_packets)
    }

    /// Number of key packets
    pub fn key_packet_count(&self) -> Result<usize> {
        Ok(read_frames(&self.key_packets)?.len())
    }
}
