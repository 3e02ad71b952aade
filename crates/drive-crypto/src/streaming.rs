//! Bounded-memory decryption of data packets
//!
//! Reads a framed data packet from any `Read`, decrypts it chunk by chunk and
//! writes the cleartext to any `Write`. At most one sealed chunk plus a
//! signature-sized tail is held in memory. A shared cancellation flag is
//! checked before every chunk.

use crate::{
    hashing::{ContentHash, IncrementalHasher},
    keys::SessionKey,
    packet::{
        parse_frame_header, DataHeader, DATA_HEADER_SIZE, FRAME_HEADER_SIZE, TAG_DATA_PACKET,
    },
    signature::{DetachedSignature, SIGNATURE_BODY_SIZE},
    symmetric::Aead,
    CryptoError, Result,
};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

/// Default read buffer for hashing passes (64 KiB)
pub const DEFAULT_READ_BUFFER: usize = 64 * 1024;

/// Result of a streamed decryption
#[derive(Debug)]
pub struct StreamOutcome {
    /// Cleartext bytes written
    pub bytes_written: u64,
    /// SHA-256 digest of the written cleartext, for detached verification
    pub digest: ContentHash,
    /// Signature embedded in the encrypted stream, if the packet was signed
    pub embedded_signature: Option<DetachedSignature>,
}

/// Decrypt one framed data packet from `input` into `output`
pub fn decrypt_stream<R, W>(
    input: &mut R,
    output: &mut W,
    session_key: &SessionKey,
    cancel: &AtomicBool,
) -> Result<StreamOutcome>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut frame_header = [0u8; FRAME_HEADER_SIZE];
    read_exact(input, &mut frame_header, "frame header")?;
    let (tag, body_len) = parse_frame_header(&frame_header)?;
    if tag != TAG_DATA_PACKET {
        return Err(CryptoError::InvalidPacket(format!(
            "expected data packet, found tag {}",
            tag
        )));
    }
    if body_len < DATA_HEADER_SIZE {
        return Err(CryptoError::InvalidPacket("truncated data packet header".into()));
    }

    let mut header_bytes = [0u8; DATA_HEADER_SIZE];
    read_exact(input, &mut header_bytes, "data packet header")?;
    let header = DataHeader::parse(&header_bytes)?;
    let layout = header.chunk_layout(body_len - DATA_HEADER_SIZE)?;
    let aead = Aead::new(session_key.as_bytes(), header.cipher);

    let mut sealed = vec![0u8; layout.full];
    let mut pending: Vec<u8> = Vec::new();
    let mut hasher = IncrementalHasher::new();

    for index in 0..layout.count {
        if cancel.load(Ordering::Relaxed) {
            return Err(CryptoError::Cancelled);
        }
        let len = layout.sealed_len(index);
        read_exact(input, &mut sealed[..len], "data chunk")?;
        let nonce = header.chunk_nonce(index, index + 1 == layout.count);
        let clear = aead.open(&nonce, &sealed[..len], &header_bytes)?;

        if header.signed {
            pending.extend_from_slice(&clear);
            if pending.len() > SIGNATURE_BODY_SIZE {
                let ready = pending.len() - SIGNATURE_BODY_SIZE;
                emit(output, &mut hasher, &pending[..ready])?;
                pending.drain(..ready);
            }
        } else {
            emit(output, &mut hasher, &clear)?;
        }
    }

    let mut probe = [0u8; 1];
    if input.read(&mut probe)? != 0 {
        return Err(CryptoError::InvalidPacket("trailing data after data packet".into()));
    }

    let embedded_signature = if header.signed {
        Some(DetachedSignature::from_bytes(&pending)?)
    } else {
        None
    };
    output.flush()?;

    Ok(StreamOutcome {
        bytes_written: hasher.len(),
        digest: hasher.finalize(),
        embedded_signature,
    })
}

/// SHA-256 of everything `input` yields, reading `buffer_size` bytes at a time
pub fn hash_reader<R: Read + ?Sized>(
    input: &mut R,
    buffer_size: usize,
    cancel: &AtomicBool,
) -> Result<(ContentHash, u64)> {
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut hasher = IncrementalHasher::new();
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(CryptoError::Cancelled);
        }
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
    }
    let len = hasher.len();
    Ok((hasher.finalize(), len))
}

fn emit<W: Write + ?Sized>(output: &mut W, hasher: &mut IncrementalHasher, data: &[u8]) -> Result<()> {
    hasher.update(data);
    output.write_all(data)?;
    Ok(())
}

fn read_exact<R: Read + ?Sized>(input: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    input.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => CryptoError::InvalidPacket(format!("truncated {}", what)),
        _ => CryptoError::Io(e),
    })
}
