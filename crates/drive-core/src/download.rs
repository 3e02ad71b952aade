//! Whole-revision decryption to a file
//!
//! Output goes to a `.partial` sibling of the destination and is renamed
//! into place only once every block decrypted. Cancellation or any error
//! drops the guard, which deletes the partial file.

use crate::{
    cancel::CancellationToken,
    config::DecryptMode,
    model::{Block, NodeTree, RevisionId},
    provider::BlockSource,
    verification::VerificationStatus,
    DriveCrypto, Result,
};
use drive_crypto::SessionKey;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Verification outcome of one block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockOutcome {
    pub index: u32,
    /// Cleartext bytes written for the block
    pub size: u64,
    pub status: VerificationStatus,
}

/// A revision decrypted to disk
#[derive(Clone, Debug)]
pub struct DecryptedRevision {
    pub path: PathBuf,
    /// Cleartext bytes written
    pub size: u64,
    /// Per-block outcomes in index order
    pub blocks: Vec<BlockOutcome>,
    pub manifest: VerificationStatus,
    pub content_key: VerificationStatus,
}

impl DecryptedRevision {
    /// Whether the manifest, the content key and every block verified
    pub fn is_verified(&self) -> bool {
        self.manifest.is_verified()
            && self.content_key.is_verified()
            && self.blocks.iter().all(|b| b.status.is_verified())
    }
}

impl DriveCrypto {
    /// Decrypt every block of a revision into `destination`, in index order.
    ///
    /// The manifest is checked before any output is created. A revision
    /// without a manifest signature is refused with
    /// [`DriveError::NoManifestSignature`](crate::DriveError::NoManifestSignature)
    /// rather than downloaded with a warning; an invalid signature only marks
    /// the result unverified.
    #[instrument(skip_all, fields(revision = %revision, mode = ?self.config.decrypt_mode))]
    pub fn decrypt_revision(
        &self,
        tree: &NodeTree,
        revision: &RevisionId,
        source: &dyn BlockSource,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<DecryptedRevision> {
        let rev = tree.revision(revision)?;
        let manifest = self.verify_manifest(tree, revision)?;
        let content_key = self.decrypt_content_session_key(tree, &rev.file)?;
        let blocks = rev.sorted_blocks();

        let mut output = PartialFile::create(destination)?;
        let job = Job {
            tree,
            revision,
            source,
            session_key: &content_key.value,
            cancel,
        };
        let outcomes = match self.config.decrypt_mode {
            DecryptMode::InMemory => self.blocks_in_memory(&job, &blocks, &mut output)?,
            DecryptMode::Streaming => self.blocks_streaming(&job, &blocks, &mut output)?,
            DecryptMode::Parallel => self.blocks_parallel(&job, &blocks, &mut output)?,
        };
        cancel.check()?;

        let size = outcomes.iter().map(|o| o.size).sum();
        if size != rev.size {
            warn!(declared = rev.size, actual = size, "decrypted size differs from declared size");
        }
        let path = output.finish()?;
        debug!(blocks = outcomes.len(), size, "revision decrypted");

        Ok(DecryptedRevision {
            path,
            size,
            blocks: outcomes,
            manifest,
            content_key: content_key.status,
        })
    }

    fn blocks_in_memory(
        &self,
        job: &Job<'_>,
        blocks: &[&Block],
        output: &mut PartialFile,
    ) -> Result<Vec<BlockOutcome>> {
        let mut outcomes = Vec::with_capacity(blocks.len());
        for block in blocks {
            job.cancel.check()?;
            let clear = job.decrypt(self, block)?;
            output.write_all(&clear.value)?;
            outcomes.push(BlockOutcome {
                index: block.index,
                size: clear.value.len() as u64,
                status: clear.status,
            });
        }
        Ok(outcomes)
    }

    fn blocks_streaming(
        &self,
        job: &Job<'_>,
        blocks: &[&Block],
        output: &mut PartialFile,
    ) -> Result<Vec<BlockOutcome>> {
        let mut outcomes = Vec::with_capacity(blocks.len());
        for block in blocks {
            job.cancel.check()?;
            let mut counter = CountingWriter::new(&mut *output);
            let status = self.decrypt_block_to(
                job.tree,
                job.revision,
                block,
                job.source,
                &mut counter,
                job.session_key,
                job.cancel,
            )?;
            outcomes.push(BlockOutcome {
                index: block.index,
                size: counter.written,
                status,
            });
        }
        Ok(outcomes)
    }

    fn blocks_parallel(
        &self,
        job: &Job<'_>,
        blocks: &[&Block],
        output: &mut PartialFile,
    ) -> Result<Vec<BlockOutcome>> {
        let decrypted = blocks
            .par_iter()
            .map(|block| {
                job.cancel.check()?;
                job.decrypt(self, block).map(|clear| (block.index, clear))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut outcomes = Vec::with_capacity(decrypted.len());
        for (index, clear) in decrypted {
            job.cancel.check()?;
            output.write_all(&clear.value)?;
            outcomes.push(BlockOutcome {
                index,
                size: clear.value.len() as u64,
                status: clear.status,
            });
        }
        Ok(outcomes)
    }
}

struct Job<'a> {
    tree: &'a NodeTree,
    revision: &'a RevisionId,
    source: &'a dyn BlockSource,
    session_key: &'a SessionKey,
    cancel: &'a CancellationToken,
}

impl Job<'_> {
    fn decrypt(
        &self,
        drive: &DriveCrypto,
        block: &Block,
    ) -> Result<crate::verification::Verified<Vec<u8>>> {
        let ciphertext = self.source.fetch_ciphertext(&block.reference(self.revision))?;
        drive.decrypt_block(self.tree, self.revision, block, &ciphertext, self.session_key)
    }
}

/// Output file that only appears at its destination once finished
struct PartialFile {
    temp_path: PathBuf,
    dest_path: PathBuf,
    file: Option<BufWriter<File>>,
    finished: bool,
}

impl PartialFile {
    fn create(dest: &Path) -> Result<Self> {
        let mut name = dest
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".partial");
        let temp_path = dest.with_file_name(name);
        let file = BufWriter::new(File::create(&temp_path)?);
        Ok(Self {
            temp_path,
            dest_path: dest.to_path_buf(),
            file: Some(file),
            finished: false,
        })
    }

    /// Flush, sync and rename into place. The guard stays armed until the
    /// rename succeeds, so a failure here still removes the partial file.
    fn finish(mut self) -> Result<PathBuf> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.get_ref().sync_all()?;
        }
        std::fs::rename(&self.temp_path, &self.dest_path)?;
        self.finished = true;
        Ok(self.dest_path.clone())
    }
}

impl Write for PartialFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(file) => file.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "output already finished")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.finished {
            // close before removing
            drop(self.file.take());
            if let Err(e) = std::fs::remove_file(&self.temp_path) {
                warn!(path = %self.temp_path.display(), error = %e, "failed to remove partial output");
            }
        }
    }
}

struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
