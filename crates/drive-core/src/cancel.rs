//! Cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag checked between blocks and chunks
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Fail with [`DriveError::Cancelled`](crate::DriveError::Cancelled) once cancelled
    pub fn check(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::DriveError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// The raw flag, for the streaming decryptor
    pub fn as_flag(&self) -> &AtomicBool {
        &self.flag
    }
}
