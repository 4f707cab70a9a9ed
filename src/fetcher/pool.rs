//! Bounded pool of browser render slots.
//!
//! Each render is heavy (a Chromium process tree or a remote session), so the
//! number in flight is capped. Acquiring a slot never blocks past the caller's
//! deadline: an exhausted pool queues the caller until a slot frees up or the
//! deadline passes, whichever comes first.

use crate::error::FetchError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BrowserPool {
    slots: Arc<Semaphore>,
    size: usize,
}

/// A held render slot. Released when dropped.
#[derive(Debug)]
pub struct PoolSlot {
    _permit: OwnedSemaphorePermit,
}

impl BrowserPool {
    /// Create a pool with `size` render slots.
    ///
    /// # Arguments
    /// * `size` - Maximum concurrent renders. Zero is clamped to one.
    ///
    /// # Returns
    /// A pool that is cheap to clone; clones share the same slots.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            slots: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Total slots, after clamping.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently held. Equals [`BrowserPool::size`] when idle.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a free slot until `deadline`.
    pub async fn acquire(&self, url: &str, deadline: Instant) -> Result<PoolSlot, FetchError> {
        let started = Instant::now();
        match tokio::time::timeout_at(deadline, Arc::clone(&self.slots).acquire_owned()).await {
            Ok(Ok(permit)) => {
                debug!(
                    url,
                    waited_ms = started.elapsed().as_millis() as u64,
                    available = self.available(),
                    "Acquired browser slot"
                );
                Ok(PoolSlot { _permit: permit })
            }
            Ok(Err(_closed)) => Err(FetchError::Navigation {
                url: url.to_string(),
                message: "browser pool closed".to_string(),
            }),
            Err(_elapsed) => Err(FetchError::Timeout {
                url: url.to_string(),
                after: started.elapsed(),
            }),
        }
    }
}
