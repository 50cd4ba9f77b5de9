//! Counting permits with timed, all-or-nothing acquisition.

use std::time::Duration;
use tokio::sync::Semaphore;

/// Arrival counter: producers `release`, a single waiter `acquire`s in bulk.
///
/// Permits taken by `acquire` are consumed, never handed back.
#[derive(Debug)]
pub struct Permits {
    semaphore: Semaphore,
}

impl Default for Permits {
    fn default() -> Self {
        Self::new()
    }
}

impl Permits {
    pub fn new() -> Self {
        Self {
            semaphore: Semaphore::new(0),
        }
    }

    pub fn release(&self, n: usize) {
        self.semaphore.add_permits(n);
    }

    /// Wait up to `timeout` for `n` permits. Either all `n` are consumed and
    /// `true` is returned, or none are and the result is `false`.
    pub async fn acquire(&self, n: usize, timeout: Duration) -> bool {
        let Ok(wanted) = u32::try_from(n) else {
            // More than can ever be released; behave like a plain timeout.
            tokio::time::sleep(timeout).await;
            return false;
        };

        match tokio::time::timeout(timeout, self.semaphore.acquire_many(wanted)).await {
            Ok(Ok(permit)) => {
                permit.forget();
                true
            }
            Ok(Err(_)) | Err(_) => false,
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
