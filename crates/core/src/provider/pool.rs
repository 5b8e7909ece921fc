//! Bounded, leased ASR provider pool
//!
//! A fixed number of provider instances are shared across sessions. Callers
//! lease one for the duration of a transcription; the lease is an RAII guard
//! that returns the provider on every exit path. Waiting is fair FIFO via a
//! tokio semaphore. A provider that failed mid-transcription is marked
//! unhealthy and replaced from the factory on a later lease instead of being
//! handed back out.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::AsrProvider;
use crate::error::{Error, Result};

/// Builds a fresh provider instance, for pool fill and replacement.
pub type ProviderFactory = Arc<dyn Fn() -> Result<Arc<dyn AsrProvider>> + Send + Sync>;

struct PoolShared {
    free: Mutex<Vec<Arc<dyn AsrProvider>>>,
    /// Unhealthy providers discarded on lease drop; replaced lazily
    pending_replacements: AtomicUsize,
    factory: ProviderFactory,
}

/// Bounded pool of ASR provider instances.
pub struct ProviderPool {
    semaphore: Arc<Semaphore>,
    shared: Arc<PoolShared>,
    size: usize,
}

impl ProviderPool {
    /// Build a pool of `size` instances eagerly from the factory.
    pub fn new(size: usize, factory: ProviderFactory) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("provider pool size must be >= 1".into()));
        }
        let mut free = Vec::with_capacity(size);
        for _ in 0..size {
            free.push(factory()?);
        }
        tracing::info!("Provider pool initialized with {} instance(s)", size);
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(size)),
            shared: Arc::new(PoolShared {
                free: Mutex::new(free),
                pending_replacements: AtomicUsize::new(0),
                factory,
            }),
            size,
        })
    }

    /// Number of pooled instances.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Providers currently available without waiting.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire a provider within `timeout`. Waiters are served in FIFO
    /// order. The returned lease releases the provider when dropped.
    pub async fn lease(&self, session_id: &str, timeout: Duration) -> Result<ProviderLease> {
        let permit = tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| Error::Timeout {
                timeout_ms: timeout.as_millis() as u64,
                context: format!("provider lease for session {}", session_id),
            })?
            .map_err(|_| Error::Provider("provider pool is closed".into()))?;

        let provider = {
            let popped = self.shared.free.lock().pop();
            match popped {
                Some(p) => p,
                // A permit with no free instance means an unhealthy provider
                // was discarded; build its replacement now.
                None => {
                    self.shared
                        .pending_replacements
                        .fetch_sub(1, Ordering::SeqCst);
                    match (self.shared.factory)() {
                        Ok(p) => {
                            tracing::info!("Replaced unhealthy provider with fresh instance");
                            p
                        }
                        Err(e) => {
                            // Leave the replacement owed so a later lease retries.
                            self.shared
                                .pending_replacements
                                .fetch_add(1, Ordering::SeqCst);
                            return Err(e);
                        }
                    }
                }
            }
        };

        tracing::debug!("Leased provider '{}' to session {}", provider.name(), session_id);
        Ok(ProviderLease {
            provider,
            shared: self.shared.clone(),
            unhealthy: AtomicBool::new(false),
            _permit: permit,
        })
    }
}

/// RAII lease on a pooled provider. Dropping the lease returns the provider
/// (or discards it when marked unhealthy) and wakes the next waiter.
pub struct ProviderLease {
    provider: Arc<dyn AsrProvider>,
    shared: Arc<PoolShared>,
    unhealthy: AtomicBool,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for ProviderLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderLease")
            .field("unhealthy", &self.unhealthy.load(Ordering::Relaxed))
            .finish()
    }
}

impl ProviderLease {
    /// The leased provider. Dedicated to this lease; never shared.
    pub fn provider(&self) -> &Arc<dyn AsrProvider> {
        &self.provider
    }

    /// Mark the provider unhealthy; it will be discarded on release and
    /// replaced on a later lease.
    pub fn mark_unhealthy(&self) {
        self.unhealthy.store(true, Ordering::SeqCst);
    }
}

impl Drop for ProviderLease {
    fn drop(&mut self) {
        if self.unhealthy.load(Ordering::SeqCst) {
            tracing::warn!(
                "Discarding unhealthy provider '{}'; replacement owed",
                self.provider.name()
            );
            self.shared
                .pending_replacements
                .fetch_add(1, Ordering::SeqCst);
        } else {
            self.shared.free.lock().push(self.provider.clone());
        }
        // The permit drops after this, waking the next FIFO waiter.
    }
}
