use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};

use crate::error::{GatewayError, Result};

/// Per-credential cap on simultaneous in-flight downstream calls.
///
/// A burst of short calls can stay within the RPM window and still overwhelm
/// downstream capacity, so this gate is independent of the limiter. Each
/// credential gets its own counting semaphore, created lazily on first use
/// and retained for the process lifetime. Capacity 0 disables the gate.
///
/// The permit handed back by `enter` releases its slot on drop, so the slot
/// is returned on every exit path, including errors raised between enter
/// and exit.
#[derive(Debug)]
pub struct ConcurrencyGate {
    max_per_credential: u32,
    semaphores: RwLock<HashMap<String, Arc<Semaphore>>>,
}

impl ConcurrencyGate {
    pub fn new(max_per_credential: u32) -> Self {
        Self {
            max_per_credential,
            semaphores: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_per_credential > 0
    }

    pub fn max_per_credential(&self) -> u32 {
        self.max_per_credential
    }

    /// Number of credentials with a materialized semaphore.
    pub async fn tracked_credentials(&self) -> usize {
        self.semaphores.read().await.len()
    }

    /// Free slots for a credential, `None` when the gate is disabled or the
    /// credential has never been seen.
    pub async fn available_slots(&self, credential: &str) -> Option<usize> {
        let semaphores = self.semaphores.read().await;
        semaphores.get(credential).map(|sem| sem.available_permits())
    }

    async fn semaphore_for(&self, credential: &str) -> Arc<Semaphore> {
        {
            let semaphores = self.semaphores.read().await;
            if let Some(sem) = semaphores.get(credential) {
                return Arc::clone(sem);
            }
        }

        let mut semaphores = self.semaphores.write().await;
        // Double-check after acquiring the write lock
        if let Some(sem) = semaphores.get(credential) {
            return Arc::clone(sem);
        }
        let sem = Arc::new(Semaphore::new(self.max_per_credential as usize));
        semaphores.insert(credential.to_string(), Arc::clone(&sem));
        sem
    }

    /// Block until an in-flight slot is free for this credential. Returns
    /// `None` when the gate is disabled.
    pub async fn enter(&self, credential: &str) -> Result<Option<OwnedSemaphorePermit>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let sem = self.semaphore_for(credential).await;
        let permit = sem
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::Internal("concurrency gate semaphore closed".to_string()))?;
        Ok(Some(permit))
    }
}
