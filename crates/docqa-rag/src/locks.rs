use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per document id. Ingestion and cleanup of the same id hold
/// it for their whole run; different ids never contend.
#[derive(Default)]
pub struct DocumentLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, document_id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Drop idle entries; an entry held or awaited has other strong refs.
            map.retain(|_, m| Arc::strong_count(m) > 1);
            map.entry(document_id.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Number of ids currently tracked.
    pub fn tracked(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }
}
