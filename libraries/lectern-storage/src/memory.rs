//! In-memory progress store

use async_trait::async_trait;
use lectern_core::{LocalProgress, ProgressStore, Result, SyncQueueEntry};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Progress store that lives only as long as the process
///
/// Used for dry runs and anywhere persistence across restarts is not wanted.
#[derive(Default)]
pub struct MemoryProgressStore {
    progress: RwLock<HashMap<String, LocalProgress>>,
    queue: RwLock<HashMap<String, SyncQueueEntry>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn save_progress(&self, progress: &LocalProgress) -> Result<()> {
        self.progress
            .write()
            .await
            .insert(progress.progress_key.clone(), progress.clone());
        Ok(())
    }

    async fn get_progress(&self, progress_key: &str) -> Result<Option<LocalProgress>> {
        Ok(self.progress.read().await.get(progress_key).cloned())
    }

    async fn remove_progress(&self, progress_key: &str) -> Result<()> {
        self.progress.write().await.remove(progress_key);
        Ok(())
    }

    async fn enqueue(&self, entry: &SyncQueueEntry) -> Result<()> {
        self.queue
            .write()
            .await
            .insert(entry.session_id.clone(), entry.clone());
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<SyncQueueEntry>> {
        let mut entries: Vec<SyncQueueEntry> = self.queue.read().await.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(entries)
    }

    async fn mark_synced(&self, uploaded: &[SyncQueueEntry]) -> Result<()> {
        let mut queue = self.queue.write().await;
        for sent in uploaded {
            if let Some(entry) = queue.get_mut(&sent.session_id) {
                if entry.updated_at == sent.updated_at {
                    entry.synced = true;
                }
            }
        }
        Ok(())
    }

    async fn remove_entry(&self, session_id: &str) -> Result<()> {
        self.queue.write().await.remove(session_id);
        Ok(())
    }
}
