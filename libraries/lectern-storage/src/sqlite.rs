//! SQLite-backed progress store

use crate::error::Result;
use async_trait::async_trait;
use lectern_core::{LocalProgress, PlaybackSession, ProgressStore, SyncQueueEntry};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Progress store persisted in SQLite
///
/// Session snapshots are stored as JSON so the queue survives schema changes
/// of `PlaybackSession` without a migration.
#[derive(Clone)]
pub struct SqliteProgressStore {
    pool: SqlitePool,
}

impl SqliteProgressStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn upsert_progress(&self, progress: &LocalProgress) -> Result<()> {
        sqlx::query(
            "INSERT INTO local_media_progress
             (progress_key, library_item_id, episode_id, current_time_ms, duration_ms,
              last_update, is_finished)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(progress_key)
             DO UPDATE SET
                current_time_ms = excluded.current_time_ms,
                duration_ms = excluded.duration_ms,
                last_update = excluded.last_update,
                is_finished = excluded.is_finished",
        )
        .bind(&progress.progress_key)
        .bind(&progress.library_item_id)
        .bind(&progress.episode_id)
        .bind(progress.current_time_ms as i64)
        .bind(progress.duration_ms as i64)
        .bind(progress.last_update)
        .bind(i64::from(progress.is_finished))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_progress(&self, progress_key: &str) -> Result<Option<LocalProgress>> {
        let row = sqlx::query(
            "SELECT progress_key, library_item_id, episode_id, current_time_ms, duration_ms,
                    last_update, is_finished
             FROM local_media_progress WHERE progress_key = ?",
        )
        .bind(progress_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| progress_from_row(&r)).transpose()
    }

    async fn delete_progress(&self, progress_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_media_progress WHERE progress_key = ?")
            .bind(progress_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_entry(&self, entry: &SyncQueueEntry) -> Result<()> {
        let session_json = serde_json::to_string(&entry.session)?;
        let now = chrono::Utc::now().timestamp_millis();

        sqlx::query(
            "INSERT INTO sync_queue
             (session_id, progress_key, session_json, updated_at, synced, queued_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id)
             DO UPDATE SET
                progress_key = excluded.progress_key,
                session_json = excluded.session_json,
                updated_at = excluded.updated_at,
                synced = excluded.synced",
        )
        .bind(&entry.session_id)
        .bind(&entry.progress_key)
        .bind(session_json)
        .bind(entry.updated_at)
        .bind(i64::from(entry.synced))
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(session_id = %entry.session_id, "Queued session snapshot");
        Ok(())
    }

    async fn all_entries(&self) -> Result<Vec<SyncQueueEntry>> {
        let rows = sqlx::query(
            "SELECT session_id, progress_key, session_json, updated_at, synced
             FROM sync_queue
             ORDER BY updated_at ASC, queued_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn set_synced(&self, uploaded: &[SyncQueueEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in uploaded {
            sqlx::query("UPDATE sync_queue SET synced = 1 WHERE session_id = ? AND updated_at = ?")
                .bind(&entry.session_id)
                .bind(entry.updated_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_entry(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sync_queue WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn progress_from_row(row: &SqliteRow) -> Result<LocalProgress> {
    Ok(LocalProgress {
        progress_key: row.try_get("progress_key")?,
        library_item_id: row.try_get("library_item_id")?,
        episode_id: row.try_get("episode_id")?,
        current_time_ms: row.try_get::<i64, _>("current_time_ms")?.max(0) as u64,
        duration_ms: row.try_get::<i64, _>("duration_ms")?.max(0) as u64,
        last_update: row.try_get("last_update")?,
        is_finished: row.try_get::<i64, _>("is_finished")? != 0,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<SyncQueueEntry> {
    let session_json: String = row.try_get("session_json")?;
    let session: PlaybackSession = serde_json::from_str(&session_json)?;

    Ok(SyncQueueEntry {
        session_id: row.try_get("session_id")?,
        progress_key: row.try_get("progress_key")?,
        session,
        updated_at: row.try_get("updated_at")?,
        synced: row.try_get::<i64, _>("synced")? != 0,
    })
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn save_progress(&self, progress: &LocalProgress) -> lectern_core::Result<()> {
        Ok(self.upsert_progress(progress).await?)
    }

    async fn get_progress(&self, progress_key: &str) -> lectern_core::Result<Option<LocalProgress>> {
        Ok(self.find_progress(progress_key).await?)
    }

    async fn remove_progress(&self, progress_key: &str) -> lectern_core::Result<()> {
        Ok(self.delete_progress(progress_key).await?)
    }

    async fn enqueue(&self, entry: &SyncQueueEntry) -> lectern_core::Result<()> {
        Ok(self.upsert_entry(entry).await?)
    }

    async fn entries(&self) -> lectern_core::Result<Vec<SyncQueueEntry>> {
        Ok(self.all_entries().await?)
    }

    async fn mark_synced(&self, uploaded: &[SyncQueueEntry]) -> lectern_core::Result<()> {
        Ok(self.set_synced(uploaded).await?)
    }

    async fn remove_entry(&self, session_id: &str) -> lectern_core::Result<()> {
        Ok(self.delete_entry(session_id).await?)
    }
}
