//! Progress syncer tests
//!
//! The remote API is mocked with mockall; the offline queue uses the
//! in-memory store so queue contents can be inspected directly.

use async_trait::async_trait;
use lectern_core::{
    AudioTrack, DeviceInfo, LecternError, LocalSyncResult, PlaybackSession, ProgressStore,
    ProgressUpdate, RemoteProgressRecord, RemoteSessionApi, Result, SessionOptions,
    SyncQueueEntry, UserProgress,
};
use lectern_storage::MemoryProgressStore;
use lectern_sync::{
    ProgressSource, ProgressSyncer, SyncConfig, SyncError, SyncOutcome, SyncStatus,
};
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

mock! {
    pub Remote {}

    #[async_trait]
    impl RemoteSessionApi for Remote {
        async fn create_session(
            &self,
            library_item_id: &str,
            episode_id: Option<&str>,
            device: &DeviceInfo,
            options: &SessionOptions,
        ) -> Result<PlaybackSession>;
        async fn close_session(&self, session_id: &str) -> Result<()>;
        async fn sync_session(&self, session_id: &str, update: &ProgressUpdate) -> Result<()>;
        async fn get_progress(
            &self,
            library_item_id: &str,
            episode_id: Option<&str>,
        ) -> Result<Option<RemoteProgressRecord>>;
        async fn get_current_user(&self) -> Result<UserProgress>;
        async fn sync_local_sessions(&self, sessions: &[PlaybackSession]) -> Result<LocalSyncResult>;
    }
}

fn book(id: &str, current_time_ms: u64) -> PlaybackSession {
    let mut session = PlaybackSession::new(
        id,
        "li_1",
        "The Long Book",
        vec![AudioTrack::new(0, 0, 3_600_000, "/api/items/li_1/file/1")],
    );
    session.current_time_ms = current_time_ms;
    session
}

fn syncer_with(
    remote: MockRemote,
    store: Arc<MemoryProgressStore>,
) -> (ProgressSyncer, UnboundedReceiver<SyncOutcome>) {
    ProgressSyncer::new(Arc::new(remote), store, SyncConfig::default())
}

fn offline() -> LecternError {
    LecternError::network("connection refused")
}

// =============================================================================
// Listening time & pushes
// =============================================================================

mod pushes {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_finalize_pushes_accumulated_listening_time() {
        let mut remote = MockRemote::new();
        remote
            .expect_sync_session()
            .withf(|id, update| {
                id == "ps_1" && update.time_listened_ms == 20_000 && update.current_time_ms == 95_000
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let store = Arc::new(MemoryProgressStore::new());
        let (mut syncer, _rx) = syncer_with(remote, store.clone());
        let mut session = book("ps_1", 75_000);

        syncer.begin(&session);
        syncer.on_play();
        tokio::time::advance(Duration::from_secs(20)).await;
        session.current_time_ms = 95_000;

        syncer.finalize(&mut session).await.unwrap();

        assert_eq!(session.time_listening_ms, 20_000);
        assert_eq!(syncer.unsynced_listening_ms(), 0);
        assert!(syncer.active_session_id().is_none());
        assert!(store.entries().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_pushes_only_after_interval() {
        let mut remote = MockRemote::new();
        remote
            .expect_sync_session()
            .times(1)
            .returning(|_, _| Ok(()));

        let store = Arc::new(MemoryProgressStore::new());
        let (mut syncer, mut rx) = syncer_with(remote, store);
        let mut session = book("ps_1", 0);

        syncer.begin(&session);
        syncer.on_play();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!syncer.tick(&mut session));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(syncer.tick(&mut session));

        match rx.recv().await.unwrap() {
            SyncOutcome::Pushed {
                session_id,
                listened_ms,
                result,
            } => {
                assert_eq!(session_id, "ps_1");
                assert_eq!(listened_ms, 15_000);
                assert!(result.is_ok());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_session_accumulates_nothing() {
        let remote = MockRemote::new();
        let store = Arc::new(MemoryProgressStore::new());
        let (mut syncer, _rx) = syncer_with(remote, store);
        let mut session = book("ps_1", 0);

        syncer.begin(&session);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!syncer.tick(&mut session));
        assert_eq!(session.time_listening_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_session_writes_progress_without_remote_call() {
        // No expectations: any remote call panics
        let remote = MockRemote::new();
        let store = Arc::new(MemoryProgressStore::new());
        let (mut syncer, _rx) = syncer_with(remote, store.clone());
        let mut session = book("local_1", 42_000).into_local();

        syncer.begin(&session);
        syncer.finalize(&mut session).await.unwrap();

        let progress = store.get_progress("li_1").await.unwrap().unwrap();
        assert_eq!(progress.current_time_ms, 42_000);
        assert!(!progress.is_finished);
        assert_eq!(store.pending().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_marks_local_progress_finished() {
        let remote = MockRemote::new();
        let store = Arc::new(MemoryProgressStore::new());
        let (mut syncer, mut rx) = syncer_with(remote, store.clone());
        let mut session = book("local_1", 3_600_000).into_local();

        syncer.begin(&session);
        syncer.on_play();
        tokio::time::advance(Duration::from_secs(4)).await;
        syncer.finish(&mut session);
        assert_eq!(session.time_listening_ms, 4_000);

        match rx.recv().await.unwrap() {
            SyncOutcome::Pushed { listened_ms, result, .. } => {
                assert_eq!(listened_ms, 4_000);
                assert!(result.is_ok());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let progress = store.get_progress("li_1").await.unwrap().unwrap();
        assert!(progress.is_finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_does_not_wait_for_the_server() {
        let mut remote = MockRemote::new();
        remote.expect_sync_session().times(1).returning(|_, _| Ok(()));

        let store = Arc::new(MemoryProgressStore::new());
        let (mut syncer, mut rx) = syncer_with(remote, store);
        let mut session = book("ps_1", 3_600_000);

        syncer.begin(&session);
        syncer.finish(&mut session);
        assert_eq!(syncer.active_session_id(), Some("ps_1"));

        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Pushed { result: Ok(()), .. }));
        assert_eq!(syncer.handle_outcome(outcome), None);
    }
}

// =============================================================================
// Failure handling & offline queue
// =============================================================================

mod failures {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_failing_then_recovered_transitions() {
        let mut remote = MockRemote::new();
        let mut seq = mockall::Sequence::new();
        remote
            .expect_sync_session()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(offline()));
        remote
            .expect_sync_session()
            .withf(|_, update| update.time_listened_ms == 30_000)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let store = Arc::new(MemoryProgressStore::new());
        let (mut syncer, mut rx) = syncer_with(remote, store.clone());
        let mut session = book("ps_1", 0);
        syncer.begin(&session);
        syncer.on_play();

        // First failure flips into failing and queues the snapshot
        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(syncer.tick(&mut session));
        let outcome = rx.recv().await.unwrap();
        assert_eq!(syncer.handle_outcome(outcome), Some(SyncStatus::Failing));
        assert_eq!(store.pending().await.unwrap().len(), 1);
        assert_eq!(syncer.unsynced_listening_ms(), 15_000);

        // Second failure stays quiet
        syncer.on_pause(&mut session);
        let outcome = rx.recv().await.unwrap();
        assert_eq!(syncer.handle_outcome(outcome), None);
        assert!(syncer.is_failing());

        // Recovery carries the listening time that never reached the server
        syncer.on_play();
        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(syncer.tick(&mut session));
        let outcome = rx.recv().await.unwrap();
        assert_eq!(syncer.handle_outcome(outcome), Some(SyncStatus::Recovered));
        assert!(!syncer.is_failing());
        assert!(store.entries().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_failure_is_reported_and_queued() {
        let mut remote = MockRemote::new();
        remote
            .expect_sync_session()
            .returning(|_, _| Err(offline()));

        let store = Arc::new(MemoryProgressStore::new());
        let (mut syncer, _rx) = syncer_with(remote, store.clone());
        let mut session = book("ps_1", 10_000);
        syncer.begin(&session);

        let err = syncer.finalize(&mut session).await.unwrap_err();
        assert!(err.is_transient());
        let pending = store.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].session.current_time_ms, 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_queue_collapses_to_latest_per_work() {
        let store = Arc::new(MemoryProgressStore::new());
        for (id, updated_at) in [("ps_a", 100), ("ps_b", 300), ("ps_c", 200)] {
            let mut session = book(id, 0);
            session.updated_at = updated_at;
            store
                .enqueue(&SyncQueueEntry::from_session(&session))
                .await
                .unwrap();
        }

        let mut remote = MockRemote::new();
        remote
            .expect_sync_local_sessions()
            .withf(|sessions| sessions.len() == 3)
            .times(1)
            .returning(|sessions| {
                Ok(LocalSyncResult {
                    synced_session_ids: sessions.iter().map(|s| s.id.clone()).collect(),
                    errors: Vec::new(),
                })
            });

        let (syncer, _rx) = syncer_with(remote, store.clone());
        let report = syncer.queue_sync().run().await.unwrap();

        assert_eq!(report.pushed, 3);
        assert_eq!(report.collapsed, 2);
        let remaining = store.entries().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].session_id, "ps_b");
        assert!(store.pending().await.unwrap().is_empty());
    }

    /// Server whose batch upload races with a newer snapshot of the same session
    struct RacingRemote {
        store: Arc<MemoryProgressStore>,
    }

    #[async_trait]
    impl RemoteSessionApi for RacingRemote {
        async fn create_session(
            &self,
            _library_item_id: &str,
            _episode_id: Option<&str>,
            _device: &DeviceInfo,
            _options: &SessionOptions,
        ) -> Result<PlaybackSession> {
            unimplemented!()
        }
        async fn close_session(&self, _session_id: &str) -> Result<()> {
            unimplemented!()
        }
        async fn sync_session(&self, _session_id: &str, _update: &ProgressUpdate) -> Result<()> {
            unimplemented!()
        }
        async fn get_progress(
            &self,
            _library_item_id: &str,
            _episode_id: Option<&str>,
        ) -> Result<Option<RemoteProgressRecord>> {
            unimplemented!()
        }
        async fn get_current_user(&self) -> Result<UserProgress> {
            unimplemented!()
        }
        async fn sync_local_sessions(&self, sessions: &[PlaybackSession]) -> Result<LocalSyncResult> {
            let mut newer = book("local_1", 500_000);
            newer.updated_at = 2_000;
            self.store
                .enqueue(&SyncQueueEntry::from_session(&newer))
                .await
                .unwrap();
            Ok(LocalSyncResult {
                synced_session_ids: sessions.iter().map(|s| s.id.clone()).collect(),
                errors: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_snapshot_queued_during_upload_is_not_lost() {
        let store = Arc::new(MemoryProgressStore::new());
        let mut session = book("local_1", 120_000);
        session.updated_at = 1_000;
        store
            .enqueue(&SyncQueueEntry::from_session(&session))
            .await
            .unwrap();

        let remote = Arc::new(RacingRemote {
            store: store.clone(),
        });
        let (syncer, _rx) = ProgressSyncer::new(remote, store.clone(), SyncConfig::default());
        let report = syncer.queue_sync().run().await.unwrap();
        assert_eq!(report.pushed, 1);

        let pending = store.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].session.current_time_ms, 500_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_skips_upload() {
        let remote = MockRemote::new();
        let store = Arc::new(MemoryProgressStore::new());
        let (syncer, _rx) = syncer_with(remote, store);

        let report = syncer.queue_sync().run().await.unwrap();
        assert_eq!(report.pushed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_queue_sync_reports_recovery() {
        let store = Arc::new(MemoryProgressStore::new());
        store
            .enqueue(&SyncQueueEntry::from_session(&book("ps_a", 0)))
            .await
            .unwrap();

        let mut remote = MockRemote::new();
        remote.expect_sync_session().returning(|_, _| Err(offline()));
        remote.expect_sync_local_sessions().returning(|_| {
            Ok(LocalSyncResult {
                synced_session_ids: vec!["ps_a".to_string()],
                errors: Vec::new(),
            })
        });

        let (mut syncer, mut rx) = syncer_with(remote, store);
        let mut session = book("ps_b", 0);
        syncer.begin(&session);
        syncer.sync_now(&mut session);
        let outcome = rx.recv().await.unwrap();
        assert_eq!(syncer.handle_outcome(outcome), Some(SyncStatus::Failing));

        syncer.spawn_queue_sync();
        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::QueueSynced(Ok(_))));
        assert_eq!(syncer.handle_outcome(outcome), Some(SyncStatus::Recovered));
    }
}

// =============================================================================
// Reconciliation at prepare time
// =============================================================================

mod reconciliation {
    use super::*;

    fn record(current_time_ms: u64, last_update: i64) -> RemoteProgressRecord {
        RemoteProgressRecord {
            library_item_id: "li_1".into(),
            episode_id: None,
            current_time_ms,
            duration_ms: 3_600_000,
            last_update,
            is_finished: false,
        }
    }

    #[tokio::test]
    async fn test_newer_remote_progress_is_applied() {
        let mut remote = MockRemote::new();
        remote
            .expect_get_progress()
            .returning(|_, _| Ok(Some(record(180_000, 2_000))));

        let store = Arc::new(MemoryProgressStore::new());
        let (syncer, _rx) = syncer_with(remote, store);
        let mut session = book("ps_1", 120_000);
        session.updated_at = 1_000;

        let result = syncer.reconcile_session(&mut session).await;
        assert_eq!(result.source, ProgressSource::Remote);
        assert_eq!(session.current_time_ms, 180_000);
    }

    #[tokio::test]
    async fn test_older_remote_progress_is_ignored() {
        let mut remote = MockRemote::new();
        remote
            .expect_get_progress()
            .returning(|_, _| Ok(Some(record(180_000, 2_000))));

        let store = Arc::new(MemoryProgressStore::new());
        let (syncer, _rx) = syncer_with(remote, store);
        let mut session = book("ps_1", 120_000);
        session.updated_at = 3_000;

        let result = syncer.reconcile_session(&mut session).await;
        assert_eq!(result.source, ProgressSource::Local);
        assert_eq!(session.current_time_ms, 120_000);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_local() {
        let mut remote = MockRemote::new();
        remote
            .expect_get_progress()
            .returning(|_, _| Err(offline()));

        let store = Arc::new(MemoryProgressStore::new());
        let (syncer, _rx) = syncer_with(remote, store);
        let mut session = book("ps_1", 120_000);

        let err = syncer.fetch_remote_progress(&session).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(_)));

        let result = syncer.reconcile_session(&mut session).await;
        assert_eq!(result.source, ProgressSource::Local);
        assert_eq!(session.current_time_ms, 120_000);
    }

    #[tokio::test]
    async fn test_local_session_skips_remote_fetch() {
        let remote = MockRemote::new();
        let store = Arc::new(MemoryProgressStore::new());
        let (syncer, _rx) = syncer_with(remote, store);
        let mut session = book("local_1", 5_000).into_local();

        let result = syncer.reconcile_session(&mut session).await;
        assert_eq!(result.source, ProgressSource::Local);
    }
}
