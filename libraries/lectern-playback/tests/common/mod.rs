//! Shared fixtures for playback integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use lectern_core::{
    AudioTrack, BackendKind, Chapter, DeviceInfo, LecternError, LocalSyncResult, PlayMethod,
    PlaybackSession, ProgressUpdate, RemoteProgressRecord, RemoteSessionApi, Result,
    SessionOptions, UserProgress,
};
use lectern_playback::{
    BackendEvent, LocalPosition, PlaybackBackend, PlayerEvent, SegmentList, SimulatedBackend,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedSender;

/// Ordered record of remote calls and backend operations
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }

    /// Wait until `entry` shows up, for calls made by background tasks
    pub async fn wait_for_entry(&self, entry: &str, timeout: Duration) {
        let logged = tokio::time::timeout(timeout, async {
            while !self.contains(entry) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(logged.is_ok(), "{entry} never logged: {:?}", self.entries());
    }
}

/// Three 300 s chapters in one 900 s file
pub fn three_chapter_book(id: &str) -> PlaybackSession {
    PlaybackSession::new(
        id,
        "li_1",
        "The Long Book",
        vec![AudioTrack::new(0, 0, 900_000, "/api/items/li_1/file/1")],
    )
    .with_chapters(vec![
        Chapter::new(0, "One", 0, 300_000),
        Chapter::new(1, "Two", 300_000, 600_000),
        Chapter::new(2, "Three", 600_000, 900_000),
    ])
}

pub fn book_at(id: &str, item: &str, current_time_ms: u64) -> PlaybackSession {
    let mut session = three_chapter_book(id);
    session.library_item_id = item.to_string();
    session.current_time_ms = current_time_ms;
    session
}

/// In-process stand-in for the media server
#[derive(Default)]
pub struct FakeRemote {
    pub log: CallLog,
    pub sync_delay: Duration,
    pub fail_sync: AtomicBool,
    pub fail_create: AtomicBool,
    pub progress: Mutex<Option<RemoteProgressRecord>>,
    created: AtomicUsize,
}

impl FakeRemote {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn with_sync_delay(mut self, delay: Duration) -> Self {
        self.sync_delay = delay;
        self
    }

    pub fn set_sync_failing(&self, failing: bool) {
        self.fail_sync.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteSessionApi for FakeRemote {
    async fn create_session(
        &self,
        library_item_id: &str,
        episode_id: Option<&str>,
        _device: &DeviceInfo,
        options: &SessionOptions,
    ) -> Result<PlaybackSession> {
        let method = if options.force_transcode { "transcode" } else { "direct" };
        self.log.push(format!("create:{library_item_id}:{method}"));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(LecternError::network("server unreachable"));
        }

        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let mut session = three_chapter_book(&format!("ps_new_{n}"));
        session.library_item_id = library_item_id.to_string();
        session.episode_id = episode_id.map(str::to_string);
        session.play_method = if options.force_transcode {
            PlayMethod::Transcode
        } else {
            PlayMethod::DirectPlay
        };
        Ok(session)
    }

    async fn close_session(&self, session_id: &str) -> Result<()> {
        self.log.push(format!("close:{session_id}"));
        Ok(())
    }

    async fn sync_session(&self, session_id: &str, _update: &ProgressUpdate) -> Result<()> {
        if !self.sync_delay.is_zero() {
            tokio::time::sleep(self.sync_delay).await;
        }
        self.log.push(format!("sync:{session_id}"));
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(LecternError::network("offline"));
        }
        Ok(())
    }

    async fn get_progress(
        &self,
        _library_item_id: &str,
        _episode_id: Option<&str>,
    ) -> Result<Option<RemoteProgressRecord>> {
        Ok(self.progress.lock().unwrap().clone())
    }

    async fn get_current_user(&self) -> Result<UserProgress> {
        Ok(UserProgress {
            id: "u_1".into(),
            username: "reader".into(),
            media_progress: Vec::new(),
        })
    }

    async fn sync_local_sessions(&self, sessions: &[PlaybackSession]) -> Result<LocalSyncResult> {
        self.log.push(format!("local-all:{}", sessions.len()));
        Ok(LocalSyncResult {
            synced_session_ids: sessions.iter().map(|s| s.id.clone()).collect(),
            errors: Vec::new(),
        })
    }
}

/// Simulated backend that records what the coordinator asks of it
pub struct RecordingBackend {
    inner: SimulatedBackend,
    log: CallLog,
    events: Option<UnboundedSender<BackendEvent>>,
    pub fail_next_play: Arc<AtomicBool>,
}

impl RecordingBackend {
    pub fn new(inner: SimulatedBackend, log: CallLog) -> Self {
        Self {
            inner,
            log,
            events: None,
            fail_next_play: Arc::new(AtomicBool::new(false)),
        }
    }

    fn record(&self, op: impl std::fmt::Display) {
        self.log.push(format!("{}:{op}", self.inner.kind()));
    }
}

impl PlaybackBackend for RecordingBackend {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn initialize(&mut self) -> lectern_playback::Result<()> {
        self.inner.initialize()
    }

    fn set_segments(
        &mut self,
        segments: &SegmentList,
        tracks: &[AudioTrack],
    ) -> lectern_playback::Result<()> {
        self.record("set_segments");
        self.inner.set_segments(segments, tracks)
    }

    fn seek_to(&mut self, position: LocalPosition) -> lectern_playback::Result<()> {
        self.record(format!("seek:{}:{}", position.segment_index, position.offset_ms));
        self.inner.seek_to(position)
    }

    fn play(&mut self) -> lectern_playback::Result<()> {
        self.record("play");
        if self.fail_next_play.swap(false, Ordering::SeqCst) {
            // Engines report decode failures asynchronously
            if let Some(events) = &self.events {
                let _ = events.send(BackendEvent::Error {
                    kind: self.inner.kind(),
                    message: "decoder failed".into(),
                });
            }
        }
        self.inner.play()
    }

    fn pause(&mut self) -> lectern_playback::Result<()> {
        self.inner.pause()
    }

    fn stop(&mut self) {
        self.record("stop");
        self.inner.stop()
    }

    fn set_speed(&mut self, speed: f32) -> lectern_playback::Result<()> {
        self.inner.set_speed(speed)
    }

    fn speed(&self) -> f32 {
        self.inner.speed()
    }

    fn current_position(&self) -> Option<LocalPosition> {
        self.inner.current_position()
    }

    fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    fn subscribe(&mut self, events: UnboundedSender<BackendEvent>) {
        self.events = Some(events.clone());
        self.inner.subscribe(events);
    }

    fn poll(&mut self) {
        self.inner.poll()
    }
}

/// Drain events until one matches, failing after `timeout` of (virtual) time
pub async fn wait_for<F>(
    rx: &mut broadcast::Receiver<PlayerEvent>,
    timeout: Duration,
    mut pred: F,
) -> PlayerEvent
where
    F: FnMut(&PlayerEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for player event")
}
