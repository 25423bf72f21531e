//! Lectern - Playback Coordination
//!
//! Turns a [`lectern_core::PlaybackSession`] into something a rendering
//! backend can play, and keeps the session honest while it does.
//!
//! This crate provides:
//! - Segmentation of a work into chapters, tracks or a single span
//! - Absolute <-> segment-local position translation
//! - Chapter/track navigation with a tracked current index
//! - Hand-off between a local and a remote (cast) backend
//! - The session lifecycle state machine (prepare, refresh, close, fallback)
//! - A single-task player service driven through [`PlayerHandle`]
//!
//! # Architecture
//!
//! Everything that mutates a session runs on the task spawned by
//! [`PlayerService`]. Rendering is abstracted behind [`PlaybackBackend`];
//! [`SimulatedBackend`] advances with the tokio clock and is what the CLI and
//! the tests use.
//!
//! # Example: Position translation
//!
//! ```rust
//! use lectern_core::{AudioTrack, Chapter, PlaybackSession};
//! use lectern_playback::{build_segments, SegmentationScheme};
//!
//! let session = PlaybackSession::new(
//!     "ps_1",
//!     "li_1",
//!     "The Long Book",
//!     vec![AudioTrack::new(0, 0, 900_000, "/api/items/li_1/file/1")],
//! )
//! .with_chapters(vec![
//!     Chapter::new(0, "One", 0, 300_000),
//!     Chapter::new(1, "Two", 300_000, 600_000),
//!     Chapter::new(2, "Three", 600_000, 900_000),
//! ]);
//!
//! let segments = build_segments(&session);
//! assert_eq!(segments.scheme(), SegmentationScheme::Chapters);
//!
//! let local = segments.to_local(450_000);
//! assert_eq!((local.segment_index, local.offset_ms), (1, 150_000));
//! assert_eq!(segments.to_absolute(local), 450_000);
//! ```
//!
//! # Example: Player service
//!
//! ```rust,no_run
//! use lectern_core::{DeviceInfo, PlaybackSession, ProgressStore, RemoteSessionApi};
//! use lectern_playback::{PlaybackConfig, PlayerService, SimulatedBackend};
//! use lectern_sync::SyncConfig;
//! use std::sync::Arc;
//!
//! # async fn run(
//! #     remote: Arc<dyn RemoteSessionApi>,
//! #     store: Arc<dyn ProgressStore>,
//! #     session: PlaybackSession,
//! # ) -> lectern_playback::Result<()> {
//! let (service, player) = PlayerService::new(
//!     Box::new(SimulatedBackend::local()),
//!     remote,
//!     store,
//!     DeviceInfo::new("dev_1"),
//!     PlaybackConfig::default(),
//!     SyncConfig::default(),
//! );
//! service.spawn();
//!
//! player.prepare(session, true, 1.0).await?;
//! player.skip_next();
//! player.close();
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod navigation;
pub mod segmentation;
pub mod service;
pub mod simulated;
pub mod translator;
pub mod types;

pub use backend::{BackendEvent, BackendState, PlaybackBackend};
pub use coordinator::BackendSwitchCoordinator;
pub use error::{PlaybackError, Result};
pub use events::PlayerEvent;
pub use lifecycle::{PlayerStatus, SessionLifecycle, SessionState};
pub use navigation::{NavigationController, NavigationTarget};
pub use segmentation::{build_segments, classify, SegmentationScheme};
pub use service::{PlayerCommand, PlayerHandle, PlayerService};
pub use simulated::SimulatedBackend;
pub use translator::{to_absolute, to_local, LocalPosition, Segment, SegmentList, END_EPSILON_MS};
pub use types::PlaybackConfig;
