//! Lectern Core
//!
//! Platform-agnostic session types, collaborator contracts, and error handling
//! shared by every Lectern crate.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `PlaybackSession`, `Chapter`, `AudioTrack`, progress records
//! - **Collaborator Traits**: `RemoteSessionApi` (server), `ProgressStore` (device-local persistence)
//! - **Error Handling**: Unified `LecternError` and `Result` types
//!
//! # Example
//!
//! ```rust
//! use lectern_core::types::{AudioTrack, Chapter, PlaybackSession};
//!
//! let tracks = vec![AudioTrack::new(0, 0, 900_000, "/api/items/li_1/file/1")];
//! let session = PlaybackSession::new("ps_1", "li_1", "The Long Book", tracks).with_chapters(vec![
//!     Chapter::new(0, "One", 0, 300_000),
//!     Chapter::new(1, "Two", 300_000, 600_000),
//!     Chapter::new(2, "Three", 600_000, 900_000),
//! ]);
//!
//! assert_eq!(session.total_duration_ms(), 900_000);
//! assert!(session.validate().is_ok());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{LecternError, Result};
pub use traits::{ProgressStore, RemoteSessionApi};

pub use types::{
    // Session
    unix_now_ms, AudioTrack, BackendKind, Chapter, PlayMethod, PlaybackSession,
    // Progress
    progress_key, LocalProgress, LocalSyncResult, ProgressUpdate, RemoteProgressRecord,
    SyncQueueEntry, UserProgress,
    // Device
    DeviceInfo, SessionOptions,
};
