//! Lectern - Progress Sync
//!
//! Keeps the server's idea of "where am I in this book" current:
//! - Listening-time accumulation from play/pause/seek events
//! - Periodic pushes and pushes on pause, finalize and end of content
//! - Reconciliation of local vs. remote progress at prepare time
//! - Offline queue of unsynced session snapshots, uploaded in batches
//!   when connectivity returns and collapsed to one entry per work

mod config;
mod error;
pub mod reconcile;
mod syncer;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use reconcile::{reconcile, ProgressSource, Reconciliation};
pub use syncer::{ProgressSyncer, QueueSync, QueueSyncReport, SyncOutcome, SyncStatus};
