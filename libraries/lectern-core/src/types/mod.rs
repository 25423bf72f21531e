mod device;
mod progress;
mod session;

pub use device::{DeviceInfo, SessionOptions};
pub use progress::{
    progress_key, LocalProgress, LocalSyncResult, ProgressUpdate, RemoteProgressRecord,
    SyncQueueEntry, UserProgress,
};
pub use session::{unix_now_ms, AudioTrack, BackendKind, Chapter, PlayMethod, PlaybackSession};
