//! Local vs. remote progress reconciliation
//!
//! Remote progress is adopted only when it is newer than the local copy and
//! far enough away to matter. Small differences keep the local position so
//! a slightly stale server record never drags the listener backwards.

use lectern_core::{PlaybackSession, RemoteProgressRecord};

/// Which record the position came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSource {
    Local,
    Remote,
}

/// Outcome of comparing a session against the server's record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub source: ProgressSource,
    pub current_time_ms: u64,
}

impl Reconciliation {
    fn local(current_time_ms: u64) -> Self {
        Self {
            source: ProgressSource::Local,
            current_time_ms,
        }
    }
}

/// Decide which position to resume from
///
/// `local_updated_at` and `remote.last_update` are Unix epoch milliseconds.
pub fn reconcile(
    local_time_ms: u64,
    local_updated_at: i64,
    remote: Option<&RemoteProgressRecord>,
    threshold_ms: u64,
) -> Reconciliation {
    let Some(remote) = remote else {
        return Reconciliation::local(local_time_ms);
    };

    if remote.last_update <= local_updated_at {
        return Reconciliation::local(local_time_ms);
    }

    if remote.current_time_ms.abs_diff(local_time_ms) <= threshold_ms {
        return Reconciliation::local(local_time_ms);
    }

    Reconciliation {
        source: ProgressSource::Remote,
        current_time_ms: remote.current_time_ms,
    }
}

/// Reconcile and apply the result to the session
pub fn apply(
    session: &mut PlaybackSession,
    remote: Option<&RemoteProgressRecord>,
    threshold_ms: u64,
) -> Reconciliation {
    let result = reconcile(
        session.current_time_ms,
        session.updated_at,
        remote,
        threshold_ms,
    );
    if result.source == ProgressSource::Remote {
        session.current_time_ms = result.current_time_ms;
    }
    result
}
