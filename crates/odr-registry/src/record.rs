use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use odr_port::SharedSession;

use crate::registry::LoadUpdate;

/// Load state of one tracked tag.
///
/// `NotLoaded → Loading → {Loaded | Failed}`; any state can move to
/// `Released`, which is terminal and removes the record from the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    NotLoaded,
    Loading,
    Loaded,
    Failed,
    Released,
}

/// Loading-priority hint forwarded to the download port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Explicit caller request; the port should fetch as fast as it can.
    Urgent,
    /// Cache warm-up; the port may deprioritize the transfer.
    Prefetch,
}

/// Tracking state for one distinct tag. Created on the first
/// request/prefetch, mutated in place as the download progresses, and
/// destroyed only through an explicit release.
pub(crate) struct RequestRecord {
    pub(crate) tag: String,
    /// Attempt id minted by whichever call created this record; completion
    /// paths compare against it so stale outcomes are dropped.
    pub(crate) attempt: Uuid,
    pub(crate) corr_id: String,
    pub(crate) status: LoadStatus,
    pub(crate) priority: Priority,
    /// Human-readable failure reason; non-empty exactly when `Failed`.
    pub(crate) error: String,
    pub(crate) session: SharedSession,
    /// Update channel of the caller that owns this fetch, if any.
    pub(crate) watcher: Option<mpsc::UnboundedSender<LoadUpdate>>,
}

impl RequestRecord {
    pub(crate) fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            tag: self.tag.clone(),
            status: self.status,
            priority: self.priority,
            error: self.error.clone(),
            progress: self.session.progress_fraction(),
        }
    }

    /// Terminal teardown: end the port session exactly once and clear the
    /// fields observers could still be holding.
    pub(crate) fn release(&mut self) {
        self.status = LoadStatus::Released;
        self.session.end();
        self.tag.clear();
        self.error.clear();
        self.watcher = None;
    }
}

/// Read-only view of a record, safe to hand to presentation code.
#[derive(Clone, Debug, Serialize)]
pub struct RequestSnapshot {
    pub tag: String,
    pub status: LoadStatus,
    pub priority: Priority,
    pub error: String,
    /// Port-reported download progress in [0, 1]; polled, not pushed.
    pub progress: f32,
}
