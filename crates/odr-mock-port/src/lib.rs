//! In-memory [`odr_port`] implementation with scriptable per-tag behavior.
//!
//! Tests script what the "platform" does for each tag (succeed, fail with a
//! platform code, report the content as cached, or hold the download open
//! until the test completes it) and then assert on open/begin/end counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use odr_port::{DownloadSession, PortError, SessionFactory, SharedSession};

/// What the mock platform does when a session for a tag is driven.
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// `is_cached` is false; `begin` completes successfully.
    Succeed,
    /// `is_cached` is false; `begin` completes with the given code.
    Fail(PortError),
    /// `is_cached` is true; `begin` (if called anyway) succeeds.
    Cached,
    /// `begin` parks until [`MockPort::complete`] supplies an outcome.
    Hold,
    /// `open` itself fails with the given code; no session is produced.
    RefuseOpen(PortError),
}

#[derive(Default)]
struct TagState {
    opens: AtomicUsize,
    begins: AtomicUsize,
    ends: AtomicUsize,
    last_priority: Mutex<Option<f32>>,
    progress_bits: AtomicU32,
    pending: Mutex<Option<Result<(), PortError>>>,
    notify: Notify,
}

/// Scriptable factory handed to the registry under test.
#[derive(Default)]
pub struct MockPort {
    behaviors: Mutex<HashMap<String, MockBehavior>>,
    tags: Mutex<HashMap<String, Arc<TagState>>>,
}

impl MockPort {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, tag: &str, behavior: MockBehavior) {
        self.behaviors
            .lock()
            .expect("behaviors lock")
            .insert(tag.to_string(), behavior);
    }

    /// Resolve a held download. No-op when nothing is parked on the tag.
    pub fn complete(&self, tag: &str, outcome: Result<(), PortError>) {
        let state = self.state_for(tag);
        *state.pending.lock().expect("pending lock") = Some(outcome);
        state.notify.notify_waiters();
    }

    pub fn set_progress(&self, tag: &str, fraction: f32) {
        self.state_for(tag)
            .progress_bits
            .store(fraction.to_bits(), Ordering::Relaxed);
    }

    pub fn open_count(&self, tag: &str) -> usize {
        self.state_for(tag).opens.load(Ordering::Relaxed)
    }

    pub fn begin_count(&self, tag: &str) -> usize {
        self.state_for(tag).begins.load(Ordering::Relaxed)
    }

    pub fn end_count(&self, tag: &str) -> usize {
        self.state_for(tag).ends.load(Ordering::Relaxed)
    }

    pub fn last_priority(&self, tag: &str) -> Option<f32> {
        *self.state_for(tag).last_priority.lock().expect("priority lock")
    }

    fn behavior_for(&self, tag: &str) -> MockBehavior {
        self.behaviors
            .lock()
            .expect("behaviors lock")
            .get(tag)
            .cloned()
            .unwrap_or(MockBehavior::Succeed)
    }

    fn state_for(&self, tag: &str) -> Arc<TagState> {
        self.tags
            .lock()
            .expect("tags lock")
            .entry(tag.to_string())
            .or_default()
            .clone()
    }
}

impl SessionFactory for MockPort {
    fn open(&self, tag: &str) -> Result<SharedSession, PortError> {
        if let MockBehavior::RefuseOpen(code) = self.behavior_for(tag) {
            return Err(code);
        }
        let state = self.state_for(tag);
        state.opens.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockSession {
            behavior: self.behavior_for(tag),
            state,
        }))
    }
}

struct MockSession {
    behavior: MockBehavior,
    state: Arc<TagState>,
}

#[async_trait::async_trait]
impl DownloadSession for MockSession {
    async fn is_cached(&self) -> Result<bool, PortError> {
        Ok(matches!(self.behavior, MockBehavior::Cached))
    }

    async fn begin(&self, priority: f32) -> Result<(), PortError> {
        self.state.begins.fetch_add(1, Ordering::Relaxed);
        *self.state.last_priority.lock().expect("priority lock") = Some(priority);
        match &self.behavior {
            MockBehavior::Fail(code) => Err(code.clone()),
            MockBehavior::Hold => loop {
                let parked = self.state.notify.notified();
                tokio::pin!(parked);
                // Register the waiter before checking so a concurrent
                // `complete` cannot slip between the check and the await.
                parked.as_mut().enable();
                if let Some(outcome) = self.state.pending.lock().expect("pending lock").take() {
                    return outcome;
                }
                parked.await;
            },
            _ => Ok(()),
        }
    }

    fn progress_fraction(&self) -> f32 {
        f32::from_bits(self.state.progress_bits.load(Ordering::Relaxed))
    }

    fn end(&self) {
        self.state.ends.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_failure_surfaces_code() {
        let port = MockPort::new();
        port.script("Chapter1", MockBehavior::Fail(PortError::OutOfSpace));
        let session = port.open("Chapter1").expect("session");
        assert_eq!(session.begin(1.0).await, Err(PortError::OutOfSpace));
        assert_eq!(port.begin_count("Chapter1"), 1);
        assert_eq!(port.last_priority("Chapter1"), Some(1.0));
    }

    #[tokio::test]
    async fn held_download_resolves_on_complete() {
        let port = MockPort::new();
        port.script("Chapter2", MockBehavior::Hold);
        let session = port.open("Chapter2").expect("session");
        let driver = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.begin(0.5).await })
        };
        tokio::task::yield_now().await;
        port.complete("Chapter2", Ok(()));
        assert_eq!(driver.await.expect("join"), Ok(()));
    }

    #[tokio::test]
    async fn complete_before_begin_is_consumed_immediately() {
        let port = MockPort::new();
        port.script("Chapter3", MockBehavior::Hold);
        let session = port.open("Chapter3").expect("session");
        port.complete("Chapter3", Err(PortError::InvalidTag));
        assert_eq!(session.begin(1.0).await, Err(PortError::InvalidTag));
    }

    #[tokio::test]
    async fn refuse_open_produces_no_session() {
        let port = MockPort::new();
        port.script("Bad", MockBehavior::RefuseOpen(PortError::InvalidTag));
        assert!(port.open("Bad").is_err());
        assert_eq!(port.open_count("Bad"), 0);
    }

    #[tokio::test]
    async fn cached_behavior_reports_cached() {
        let port = MockPort::new();
        port.script("Chapter4", MockBehavior::Cached);
        let session = port.open("Chapter4").expect("session");
        assert_eq!(session.is_cached().await, Ok(true));
    }
}
