use std::sync::{Arc, Mutex};

/// Process-wide loading observables for presentation code that polls
/// instead of subscribing to the bus.
///
/// One writer at a time per field (the registry); readers may poll from
/// any thread. Cloning the board clones the handle, not the state.
#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<BoardState>>,
}

#[derive(Default)]
struct BoardState {
    loading: usize,
    last_error: String,
    active_tag: String,
}

impl StatusBoard {
    /// True while any tracked tag is mid-download.
    pub fn is_loading(&self) -> bool {
        self.inner.lock().expect("board lock").loading > 0
    }

    /// Most recent normalized failure message; empty until a load fails.
    pub fn last_error(&self) -> String {
        self.inner.lock().expect("board lock").last_error.clone()
    }

    /// Tag of the most recent download to start.
    pub fn active_tag(&self) -> String {
        self.inner.lock().expect("board lock").active_tag.clone()
    }

    pub fn clear_last_error(&self) {
        self.inner.lock().expect("board lock").last_error.clear();
    }

    pub(crate) fn loading_started(&self, tag: &str) {
        let mut state = self.inner.lock().expect("board lock");
        state.loading += 1;
        state.active_tag = tag.to_string();
    }

    pub(crate) fn loading_finished(&self) {
        let mut state = self.inner.lock().expect("board lock");
        state.loading = state.loading.saturating_sub(1);
    }

    pub(crate) fn record_error(&self, message: &str) {
        self.inner.lock().expect("board lock").last_error = message.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_flag_tracks_nested_starts() {
        let board = StatusBoard::default();
        assert!(!board.is_loading());
        board.loading_started("Chapter1");
        board.loading_started("Chapter2");
        assert!(board.is_loading());
        assert_eq!(board.active_tag(), "Chapter2");
        board.loading_finished();
        assert!(board.is_loading());
        board.loading_finished();
        assert!(!board.is_loading());
        // A stray extra decrement must not wrap.
        board.loading_finished();
        assert!(!board.is_loading());
    }

    #[test]
    fn last_error_is_sticky_until_cleared() {
        let board = StatusBoard::default();
        board.record_error("out of space");
        assert_eq!(board.last_error(), "out of space");
        board.loading_started("Chapter1");
        board.loading_finished();
        assert_eq!(board.last_error(), "out of space");
        board.clear_last_error();
        assert!(board.last_error().is_empty());
    }
}
