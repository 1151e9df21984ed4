//! Shared signals between independent views.
//!
//! Two unrelated broadcast cells:
//! - the free-text search term, replaced wholesale on every edit
//! - the refresh counter, bumped whenever experiment data changed and
//!   dependent views should reload from the backend
//!
//! Both are `watch` channels: a receiver always sees the latest value, and
//! several bumps between two polls are observed as a single change whose
//! counter has moved by the number of bumps.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Clone is cheap; clones share the same cells.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Cells>,
}

struct Cells {
    search: watch::Sender<String>,
    refresh: watch::Sender<u64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (search, _) = watch::channel(String::new());
        let (refresh, _) = watch::channel(0);
        Self {
            inner: Arc::new(Cells { search, refresh }),
        }
    }

    // =========================================================================
    // Search term
    // =========================================================================

    pub fn search_term(&self) -> String {
        self.inner.search.borrow().clone()
    }

    pub fn set_search_term(&self, term: impl Into<String>) {
        let term = term.into();
        debug!(term = %term, "Search term updated");
        self.inner.search.send_replace(term);
    }

    pub fn subscribe_search(&self) -> watch::Receiver<String> {
        self.inner.search.subscribe()
    }

    // =========================================================================
    // Refresh signal
    // =========================================================================

    /// Ask every dependent view to reload.
    pub fn trigger_refresh(&self) {
        self.inner.refresh.send_modify(|count| *count += 1);
        debug!(count = *self.inner.refresh.borrow(), "Refresh triggered");
    }

    /// Current counter value. Only changes to it carry meaning.
    pub fn refresh_count(&self) -> u64 {
        *self.inner.refresh.borrow()
    }

    pub fn subscribe_refresh(&self) -> watch::Receiver<u64> {
        self.inner.refresh.subscribe()
    }
}
