//! Periodic re-validation of the active session.
//!
//! The monitor owns one spawned task. It is started when a session becomes
//! authenticated and stopped when the session leaves that state; dropping
//! the monitor stops it too, so no check ever fires after teardown.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Default interval between liveness checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// What a liveness check decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Keep checking.
    Alive,
    /// The session ended; stop the monitor.
    Ended,
}

#[derive(Debug, Default)]
pub struct LivenessMonitor {
    handle: Option<JoinHandle<()>>,
}

impl LivenessMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start checking every `period`, replacing any running check.
    ///
    /// The first check fires one full period after start. Must be called
    /// from within a Tokio runtime.
    pub fn start<F>(&mut self, period: Duration, mut check: F)
    where
        F: FnMut() -> Liveness + Send + 'static,
    {
        self.stop();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                trace!("Running liveness check");
                if check() == Liveness::Ended {
                    debug!("Liveness monitor finished");
                    break;
                }
            }
        });
        self.handle = Some(handle);
        debug!(period_secs = period.as_secs(), "Liveness monitor started");
    }

    /// Cancel the outstanding timer. Safe to call when not running.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Liveness monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_check_waits_a_full_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let mut monitor = LivenessMonitor::new();
        monitor.start(Duration::from_secs(60), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Liveness::Alive
        });

        time::sleep(Duration::from_secs(59)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_check() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let mut monitor = LivenessMonitor::new();
        monitor.start(Duration::from_secs(60), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Liveness::Alive
        });

        monitor.stop();
        assert!(!monitor.is_running());
        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Stopping again is a no-op
        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ended_check_stops_the_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let mut monitor = LivenessMonitor::new();
        monitor.start(Duration::from_secs(10), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Liveness::Ended
        });

        time::sleep(Duration::from_secs(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_the_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        {
            let mut monitor = LivenessMonitor::new();
            monitor.start(Duration::from_secs(10), move || {
                seen.fetch_add(1, Ordering::SeqCst);
                Liveness::Alive
            });
        }
        time::sleep(Duration::from_secs(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
