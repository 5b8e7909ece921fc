//! Per-session countdown timer service
//!
//! One active timer per session: arming a new countdown cancels any prior
//! one. Callbacks run on their own task and must only dispatch actions -
//! cancellation is racy by nature, so a callback that slips through a cancel
//! is rendered harmless by the FSM guard on the resulting action.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

struct TimerEntry {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Keyed countdown timers, one slot per session.
#[derive(Clone)]
pub struct TimerService {
    timers: Arc<DashMap<String, TimerEntry>>,
    generation: Arc<AtomicU64>,
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService {
    /// Create an empty timer service.
    pub fn new() -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Arm a countdown for `session_id`, cancelling any active one. When the
    /// countdown elapses without being cancelled, `callback` runs on its own
    /// task with the session id.
    pub fn start_countdown<F>(&self, session_id: &str, duration: Duration, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Reserve the slot before spawning so a zero-duration countdown
        // cannot fire before its own registration exists.
        if let Some(old) = self.timers.insert(
            session_id.to_string(),
            TimerEntry {
                generation,
                handle: None,
            },
        ) {
            if let Some(handle) = old.handle {
                handle.abort();
            }
        }

        let timers = self.timers.clone();
        let sid = session_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // Fire only while still the current occupant of the slot
            let current = timers
                .remove_if(&sid, |_, entry| entry.generation == generation)
                .is_some();
            if current {
                tracing::debug!("Silence countdown fired for session {}", sid);
                callback(sid);
            }
        });

        if let Some(mut entry) = self.timers.get_mut(session_id) {
            if entry.generation == generation {
                entry.handle = Some(handle);
            }
        }

        tracing::debug!(
            "Started {}ms countdown for session {}",
            duration.as_millis(),
            session_id
        );
    }

    /// Cancel the session's timer. Returns whether one was active.
    pub fn stop_timer(&self, session_id: &str) -> bool {
        match self.timers.remove(session_id) {
            Some((_, entry)) => {
                if let Some(handle) = entry.handle {
                    handle.abort();
                }
                tracing::debug!("Stopped countdown for session {}", session_id);
                true
            }
            None => false,
        }
    }

    /// Is a countdown currently armed for the session?
    pub fn is_active(&self, session_id: &str) -> bool {
        self.timers.contains_key(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_callback(fired: &Arc<AtomicUsize>) -> impl FnOnce(String) + Send + 'static {
        let fired = fired.clone();
        move |_sid| {
            fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_countdown_fires_once() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        timers.start_countdown("s1", Duration::from_millis(20), counter_callback(&fired));
        assert!(timers.is_active("s1"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_active("s1"));
    }

    #[tokio::test]
    async fn test_stop_cancels() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        timers.start_countdown("s1", Duration::from_millis(30), counter_callback(&fired));
        assert!(timers.stop_timer("s1"));
        assert!(!timers.is_active("s1"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timers.stop_timer("s1"));
    }

    #[tokio::test]
    async fn test_restart_cancels_prior() {
        let timers = TimerService::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        timers.start_countdown("s1", Duration::from_millis(30), counter_callback(&first));
        timers.start_countdown("s1", Duration::from_millis(60), counter_callback(&second));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_duration_fires() {
        let timers = TimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));
        timers.start_countdown("s1", Duration::ZERO, counter_callback(&fired));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let timers = TimerService::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        timers.start_countdown("a", Duration::from_millis(20), counter_callback(&a));
        timers.start_countdown("b", Duration::from_millis(20), counter_callback(&b));
        timers.stop_timer("a");

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }
}
