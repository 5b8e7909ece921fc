//! Timestamped multi-reader audio queue
//!
//! One ordered deque of `(timestamp, chunk, duration)` per session. The
//! ingest path is the only writer; any number of named readers (`wake_word`,
//! `vad`, `recording`) hold independent cursors and read non-destructively,
//! so detectors never steal audio from each other. History older than the
//! retention window is trimmed after every push.
//!
//! Locking: one `parking_lot::Mutex` per session around the deque + cursors,
//! a `DashMap` for the session registry. Blocking readers park on a
//! per-session `Notify` that `push` signals. No lock is ever held across an
//! await point.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::audio::AudioChunk;
use crate::clock::{secs_to_micros, Clock};
use crate::config::QueueConfig;

/// How long before "now" a fresh reader's cursor is placed when the session
/// has no retained audio yet, so imminent pushes are not missed.
const NEW_READER_BACKDATE_MICROS: u64 = 100_000;

/// Poll interval while waiting in [`AudioQueue::pull_blocking`]. The notify
/// signal usually wakes readers sooner; this bounds the lost-wakeup window.
const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A queued audio chunk with its assigned monotonic timestamp.
#[derive(Debug, Clone)]
pub struct TimestampedChunk {
    /// Assigned monotonic timestamp in microseconds (strictly increasing per session)
    pub timestamp: u64,
    /// The immutable audio payload
    pub chunk: AudioChunk,
    /// Duration of this chunk in seconds
    pub duration: f64,
}

/// Aggregate queue statistics, for transports and dashboards.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueStats {
    /// Number of live per-session queues
    pub total_sessions: usize,
    /// Total retained chunks across all sessions
    pub total_chunks: usize,
    /// Retained chunk count per session
    pub session_sizes: HashMap<String, usize>,
}

#[derive(Default)]
struct QueueInner {
    items: VecDeque<TimestampedChunk>,
    /// reader id -> exclusive cursor (last delivered timestamp)
    readers: HashMap<String, u64>,
    last_timestamp: u64,
}

struct SessionQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl SessionQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
        }
    }
}

/// Per-session timestamped audio queues with named reader cursors.
pub struct AudioQueue {
    sessions: DashMap<String, Arc<SessionQueue>>,
    clock: Clock,
    max_history_micros: u64,
    default_chunk_duration: f64,
}

impl AudioQueue {
    /// Create a queue with the given clock and retention configuration.
    pub fn new(clock: Clock, config: &QueueConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
            max_history_micros: secs_to_micros(config.max_history_duration),
            default_chunk_duration: config.chunk_duration,
        }
    }

    /// Current monotonic time in microseconds, from the queue's clock.
    pub fn now_micros(&self) -> u64 {
        self.clock.now_micros()
    }

    fn session(&self, session_id: &str) -> Option<Arc<SessionQueue>> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    fn ensure_session(&self, session_id: &str) -> Arc<SessionQueue> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!("Created audio queue for session {}", session_id);
                Arc::new(SessionQueue::new())
            })
            .value()
            .clone()
    }

    /// Append a chunk, assigning it the current monotonic timestamp.
    ///
    /// Timestamps are strictly increasing per session: a clock reading at or
    /// below the previous timestamp is raised to `last + 1us`. Returns the
    /// assigned timestamp. Unknown sessions are created on first push.
    pub fn push(&self, session_id: &str, chunk: AudioChunk) -> u64 {
        let sq = self.ensure_session(session_id);
        let assigned = {
            let mut inner = sq.inner.lock();

            let now = self.clock.now_micros();
            let assigned = if now <= inner.last_timestamp {
                inner.last_timestamp + 1
            } else {
                now
            };
            inner.last_timestamp = assigned;

            let duration = if chunk.is_empty() {
                self.default_chunk_duration
            } else {
                chunk.duration_secs()
            };
            inner.items.push_back(TimestampedChunk {
                timestamp: assigned,
                chunk,
                duration,
            });

            // Retention trim, O(trimmed)
            let cutoff = assigned.saturating_sub(self.max_history_micros);
            while inner
                .items
                .front()
                .map(|f| f.timestamp < cutoff)
                .unwrap_or(false)
            {
                inner.items.pop_front();
            }

            assigned
        };

        sq.notify.notify_waiters();
        tracing::trace!("Pushed chunk to {} at {}us", session_id, assigned);
        assigned
    }

    /// Record a named reader cursor for a session.
    ///
    /// With `start_timestamp` the cursor is placed so that the item at
    /// exactly that timestamp is still delivered (enables pre-roll reads
    /// behind "now"). Without it, a new reader starts at the earliest
    /// retained item, or 100 ms before now when the queue is empty.
    /// Re-registering an existing reader without a timestamp is a no-op.
    pub fn register_reader(
        &self,
        session_id: &str,
        reader_id: &str,
        start_timestamp: Option<u64>,
    ) {
        let sq = self.ensure_session(session_id);
        let mut inner = sq.inner.lock();

        let cursor = match start_timestamp {
            Some(ts) => ts.saturating_sub(1),
            None => {
                if inner.readers.contains_key(reader_id) {
                    return;
                }
                match inner.items.front() {
                    Some(first) => first.timestamp.saturating_sub(1),
                    None => self.clock.now_micros().saturating_sub(NEW_READER_BACKDATE_MICROS),
                }
            }
        };
        tracing::debug!(
            "Reader '{}' registered for session '{}' at cursor {}us",
            reader_id,
            session_id,
            cursor
        );
        inner.readers.insert(reader_id.to_string(), cursor);
    }

    /// Non-destructive read of items strictly after `from` (or the reader's
    /// cursor when omitted), advancing the cursor to the last returned item.
    ///
    /// A cursor older than the earliest retained item resyncs to it: the next
    /// pull simply starts at the front of the retained window. Unknown
    /// sessions return an empty vec.
    pub fn pull_from_timestamp(
        &self,
        session_id: &str,
        reader_id: &str,
        from: Option<u64>,
        max_chunks: Option<usize>,
    ) -> Vec<TimestampedChunk> {
        let Some(sq) = self.session(session_id) else {
            return Vec::new();
        };
        let mut inner = sq.inner.lock();

        let from = match from {
            Some(ts) => ts,
            None => match inner.readers.get(reader_id) {
                Some(cursor) => *cursor,
                None => {
                    // Unregistered reader: start from now, delivering only
                    // audio pushed after this call.
                    let now = self.clock.now_micros();
                    inner.readers.insert(reader_id.to_string(), now);
                    now
                }
            },
        };

        let limit = max_chunks.unwrap_or(usize::MAX);
        let mut result = Vec::new();
        for item in inner.items.iter() {
            if item.timestamp > from {
                result.push(item.clone());
                if result.len() >= limit {
                    break;
                }
            }
        }

        if let Some(last) = result.last() {
            let last_ts = last.timestamp;
            let cursor = inner.readers.entry(reader_id.to_string()).or_insert(0);
            // Cursors only move forward across pull calls
            *cursor = (*cursor).max(last_ts);
        }

        result
    }

    /// Wait up to `timeout` for the next single item after the reader's
    /// cursor. Returns `None` on timeout or when the session was removed.
    pub async fn pull_blocking(
        &self,
        session_id: &str,
        reader_id: &str,
        timeout: Duration,
    ) -> Option<TimestampedChunk> {
        let sq = self.ensure_session(session_id);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(item) = self
                .pull_from_timestamp(session_id, reader_id, None, Some(1))
                .into_iter()
                .next()
            {
                return Some(item);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }

            let wait =
                BLOCKING_POLL_INTERVAL.min(deadline.duration_since(tokio::time::Instant::now()));
            tokio::select! {
                _ = sq.notify.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Read-only range scan: every retained item with
    /// `start <= timestamp <= end` (end unbounded when `None`). Ignores and
    /// does not move any reader cursor.
    pub fn get_between(
        &self,
        session_id: &str,
        start: u64,
        end: Option<u64>,
    ) -> Vec<TimestampedChunk> {
        let Some(sq) = self.session(session_id) else {
            return Vec::new();
        };
        let inner = sq.inner.lock();
        inner
            .items
            .iter()
            .filter(|item| {
                item.timestamp >= start && end.map(|e| item.timestamp <= e).unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// Destructively pop up to `count` chunks from the front, in insertion
    /// order. This is the batch-upload drain path; cursor-based readers
    /// should use [`Self::pull_from_timestamp`] instead.
    pub fn pull(&self, session_id: &str, count: usize) -> Vec<AudioChunk> {
        let Some(sq) = self.session(session_id) else {
            return Vec::new();
        };
        let mut inner = sq.inner.lock();
        let n = count.min(inner.items.len());
        inner
            .items
            .drain(..n)
            .map(|item| item.chunk)
            .collect()
    }

    /// Drop all retained chunks. Cursors survive and resync on new data.
    pub fn clear(&self, session_id: &str) {
        if let Some(sq) = self.session(session_id) {
            let mut inner = sq.inner.lock();
            let dropped = inner.items.len();
            inner.items.clear();
            tracing::debug!("Cleared {} chunks from session {}", dropped, session_id);
        }
    }

    /// Destroy the entire per-session state: queue, cursors, and event.
    /// Blocked readers wake and observe the removal as a timeout.
    pub fn remove(&self, session_id: &str) {
        if let Some((_, sq)) = self.sessions.remove(session_id) {
            sq.notify.notify_waiters();
            tracing::debug!("Removed audio queue for session {}", session_id);
        }
    }

    /// Retained chunk count for a session (0 when unknown).
    pub fn size(&self, session_id: &str) -> usize {
        self.session(session_id)
            .map(|sq| sq.inner.lock().items.len())
            .unwrap_or(0)
    }

    /// True when the session has a queue.
    pub fn exists(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Aggregate statistics across all sessions.
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for entry in self.sessions.iter() {
            let size = entry.value().inner.lock().items.len();
            stats.total_sessions += 1;
            stats.total_chunks += size;
            stats.session_sizes.insert(entry.key().clone(), size);
        }
        stats
    }
}
