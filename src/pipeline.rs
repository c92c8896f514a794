//! Producer/consumer plumbing between the decision loop and its consumers.
//!
//! The producer owns the decision state. The only shared mutable state is the
//! latest-frame slot and the alert queue, both reachable through a cloneable
//! [`Pipeline`] handle together with the cooperative stop flag.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::frame::{AnnotatedFrame, LatestFrame};

/// Token pushed to live listeners when a fall is confirmed.
pub const FALL_DETECTED: &str = "FALL_DETECTED";

// ----------------------------------------------------------------------------
// AlertEvent
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct AlertEvent {
    /// Monotonic per-process alert number, starting at 1.
    pub seq: u64,
    pub message: &'static str,
    /// How long the person had been down when the alert fired.
    pub sustained: Duration,
    /// Wall-clock emission time, seconds since the Unix epoch.
    pub emitted_at_epoch_s: u64,
    /// Frame that triggered the alert.
    pub frame: Arc<AnnotatedFrame>,
}

impl AlertEvent {
    pub fn fall_detected(seq: u64, sustained: Duration, frame: Arc<AnnotatedFrame>) -> Self {
        let emitted_at_epoch_s = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            seq,
            message: FALL_DETECTED,
            sustained,
            emitted_at_epoch_s,
            frame,
        }
    }

    /// Human-readable notification text.
    pub fn text(&self) -> String {
        format!(
            "Fall detected: person remained fallen for {:.0} seconds!",
            self.sustained.as_secs_f64()
        )
    }

    pub fn summary(&self) -> AlertSummary {
        AlertSummary {
            seq: self.seq,
            message: self.message.to_string(),
            sustained_secs: self.sustained.as_secs_f64(),
            emitted_at_epoch_s: self.emitted_at_epoch_s,
            frame_seq: self.frame.seq(),
        }
    }
}

/// Alert without its frame, for JSON consumers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertSummary {
    pub seq: u64,
    pub message: String,
    pub sustained_secs: f64,
    pub emitted_at_epoch_s: u64,
    pub frame_seq: u64,
}

// ----------------------------------------------------------------------------
// AlertQueue
// ----------------------------------------------------------------------------

struct QueueInner {
    events: Mutex<VecDeque<AlertEvent>>,
    ready: Condvar,
    capacity: Option<usize>,
    dropped: AtomicU64,
}

/// FIFO of alert events, safe for any number of producers and consumers.
///
/// Unbounded by default. A bounded queue drops its oldest pending alert to
/// make room and counts the drop.
#[derive(Clone)]
pub struct AlertQueue {
    inner: Arc<QueueInner>,
}

impl AlertQueue {
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                events: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
                capacity,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AlertEvent>> {
        self.inner
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, event: AlertEvent) {
        let mut events = self.lock();
        if let Some(cap) = self.inner.capacity {
            while events.len() >= cap {
                if let Some(old) = events.pop_front() {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    log::warn!("alert queue full ({}), dropping alert #{}", cap, old.seq);
                }
            }
        }
        events.push_back(event);
        drop(events);
        self.inner.ready.notify_one();
    }

    pub fn try_recv(&self) -> Option<AlertEvent> {
        self.lock().pop_front()
    }

    /// Wait up to `timeout` for the next alert.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<AlertEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.lock();
        loop {
            if let Some(event) = events.pop_front() {
                return Some(event);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            events = match self.inner.ready.wait_timeout(events, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity
    }
}

impl Default for AlertQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}

// ----------------------------------------------------------------------------
// Shutdown
// ----------------------------------------------------------------------------

/// Cooperative stop flag checked at every poll and sleep boundary.
#[derive(Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

const SLEEP_SLICE: Duration = Duration::from_millis(50);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` in short slices. Returns false if stopped early.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

/// Handles shared between the producer and its consumers.
#[derive(Clone, Default)]
pub struct Pipeline {
    pub latest: LatestFrame,
    pub alerts: AlertQueue,
    pub shutdown: Shutdown,
}

impl Pipeline {
    pub fn new(queue_capacity: Option<usize>) -> Self {
        Self {
            latest: LatestFrame::new(),
            alerts: AlertQueue::with_capacity(queue_capacity),
            shutdown: Shutdown::new(),
        }
    }
}
