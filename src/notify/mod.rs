//! Alert delivery.
//!
//! The dispatcher is the single consumer of the alert queue. Each alert is
//! handed to every sink in registration order; a failing sink is logged and
//! skipped, it never blocks the others.

#[cfg(feature = "notify-mqtt")]
pub mod mqtt;
#[cfg(feature = "notify-http")]
pub mod webhook;

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::pipeline::{AlertEvent, AlertQueue, AlertSummary, Shutdown};

#[cfg(feature = "notify-mqtt")]
pub use mqtt::MqttSink;
#[cfg(feature = "notify-http")]
pub use webhook::WebhookSink;

pub trait AlertSink: Send {
    fn name(&self) -> &'static str;

    fn deliver(&mut self, alert: &AlertEvent) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Built-in sinks
// ----------------------------------------------------------------------------

/// Writes each alert to the log at warn level.
#[derive(Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(&mut self, alert: &AlertEvent) -> Result<()> {
        log::warn!(
            "{} #{} (frame {}): {}",
            alert.message,
            alert.seq,
            alert.frame.seq(),
            alert.text()
        );
        Ok(())
    }
}

/// Bounded history of delivered alerts, newest last.
///
/// Cloning shares the history; the status server reads from a clone while
/// the dispatcher writes through the sink.
#[derive(Clone)]
pub struct RecentAlerts {
    inner: Arc<Mutex<VecDeque<AlertSummary>>>,
    capacity: usize,
}

impl RecentAlerts {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AlertSummary>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn record(&self, summary: AlertSummary) {
        let mut history = self.lock();
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(summary);
    }

    /// Alerts with a sequence number greater than `seq`, oldest first.
    pub fn since(&self, seq: u64) -> Vec<AlertSummary> {
        self.lock().iter().filter(|a| a.seq > seq).cloned().collect()
    }

    pub fn latest(&self) -> Option<AlertSummary> {
        self.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlertSink for RecentAlerts {
    fn name(&self) -> &'static str {
        "recent"
    }

    fn deliver(&mut self, alert: &AlertEvent) -> Result<()> {
        self.record(alert.summary());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct DispatchStats {
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
}

pub struct AlertDispatcher {
    queue: AlertQueue,
    sinks: Vec<Box<dyn AlertSink>>,
    poll_interval: Duration,
    stats: Arc<DispatchStats>,
}

impl AlertDispatcher {
    pub fn new(queue: AlertQueue, poll_interval: Duration) -> Self {
        Self {
            queue,
            sinks: Vec::new(),
            poll_interval,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn AlertSink>) {
        log::info!("alert sink registered: {}", sink.name());
        self.sinks.push(sink);
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    /// Wait up to one poll interval for an alert and deliver it.
    ///
    /// Returns the delivered alert's sequence number, or `None` on timeout.
    pub fn run_once(&mut self) -> Option<u64> {
        let alert = self.queue.recv_timeout(self.poll_interval)?;
        self.deliver(&alert);
        Some(alert.seq)
    }

    fn deliver(&mut self, alert: &AlertEvent) {
        for sink in self.sinks.iter_mut() {
            match sink.deliver(alert) {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    log::error!("alert #{} not delivered to {}: {}", alert.seq, sink.name(), err);
                }
            }
        }
    }

    pub fn run(&mut self, shutdown: &Shutdown) {
        while !shutdown.is_triggered() {
            self.run_once();
        }
        // Drain what the producer pushed before stopping.
        while let Some(alert) = self.queue.try_recv() {
            self.deliver(&alert);
        }
    }

    pub fn spawn(mut self, shutdown: Shutdown) -> Result<DispatcherHandle> {
        let stats = self.stats.clone();
        let stop = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("fall-alerts".to_string())
            .spawn(move || self.run(&stop))?;
        Ok(DispatcherHandle {
            shutdown,
            stats,
            join: Some(join),
        })
    }
}

pub struct DispatcherHandle {
    shutdown: Shutdown,
    stats: Arc<DispatchStats>,
    join: Option<JoinHandle<()>>,
}

impl DispatcherHandle {
    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.trigger();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("alert dispatcher thread panicked"))?;
        }
        Ok(())
    }
}
