//! Producer loop: acquire, detect, decide, publish.
//!
//! `FallMonitor` owns the frame source, the detector backend and the
//! decision engine. It runs on a single thread and never stops on a source
//! or detector error; the only way out is the pipeline's shutdown flag.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::annotate::annotate;
use crate::config::{MonitorConfig, PacingSettings, Thresholds};
use crate::confirm::ConfirmSnapshot;
use crate::detect::{DetectorBackend, FrameObservations, ObjectClass};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::pipeline::{AlertEvent, Pipeline};
use crate::{DecisionSummary, FallEngine};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Counters shared between the producer and status readers.
#[derive(Debug, Default)]
pub struct MonitorStats {
    frames_processed: AtomicU64,
    frames_skipped: AtomicU64,
    source_errors: AtomicU64,
    detector_failures: AtomicU64,
    alerts_emitted: AtomicU64,
    last: Mutex<Option<LastDecision>>,
}

/// State of the most recently processed frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LastDecision {
    pub frame_seq: u64,
    pub summary: DecisionSummary,
    pub confirm: ConfirmSnapshot,
    pub counts: Vec<ClassCount>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ClassCount {
    pub class: ObjectClass,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub source_errors: u64,
    pub detector_failures: u64,
    pub alerts_emitted: u64,
    pub alerts_dropped: u64,
    pub alerts_pending: usize,
    pub last: Option<LastDecision>,
}

impl MonitorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn alerts_emitted(&self) -> u64 {
        self.alerts_emitted.load(Ordering::Relaxed)
    }

    fn record(&self, last: LastDecision) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        let mut slot = self.last.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(last);
    }

    /// Point-in-time copy, folding in the queue's own counters.
    pub fn snapshot(&self, pipeline: &Pipeline) -> StatsSnapshot {
        let last = self.last.lock().unwrap_or_else(|p| p.into_inner()).clone();
        StatsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            alerts_dropped: pipeline.alerts.dropped(),
            alerts_pending: pipeline.alerts.len(),
            last,
        }
    }
}

// ----------------------------------------------------------------------------
// FallMonitor
// ----------------------------------------------------------------------------

/// What one producer cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Processed { seq: u64, summary: DecisionSummary },
    NoFrame,
}

pub struct FallMonitor {
    source: Box<dyn FrameSource>,
    backend: Box<dyn DetectorBackend>,
    engine: FallEngine,
    pipeline: Pipeline,
    pacing: PacingSettings,
    stats: Arc<MonitorStats>,
    alert_seq: u64,
}

impl FallMonitor {
    pub fn new(
        config: &MonitorConfig,
        source: Box<dyn FrameSource>,
        backend: Box<dyn DetectorBackend>,
        pipeline: Pipeline,
    ) -> Self {
        Self::with_thresholds(&config.thresholds, config.pacing.clone(), source, backend, pipeline)
    }

    pub fn with_thresholds(
        thresholds: &Thresholds,
        pacing: PacingSettings,
        source: Box<dyn FrameSource>,
        backend: Box<dyn DetectorBackend>,
        pipeline: Pipeline,
    ) -> Self {
        Self {
            source,
            backend,
            engine: FallEngine::new(thresholds),
            pipeline,
            pacing,
            stats: Arc::new(MonitorStats::new()),
            alert_seq: 0,
        }
    }

    pub fn stats(&self) -> Arc<MonitorStats> {
        self.stats.clone()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run one acquisition/decision cycle.
    pub fn step(&mut self) -> StepOutcome {
        match self.source.next_frame() {
            Ok(Some(frame)) => self.process(frame),
            Ok(None) => {
                self.stats.frames_skipped.fetch_add(1, Ordering::Relaxed);
                log::trace!("no frame from {}", self.source.describe());
                StepOutcome::NoFrame
            }
            Err(err) => {
                self.stats.source_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("frame acquisition failed: {}", err);
                StepOutcome::NoFrame
            }
        }
    }

    fn process(&mut self, frame: Frame) -> StepOutcome {
        let seq = frame.seq;
        let now = frame.captured_at;
        let observations = match self.backend.detect(&frame) {
            Ok(obs) => obs,
            Err(err) => {
                self.stats.detector_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("{} detector failed on frame {}: {}", self.backend.name(), seq, err);
                FrameObservations::default()
            }
        };

        let decision = self.engine.evaluate(&observations, now);
        let summary = decision.summary();
        let counts = decision
            .detections
            .counts()
            .into_iter()
            .map(|(class, count)| ClassCount { class, count })
            .collect();
        let annotated = Arc::new(annotate(frame, &decision));
        self.pipeline.latest.publish(annotated.clone());

        if let Some(confirmation) = decision.confirmation {
            self.alert_seq += 1;
            let event = AlertEvent::fall_detected(self.alert_seq, confirmation.elapsed(), annotated);
            log::warn!("alert #{}: {}", event.seq, event.text());
            self.pipeline.alerts.push(event);
            self.stats.alerts_emitted.fetch_add(1, Ordering::Relaxed);
        }

        self.stats.record(LastDecision {
            frame_seq: seq,
            summary,
            confirm: self.engine.confirmer().snapshot(now),
            counts,
        });
        StepOutcome::Processed { seq, summary }
    }

    /// Loop until the pipeline's shutdown flag is raised.
    pub fn run(&mut self) {
        log::info!(
            "monitor running: source={} backend={}",
            self.source.describe(),
            self.backend.name()
        );
        let mut last_health_log = Instant::now();
        let shutdown = self.pipeline.shutdown.clone();
        while !shutdown.is_triggered() {
            let pause = match self.step() {
                StepOutcome::Processed { .. } => self.pacing.frame_interval,
                StepOutcome::NoFrame => self.pacing.retry_pause,
            };

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let snap = self.stats.snapshot(&self.pipeline);
                log::info!(
                    "monitor health: frames={} skipped={} source_errors={} detector_failures={} alerts={}",
                    snap.frames_processed,
                    snap.frames_skipped,
                    snap.source_errors,
                    snap.detector_failures,
                    snap.alerts_emitted
                );
                last_health_log = Instant::now();
            }

            shutdown.sleep(pause);
        }
        log::info!("monitor stopped after {} frames", self.stats.frames_processed());
    }

    /// Warm the backend up and start the producer thread.
    pub fn spawn(mut self) -> Result<MonitorHandle> {
        self.backend.warm_up()?;
        let stats = self.stats.clone();
        let pipeline = self.pipeline.clone();
        let join = std::thread::Builder::new()
            .name("fall-monitor".to_string())
            .spawn(move || self.run())?;
        Ok(MonitorHandle {
            pipeline,
            stats,
            join: Some(join),
        })
    }
}

// ----------------------------------------------------------------------------
// MonitorHandle
// ----------------------------------------------------------------------------

pub struct MonitorHandle {
    pipeline: Pipeline,
    stats: Arc<MonitorStats>,
    join: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn stats(&self) -> Arc<MonitorStats> {
        self.stats.clone()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Raise the shutdown flag and wait for the producer to exit.
    pub fn stop(mut self) -> Result<()> {
        self.pipeline.shutdown.trigger();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("monitor thread panicked"))?;
        }
        Ok(())
    }
}
