//! Fall Witness
//!
//! Decides, frame by frame, whether a person in view has fallen and stayed
//! down, and turns a sustained fall into exactly one alert.
//!
//! # Architecture
//!
//! Each frame flows through four stages, evaluated synchronously by a single
//! producer thread:
//!
//! 1. **Aggregation**: raw detector output is filtered by confidence, class
//!    and (for persons) pose visibility, then grouped by class.
//! 2. **Posture**: each person box is classified lying or standing by its
//!    height/width ratio.
//! 3. **Support**: a lying person resting on a bed, sofa or chair is not
//!    fallen.
//! 4. **Confirmation**: the per-frame verdict must hold continuously for the
//!    sustain period before an alert is raised.
//!
//! The producer publishes the annotated frame to a single-slot
//! [`frame::LatestFrame`] and pushes alerts onto a [`pipeline::AlertQueue`].
//! Consumers (the status server, alert sinks) run on their own threads.
//!
//! # Module Structure
//!
//! - `geometry`: bounding boxes, IoU, horizontal overlap
//! - `detect`: detector output types, aggregation, detector backends
//! - `posture`, `support`, `confirm`: the decision stages
//! - `frame`, `annotate`, `pipeline`: frames, overlays, producer/consumer glue
//! - `ingest`, `monitor`, `notify`, `api`: runtime around the engine

use serde::Serialize;
use std::time::Instant;

pub mod annotate;
pub mod api;
pub mod config;
pub mod confirm;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod monitor;
pub mod notify;
pub mod pipeline;
pub mod posture;
pub mod support;

pub use annotate::annotate;
pub use config::{MonitorConfig, Thresholds};
pub use confirm::{ConfirmSnapshot, ConfirmState, Confirmation, FallConfirmer};
pub use detect::{
    Detection, DetectionAggregator, DetectorBackend, FrameDetections, FrameObservations,
    Keypoint, ObjectClass, RawDetection,
};
pub use frame::{AnnotatedFrame, Frame, LatestFrame};
pub use geometry::BoundingBox;
pub use ingest::{FrameSource, SyntheticSource};
pub use monitor::{FallMonitor, MonitorHandle, MonitorStats, StatsSnapshot};
pub use pipeline::{AlertEvent, AlertQueue, Pipeline, Shutdown, FALL_DETECTED};
pub use posture::{Posture, PostureClassifier, PostureResult};
pub use support::{SupportDecision, SupportResolver};

// -------------------- Frame Decision --------------------

/// Everything the engine concluded about one frame.
#[derive(Clone, Debug, Default)]
pub struct FrameDecision {
    pub detections: FrameDetections,
    pub posture: PostureResult,
    /// One entry per lying person, in detection order. Empty unless a fall
    /// was suspected.
    pub support: Vec<SupportDecision>,
    /// Some lying person has no supporting surface.
    pub actually_fallen: bool,
    /// Set on the frame a sustained fall is confirmed.
    pub confirmation: Option<Confirmation>,
}

impl FrameDecision {
    pub fn confirmed(&self) -> bool {
        self.confirmation.is_some()
    }

    pub fn summary(&self) -> DecisionSummary {
        DecisionSummary {
            persons: self.posture.persons.len(),
            lying: self.posture.persons.iter().filter(|p| p.lying()).count(),
            supported: self.support.iter().filter(|d| !d.actually_fallen).count(),
            fall_suspected: self.posture.fall_suspected,
            actually_fallen: self.actually_fallen,
            confirmed: self.confirmed(),
        }
    }
}

/// Per-frame counts, for logs and replay output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DecisionSummary {
    pub persons: usize,
    pub lying: usize,
    pub supported: usize,
    pub fall_suspected: bool,
    pub actually_fallen: bool,
    pub confirmed: bool,
}

// -------------------- Fall Engine --------------------

/// The per-frame decision pipeline plus its temporal state.
///
/// `evaluate` is synchronous and deterministic given the observations and
/// `now`; the only state carried between frames is the confirmer's.
#[derive(Debug)]
pub struct FallEngine {
    aggregator: DetectionAggregator,
    classifier: PostureClassifier,
    resolver: SupportResolver,
    confirmer: FallConfirmer,
}

impl FallEngine {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            aggregator: DetectionAggregator::new(thresholds),
            classifier: PostureClassifier::new(thresholds),
            resolver: SupportResolver::new(thresholds),
            confirmer: FallConfirmer::new(thresholds.sustain()),
        }
    }

    pub fn evaluate(&mut self, observations: &FrameObservations, now: Instant) -> FrameDecision {
        let detections = self
            .aggregator
            .aggregate(&observations.detections, &observations.pose);
        let posture = self.classifier.classify(&detections);

        let support: Vec<SupportDecision> = if posture.fall_suspected {
            posture
                .persons
                .iter()
                .filter(|p| p.lying())
                .map(|p| self.resolver.decide(&p.person, &detections))
                .collect()
        } else {
            Vec::new()
        };
        let actually_fallen = support.iter().any(|d| d.actually_fallen);

        let confirmation = self.confirmer.update(actually_fallen, now);
        if let Some(c) = confirmation {
            log::warn!(
                "fall confirmed: unsupported lying person for {:.1}s",
                c.elapsed().as_secs_f64()
            );
        }

        FrameDecision {
            detections,
            posture,
            support,
            actually_fallen,
            confirmation,
        }
    }

    pub fn confirmer(&self) -> &FallConfirmer {
        &self.confirmer
    }

    /// Drop any in-progress episode.
    pub fn reset(&mut self) {
        self.confirmer.reset();
    }
}

impl Default for FallEngine {
    fn default() -> Self {
        Self::new(&Thresholds::default())
    }
}

// -------------------- Tests --------------------
