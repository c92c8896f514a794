//! Lying/standing classification from box aspect ratio.

use serde::Serialize;

use crate::config::Thresholds;
use crate::detect::{Detection, FrameDetections};
use crate::geometry::BoundingBox;

/// Guards the ratio against zero-width boxes.
const RATIO_EPSILON: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Posture {
    Lying,
    Standing,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PersonPosture {
    pub person: Detection,
    pub ratio: f64,
    pub posture: Posture,
}

impl PersonPosture {
    pub fn lying(&self) -> bool {
        self.posture == Posture::Lying
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PostureResult {
    /// One entry per person, in detection order.
    pub persons: Vec<PersonPosture>,
    /// True when any person is lying.
    pub fall_suspected: bool,
}

/// `height / (width + ε)`.
pub fn aspect_ratio(bbox: &BoundingBox) -> f64 {
    bbox.height() as f64 / (bbox.width() as f64 + RATIO_EPSILON)
}

#[derive(Clone, Debug)]
pub struct PostureClassifier {
    lying_ratio_threshold: f64,
}

impl PostureClassifier {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            lying_ratio_threshold: thresholds.lying_ratio_threshold,
        }
    }

    pub fn classify_box(&self, bbox: &BoundingBox) -> (f64, Posture) {
        let ratio = aspect_ratio(bbox);
        let posture = if ratio < self.lying_ratio_threshold {
            Posture::Lying
        } else {
            Posture::Standing
        };
        (ratio, posture)
    }

    pub fn classify(&self, frame: &FrameDetections) -> PostureResult {
        let persons: Vec<PersonPosture> = frame
            .persons()
            .iter()
            .map(|person| {
                let (ratio, posture) = self.classify_box(&person.bbox);
                PersonPosture {
                    person: *person,
                    ratio,
                    posture,
                }
            })
            .collect();
        let fall_suspected = persons.iter().any(PersonPosture::lying);
        PostureResult {
            persons,
            fall_suspected,
        }
    }
}

impl Default for PostureClassifier {
    fn default() -> Self {
        Self::new(&Thresholds::default())
    }
}
