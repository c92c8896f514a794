//! Per-frame detection filtering and grouping.

use crate::config::Thresholds;
use crate::detect::result::{Detection, Keypoint, ObjectClass, RawDetection, TOTAL_LANDMARKS};
use crate::geometry::BoundingBox;

/// Surviving detections of one frame, grouped by class in detector order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameDetections {
    by_class: [Vec<Detection>; ObjectClass::COUNT],
}

impl FrameDetections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, detection: Detection) {
        self.by_class[detection.class.index()].push(detection);
    }

    /// Detections of `class`, in the order the detector reported them.
    pub fn get(&self, class: ObjectClass) -> &[Detection] {
        &self.by_class[class.index()]
    }

    pub fn persons(&self) -> &[Detection] {
        self.get(ObjectClass::Person)
    }

    pub fn len(&self) -> usize {
        self.by_class.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-class counts, for diagnostics.
    pub fn counts(&self) -> Vec<(ObjectClass, usize)> {
        ObjectClass::ALL
            .into_iter()
            .map(|class| (class, self.get(class).len()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> + '_ {
        self.by_class.iter().flatten()
    }
}

/// Filters raw detector output into [`FrameDetections`].
#[derive(Clone, Debug)]
pub struct DetectionAggregator {
    conf_threshold: f32,
    keypoint_visibility_threshold: f32,
    body_visibility_threshold: f64,
}

impl DetectionAggregator {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            conf_threshold: thresholds.conf_threshold,
            keypoint_visibility_threshold: thresholds.keypoint_visibility_threshold,
            body_visibility_threshold: thresholds.body_visibility_threshold,
        }
    }

    /// Fraction of the pose's landmarks that are visible and inside `bbox`.
    ///
    /// The denominator is always [`TOTAL_LANDMARKS`]; an empty pose yields 0.
    pub fn visible_fraction(&self, bbox: &BoundingBox, pose: &[Keypoint]) -> f64 {
        let inside = pose
            .iter()
            .take(TOTAL_LANDMARKS)
            .filter(|kp| {
                kp.visibility >= self.keypoint_visibility_threshold && bbox.contains(kp.x, kp.y)
            })
            .count();
        inside as f64 / TOTAL_LANDMARKS as f64
    }

    /// Apply the confidence, class and body-visibility filters.
    pub fn aggregate(&self, raw: &[RawDetection], pose: &[Keypoint]) -> FrameDetections {
        let mut out = FrameDetections::new();
        for det in raw {
            if !det.confidence.is_finite() || det.confidence < self.conf_threshold {
                continue;
            }
            let Some(class) = ObjectClass::from_label(&det.label) else {
                log::trace!("ignoring unsupported class '{}'", det.label);
                continue;
            };

            let bbox = if det.bbox.is_normalized() {
                det.bbox
            } else {
                log::debug!("normalizing inverted {} box {:?}", class, det.bbox);
                det.bbox.normalized()
            };

            if class == ObjectClass::Person {
                let fraction = self.visible_fraction(&bbox, pose);
                if fraction < self.body_visibility_threshold {
                    log::trace!(
                        "dropping person {:?}: {:.2} of landmarks visible",
                        bbox,
                        fraction
                    );
                    continue;
                }
            }

            out.push(Detection::new(class, bbox, det.confidence.clamp(0.0, 1.0)));
        }
        out
    }
}

impl Default for DetectionAggregator {
    fn default() -> Self {
        Self::new(&Thresholds::default())
    }
}
