use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// Number of landmarks in one pose estimate.
pub const TOTAL_LANDMARKS: usize = 33;

/// Object classes the decision engine understands.
///
/// Anything else a detector reports is dropped at aggregation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Person,
    Sofa,
    Bed,
    Chair,
}

impl ObjectClass {
    pub const COUNT: usize = 4;
    pub const ALL: [ObjectClass; Self::COUNT] = [
        ObjectClass::Person,
        ObjectClass::Sofa,
        ObjectClass::Bed,
        ObjectClass::Chair,
    ];

    /// Map a detector label to a class. Labels are matched case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|class| class.label().eq_ignore_ascii_case(label))
    }

    pub fn label(self) -> &'static str {
        match self {
            ObjectClass::Person => "person",
            ObjectClass::Sofa => "sofa",
            ObjectClass::Bed => "bed",
            ObjectClass::Chair => "chair",
        }
    }

    /// Furniture a person may legitimately lie on.
    pub fn is_surface(self) -> bool {
        !matches!(self, ObjectClass::Person)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ObjectClass::Person => 0,
            ObjectClass::Sofa => 1,
            ObjectClass::Bed => 2,
            ObjectClass::Chair => 3,
        }
    }
}

impl std::fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Unvalidated detector output for one object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(label: &str, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            label: label.to_string(),
            bbox,
            confidence,
        }
    }
}

/// Validated detection of a supported class.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub class: ObjectClass,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(class: ObjectClass, bbox: BoundingBox, confidence: f32) -> Self {
        debug_assert!(bbox.is_normalized(), "detection box must be normalized");
        debug_assert!((0.0..=1.0).contains(&confidence));
        Self {
            class,
            bbox,
            confidence,
        }
    }
}

/// One pose landmark in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: i32,
    pub y: i32,
    pub visibility: f32,
}

impl Keypoint {
    pub const fn new(x: i32, y: i32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }
}

/// Everything the external detector and pose estimator report for a frame.
///
/// `pose` holds [`TOTAL_LANDMARKS`] entries, or none when no pose was found.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameObservations {
    #[serde(default)]
    pub detections: Vec<RawDetection>,
    #[serde(default)]
    pub pose: Vec<Keypoint>,
}

impl FrameObservations {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty() && self.pose.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_from_label() {
        for class in ObjectClass::ALL {
            assert_eq!(ObjectClass::from_label(class.label()), Some(class));
        }
        assert_eq!(ObjectClass::from_label("Bed"), Some(ObjectClass::Bed));
        assert_eq!(ObjectClass::from_label("tv"), None);
        assert_eq!(ObjectClass::from_label(""), None);
    }

    #[test]
    fn observations_parse_with_missing_pose() {
        let obs: FrameObservations = serde_json::from_str(
            r#"{"detections":[{"label":"person","bbox":[1,2,3,4],"confidence":0.9}]}"#,
        )
        .unwrap();
        assert_eq!(obs.detections.len(), 1);
        assert!(obs.pose.is_empty());
        assert_eq!(obs.detections[0].bbox, BoundingBox::new(1, 2, 3, 4));
    }
}
