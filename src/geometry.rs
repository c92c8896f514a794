//! Axis-aligned bounding box geometry.
//!
//! All coordinates are integer pixels. Every ratio computed here is guarded
//! against zero-area inputs: degenerate boxes yield 0 rather than NaN.

use serde::{Deserialize, Serialize};

/// Pixel-space rectangle `(x1, y1, x2, y2)`.
///
/// Serialized as a 4-element array, matching detector output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Swap corners so that `x1 <= x2` and `y1 <= y2`.
    pub fn normalized(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    pub fn is_normalized(&self) -> bool {
        self.x1 <= self.x2 && self.y1 <= self.y2
    }

    pub fn width(&self) -> i64 {
        (self.x2 as i64 - self.x1 as i64).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.y2 as i64 - self.y1 as i64).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// Inclusive point containment.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.x1 <= x && x <= self.x2 && self.y1 <= y && y <= self.y2
    }

    /// Length of the overlap between the two boxes' x-extents.
    pub fn horizontal_overlap(&self, other: &BoundingBox) -> i64 {
        let left = self.x1.max(other.x1) as i64;
        let right = self.x2.min(other.x2) as i64;
        (right - left).max(0)
    }

    /// Area of the intersection rectangle, 0 when the boxes are disjoint.
    pub fn intersection_area(&self, other: &BoundingBox) -> i64 {
        let top = self.y1.max(other.y1) as i64;
        let bottom = self.y2.min(other.y2) as i64;
        self.horizontal_overlap(other) * (bottom - top).max(0)
    }

    /// Intersection over union in `[0, 1]`.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let inter = self.intersection_area(other);
        if inter == 0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            return 0.0;
        }
        inter as f64 / union as f64
    }

    /// Share of this box's width covered by `other`'s x-extent.
    pub fn horizontal_fraction(&self, other: &BoundingBox) -> f64 {
        let width = self.width();
        if width == 0 {
            return 0.0;
        }
        self.horizontal_overlap(other) as f64 / width as f64
    }

    /// Clip to a `width` x `height` image, returning `None` if nothing remains.
    pub fn clipped(&self, width: u32, height: u32) -> Option<BoundingBox> {
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = width as i64 - 1;
        let max_y = height as i64 - 1;
        let b = self.normalized();
        if b.x2 < 0 || b.y2 < 0 || b.x1 as i64 > max_x || b.y1 as i64 > max_y {
            return None;
        }
        Some(BoundingBox {
            x1: b.x1.max(0),
            y1: b.y1.max(0),
            x2: (b.x2 as i64).min(max_x) as i32,
            y2: (b.y2 as i64).min(max_y) as i32,
        })
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        for b in [
            BoundingBox::new(0, 0, 10, 10),
            BoundingBox::new(100, 200, 260, 260),
            BoundingBox::new(-5, -5, 3, 7),
        ] {
            assert_eq!(b.iou(&b), 1.0);
        }
    }

    #[test]
    fn iou_is_symmetric() {
        let a = BoundingBox::new(100, 200, 260, 260);
        let b = BoundingBox::new(80, 180, 280, 280);
        let c = BoundingBox::new(150, 0, 400, 230);
        assert_eq!(a.iou(&b), b.iou(&a));
        assert_eq!(a.iou(&c), c.iou(&a));
        assert_eq!(b.iou(&c), c.iou(&b));
    }

    #[test]
    fn disjoint_and_touching_boxes_have_zero_iou() {
        let a = BoundingBox::new(0, 0, 10, 10);
        assert_eq!(a.iou(&BoundingBox::new(20, 20, 30, 30)), 0.0);
        // Shared edge only: zero-area intersection.
        assert_eq!(a.iou(&BoundingBox::new(10, 0, 20, 10)), 0.0);
    }

    #[test]
    fn degenerate_boxes_do_not_divide_by_zero() {
        let line = BoundingBox::new(5, 0, 5, 10);
        assert_eq!(line.iou(&line), 0.0);
        assert_eq!(line.horizontal_fraction(&BoundingBox::new(0, 0, 10, 10)), 0.0);
    }

    #[test]
    fn iou_matches_hand_computation() {
        let person = BoundingBox::new(100, 200, 260, 260);
        let bed = BoundingBox::new(80, 180, 280, 280);
        // person is fully inside bed: 9600 / 20000
        assert!((person.iou(&bed) - 0.48).abs() < 1e-12);
        assert_eq!(person.horizontal_fraction(&bed), 1.0);
    }

    #[test]
    fn normalized_swaps_inverted_corners() {
        let b = BoundingBox::new(50, 40, 10, 20).normalized();
        assert_eq!(b, BoundingBox::new(10, 20, 50, 40));
        assert!(b.is_normalized());
    }

    #[test]
    fn containment_is_inclusive() {
        let b = BoundingBox::new(0, 0, 10, 10);
        assert!(b.contains(0, 0));
        assert!(b.contains(10, 10));
        assert!(!b.contains(11, 5));
    }

    #[test]
    fn clipping_to_frame() {
        let b = BoundingBox::new(-10, 5, 700, 50);
        assert_eq!(b.clipped(640, 480), Some(BoundingBox::new(0, 5, 639, 50)));
        assert_eq!(BoundingBox::new(700, 0, 800, 10).clipped(640, 480), None);
    }

    #[test]
    fn serializes_as_array() {
        let b = BoundingBox::new(1, 2, 3, 4);
        assert_eq!(serde_json::to_string(&b).unwrap(), "[1,2,3,4]");
        let back: BoundingBox = serde_json::from_str("[1,2,3,4]").unwrap();
        assert_eq!(back, b);
    }
}
