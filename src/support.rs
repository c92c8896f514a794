//! Support-surface resolution.
//!
//! A lying person whose box sits on a bed, sofa or chair is resting, not
//! fallen. Surfaces are tried in priority order and, within a class, in
//! detection order; the first surface that satisfies every geometric test
//! wins. There is no best-match selection.

use serde::Serialize;

use crate::config::Thresholds;
use crate::detect::{Detection, FrameDetections, ObjectClass};

/// The surface a person was found resting on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Support {
    pub class: ObjectClass,
    /// Position of the surface within its class in [`FrameDetections`].
    pub index: usize,
    pub surface: Detection,
    pub iou: f64,
    pub horizontal_fraction: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SupportDecision {
    pub person: Detection,
    pub support: Option<Support>,
    /// True when no qualifying surface was found.
    pub actually_fallen: bool,
}

#[derive(Clone, Debug)]
pub struct SupportResolver {
    iou_threshold: f64,
    horizontal_overlap_fraction: f64,
    vertical_tolerance: f64,
    surface_priority: Vec<ObjectClass>,
}

impl SupportResolver {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            iou_threshold: thresholds.iou_threshold,
            horizontal_overlap_fraction: thresholds.horizontal_overlap_fraction,
            vertical_tolerance: thresholds.vertical_tolerance,
            surface_priority: thresholds.surface_priority.clone(),
        }
    }

    /// Person's feet are no lower than the surface's bottom and no higher
    /// than `vertical_tolerance` surface-heights above its top.
    pub fn vertical_position_ok(&self, person: &Detection, surface: &Detection) -> bool {
        let bottom = person.bbox.y2 as f64;
        let top_limit =
            surface.bbox.y1 as f64 - surface.bbox.height() as f64 * self.vertical_tolerance;
        bottom <= surface.bbox.y2 as f64 && bottom >= top_limit
    }

    /// Evaluate one person against one surface.
    pub fn supports(&self, person: &Detection, surface: &Detection) -> Option<(f64, f64)> {
        let iou = person.bbox.iou(&surface.bbox);
        let horizontal_fraction = person.bbox.horizontal_fraction(&surface.bbox);
        let ok = iou > self.iou_threshold
            && horizontal_fraction > self.horizontal_overlap_fraction
            && self.vertical_position_ok(person, surface);
        ok.then_some((iou, horizontal_fraction))
    }

    /// First surface, in priority then detection order, supporting `person`.
    pub fn find_support(&self, person: &Detection, frame: &FrameDetections) -> Option<Support> {
        for &class in &self.surface_priority {
            for (index, surface) in frame.get(class).iter().enumerate() {
                if let Some((iou, horizontal_fraction)) = self.supports(person, surface) {
                    return Some(Support {
                        class,
                        index,
                        surface: *surface,
                        iou,
                        horizontal_fraction,
                    });
                }
            }
        }
        None
    }

    /// One decision per person, in detection order.
    pub fn resolve(&self, frame: &FrameDetections) -> Vec<SupportDecision> {
        frame
            .persons()
            .iter()
            .map(|person| self.decide(person, frame))
            .collect()
    }

    pub fn decide(&self, person: &Detection, frame: &FrameDetections) -> SupportDecision {
        let support = self.find_support(person, frame);
        SupportDecision {
            person: *person,
            support,
            actually_fallen: support.is_none(),
        }
    }

    /// Frame verdict over every person; `false` when there are no persons.
    pub fn any_actually_fallen(&self, frame: &FrameDetections) -> bool {
        self.resolve(frame).iter().any(|d| d.actually_fallen)
    }
}

impl Default for SupportResolver {
    fn default() -> Self {
        Self::new(&Thresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn det(class: ObjectClass, x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection::new(class, BoundingBox::new(x1, y1, x2, y2), 0.9)
    }

    fn lying_person() -> Detection {
        det(ObjectClass::Person, 100, 200, 260, 260)
    }

    #[test]
    fn person_on_bed_is_supported() {
        let mut frame = FrameDetections::new();
        frame.push(lying_person());
        frame.push(det(ObjectClass::Bed, 80, 180, 280, 280));

        let decisions = SupportResolver::default().resolve(&frame);
        assert_eq!(decisions.len(), 1);
        assert!(!decisions[0].actually_fallen);
        let support = decisions[0].support.unwrap();
        assert_eq!(support.class, ObjectClass::Bed);
        assert!((support.iou - 0.48).abs() < 1e-9);
        assert_eq!(support.horizontal_fraction, 1.0);
    }

    #[test]
    fn person_without_furniture_is_fallen() {
        let mut frame = FrameDetections::new();
        frame.push(lying_person());
        let resolver = SupportResolver::default();
        assert!(resolver.resolve(&frame)[0].actually_fallen);
        assert!(resolver.any_actually_fallen(&frame));
    }

    #[test]
    fn no_persons_means_no_fall() {
        let mut frame = FrameDetections::new();
        frame.push(det(ObjectClass::Bed, 80, 180, 280, 280));
        let resolver = SupportResolver::default();
        assert!(resolver.resolve(&frame).is_empty());
        assert!(!resolver.any_actually_fallen(&frame));
    }

    #[test]
    fn feet_below_surface_bottom_are_not_supported() {
        let resolver = SupportResolver::default();
        let person = det(ObjectClass::Person, 100, 230, 260, 290);
        let bed = det(ObjectClass::Bed, 80, 180, 280, 280);
        assert!(!resolver.vertical_position_ok(&person, &bed));
        assert!(resolver.supports(&person, &bed).is_none());
    }

    #[test]
    fn vertical_tolerance_bounds_are_inclusive() {
        let resolver = SupportResolver::default();
        // bed height 100 -> feet may be as high as y = 100 - 35 = 65
        let bed = det(ObjectClass::Bed, 0, 100, 200, 200);
        assert!(resolver.vertical_position_ok(&det(ObjectClass::Person, 0, 0, 10, 65), &bed));
        assert!(!resolver.vertical_position_ok(&det(ObjectClass::Person, 0, 0, 10, 64), &bed));
        assert!(resolver.vertical_position_ok(&det(ObjectClass::Person, 0, 0, 10, 200), &bed));
        assert!(!resolver.vertical_position_ok(&det(ObjectClass::Person, 0, 0, 10, 201), &bed));
    }

    #[test]
    fn narrow_overlap_is_not_support() {
        let resolver = SupportResolver::default();
        // Chair covers 40% of the person's width.
        let person = det(ObjectClass::Person, 0, 200, 100, 250);
        let chair = det(ObjectClass::Chair, 60, 150, 200, 260);
        assert!(person.bbox.horizontal_fraction(&chair.bbox) < 0.5);
        assert!(resolver.supports(&person, &chair).is_none());
    }

    #[test]
    fn bed_wins_over_earlier_sofa() {
        let mut frame = FrameDetections::new();
        frame.push(lying_person());
        frame.push(det(ObjectClass::Sofa, 90, 190, 270, 270));
        frame.push(det(ObjectClass::Bed, 80, 180, 280, 280));
        let decision = SupportResolver::default().resolve(&frame)[0];
        assert_eq!(decision.support.unwrap().class, ObjectClass::Bed);
    }

    #[test]
    fn first_matching_detection_wins_within_class() {
        let mut frame = FrameDetections::new();
        frame.push(lying_person());
        frame.push(det(ObjectClass::Sofa, 0, 0, 20, 20)); // no overlap
        frame.push(det(ObjectClass::Sofa, 80, 180, 300, 300)); // looser fit
        frame.push(det(ObjectClass::Sofa, 95, 195, 265, 265)); // tighter fit
        let support = SupportResolver::default().resolve(&frame)[0].support.unwrap();
        assert_eq!(support.class, ObjectClass::Sofa);
        assert_eq!(support.index, 1);
    }

    #[test]
    fn custom_priority_changes_tie_break() {
        let thresholds = Thresholds {
            surface_priority: vec![ObjectClass::Chair, ObjectClass::Bed],
            ..Thresholds::default()
        };
        let mut frame = FrameDetections::new();
        frame.push(lying_person());
        frame.push(det(ObjectClass::Bed, 80, 180, 280, 280));
        frame.push(det(ObjectClass::Chair, 90, 190, 270, 270));
        frame.push(det(ObjectClass::Sofa, 90, 190, 270, 270));
        let support = SupportResolver::new(&thresholds).resolve(&frame)[0]
            .support
            .unwrap();
        assert_eq!(support.class, ObjectClass::Chair);
    }

    #[test]
    fn each_person_is_decided_independently() {
        let mut frame = FrameDetections::new();
        frame.push(lying_person());
        frame.push(det(ObjectClass::Person, 400, 300, 560, 360));
        frame.push(det(ObjectClass::Bed, 80, 180, 280, 280));
        let decisions = SupportResolver::default().resolve(&frame);
        assert!(!decisions[0].actually_fallen);
        assert!(decisions[1].actually_fallen);
    }
}
