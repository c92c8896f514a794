use std::time::{Duration, Instant};

use fall_witness::detect::TOTAL_LANDMARKS;
use fall_witness::{
    BoundingBox, ConfirmState, FallEngine, FrameObservations, Keypoint, RawDetection,
    Thresholds,
};

const FRAME_MS: u64 = 100;

/// A full pose whose landmarks all sit inside `bbox`.
fn pose_inside(bbox: BoundingBox) -> Vec<Keypoint> {
    let cx = (bbox.x1 + bbox.x2) / 2;
    let cy = (bbox.y1 + bbox.y2) / 2;
    vec![Keypoint::new(cx, cy, 0.9); TOTAL_LANDMARKS]
}

fn frame(person: BoundingBox, furniture: &[(&str, BoundingBox)]) -> FrameObservations {
    let mut detections = vec![RawDetection::new("person", person, 0.92)];
    detections.extend(
        furniture
            .iter()
            .map(|(label, bbox)| RawDetection::new(label, *bbox, 0.8)),
    );
    FrameObservations {
        detections,
        pose: pose_inside(person),
    }
}

/// Feed `frames` at 10 fps and return the indices that raised an alert.
fn replay(engine: &mut FallEngine, frames: impl Iterator<Item = FrameObservations>) -> Vec<usize> {
    let base = Instant::now();
    frames
        .enumerate()
        .filter_map(|(i, obs)| {
            let now = base + Duration::from_millis(i as u64 * FRAME_MS);
            engine.evaluate(&obs, now).confirmed().then_some(i)
        })
        .collect()
}

const STANDING: BoundingBox = BoundingBox::new(100, 100, 160, 260);
const LYING: BoundingBox = BoundingBox::new(100, 200, 260, 260);
const BED: BoundingBox = BoundingBox::new(80, 180, 280, 280);

#[test]
fn standing_person_never_alerts() {
    let mut engine = FallEngine::new(&Thresholds::default());
    let first = engine.evaluate(&frame(STANDING, &[]), Instant::now());
    assert_eq!(first.posture.persons.len(), 1);
    assert!((first.posture.persons[0].ratio - 160.0 / 60.0).abs() < 1e-4);
    assert!(!first.posture.fall_suspected);

    let alone = replay(&mut engine, (0..120).map(|_| frame(STANDING, &[])));
    let with_bed = replay(&mut engine, (0..120).map(|_| frame(STANDING, &[("bed", BED)])));
    assert!(alone.is_empty());
    assert!(with_bed.is_empty());
}

#[test]
fn unsupported_lying_person_alerts_once_after_five_seconds() {
    let mut engine = FallEngine::new(&Thresholds::default());
    let first = engine.evaluate(&frame(LYING, &[]), Instant::now());
    assert!(first.posture.fall_suspected);
    assert!(first.actually_fallen);
    engine.reset();

    // 0.0s .. 7.0s: onset at frame 0, sustain reached at frame 50.
    let alerts = replay(&mut engine, (0..=70).map(|_| frame(LYING, &[])));
    assert_eq!(alerts, vec![50]);
}

#[test]
fn person_lying_on_bed_is_supported() {
    let mut engine = FallEngine::new(&Thresholds::default());
    let decision = engine.evaluate(&frame(LYING, &[("bed", BED)]), Instant::now());
    assert!(decision.posture.fall_suspected);
    assert!(!decision.actually_fallen);
    let support = decision.support[0].support.expect("bed supports the person");
    assert!((support.iou - 0.48).abs() < 1e-9);
    assert_eq!(support.horizontal_fraction, 1.0);

    let alerts = replay(&mut engine, (0..200).map(|_| frame(LYING, &[("bed", BED)])));
    assert!(alerts.is_empty());
    assert_eq!(engine.confirmer().state(), ConfirmState::Idle);
}

#[test]
fn flickering_verdict_never_alerts() {
    let mut engine = FallEngine::new(&Thresholds::default());
    // 10 seconds, verdict alternating every frame.
    let frames = (0..100).map(|i| {
        if i % 2 == 0 {
            frame(LYING, &[])
        } else {
            frame(LYING, &[("bed", BED)])
        }
    });
    assert!(replay(&mut engine, frames).is_empty());
}

#[test]
fn poorly_visible_person_is_discarded_before_posture() {
    let mut engine = FallEngine::new(&Thresholds::default());
    let mut obs = frame(LYING, &[]);
    obs.detections[0].confidence = 0.99;
    // 16 of 33 landmarks visible inside the box.
    for kp in obs.pose.iter_mut().skip(16) {
        kp.visibility = 0.2;
    }
    let decision = engine.evaluate(&obs, Instant::now());
    assert!(decision.detections.persons().is_empty());
    assert!(decision.posture.persons.is_empty());
    assert!(!decision.actually_fallen);

    let alerts = replay(&mut engine, (0..80).map(|_| obs.clone()));
    assert!(alerts.is_empty());
}

#[test]
fn one_fallen_person_among_supported_ones_still_alerts() {
    let mut engine = FallEngine::new(&Thresholds::default());
    // Hangs off the foot of the bed: only a quarter of its width is covered.
    let floor = BoundingBox::new(240, 250, 400, 300);
    let obs = FrameObservations {
        detections: vec![
            RawDetection::new("person", LYING, 0.9),
            RawDetection::new("person", floor, 0.9),
            RawDetection::new("bed", BED, 0.8),
        ],
        // Every landmark lies where the two bodies overlap.
        pose: vec![Keypoint::new(250, 255, 0.9); TOTAL_LANDMARKS],
    };
    let decision = engine.evaluate(&obs, Instant::now());
    assert_eq!(decision.posture.persons.len(), 2);
    assert_eq!(decision.support.len(), 2);
    assert!(!decision.support[0].actually_fallen);
    assert!(decision.support[1].actually_fallen);
    assert!(decision.actually_fallen);
}

#[test]
fn standing_person_beside_sleeper_does_not_alert() {
    let mut engine = FallEngine::new(&Thresholds::default());
    let obs = FrameObservations {
        detections: vec![
            RawDetection::new("person", LYING, 0.9),
            RawDetection::new("person", BoundingBox::new(240, 120, 300, 258), 0.9),
            RawDetection::new("bed", BED, 0.8),
        ],
        pose: vec![Keypoint::new(250, 255, 0.9); TOTAL_LANDMARKS],
    };
    let decision = engine.evaluate(&obs, Instant::now());
    assert_eq!(decision.posture.persons.len(), 2);
    assert_eq!(decision.support.len(), 1);
    let alerts = replay(&mut engine, (0..80).map(|_| obs.clone()));
    assert!(alerts.is_empty());
}
