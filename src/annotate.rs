//! Decision overlays.
//!
//! Drawing is pure visualization: it reads a [`FrameDecision`] and never
//! feeds back into it. Captions travel with the frame as overlay metadata.

use crate::frame::{AnnotatedFrame, Frame, Overlay};
use crate::posture::Posture;
use crate::FrameDecision;

pub const SURFACE_COLOR: [u8; 3] = [0, 255, 255];
pub const STANDING_COLOR: [u8; 3] = [0, 255, 0];
pub const LYING_COLOR: [u8; 3] = [255, 0, 0];
pub const SUPPORTED_COLOR: [u8; 3] = [0, 255, 0];

pub const FALL_CAPTION: &str = "FALL DETECTED";

/// Draw surfaces, then persons, over `frame`.
pub fn annotate(frame: Frame, decision: &FrameDecision) -> AnnotatedFrame {
    let mut out = AnnotatedFrame::new(frame);

    for surface in decision.detections.iter().filter(|d| d.class.is_surface()) {
        out.push_overlay(Overlay {
            bbox: surface.bbox,
            label: surface.class.label().to_string(),
            color: SURFACE_COLOR,
        });
    }

    let mut support = decision.support.iter();
    for person in &decision.posture.persons {
        let overlay = match person.posture {
            Posture::Standing => Overlay {
                bbox: person.person.bbox,
                label: format!("Standing {:.2}", person.ratio),
                color: STANDING_COLOR,
            },
            Posture::Lying => match support.next().and_then(|d| d.support) {
                Some(s) => Overlay {
                    bbox: person.person.bbox,
                    label: format!("On {}", s.class),
                    color: SUPPORTED_COLOR,
                },
                None => Overlay {
                    bbox: person.person.bbox,
                    label: FALL_CAPTION.to_string(),
                    color: LYING_COLOR,
                },
            },
        };
        out.push_overlay(overlay);
    }
    out
}
