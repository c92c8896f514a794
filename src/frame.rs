//! Frames and the shared "latest annotated frame" slot.
//!
//! - `Frame`: one captured RGB image with its capture sequence number.
//! - `AnnotatedFrame`: a frame with decision overlays drawn in.
//! - `LatestFrame`: single-slot handoff from the producer to any number of
//!   readers. Stale frames are replaced, never queued.

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::geometry::BoundingBox;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured frame. Pixels are packed RGB8, row-major.
#[derive(Clone, Debug)]
pub struct Frame {
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(seq: u64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            seq,
            width,
            height,
            pixels,
            captured_at: Instant::now(),
        })
    }

    /// Black frame of the given size.
    pub fn blank(seq: u64, width: u32, height: u32) -> Result<Self> {
        let len = rgb_len(width, height)?;
        Self::new(seq, width, height, vec![0; len])
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]])
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: [u8; 3]) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels[idx..idx + 3].copy_from_slice(&color);
    }

    /// Draw a rectangle outline `thickness` pixels wide, clipped to the frame.
    pub fn draw_rect(&mut self, bbox: &BoundingBox, color: [u8; 3], thickness: u32) {
        let Some(b) = bbox.clipped(self.width, self.height) else {
            return;
        };
        for t in 0..thickness as i32 {
            for x in b.x1..=b.x2 {
                self.put_pixel(x, b.y1 + t, color);
                self.put_pixel(x, b.y2 - t, color);
            }
            for y in b.y1..=b.y2 {
                self.put_pixel(b.x1 + t, y, color);
                self.put_pixel(b.x2 - t, y, color);
            }
        }
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// AnnotatedFrame
// ----------------------------------------------------------------------------

/// A box drawn onto a frame, with the caption that belongs above it.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    pub bbox: BoundingBox,
    pub label: String,
    pub color: [u8; 3],
}

/// Frame with decision overlays drawn in. Same dimensions as the source.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub overlays: Vec<Overlay>,
}

impl AnnotatedFrame {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            overlays: Vec::new(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.frame.seq
    }

    /// Draw `overlay` into the pixels and keep its caption.
    pub fn push_overlay(&mut self, overlay: Overlay) {
        self.frame.draw_rect(&overlay.bbox, overlay.color, 2);
        self.overlays.push(overlay);
    }

    /// Binary PPM (P6) encoding of the annotated pixels.
    pub fn to_ppm(&self) -> Vec<u8> {
        let header = format!("P6\n{} {}\n255\n", self.frame.width, self.frame.height);
        let mut out = Vec::with_capacity(header.len() + self.frame.pixels.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.frame.pixels);
        out
    }
}

// ----------------------------------------------------------------------------
// LatestFrame: single-slot producer -> readers handoff
// ----------------------------------------------------------------------------

/// Most recently completed annotated frame.
///
/// The producer replaces the slot wholesale; readers take a shared handle
/// under the lock and never hold it beyond the clone.
#[derive(Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<Arc<AnnotatedFrame>>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<AnnotatedFrame>>> {
        // A panicking reader must not take the producer down with it.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the slot wholesale. Sequence numbers are not compared: a
    /// restarted source numbers its frames from zero again.
    pub fn publish(&self, frame: Arc<AnnotatedFrame>) {
        *self.lock() = Some(frame);
    }

    pub fn get(&self) -> Option<Arc<AnnotatedFrame>> {
        self.lock().clone()
    }

    pub fn seq(&self) -> Option<u64> {
        self.lock().as_ref().map(|f| f.seq())
    }
}
