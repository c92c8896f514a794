//! Synthetic frame source for `stub://` URLs.
//!
//! Produces frames of the configured size, paced to the configured frame
//! rate. Used by the daemon when no capture device is wired in, and by tests.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use super::FrameSource;
use crate::config::SourceSettings;
use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct SyntheticStats {
    pub frames_captured: u64,
    pub url: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

pub struct SyntheticSource {
    settings: SourceSettings,
    period: Duration,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    /// Background tint, shifted now and then so consecutive frames differ.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(settings: SourceSettings) -> Result<Self> {
        if !settings.url.starts_with("stub://") {
            return Err(anyhow!("synthetic source requires a stub:// url"));
        }
        if settings.width == 0 || settings.height == 0 {
            return Err(anyhow!("synthetic source needs a non-zero frame size"));
        }
        let period = Duration::from_secs_f64(1.0 / settings.target_fps.max(1) as f64);
        log::info!(
            "SyntheticSource: {} at {}x{} / {} fps",
            settings.url,
            settings.width,
            settings.height,
            settings.target_fps
        );
        Ok(Self {
            settings,
            period,
            frame_count: 0,
            last_frame_at: None,
            scene_state: 0,
        })
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(16);
        }
        let len = self.settings.width as usize * self.settings.height as usize * 3;
        vec![self.scene_state / 4; len]
    }

    pub fn stats(&self) -> SyntheticStats {
        SyntheticStats {
            frames_captured: self.frame_count,
            url: self.settings.url.clone(),
        }
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("{} (synthetic)", self.settings.url)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let now = Instant::now();
        if let Some(last) = self.last_frame_at {
            if now.saturating_duration_since(last) < self.period {
                return Ok(None);
            }
        }
        self.last_frame_at = Some(now);
        let seq = self.frame_count;
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(seq, self.settings.width, self.settings.height, pixels).map(Some)
    }
}
