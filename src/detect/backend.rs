use anyhow::Result;

use crate::detect::result::FrameObservations;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend wraps the external object detector and pose estimator. It sees
/// the pixels of one frame and reports raw detections plus at most one pose.
/// Filtering and decisions happen downstream, never inside a backend.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection and pose estimation on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<FrameObservations>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<FrameObservations> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
