//! Frame ingestion sources.
//!
//! A source hands the producer one frame at a time. Returning `Ok(None)`
//! means "no frame this cycle"; the producer pauses briefly and asks again.
//! Errors are transient from the producer's point of view and never stop the
//! loop.
//!
//! Only the synthetic `stub://` source ships in this crate. Camera capture is
//! provided by the embedding application through [`FrameSource`].

pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::config::SourceSettings;
use crate::frame::Frame;

pub use synthetic::SyntheticSource;

pub trait FrameSource: Send {
    /// Human-readable source description for logs.
    fn describe(&self) -> String;

    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}

/// Open the built-in source for `settings.url`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    if settings.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings.clone())?));
    }
    Err(anyhow!(
        "no built-in capture backend for '{}'; only stub:// sources are supported",
        settings.url
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_stub_and_rejects_others() {
        let mut settings = SourceSettings {
            url: "stub://kitchen".to_string(),
            target_fps: 5,
            width: 8,
            height: 8,
        };
        let source = open_source(&settings).unwrap();
        assert!(source.describe().contains("stub://kitchen"));

        settings.url = "rtsp://10.0.0.2/stream".to_string();
        assert!(open_source(&settings).is_err());
    }
}
