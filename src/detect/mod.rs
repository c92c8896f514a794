mod aggregate;
mod backend;
mod backends;
mod result;

pub use aggregate::{DetectionAggregator, FrameDetections};
pub use backend::DetectorBackend;
pub use backends::{load_script, parse_script, ScriptEntry, ScriptedBackend, StubBackend};
pub use result::{
    Detection, FrameObservations, Keypoint, ObjectClass, RawDetection, TOTAL_LANDMARKS,
};
