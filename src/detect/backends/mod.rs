pub mod scripted;
pub mod stub;

pub use scripted::{load_script, parse_script, ScriptEntry, ScriptedBackend};
pub use stub::StubBackend;
