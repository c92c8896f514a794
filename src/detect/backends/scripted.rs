//! Replays recorded detector output.
//!
//! Scripts are JSON lines, one frame per line:
//!
//! ```text
//! {"t": 0.0, "detections": [{"label": "person", "bbox": [100,200,260,260], "confidence": 0.9}], "pose": [...]}
//! ```
//!
//! `t` (seconds since the start of the recording) is optional and only used
//! by offline replay; blank lines and lines starting with `#` are skipped.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::FrameObservations;
use crate::frame::Frame;

/// One recorded frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<f64>,
    #[serde(flatten)]
    pub observations: FrameObservations,
}

/// Parse a JSON-lines script.
pub fn parse_script(raw: &str) -> Result<Vec<ScriptEntry>> {
    let mut entries = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry: ScriptEntry = serde_json::from_str(line)
            .map_err(|e| anyhow!("script line {}: {}", lineno + 1, e))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Load a JSON-lines script from disk.
pub fn load_script(path: &Path) -> Result<Vec<ScriptEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    parse_script(&raw).with_context(|| format!("invalid script {}", path.display()))
}

/// Backend that returns scripted observations in order.
///
/// Once the script is exhausted the last entry is repeated, so a recording of
/// a person lying still keeps "lying" for as long as frames arrive.
pub struct ScriptedBackend {
    entries: Vec<FrameObservations>,
    cursor: usize,
}

impl ScriptedBackend {
    pub fn new(entries: Vec<FrameObservations>) -> Self {
        Self { entries, cursor: 0 }
    }

    pub fn from_script(entries: Vec<ScriptEntry>) -> Self {
        Self::new(entries.into_iter().map(|e| e.observations).collect())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::from_script(load_script(path)?))
    }

    pub fn exhausted(&self) -> bool {
        self.cursor >= self.entries.len()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<FrameObservations> {
        if let Some(entry) = self.entries.get(self.cursor) {
            self.cursor += 1;
            return Ok(entry.clone());
        }
        Ok(self.entries.last().cloned().unwrap_or_default())
    }
}
