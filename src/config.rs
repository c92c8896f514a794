use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::ObjectClass;

const DEFAULT_SOURCE_URL: &str = "stub://room_camera";
const DEFAULT_SOURCE_FPS: u32 = 15;
const DEFAULT_SOURCE_WIDTH: u32 = 320;
const DEFAULT_SOURCE_HEIGHT: u32 = 320;
const DEFAULT_API_ADDR: &str = "127.0.0.1:8798";
const DEFAULT_FRAME_INTERVAL_MS: u64 = 20;
const DEFAULT_RETRY_PAUSE_MS: u64 = 10;
const DEFAULT_ALERT_POLL_MS: u64 = 1000;
const DEFAULT_RECENT_ALERTS: usize = 32;
const DEFAULT_MQTT_TOPIC_PREFIX: &str = "fall_witness";
const DEFAULT_MQTT_CLIENT_ID: &str = "falld";

/// Fixed decision thresholds.
///
/// Every field may be omitted from a config file; missing fields keep their
/// defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum detector confidence for any object.
    pub conf_threshold: f32,
    /// Minimum landmark visibility for it to count toward body visibility.
    pub keypoint_visibility_threshold: f32,
    /// Minimum share of the 33 landmarks that must fall inside a person box.
    pub body_visibility_threshold: f64,
    /// A person box with `height / width` below this is lying.
    pub lying_ratio_threshold: f64,
    /// Person/surface IoU must exceed this to count as support.
    pub iou_threshold: f64,
    /// Share of the person's width the surface must cover.
    pub horizontal_overlap_fraction: f64,
    /// How far above a surface's top edge (in surface heights) feet may rest.
    pub vertical_tolerance: f64,
    /// How long an unsupported lying person must persist before alerting.
    pub sustain_seconds: f64,
    /// Surface classes in the order they are tried.
    pub surface_priority: Vec<ObjectClass>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            conf_threshold: 0.6,
            keypoint_visibility_threshold: 0.35,
            body_visibility_threshold: 0.5,
            lying_ratio_threshold: 1.15,
            iou_threshold: 0.1,
            horizontal_overlap_fraction: 0.5,
            vertical_tolerance: 0.35,
            sustain_seconds: 5.0,
            surface_priority: vec![ObjectClass::Bed, ObjectClass::Sofa, ObjectClass::Chair],
        }
    }
}

impl Thresholds {
    /// Sustain period as a `Duration`. Values `validate` would reject are
    /// clamped: non-positive or NaN to zero, too large to `Duration::MAX`.
    pub fn sustain(&self) -> Duration {
        Duration::try_from_secs_f64(self.sustain_seconds).unwrap_or(
            if self.sustain_seconds > 0.0 {
                Duration::MAX
            } else {
                Duration::ZERO
            },
        )
    }

    pub fn validate(&self) -> Result<()> {
        unit_interval("conf_threshold", self.conf_threshold as f64)?;
        unit_interval(
            "keypoint_visibility_threshold",
            self.keypoint_visibility_threshold as f64,
        )?;
        unit_interval("body_visibility_threshold", self.body_visibility_threshold)?;
        unit_interval("iou_threshold", self.iou_threshold)?;
        unit_interval(
            "horizontal_overlap_fraction",
            self.horizontal_overlap_fraction,
        )?;
        if !(self.lying_ratio_threshold.is_finite() && self.lying_ratio_threshold > 0.0) {
            return Err(anyhow!("lying_ratio_threshold must be positive"));
        }
        if !(self.vertical_tolerance.is_finite() && self.vertical_tolerance >= 0.0) {
            return Err(anyhow!("vertical_tolerance must be >= 0"));
        }
        if !(self.sustain_seconds.is_finite() && self.sustain_seconds > 0.0) {
            return Err(anyhow!("sustain_seconds must be greater than zero"));
        }
        if Duration::try_from_secs_f64(self.sustain_seconds).is_err() {
            return Err(anyhow!(
                "sustain_seconds is too large (got {})",
                self.sustain_seconds
            ));
        }
        if self.surface_priority.is_empty() {
            return Err(anyhow!("surface_priority must name at least one surface"));
        }
        for (i, class) in self.surface_priority.iter().enumerate() {
            if !class.is_surface() {
                return Err(anyhow!("surface_priority may not contain '{}'", class));
            }
            if self.surface_priority[..i].contains(class) {
                return Err(anyhow!("surface_priority lists '{}' twice", class));
            }
        }
        Ok(())
    }
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within 0..=1 (got {})", name, value));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    thresholds: Option<Thresholds>,
    source: Option<SourceConfigFile>,
    script_path: Option<PathBuf>,
    api: Option<ApiConfigFile>,
    alerts: Option<AlertConfigFile>,
    pacing: Option<PacingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    enabled: Option<bool>,
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    queue_capacity: Option<usize>,
    poll_interval_ms: Option<u64>,
    recent_capacity: Option<usize>,
    webhook_url: Option<String>,
    mqtt_broker: Option<String>,
    mqtt_topic_prefix: Option<String>,
    mqtt_client_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PacingConfigFile {
    frame_interval_ms: Option<u64>,
    retry_pause_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub thresholds: Thresholds,
    pub source: SourceSettings,
    /// Recorded detector output to replay instead of running a model.
    pub script_path: Option<PathBuf>,
    pub api: ApiSettings,
    pub alerts: AlertSettings,
    pub pacing: PacingSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub enabled: bool,
    pub addr: String,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    /// `None` keeps the alert queue unbounded.
    pub queue_capacity: Option<usize>,
    pub poll_interval: Duration,
    pub recent_capacity: usize,
    pub webhook_url: Option<String>,
    pub mqtt_broker: Option<String>,
    pub mqtt_topic_prefix: String,
    pub mqtt_client_id: String,
}

#[derive(Debug, Clone)]
pub struct PacingSettings {
    /// Sleep between processed frames.
    pub frame_interval: Duration,
    /// Sleep after a cycle with no frame available.
    pub retry_pause: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_file(MonitorConfigFile::default())
    }
}

impl MonitorConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FALL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit path, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let api = file.api.unwrap_or_default();
        let alerts = file.alerts.unwrap_or_default();
        let pacing = file.pacing.unwrap_or_default();
        Self {
            thresholds: file.thresholds.unwrap_or_default(),
            source: SourceSettings {
                url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            },
            script_path: file.script_path,
            api: ApiSettings {
                enabled: api.enabled.unwrap_or(true),
                addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            },
            alerts: AlertSettings {
                queue_capacity: alerts.queue_capacity,
                poll_interval: Duration::from_millis(
                    alerts.poll_interval_ms.unwrap_or(DEFAULT_ALERT_POLL_MS),
                ),
                recent_capacity: alerts.recent_capacity.unwrap_or(DEFAULT_RECENT_ALERTS),
                webhook_url: alerts.webhook_url,
                mqtt_broker: alerts.mqtt_broker,
                mqtt_topic_prefix: alerts
                    .mqtt_topic_prefix
                    .unwrap_or_else(|| DEFAULT_MQTT_TOPIC_PREFIX.to_string()),
                mqtt_client_id: alerts
                    .mqtt_client_id
                    .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
            },
            pacing: PacingSettings {
                frame_interval: Duration::from_millis(
                    pacing.frame_interval_ms.unwrap_or(DEFAULT_FRAME_INTERVAL_MS),
                ),
                retry_pause: Duration::from_millis(
                    pacing.retry_pause_ms.unwrap_or(DEFAULT_RETRY_PAUSE_MS),
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_nonempty("FALL_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(addr) = env_nonempty("FALL_API_ADDR") {
            self.api.addr = addr;
        }
        if let Some(script) = env_nonempty("FALL_SCRIPT") {
            self.script_path = Some(PathBuf::from(script));
        }
        if let Some(url) = env_nonempty("FALL_WEBHOOK_URL") {
            self.alerts.webhook_url = Some(url);
        }
        if let Some(broker) = env_nonempty("FALL_MQTT_BROKER") {
            self.alerts.mqtt_broker = Some(broker);
        }
        if let Some(conf) = env_nonempty("FALL_CONF_THRESHOLD") {
            self.thresholds.conf_threshold = conf
                .parse()
                .map_err(|_| anyhow!("FALL_CONF_THRESHOLD must be a number"))?;
        }
        if let Some(secs) = env_nonempty("FALL_SUSTAIN_SECS") {
            self.thresholds.sustain_seconds = secs
                .parse()
                .map_err(|_| anyhow!("FALL_SUSTAIN_SECS must be a number of seconds"))?;
        }
        if let Some(cap) = env_nonempty("FALL_ALERT_QUEUE_CAPACITY") {
            let cap: usize = cap
                .parse()
                .map_err(|_| anyhow!("FALL_ALERT_QUEUE_CAPACITY must be an integer"))?;
            self.alerts.queue_capacity = Some(cap);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be >= 1"));
        }
        if self.alerts.queue_capacity == Some(0) {
            return Err(anyhow!("alert queue_capacity must be greater than zero"));
        }
        if self.alerts.poll_interval.is_zero() {
            return Err(anyhow!("alert poll_interval_ms must be greater than zero"));
        }
        Ok(())
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
