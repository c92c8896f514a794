use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use fall_witness::{MonitorConfig, ObjectClass};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FALL_CONFIG",
        "FALL_SOURCE_URL",
        "FALL_API_ADDR",
        "FALL_CONF_THRESHOLD",
        "FALL_SUSTAIN_SECS",
        "FALL_ALERT_QUEUE_CAPACITY",
        "FALL_WEBHOOK_URL",
        "FALL_MQTT_BROKER",
        "FALL_SCRIPT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "thresholds": {
            "conf_threshold": 0.7,
            "vertical_tolerance": 0.5,
            "surface_priority": ["sofa", "bed"]
        },
        "source": {
            "url": "stub://bedroom",
            "target_fps": 8,
            "width": 640,
            "height": 480
        },
        "api": { "addr": "127.0.0.1:9100" },
        "alerts": { "queue_capacity": 4, "recent_capacity": 10 },
        "pacing": { "frame_interval_ms": 5 }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("FALL_CONFIG", file.path());
    std::env::set_var("FALL_SUSTAIN_SECS", "3.5");
    std::env::set_var("FALL_SOURCE_URL", "stub://hallway");

    let cfg = MonitorConfig::load().expect("load config");

    assert_eq!(cfg.thresholds.conf_threshold, 0.7);
    assert_eq!(cfg.thresholds.vertical_tolerance, 0.5);
    assert_eq!(cfg.thresholds.iou_threshold, 0.1);
    assert_eq!(
        cfg.thresholds.surface_priority,
        vec![ObjectClass::Sofa, ObjectClass::Bed]
    );
    assert_eq!(cfg.thresholds.sustain(), Duration::from_secs_f64(3.5));
    assert_eq!(cfg.source.url, "stub://hallway");
    assert_eq!(cfg.source.target_fps, 8);
    assert_eq!(cfg.source.width, 640);
    assert_eq!(cfg.api.addr, "127.0.0.1:9100");
    assert!(cfg.api.enabled);
    assert_eq!(cfg.alerts.queue_capacity, Some(4));
    assert_eq!(cfg.alerts.recent_capacity, 10);
    assert_eq!(cfg.pacing.frame_interval, Duration::from_millis(5));
    assert_eq!(cfg.pacing.retry_pause, Duration::from_millis(10));

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
script_path = "/var/lib/fall/recording.jsonl"

[thresholds]
sustain_seconds = 2.0
lying_ratio_threshold = 1.3

[api]
enabled = false

[alerts]
mqtt_broker = "mqtt://127.0.0.1:1883"
mqtt_topic_prefix = "home/fall"
"#;
    file.write_all(toml.as_bytes()).expect("write config");

    let cfg = MonitorConfig::load_from(file.path()).expect("load config");
    assert_eq!(cfg.thresholds.sustain_seconds, 2.0);
    assert_eq!(cfg.thresholds.lying_ratio_threshold, 1.3);
    assert_eq!(cfg.thresholds.conf_threshold, 0.6);
    assert!(!cfg.api.enabled);
    assert_eq!(
        cfg.script_path.as_deref(),
        Some(std::path::Path::new("/var/lib/fall/recording.jsonl"))
    );
    assert_eq!(cfg.alerts.mqtt_broker.as_deref(), Some("mqtt://127.0.0.1:1883"));
    assert_eq!(cfg.alerts.mqtt_topic_prefix, "home/fall");
    assert_eq!(cfg.alerts.queue_capacity, None);

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let cfg = MonitorConfig::load().expect("load defaults");
    assert_eq!(cfg.source.url, "stub://room_camera");
    assert_eq!(cfg.api.addr, "127.0.0.1:8798");
    assert_eq!(cfg.thresholds.sustain(), Duration::from_secs(5));
    assert_eq!(cfg.alerts.poll_interval, Duration::from_secs(1));
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    std::env::set_var("FALL_SUSTAIN_SECS", "soon");
    assert!(MonitorConfig::load().is_err());

    std::env::set_var("FALL_SUSTAIN_SECS", "0");
    assert!(MonitorConfig::load().is_err());

    std::env::set_var("FALL_SUSTAIN_SECS", "1e20");
    let err = MonitorConfig::load().unwrap_err();
    assert!(err.to_string().contains("sustain_seconds"));
    clear_env();

    std::env::set_var("FALL_ALERT_QUEUE_CAPACITY", "0");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{"thresholds": {"surface_priority": ["person"]}}"#)
        .expect("write config");
    let err = MonitorConfig::load_from(file.path()).unwrap_err();
    assert!(err.to_string().contains("surface_priority"));

    let mut broken = NamedTempFile::new().expect("temp config");
    broken.write_all(b"{ not json").expect("write config");
    let err = MonitorConfig::load_from(broken.path()).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
