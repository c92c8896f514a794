use anyhow::Result;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use fall_witness::api::{ApiConfig, ApiServer, ApiState};
use fall_witness::config::SourceSettings;
use fall_witness::detect::{ScriptedBackend, TOTAL_LANDMARKS};
use fall_witness::notify::{AlertDispatcher, RecentAlerts};
use fall_witness::{
    BoundingBox, FallMonitor, FrameObservations, Keypoint, MonitorConfig, Pipeline,
    RawDetection, SyntheticSource,
};

fn lying_on_floor() -> FrameObservations {
    FrameObservations {
        detections: vec![RawDetection::new(
            "person",
            BoundingBox::new(20, 40, 100, 70),
            0.9,
        )],
        pose: vec![Keypoint::new(60, 55, 0.9); TOTAL_LANDMARKS],
    }
}

fn get(addr: SocketAddr, path: &str) -> Result<(String, Vec<u8>)> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    write!(stream, "GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path)?;
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw)?;
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| anyhow::anyhow!("no header terminator"))?;
    let headers = String::from_utf8_lossy(&raw[..split]).to_string();
    Ok((headers, raw[split + 4..].to_vec()))
}

fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn monitor_raises_alert_and_serves_it() -> Result<()> {
    let mut config = MonitorConfig::default();
    config.thresholds.sustain_seconds = 0.2;
    config.source = SourceSettings {
        url: "stub://test_room".to_string(),
        target_fps: 50,
        width: 120,
        height: 90,
    };
    config.pacing.frame_interval = Duration::from_millis(5);
    config.alerts.poll_interval = Duration::from_millis(20);

    let pipeline = Pipeline::new(None);
    let recent = RecentAlerts::new(8);
    let source = SyntheticSource::new(config.source.clone())?;
    let backend = ScriptedBackend::new(vec![lying_on_floor()]);

    let monitor = FallMonitor::new(&config, Box::new(source), Box::new(backend), pipeline.clone());
    let stats = monitor.stats();
    let dispatcher = AlertDispatcher::new(pipeline.alerts.clone(), config.alerts.poll_interval)
        .with_sink(Box::new(recent.clone()));
    let dispatcher_handle = dispatcher.spawn(pipeline.shutdown.clone())?;
    let monitor_handle = monitor.spawn()?;
    let api_handle = ApiServer::new(
        ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        },
        ApiState {
            pipeline: pipeline.clone(),
            stats: stats.clone(),
            recent: recent.clone(),
        },
    )
    .spawn()?;

    assert!(
        wait_for(Duration::from_secs(10), || !recent.is_empty()),
        "no alert delivered"
    );

    let (headers, body) = get(api_handle.addr, "/health")?;
    assert!(headers.starts_with("HTTP/1.1 200"));
    assert_eq!(body, br#"{"status":"ok"}"#);

    let (headers, body) = get(api_handle.addr, "/status")?;
    assert!(headers.starts_with("HTTP/1.1 200"));
    let status: Value = serde_json::from_slice(&body)?;
    assert!(status["frames_processed"].as_u64().unwrap_or(0) >= 1);
    assert!(status["alerts_emitted"].as_u64().unwrap_or(0) >= 1);
    assert!(status["latest_frame_seq"].is_u64());
    assert_eq!(status["last"]["summary"]["persons"], 1);

    let (headers, body) = get(api_handle.addr, "/frame")?;
    assert!(headers.contains("image/x-portable-pixmap"));
    assert!(body.starts_with(b"P6\n120 90\n255\n"));

    let (_, body) = get(api_handle.addr, "/alerts?since=0")?;
    let alerts: Value = serde_json::from_slice(&body)?;
    let first = &alerts["alerts"][0];
    assert_eq!(first["seq"], 1);
    assert_eq!(first["message"], "FALL_DETECTED");
    assert!(first["sustained_secs"].as_f64().unwrap_or(0.0) >= 0.2);

    let (headers, _) = get(api_handle.addr, "/alerts?since=nope")?;
    assert!(headers.starts_with("HTTP/1.1 400"));
    let (headers, _) = get(api_handle.addr, "/nowhere")?;
    assert!(headers.starts_with("HTTP/1.1 404"));

    api_handle.stop()?;
    monitor_handle.stop()?;
    dispatcher_handle.stop()?;
    assert!(pipeline.shutdown.is_triggered());
    Ok(())
}

#[test]
fn frame_endpoint_is_404_before_first_frame() -> Result<()> {
    let pipeline = Pipeline::new(None);
    let api_handle = ApiServer::new(
        ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        },
        ApiState {
            pipeline,
            stats: Default::default(),
            recent: RecentAlerts::new(4),
        },
    )
    .spawn()?;
    let (headers, body) = get(api_handle.addr, "/frame")?;
    assert!(headers.starts_with("HTTP/1.1 404"));
    assert_eq!(body, br#"{"error":"no_frame"}"#);
    let (_, body) = get(api_handle.addr, "/alerts")?;
    let alerts: Value = serde_json::from_slice(&body)?;
    assert_eq!(alerts["alerts"].as_array().map(Vec::len), Some(0));
    api_handle.stop()
}
