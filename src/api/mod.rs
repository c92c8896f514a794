//! Loopback status and stream server.
//!
//! Routes (GET only):
//! - `/health`: liveness
//! - `/status`: monitor counters, confirmer state, latest per-class counts
//! - `/frame`: latest annotated frame as binary PPM
//! - `/alerts?since=N`: alerts with sequence number greater than `N`
//!
//! Requests from a non-loopback peer to a loopback listener are refused.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::monitor::{MonitorStats, StatsSnapshot};
use crate::notify::RecentAlerts;
use crate::pipeline::{AlertSummary, Pipeline};

const MAX_REQUEST_BYTES: usize = 8192;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8798".to_string(),
        }
    }
}

/// Read-only views the server answers from.
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Pipeline,
    pub stats: Arc<MonitorStats>,
    pub recent: RecentAlerts,
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusBody {
    uptime_secs: u64,
    latest_frame_seq: Option<u64>,
    #[serde(flatten)]
    stats: StatsSnapshot,
}

#[derive(Serialize)]
struct AlertsBody {
    since: u64,
    alerts: Vec<AlertSummary>,
}

pub struct ApiServer {
    cfg: ApiConfig,
    state: ApiState,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, state: ApiState) -> Self {
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let state = self.state;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, state, shutdown_thread) {
                log::error!("status api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, state: ApiState, shutdown: Arc<AtomicBool>) -> Result<()> {
    let started = Instant::now();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &state, started) {
                    log::warn!("status api request failed: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, state: &ApiState, started: Instant) -> Result<()> {
    // Accepted sockets inherit non-blocking mode on some platforms.
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }
    match request.path.as_str() {
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        "/status" => {
            let body = StatusBody {
                uptime_secs: started.elapsed().as_secs(),
                latest_frame_seq: state.pipeline.latest.seq(),
                stats: state.stats.snapshot(&state.pipeline),
            };
            let payload = serde_json::to_vec(&body)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        "/frame" => match state.pipeline.latest.get() {
            Some(frame) => write_response(&mut stream, 200, "image/x-portable-pixmap", &frame.to_ppm()),
            None => write_json_response(&mut stream, 404, r#"{"error":"no_frame"}"#),
        },
        "/alerts" => {
            let since = match request.query_u64("since") {
                Ok(since) => since.unwrap_or(0),
                Err(_) => {
                    return write_json_response(&mut stream, 400, r#"{"error":"invalid_since"}"#);
                }
            };
            let body = AlertsBody {
                since,
                alerts: state.recent.since(since),
            };
            let payload = serde_json::to_vec(&body)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (raw_path, HashMap::new()),
    };
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query,
    })
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
}

impl HttpRequest {
    fn query_u64(&self, key: &str) -> Result<Option<u64>> {
        self.query
            .get(key)
            .map(|v| v.parse::<u64>().map_err(|_| anyhow!("invalid {}", key)))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parsing() {
        let q = parse_query("since=4&x=y&flag");
        assert_eq!(q.get("since").map(String::as_str), Some("4"));
        assert_eq!(q.get("x").map(String::as_str), Some("y"));
        assert!(!q.contains_key("flag"));

        let req = HttpRequest {
            method: "GET".to_string(),
            path: "/alerts".to_string(),
            query: parse_query("since=abc"),
        };
        assert!(req.query_u64("since").is_err());
        assert_eq!(req.query_u64("other").unwrap(), None);
    }
}
