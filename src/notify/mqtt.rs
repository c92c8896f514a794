//! MQTT sink (feature `notify-mqtt`).
//!
//! Publishes the `FALL_DETECTED` token to `<prefix>/alert` and the alert
//! summary as JSON to `<prefix>/alert/json`, both QoS 1, not retained.

use anyhow::{anyhow, Result};
use rumqttc::v5::{
    mqttbytes::QoS, Client, Connection, ConnectionError, Event, Incoming, MqttOptions,
};
use rumqttc::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::AlertSink;
use crate::pipeline::AlertEvent;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Parse `host:port`, `mqtt://host:port` or `mqtts://host:port`.
pub fn parse_broker(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();
    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }
    let (host, port) = match remainder.rsplit_once(':') {
        Some((host, port)) => (
            host,
            port.parse::<u16>()
                .map_err(|_| anyhow!("invalid MQTT port in {}", addr))?,
        ),
        None => (remainder, if use_tls { 8883 } else { 1883 }),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok(MqttEndpoint {
        host: host.to_string(),
        port,
        use_tls,
    })
}

const RECONNECT_MIN: Duration = Duration::from_millis(250);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Doubling pause between reconnect attempts, reset once the broker accepts
/// a connection.
#[derive(Debug)]
struct ReconnectBackoff {
    next: Duration,
}

impl ReconnectBackoff {
    fn new() -> Self {
        Self {
            next: RECONNECT_MIN,
        }
    }

    fn next_pause(&mut self) -> Duration {
        let pause = self.next;
        self.next = (self.next * 2).min(RECONNECT_MAX);
        pause
    }

    fn reset(&mut self) {
        self.next = RECONNECT_MIN;
    }
}

pub struct MqttSink {
    client: Client,
    topic_prefix: String,
    stop: Arc<AtomicBool>,
    connection_handle: Option<JoinHandle<()>>,
}

impl MqttSink {
    pub fn connect(broker: &str, client_id: &str, topic_prefix: &str) -> Result<Self> {
        let endpoint = parse_broker(broker)?;
        let mut options = MqttOptions::new(client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if endpoint.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        let (client, connection) = Client::new(options, 10);
        log::info!(
            "alert mqtt sink: {}:{} (TLS: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls
        );
        let stop = Arc::new(AtomicBool::new(false));
        Ok(Self {
            client,
            topic_prefix: topic_prefix.trim_end_matches('/').to_string(),
            connection_handle: Some(spawn_connection(connection, stop.clone())),
            stop,
        })
    }

    fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.topic_prefix, suffix)
    }

    /// True while the event loop thread is still driving the connection.
    pub fn is_running(&self) -> bool {
        self.connection_handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    pub fn disconnect(mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        let result = self.client.disconnect();
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
        result?;
        Ok(())
    }
}

/// Drive the event loop until the sink is disconnected. rumqttc reconnects
/// on the next poll after an error, so errors only pause the loop.
fn spawn_connection(mut connection: Connection, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut backoff = ReconnectBackoff::new();
        for event in connection.iter() {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    log::info!("MQTT connected");
                    backoff.reset();
                }
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(ConnectionError::RequestsDone) => break,
                Err(e) => {
                    let pause = backoff.next_pause();
                    log::warn!("MQTT connection error: {} (retrying in {:?})", e, pause);
                    pause_unless_stopped(&stop, pause);
                }
            }
        }
        log::debug!("MQTT event loop exited");
    })
}

fn pause_unless_stopped(stop: &AtomicBool, pause: Duration) {
    let slice = Duration::from_millis(50);
    let mut waited = Duration::ZERO;
    while waited < pause && !stop.load(Ordering::SeqCst) {
        let step = slice.min(pause - waited);
        std::thread::sleep(step);
        waited += step;
    }
}

impl AlertSink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn deliver(&mut self, alert: &AlertEvent) -> Result<()> {
        self.client.publish(
            self.topic("alert"),
            QoS::AtLeastOnce,
            false,
            alert.message.as_bytes().to_vec(),
        )?;
        let payload = serde_json::to_vec(&alert.summary())?;
        self.client
            .publish(self.topic("alert/json"), QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_broker_forms() {
        assert_eq!(
            parse_broker("localhost:1884").unwrap(),
            MqttEndpoint {
                host: "localhost".to_string(),
                port: 1884,
                use_tls: false
            }
        );
        let tls = parse_broker("mqtts://broker.local").unwrap();
        assert_eq!(tls.port, 8883);
        assert!(tls.use_tls);
        assert!(parse_broker("ws://broker:80").is_err());
        assert!(parse_broker("mqtt://:1883").is_err());
    }

    #[test]
    fn backoff_doubles_up_to_the_cap_and_resets() {
        let mut backoff = ReconnectBackoff::new();
        assert_eq!(backoff.next_pause(), RECONNECT_MIN);
        assert_eq!(backoff.next_pause(), RECONNECT_MIN * 2);
        for _ in 0..20 {
            backoff.next_pause();
        }
        assert_eq!(backoff.next_pause(), RECONNECT_MAX);
        backoff.reset();
        assert_eq!(backoff.next_pause(), RECONNECT_MIN);
    }

    #[test]
    fn unreachable_broker_keeps_the_sink_usable() -> Result<()> {
        use crate::frame::{AnnotatedFrame, Frame};

        // Nothing listens on port 1, so every connect attempt is refused.
        let mut sink = MqttSink::connect("127.0.0.1:1", "fall-test", "test/fall")?;
        std::thread::sleep(Duration::from_millis(600));
        assert!(sink.is_running());

        let frame = Arc::new(AnnotatedFrame::new(Frame::blank(1, 2, 2)?));
        let alert = AlertEvent::fall_detected(1, Duration::from_secs(5), frame);
        sink.deliver(&alert)?;
        assert!(sink.is_running());
        sink.disconnect()
    }
}
