//! HTTP webhook sink (feature `notify-http`).
//!
//! Each alert is posted as a JSON text message to the webhook URL, followed
//! by the annotated frame as a JPEG to `<url>/snapshot`. If the snapshot
//! upload fails a second text message reports it.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use super::AlertSink;
use crate::frame::AnnotatedFrame;
use crate::pipeline::AlertEvent;

const JPEG_QUALITY: u8 = 85;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct TextMessage<'a> {
    text: &'a str,
    event: &'a str,
    seq: u64,
    sustained_secs: f64,
    emitted_at_epoch_s: u64,
}

pub struct WebhookSink {
    agent: ureq::Agent,
    message_url: Url,
    snapshot_url: Url,
}

impl WebhookSink {
    pub fn new(url: &str) -> Result<Self> {
        let message_url = Url::parse(url).context("parse webhook url")?;
        if !matches!(message_url.scheme(), "http" | "https") {
            return Err(anyhow!("webhook url must be http or https: {}", url));
        }
        let mut snapshot_url = message_url.clone();
        snapshot_url
            .path_segments_mut()
            .map_err(|_| anyhow!("webhook url cannot take a path: {}", url))?
            .pop_if_empty()
            .push("snapshot");
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Ok(Self {
            agent,
            message_url,
            snapshot_url,
        })
    }

    pub fn snapshot_url(&self) -> &Url {
        &self.snapshot_url
    }

    fn post_text(&self, alert: &AlertEvent, text: &str) -> Result<()> {
        let body = serde_json::to_string(&TextMessage {
            text,
            event: alert.message,
            seq: alert.seq,
            sustained_secs: alert.sustained.as_secs_f64(),
            emitted_at_epoch_s: alert.emitted_at_epoch_s,
        })?;
        self.agent
            .post(self.message_url.as_str())
            .set("Content-Type", "application/json")
            .send_string(&body)
            .context("post webhook message")?;
        Ok(())
    }

    fn post_snapshot(&self, alert: &AlertEvent) -> Result<()> {
        let jpeg = encode_jpeg(&alert.frame)?;
        self.agent
            .post(self.snapshot_url.as_str())
            .set("Content-Type", "image/jpeg")
            .set("X-Alert-Seq", &alert.seq.to_string())
            .send_bytes(&jpeg)
            .context("post webhook snapshot")?;
        Ok(())
    }
}

impl AlertSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn deliver(&mut self, alert: &AlertEvent) -> Result<()> {
        self.post_text(alert, &alert.text())?;
        if let Err(err) = self.post_snapshot(alert) {
            log::warn!("snapshot upload for alert #{} failed: {}", alert.seq, err);
            self.post_text(alert, "Image upload failed")?;
        }
        Ok(())
    }
}

/// Encode the annotated pixels as a baseline JPEG.
pub fn encode_jpeg(frame: &AnnotatedFrame) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode(
            frame.frame.pixels(),
            frame.frame.width,
            frame.frame.height,
            ExtendedColorType::Rgb8,
        )
        .context("encode jpeg")?;
    Ok(out)
}
