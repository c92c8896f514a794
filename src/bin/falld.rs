//! falld - fall monitoring daemon
//!
//! This daemon:
//! 1. Acquires frames from the configured source
//! 2. Runs the detector backend on every frame
//! 3. Decides per frame whether a lying person is unsupported
//! 4. Raises one alert per sustained fall and hands it to the alert sinks
//! 5. Serves status, the latest annotated frame and recent alerts on loopback

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use fall_witness::{
    api::{ApiConfig, ApiServer, ApiState},
    detect::{DetectorBackend, ScriptedBackend, StubBackend},
    ingest,
    notify::{AlertDispatcher, LogSink, RecentAlerts},
    FallMonitor, MonitorConfig, Pipeline,
};

#[derive(Parser, Debug)]
#[command(name = "falld", about = "Fall monitoring daemon")]
struct Args {
    /// Config file (.toml or .json)
    #[arg(long, env = "FALL_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// JSON-lines detector script to replay instead of a live model
    #[arg(long, value_name = "PATH")]
    script: Option<PathBuf>,

    /// Do not start the status server
    #[arg(long)]
    no_api: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MonitorConfig::load_from(path)?,
        None => MonitorConfig::load()?,
    };
    if let Some(script) = args.script {
        config.script_path = Some(script);
    }

    let source = ingest::open_source(&config.source)?;
    let backend: Box<dyn DetectorBackend> = match &config.script_path {
        Some(path) => {
            log::info!("replaying detector script {}", path.display());
            Box::new(ScriptedBackend::from_path(path)?)
        }
        None => {
            log::warn!("no detector script configured; stub backend reports nothing");
            Box::new(StubBackend::new())
        }
    };

    let pipeline = Pipeline::new(config.alerts.queue_capacity);
    let recent = RecentAlerts::new(config.alerts.recent_capacity);
    let dispatcher = build_dispatcher(&config, &pipeline, &recent)?;

    let monitor = FallMonitor::new(&config, source, backend, pipeline.clone());
    let stats = monitor.stats();

    let dispatcher_handle = dispatcher.spawn(pipeline.shutdown.clone())?;
    let monitor_handle = monitor.spawn()?;

    let api_handle = if config.api.enabled && !args.no_api {
        let state = ApiState {
            pipeline: pipeline.clone(),
            stats,
            recent,
        };
        let handle = ApiServer::new(
            ApiConfig {
                addr: config.api.addr.clone(),
            },
            state,
        )
        .spawn()?;
        log::info!("status api listening on {}", handle.addr);
        Some(handle)
    } else {
        None
    };

    log::info!(
        "falld running: sustain={:.1}s conf>={:.2} source={}",
        config.thresholds.sustain_seconds,
        config.thresholds.conf_threshold,
        config.source.url
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    log::info!("falld waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping...");

    if let Some(handle) = api_handle {
        handle.stop()?;
    }
    monitor_handle.stop()?;
    dispatcher_handle.stop()?;
    Ok(())
}

fn build_dispatcher(
    config: &MonitorConfig,
    pipeline: &Pipeline,
    recent: &RecentAlerts,
) -> Result<AlertDispatcher> {
    let mut dispatcher = AlertDispatcher::new(pipeline.alerts.clone(), config.alerts.poll_interval)
        .with_sink(Box::new(LogSink))
        .with_sink(Box::new(recent.clone()));

    if let Some(url) = &config.alerts.webhook_url {
        #[cfg(feature = "notify-http")]
        dispatcher.add_sink(Box::new(fall_witness::notify::WebhookSink::new(url)?));
        #[cfg(not(feature = "notify-http"))]
        log::warn!("webhook {} ignored: built without the notify-http feature", url);
    }

    if let Some(broker) = &config.alerts.mqtt_broker {
        #[cfg(feature = "notify-mqtt")]
        dispatcher.add_sink(Box::new(fall_witness::notify::MqttSink::connect(
            broker,
            &config.alerts.mqtt_client_id,
            &config.alerts.mqtt_topic_prefix,
        )?));
        #[cfg(not(feature = "notify-mqtt"))]
        log::warn!("mqtt broker {} ignored: built without the notify-mqtt feature", broker);
    }

    Ok(dispatcher)
}
