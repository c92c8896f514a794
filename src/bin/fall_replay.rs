//! fall_replay - run recorded detector output through the fall engine.
//!
//! The script is JSON lines, one frame per line, each with an optional `t`
//! (seconds since the start of the recording). Frames without `t` are spaced
//! at `1 / --fps`. Alerts are printed to stdout; `--json` also prints one
//! decision summary per frame.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use fall_witness::detect::load_script;
use fall_witness::{DecisionSummary, FallEngine, MonitorConfig};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "fall_replay",
    about = "Replay recorded detections through the fall engine"
)]
struct Args {
    /// JSON-lines detector script
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,

    /// Config file (.toml or .json) supplying thresholds
    #[arg(long, env = "FALL_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the sustain duration in seconds
    #[arg(long, value_name = "SECS")]
    sustain_secs: Option<f64>,

    /// Frame rate assumed for entries without a timestamp
    #[arg(long, default_value_t = 15.0)]
    fps: f64,

    /// Print a JSON decision summary for every frame
    #[arg(long)]
    json: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Serialize)]
struct FrameLine {
    frame: usize,
    t: f64,
    #[serde(flatten)]
    summary: DecisionSummary,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(&args.ui, is_tty, !stdout_is_tty);

    if !(args.fps.is_finite() && args.fps > 0.0) {
        return Err(anyhow!("--fps must be positive"));
    }

    let mut thresholds = {
        let _stage = ui.stage("Load config");
        match &args.config {
            Some(path) => MonitorConfig::load_from(path)?.thresholds,
            None => MonitorConfig::load()?.thresholds,
        }
    };
    if let Some(secs) = args.sustain_secs {
        thresholds.sustain_seconds = secs;
        thresholds.validate()?;
    }

    let entries = {
        let _stage = ui.stage("Load script");
        load_script(&args.script)?
    };

    let mut engine = FallEngine::new(&thresholds);
    let progress = ui.frames(entries.len() as u64);
    let base = Instant::now();
    let mut last_t = 0.0_f64;
    let mut alerts = 0u64;

    for (index, entry) in entries.iter().enumerate() {
        let t = entry.t.unwrap_or(index as f64 / args.fps);
        if !t.is_finite() || t < last_t {
            return Err(anyhow!(
                "frame {}: timestamp {} goes backwards (previous {})",
                index,
                t,
                last_t
            ));
        }
        last_t = t;

        let decision = engine.evaluate(&entry.observations, base + Duration::from_secs_f64(t));
        if args.json {
            let line = FrameLine {
                frame: index,
                t,
                summary: decision.summary(),
            };
            println!("{}", serde_json::to_string(&line)?);
        }
        if let Some(confirmation) = decision.confirmation {
            alerts += 1;
            let msg = format!(
                "FALL_DETECTED #{} frame={} t={:.2}s sustained={:.2}s",
                alerts,
                index,
                t,
                confirmation.elapsed().as_secs_f64()
            );
            if args.json {
                progress.note(&msg);
            } else {
                println!("{msg}");
            }
        }
        progress.inc();
    }
    progress.finish(alerts);

    eprintln!("{} frames replayed, {} alerts", entries.len(), alerts);
    Ok(())
}
