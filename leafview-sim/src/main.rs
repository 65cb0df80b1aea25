mod sim_host;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use leafview_core::barrier::RevealedFrame;
use leafview_core::host::Host;
use leafview_core::settings;
use leafview_core::{BatchId, CoordinatorEvent, OpenCoordinator, Rect, RestoreEntry, WindowId};
use serde::Serialize;

use crate::sim_host::{run_window_manager, SimHost};

/// Give up on a restore that has not revealed after this long.
const REVEAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Replay a saved LeafView session against a simulated window manager and
/// print what opened, what failed and where each window ended up.
#[derive(Parser, Debug)]
#[command(name = "leafview-sim")]
struct Args {
    /// Session file: a JSON array of restore entries
    session: PathBuf,

    /// Visible screen size, as WxH
    #[arg(long, value_parser = parse_screen, default_value = "1440x900")]
    screen: Rect,

    /// Delay before the simulated window manager constructs each window
    #[arg(long = "window-delay-ms", default_value_t = 50)]
    window_delay_ms: u64,

    /// Coordinator settings file (defaults to the user config dir)
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Args {
    fn window_delay(&self) -> Duration {
        Duration::from_millis(self.window_delay_ms)
    }
}

fn parse_screen(value: &str) -> Result<Rect, String> {
    let (w, h) = value
        .split_once('x')
        .ok_or_else(|| format!("invalid screen size '{}', expected WxH", value))?;
    let width: f64 = w.parse().map_err(|_| format!("invalid width '{}'", w))?;
    let height: f64 = h.parse().map_err(|_| format!("invalid height '{}'", h))?;
    if width <= 0.0 || height <= 0.0 {
        return Err(format!("screen size '{}' must be positive", value));
    }
    Ok(Rect::new(0.0, 0.0, width, height))
}

#[derive(Serialize)]
struct OpenedReport {
    window: WindowId,
    file_path: String,
    page: usize,
    page_count: usize,
}

#[derive(Serialize)]
struct FailedReport {
    file_path: String,
    reason: String,
}

#[derive(Serialize)]
struct RestoreReport {
    batch: BatchId,
    opened: Vec<OpenedReport>,
    failed: Vec<FailedReport>,
    revealed: Vec<RevealedFrame>,
    frames_applied: usize,
}

async fn run(args: Args) -> Result<RestoreReport, String> {
    let contents = std::fs::read_to_string(&args.session)
        .map_err(|e| format!("failed to read {}: {}", args.session.display(), e))?;
    let entries: Vec<RestoreEntry> = serde_json::from_str(&contents)
        .map_err(|e| format!("failed to parse {}: {}", args.session.display(), e))?;

    let settings = match &args.settings {
        Some(path) => settings::load_from(path),
        None => settings::load(),
    };
    log::debug!("Coordinator settings: {:?}", settings);

    let (host, requests) = SimHost::new(args.screen);
    let host = Arc::new(host);
    let (coordinator, mut events) = OpenCoordinator::new(Host::from_shared(host.clone()), settings);
    tokio::spawn(run_window_manager(
        coordinator.clone(),
        requests,
        args.window_delay(),
    ));

    log::info!(
        "Restoring {} window(s) from {}",
        entries.len(),
        args.session.display()
    );
    let restore = coordinator.clone();
    let started = tokio::spawn(async move { restore.request_session_restore(entries).await });

    let mut opened = Vec::new();
    let mut failed = Vec::new();
    let reveal = loop {
        let event = tokio::time::timeout(REVEAL_TIMEOUT, events.recv())
            .await
            .map_err(|_| format!("no reveal after {:?}", REVEAL_TIMEOUT))?
            .ok_or("coordinator stopped")?;
        match event {
            CoordinatorEvent::FileOpened {
                window,
                file_path,
                page,
                page_count,
            } => opened.push(OpenedReport {
                window,
                file_path,
                page,
                page_count,
            }),
            CoordinatorEvent::OpenFailed {
                file_path, reason, ..
            } => failed.push(FailedReport { file_path, reason }),
            CoordinatorEvent::FileNotFound { file_path } => {
                log::warn!("File not found: {}", file_path)
            }
            CoordinatorEvent::RestoreDropped { reason, .. } => return Err(reason),
            CoordinatorEvent::Revealed(reveal) => break reveal,
            CoordinatorEvent::RefreshLists { .. } => {}
        }
    };

    let batch = started
        .await
        .map_err(|e| format!("restore task failed: {}", e))?
        .map_err(|e| e.to_string())?;

    // Frames are applied by each window after the reveal fires.
    tokio::time::sleep(args.window_delay()).await;

    Ok(RestoreReport {
        batch,
        opened,
        failed,
        revealed: reveal.frames,
        frames_applied: host.applied_frames().len(),
    })
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Args::parse();

    match run(args).await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("leafview-sim: failed to serialize report: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("leafview-sim: {}", e);
            std::process::exit(1);
        }
    }
}
