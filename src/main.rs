// SPDX-License-Identifier: GPL-3.0-only

use clap::Parser;
use kinect_record::backends::device::frame_loop::StopSignal;
use kinect_record::config::Config;
use kinect_record::session::{self, Frontend};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "kinect-record")]
#[command(about = "Record depth, video and tilt telemetry to a session directory")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Session directory (created if absent)
    #[arg(value_name = "OUT_DIR")]
    out_dir: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=kinect_record=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let frontend = Frontend::from_config(&config);
    let stop = StopSignal::new();

    // In raw terminal mode Ctrl+C arrives as a key press instead
    if frontend == Frontend::Headless {
        let handler_stop = stop.clone();
        ctrlc::set_handler(move || handler_stop.request())?;
    }

    info!(out_dir = %cli.out_dir.display(), version = env!("GIT_VERSION"), "Starting session");
    match session::record(&cli.out_dir, &config, frontend, stop) {
        Ok(summary) => {
            info!(
                end = ?summary.capture.end,
                presented = summary.presented,
                "Session complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Session failed");
            Err(e.into())
        }
    }
}
