//! Webcam-capture binary: grab a fixed number of adjusted frames.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use log::warn;
use webcam_capture::cli::CaptureArgs;
use webcam_capture::{capture, CameraError};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match CaptureArgs::parse().into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::from(2);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        warn!("cannot install Ctrl-C handler: {err}");
    }

    match capture::run(&config, &shutdown) {
        Ok(report) => {
            println!("{report}");
            for path in &report.files {
                println!("  {}", path.display());
            }
            ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1))
        }
        Err(err @ CameraError::InvalidParameter { .. }) => {
            eprintln!("Error: {err}");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
