//! Bounded capture loop: read, adjust, write.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use log::{error, info, warn};

use crate::adjust::adjust;
use crate::config::CaptureConfig;
use crate::error::Result;
use crate::session::Session;
use crate::writer::{FrameSink, JpegWriter};

/// How a capture run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Every requested frame was attempted.
    Completed,
    /// The device could not be opened. Nothing was attempted.
    DeviceUnavailable(String),
    /// The device failed mid-run; remaining frames were not attempted.
    Aborted(String),
    /// Shutdown was requested between frames.
    Interrupted,
}

/// Outcome of a capture run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    /// Frames requested.
    pub requested: u32,
    /// Frames read from the device and handed to the writer.
    pub attempted: u32,
    /// Frames written.
    pub succeeded: u32,
    /// Frames read but not written.
    pub failed: u32,
    /// Failed read attempts, including retried ones.
    pub read_failures: u32,
    /// Files written, in order.
    pub files: Vec<PathBuf>,
    /// How the run ended.
    pub status: RunStatus,
}

impl CaptureReport {
    fn new(requested: u32) -> Self {
        Self {
            requested,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            read_failures: 0,
            files: Vec::new(),
            status: RunStatus::Completed,
        }
    }

    /// Frames never attempted because the run ended early.
    pub const fn not_attempted(&self) -> u32 {
        self.requested.saturating_sub(self.attempted)
    }

    /// Process exit code: 0 when at least one frame was written (or none
    /// were requested), 1 otherwise.
    pub const fn exit_code(&self) -> i32 {
        if self.succeeded > 0 || self.requested == 0 {
            0
        } else {
            1
        }
    }
}

impl std::fmt::Display for CaptureReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} frames written ({} write failures, {} read failures, {} not attempted)",
            self.succeeded,
            self.requested,
            self.failed,
            self.read_failures,
            self.not_attempted()
        )?;
        match &self.status {
            RunStatus::Completed => Ok(()),
            RunStatus::DeviceUnavailable(reason) => write!(f, "; device unavailable: {reason}"),
            RunStatus::Aborted(reason) => write!(f, "; aborted: {reason}"),
            RunStatus::Interrupted => write!(f, "; interrupted"),
        }
    }
}

/// Run a complete capture with the real device and a JPEG writer.
///
/// Invalid parameters are rejected before the device is touched. Every
/// other failure is described by the returned report.
pub fn run(config: &CaptureConfig, shutdown: &AtomicBool) -> Result<CaptureReport> {
    config.validate()?;

    let mut session = match Session::open(config) {
        Ok(session) => session,
        Err(err) => {
            error!("{err}");
            let mut report = CaptureReport::new(config.frame_count);
            report.status = RunStatus::DeviceUnavailable(err.to_string());
            return Ok(report);
        }
    };

    let mut writer = JpegWriter::new(&config.output_dir, config.jpeg_quality);
    let report = run_with(&mut session, &mut writer, config, shutdown);
    session.close();
    Ok(report)
}

/// Capture loop over an open session.
///
/// A failed write skips the frame without consuming a sequence number, so
/// written files are numbered without gaps. Read failures are retried up
/// to `config.max_read_failures` consecutive times.
pub fn run_with(
    session: &mut Session,
    sink: &mut dyn FrameSink,
    config: &CaptureConfig,
    shutdown: &AtomicBool,
) -> CaptureReport {
    let mut report = CaptureReport::new(config.frame_count);

    session.warm_up(config.settle_delay, config.warmup_frames, config.warmup_delay);
    info!(
        "capturing {} frames from {} (brightness {}, contrast {}, night {})",
        config.frame_count,
        session.label(),
        config.adjustment.brightness,
        config.adjustment.contrast,
        config.adjustment.night_mode
    );

    let mut sequence = 0u32;
    let mut consecutive_failures = 0u32;

    while report.attempted < config.frame_count {
        if shutdown.load(Ordering::Relaxed) {
            warn!("shutdown requested, stopping capture");
            report.status = RunStatus::Interrupted;
            break;
        }

        let frame = match session.read() {
            Ok(frame) => {
                consecutive_failures = 0;
                frame
            }
            Err(err) => {
                report.read_failures += 1;
                consecutive_failures += 1;
                if err.is_fatal() || consecutive_failures >= config.max_read_failures {
                    error!("giving up on {}: {err}", session.label());
                    report.status = RunStatus::Aborted(err.to_string());
                    break;
                }
                warn!(
                    "failed to grab frame (attempt {consecutive_failures}/{}): {err}",
                    config.max_read_failures
                );
                thread::sleep(config.retry_delay);
                continue;
            }
        };

        report.attempted += 1;
        let adjusted = adjust(&frame, &config.adjustment);
        match sink.write(&adjusted, sequence) {
            Ok(path) => {
                info!(
                    "[{}/{}] saved {} ({}x{}x{})",
                    report.attempted,
                    config.frame_count,
                    path.display(),
                    adjusted.width,
                    adjusted.height,
                    adjusted.channels()
                );
                sequence += 1;
                report.succeeded += 1;
                report.files.push(path);
            }
            Err(err) => {
                warn!("skipping frame {}: {err}", report.attempted);
                report.failed += 1;
            }
        }
    }

    report
}
