//! Command-line arguments of the capture and preview binaries.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{Adjustment, CaptureConfig, DeviceId};
use crate::error::Result;

/// Capture a fixed number of adjusted frames from a webcam into JPEG files
#[derive(Parser, Debug)]
#[command(name = "webcam-capture")]
#[command(version, about, long_about = None)]
pub struct CaptureArgs {
    /// Camera index, /dev/videoN path or http:// MJPEG URL
    #[arg(short, long, default_value = "0")]
    pub device: DeviceId,

    /// Frame width
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Frame height
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Output directory
    #[arg(short, long, default_value = "./frames")]
    pub output: PathBuf,

    /// Number of frames to capture
    #[arg(short, long = "num-frames", default_value_t = 10)]
    pub num_frames: u32,

    /// Brightness offset, -50..50 (default 0, or -5 with --night)
    #[arg(short, long, allow_negative_numbers = true)]
    pub brightness: Option<i32>,

    /// Contrast factor, 0.5..2.0 (default 1.0, or 1.3 with --night)
    #[arg(short, long)]
    pub contrast: Option<f32>,

    /// Enable night mode (grayscale, long exposure, high gain)
    #[arg(long)]
    pub night: bool,

    /// JPEG quality, 1..100
    #[arg(long, default_value_t = 95)]
    pub quality: u8,

    /// Milliseconds to wait after opening the camera, before warm-up
    #[arg(long, default_value_t = 2000)]
    pub settle_ms: u64,

    /// Frames discarded while exposure settles
    #[arg(long, default_value_t = 5)]
    pub warmup_frames: u32,

    /// Read timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub timeout_ms: u64,
}

impl CaptureArgs {
    /// Validated run configuration.
    ///
    /// With `--night`, brightness and contrast the user did not set come
    /// from the night preset.
    pub fn into_config(self) -> Result<CaptureConfig> {
        let base = if self.night {
            Adjustment::NIGHT_PRESET
        } else {
            Adjustment::IDENTITY
        };
        let adjustment = Adjustment::new(
            self.brightness.unwrap_or(base.brightness),
            self.contrast.unwrap_or(base.contrast),
            self.night,
        )?;

        let config = CaptureConfig {
            device: self.device,
            width: self.width,
            height: self.height,
            adjustment,
            frame_count: self.num_frames,
            output_dir: self.output,
            read_timeout: Some(Duration::from_millis(self.timeout_ms)),
            settle_delay: Duration::from_millis(self.settle_ms),
            warmup_frames: self.warmup_frames,
            jpeg_quality: self.quality,
            ..CaptureConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

/// Live webcam preview with brightness, contrast and night-mode controls
#[derive(Parser, Debug)]
#[command(name = "webcam-server")]
#[command(version, about, long_about = None)]
pub struct ServerArgs {
    /// Camera index, /dev/videoN path or http:// MJPEG URL
    #[arg(short, long, default_value = "0")]
    pub device: DeviceId,

    /// Frame width
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Frame height
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:5000")]
    pub bind: String,

    /// Directory for snapshots taken from the page
    #[arg(short, long, default_value = "./frames")]
    pub output: PathBuf,

    /// JPEG quality of streamed frames, 1..100
    #[arg(long, default_value_t = 80)]
    pub quality: u8,

    /// Start in night mode
    #[arg(long)]
    pub night: bool,
}

impl ServerArgs {
    /// Validated device configuration for the preview producer.
    pub fn to_config(&self) -> Result<CaptureConfig> {
        let config = CaptureConfig {
            device: self.device.clone(),
            width: self.width,
            height: self.height,
            adjustment: Adjustment {
                night_mode: self.night,
                ..Adjustment::IDENTITY
            },
            output_dir: self.output.clone(),
            jpeg_quality: self.quality,
            ..CaptureConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}
