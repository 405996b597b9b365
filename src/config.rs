//! Capture configuration and parameter validation.

use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CameraError, Result};

/// Accepted brightness offsets.
pub const BRIGHTNESS_RANGE: RangeInclusive<i32> = -50..=50;
/// Accepted contrast factors.
pub const CONTRAST_RANGE: RangeInclusive<f32> = 0.5..=2.0;

/// Largest accepted frame width or height.
pub const MAX_DIMENSION: u32 = 8192;

/// Capture source: a local V4L2 index or a network URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceId {
    /// `/dev/video{index}`.
    Local(u32),
    /// An `http://` MJPEG stream or snapshot URL.
    Network(String),
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::Local(0)
    }
}

impl FromStr for DeviceId {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CameraError::invalid("device", "empty device identifier"));
        }
        let index = s.strip_prefix("/dev/video").unwrap_or(s);
        Ok(index
            .parse::<u32>()
            .map_or_else(|_| Self::Network(s.to_owned()), Self::Local))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(index) => write!(f, "/dev/video{index}"),
            Self::Network(url) => f.write_str(url),
        }
    }
}

/// Brightness/contrast/night-mode settings applied to every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    /// Offset added to every channel.
    pub brightness: i32,
    /// Factor every channel is multiplied by.
    pub contrast: f32,
    /// Convert to luma before adjusting.
    pub night_mode: bool,
}

impl Default for Adjustment {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Adjustment {
    /// Leaves frames untouched.
    pub const IDENTITY: Self = Self {
        brightness: 0,
        contrast: 1.0,
        night_mode: false,
    };

    /// Settings used in night mode unless the user picks their own.
    pub const NIGHT_PRESET: Self = Self {
        brightness: -5,
        contrast: 1.3,
        night_mode: true,
    };

    /// Validated constructor.
    pub fn new(brightness: i32, contrast: f32, night_mode: bool) -> Result<Self> {
        let adjustment = Self {
            brightness,
            contrast,
            night_mode,
        };
        adjustment.validate()?;
        Ok(adjustment)
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<()> {
        validate_brightness(self.brightness)?;
        validate_contrast(self.contrast)
    }

    /// Whether applying this adjustment returns the input unchanged.
    pub fn is_identity(&self) -> bool {
        !self.night_mode && self.brightness == 0 && (self.contrast - 1.0).abs() < f32::EPSILON
    }
}

/// Check a brightness offset against [`BRIGHTNESS_RANGE`].
pub fn validate_brightness(brightness: i32) -> Result<()> {
    if BRIGHTNESS_RANGE.contains(&brightness) {
        Ok(())
    } else {
        Err(CameraError::invalid(
            "brightness",
            format!(
                "{brightness} is outside {}..={}",
                BRIGHTNESS_RANGE.start(),
                BRIGHTNESS_RANGE.end()
            ),
        ))
    }
}

/// Check a contrast factor against [`CONTRAST_RANGE`]. NaN is rejected.
pub fn validate_contrast(contrast: f32) -> Result<()> {
    if CONTRAST_RANGE.contains(&contrast) {
        Ok(())
    } else {
        Err(CameraError::invalid(
            "contrast",
            format!(
                "{contrast} is outside {}..={}",
                CONTRAST_RANGE.start(),
                CONTRAST_RANGE.end()
            ),
        ))
    }
}

/// Driver controls requested while night mode is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightControls {
    /// Absolute exposure, 100 µs units.
    pub exposure: i64,
    /// Sensor gain.
    pub gain: i64,
    /// Driver-side brightness.
    pub brightness: i64,
}

impl Default for NightControls {
    fn default() -> Self {
        Self {
            exposure: 1000,
            gain: 40,
            brightness: 20,
        }
    }
}

/// Everything a capture run needs. Immutable once the run starts.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Capture source.
    pub device: DeviceId,
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
    /// Per-frame adjustment.
    pub adjustment: Adjustment,
    /// Number of frames to capture.
    pub frame_count: u32,
    /// Directory receiving `frame_NNNN.jpg` files.
    pub output_dir: PathBuf,
    /// Driver controls used when night mode is on.
    pub night_controls: NightControls,
    /// Longest a single read may block.
    pub read_timeout: Option<Duration>,
    /// Consecutive read failures tolerated before aborting.
    pub max_read_failures: u32,
    /// Pause after a failed read.
    pub retry_delay: Duration,
    /// Pause after opening the device, before the first warm-up read.
    pub settle_delay: Duration,
    /// Frames discarded after opening the device.
    pub warmup_frames: u32,
    /// Pause after each warm-up read.
    pub warmup_delay: Duration,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: DeviceId::default(),
            width: 1280,
            height: 720,
            adjustment: Adjustment::IDENTITY,
            frame_count: 10,
            output_dir: PathBuf::from("./frames"),
            night_controls: NightControls::default(),
            read_timeout: Some(Duration::from_secs(5)),
            max_read_failures: 3,
            retry_delay: Duration::from_millis(100),
            settle_delay: Duration::from_secs(2),
            warmup_frames: 5,
            warmup_delay: Duration::from_millis(200),
            jpeg_quality: 95,
        }
    }
}

impl CaptureConfig {
    /// Check every parameter before any device access.
    pub fn validate(&self) -> Result<()> {
        self.adjustment.validate()?;
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::invalid(
                "resolution",
                format!("{}x{} has a zero dimension", self.width, self.height),
            ));
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(CameraError::invalid(
                "resolution",
                format!(
                    "{}x{} exceeds {MAX_DIMENSION} pixels per side",
                    self.width, self.height
                ),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CameraError::invalid(
                "quality",
                format!("{} is outside 1..=100", self.jpeg_quality),
            ));
        }
        if self.max_read_failures == 0 {
            return Err(CameraError::invalid(
                "max_read_failures",
                "at least one read attempt is required",
            ));
        }
        Ok(())
    }
}
