//! Core traits and types for camera device abstraction.

use std::time::Duration;

use crate::error::Result;

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");

    /// Whether frames in this format can be decoded into RGB.
    pub fn is_decodable(self) -> bool {
        self == Self::MJPG || self == Self::YUYV || self == Self::RGB3
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride). Zero for compressed formats.
    pub stride: u32,
    /// Total frame size in bytes. An upper bound for compressed formats.
    pub size: u32,
}

impl Format {
    /// Create a new format specification. Sizes saturate at `u32::MAX`.
    #[must_use]
    pub fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = match fourcc {
            FourCC::YUYV => width.saturating_mul(2),
            FourCC::RGB3 => width.saturating_mul(3),
            _ => 0,
        };
        let size = if stride == 0 {
            width.saturating_mul(height).saturating_mul(3)
        } else {
            stride.saturating_mul(height)
        };
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone, Default)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// An undecoded frame as delivered by the driver.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Raw frame data in the negotiated pixel format.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

/// Driver controls used by night mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraControl {
    /// Exposure mode menu (1 = manual, 3 = aperture priority/auto).
    ExposureAuto,
    /// Absolute exposure time in 100 µs units.
    ExposureAbsolute,
    /// Sensor gain.
    Gain,
    /// Driver-side brightness.
    Brightness,
}

impl CameraControl {
    /// `V4L2_EXPOSURE_MANUAL`.
    pub const EXPOSURE_MANUAL: i64 = 1;
    /// `V4L2_EXPOSURE_APERTURE_PRIORITY`.
    pub const EXPOSURE_AUTO: i64 = 3;

    /// V4L2 control identifier.
    pub const fn id(self) -> u32 {
        const CID_BASE: u32 = 0x0098_0900;
        const CID_CAMERA_CLASS_BASE: u32 = 0x009a_0900;
        match self {
            Self::Brightness => CID_BASE,
            Self::Gain => CID_BASE + 19,
            Self::ExposureAuto => CID_CAMERA_CLASS_BASE + 1,
            Self::ExposureAbsolute => CID_CAMERA_CLASS_BASE + 2,
        }
    }
}

impl std::fmt::Display for CameraControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ExposureAuto => "exposure_auto",
            Self::ExposureAbsolute => "exposure_absolute",
            Self::Gain => "gain",
            Self::Brightness => "brightness",
        };
        f.write_str(name)
    }
}

/// Abstraction over a capture source.
///
/// Implementations own the hardware (or network) handle. A device is
/// configured first, then streamed with [`CameraDevice::start_stream`] and
/// read with [`CameraDevice::next_frame`].
pub trait CameraDevice {
    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Get current format.
    fn format(&self) -> Result<Format>;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// Set a driver control.
    fn set_control(&mut self, control: CameraControl, value: i64) -> Result<()>;

    /// Start streaming with the specified number of buffers.
    fn start_stream(&mut self, buffer_count: u32, timeout: Option<Duration>) -> Result<()>;

    /// Capture the next frame from the stream.
    fn next_frame(&mut self) -> Result<RawFrame>;

    /// Stop streaming and release the handle.
    fn release(&mut self);
}
