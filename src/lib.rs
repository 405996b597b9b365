//! Webcam-Capture: capture, adjust and save webcam frames
//!
//! This library reads frames from a V4L2 camera or an HTTP MJPEG source,
//! applies brightness, contrast and night-mode adjustments, and writes them
//! as numbered JPEG files. A preview module serves the adjusted stream over
//! HTTP with live controls.

pub mod adjust;
pub mod capture;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod network;
pub mod params;
pub mod preview;
pub mod session;
pub mod traits;
pub mod validation;
pub mod writer;

#[cfg(test)]
pub mod mock;

pub use adjust::adjust;
pub use capture::{run, run_with, CaptureReport, RunStatus};
pub use config::{Adjustment, CaptureConfig, DeviceId};
pub use device::V4L2Device;
pub use error::{CameraError, Result};
pub use frame::{Frame, PixelLayout};
pub use network::HttpMjpegDevice;
pub use params::ParameterStore;
pub use session::{Session, SessionState};
pub use traits::{CameraDevice, DeviceCapabilities, Format, FourCC, FrameMetadata, RawFrame};
pub use writer::{FrameSink, JpegWriter};
