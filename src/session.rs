//! Device session: format negotiation, night controls and frame reads.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::{CaptureConfig, DeviceId, NightControls};
use crate::device::V4L2Device;
use crate::error::{CameraError, Result};
use crate::frame::Frame;
use crate::network::HttpMjpegDevice;
use crate::traits::{CameraControl, CameraDevice, DeviceCapabilities, Format, FourCC};

/// Driver buffers. Kept small so frames are fresh rather than queued.
const BUFFER_COUNT: u32 = 2;

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not opened yet.
    Idle,
    /// Configured and streaming, between reads.
    Open,
    /// A read is in progress.
    Capturing,
    /// Released. Terminal.
    Closed,
}

/// Exclusive handle on one capture source.
///
/// Dropping the session closes it; [`Session::close`] may be called any
/// number of times.
pub struct Session {
    device: Box<dyn CameraDevice>,
    label: String,
    format: Format,
    state: SessionState,
    night_active: bool,
    degraded: Vec<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("label", &self.label)
            .field("format", &self.format)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open the device named by `config.device` and configure it.
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let device: Box<dyn CameraDevice> = match &config.device {
            DeviceId::Local(index) => Box::new(V4L2Device::open(*index)?),
            DeviceId::Network(url) => Box::new(HttpMjpegDevice::open(url)?),
        };
        Self::with_device(device, config.device.to_string(), config)
    }

    /// Configure an already opened device.
    ///
    /// MJPEG at the requested resolution is tried first; a refusal falls
    /// back to the device's current pixel format. Night controls are
    /// best-effort.
    pub fn with_device(
        mut device: Box<dyn CameraDevice>,
        label: String,
        config: &CaptureConfig,
    ) -> Result<Self> {
        let caps = device.capabilities();
        if !caps.can_capture {
            return Err(CameraError::DeviceUnavailable {
                device: label,
                reason: format!("{} ({}) cannot capture video", caps.card, caps.driver),
            });
        }
        info!("opened {label}: {} ({})", caps.card, caps.driver);

        let mut degraded = Vec::new();
        let format = negotiate_format(device.as_mut(), &label, config, &mut degraded)?;

        if format.width != config.width || format.height != config.height {
            warn!(
                "{label} delivers {}x{} instead of the requested {}x{}",
                format.width, format.height, config.width, config.height
            );
        }

        let mut session = Self {
            device,
            label,
            format,
            state: SessionState::Idle,
            night_active: false,
            degraded,
        };

        if config.adjustment.night_mode {
            session.set_night_controls(true, &config.night_controls);
        }

        if let Err(err) = session
            .device
            .start_stream(BUFFER_COUNT, config.read_timeout)
        {
            session.close();
            return Err(err);
        }
        session.state = SessionState::Open;
        Ok(session)
    }

    /// Negotiated format.
    pub const fn format(&self) -> &Format {
        &self.format
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Settings the device refused, for reporting.
    pub fn degraded(&self) -> &[String] {
        &self.degraded
    }

    /// What the driver reported when the device was opened.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        self.device.capabilities()
    }

    /// Device label, e.g. `/dev/video0`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether night controls are currently requested from the device.
    pub const fn night_active(&self) -> bool {
        self.night_active
    }

    /// Read and decode one frame. Blocks until a frame arrives or the read
    /// timeout elapses.
    pub fn read(&mut self) -> Result<Frame> {
        if self.state == SessionState::Closed {
            return Err(CameraError::ReadFailure(format!(
                "{} session is closed",
                self.label
            )));
        }
        self.state = SessionState::Capturing;
        let result = self
            .device
            .next_frame()
            .and_then(|raw| Frame::decode(&raw, &self.format));
        self.state = SessionState::Open;
        result
    }

    /// Let exposure settle: wait `settle`, then discard `count` frames,
    /// pausing `delay` after each.
    pub fn warm_up(&mut self, settle: Duration, count: u32, delay: Duration) {
        if !settle.is_zero() {
            debug!("{}: settling for {settle:?}", self.label);
            thread::sleep(settle);
        }
        if count == 0 {
            return;
        }
        info!("warming up {} ({count} frames)", self.label);
        for attempt in 0..count {
            if let Err(err) = self.read() {
                debug!("warm-up read {attempt} failed: {err}");
            }
            thread::sleep(delay);
        }
    }

    /// Request (or release) the night-mode exposure and gain settings.
    ///
    /// Refused controls are logged as degraded capability; the session keeps
    /// running.
    pub fn set_night_controls(&mut self, enabled: bool, controls: &NightControls) {
        let requests: &[(CameraControl, i64)] = if enabled {
            &[
                (CameraControl::ExposureAuto, CameraControl::EXPOSURE_MANUAL),
                (CameraControl::ExposureAbsolute, controls.exposure),
                (CameraControl::Gain, controls.gain),
                (CameraControl::Brightness, controls.brightness),
            ]
        } else {
            &[
                (CameraControl::ExposureAuto, CameraControl::EXPOSURE_AUTO),
                (CameraControl::Gain, 0),
            ]
        };

        for &(control, value) in requests {
            if let Err(err) = self.device.set_control(control, value) {
                warn!("{}: night mode degraded: {err}", self.label);
                self.degraded.push(err.to_string());
            }
        }
        self.night_active = enabled;
    }

    /// Release the device. Safe to call more than once.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.device.release();
        self.state = SessionState::Closed;
        info!("closed {}", self.label);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn negotiate_format(
    device: &mut dyn CameraDevice,
    label: &str,
    config: &CaptureConfig,
    degraded: &mut Vec<String>,
) -> Result<Format> {
    let requested = Format::new(config.width, config.height, FourCC::MJPG);
    match device.set_format(&requested) {
        Ok(actual) if actual.fourcc == FourCC::MJPG => return Ok(actual),
        Ok(actual) => {
            let msg = format!("{label} does not offer MJPEG, driver chose {}", actual.fourcc);
            warn!("configuration rejected: {msg}");
            degraded.push(msg);
        }
        Err(err) => {
            warn!("{label}: {err}");
            degraded.push(err.to_string());
        }
    }

    let current = device.format().map_err(|err| CameraError::DeviceUnavailable {
        device: label.to_owned(),
        reason: err.to_string(),
    })?;
    let fallback = Format::new(config.width, config.height, current.fourcc);
    let mut format = device.set_format(&fallback).unwrap_or(current);

    if !format.fourcc.is_decodable() {
        let yuyv = Format::new(config.width, config.height, FourCC::YUYV);
        if let Ok(actual) = device.set_format(&yuyv) {
            format = actual;
        }
    }
    if !format.fourcc.is_decodable() {
        return Err(CameraError::DeviceUnavailable {
            device: label.to_owned(),
            reason: format!("no decodable pixel format (device offers {})", format.fourcc),
        });
    }
    info!(
        "{label}: using {}x{} {}",
        format.width, format.height, format.fourcc
    );
    Ok(format)
}
