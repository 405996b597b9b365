//! Mock device implementation for testing without hardware.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::{CameraError, Result};
use crate::frame::Frame;
use crate::traits::{
    CameraControl, CameraDevice, DeviceCapabilities, Format, FourCC, FrameMetadata, RawFrame,
};
use crate::writer::encode_jpeg;

/// Observations recorded by a [`MockDevice`], shared with the test.
#[derive(Debug, Clone, Default)]
pub struct MockRecorder {
    inner: Arc<Mutex<RecorderState>>,
}

#[derive(Debug, Default)]
struct RecorderState {
    releases: u32,
    reads: u32,
    controls: Vec<(CameraControl, i64)>,
}

impl MockRecorder {
    fn with<T>(&self, f: impl FnOnce(&mut RecorderState) -> T) -> T {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// How many times the device was released.
    pub fn releases(&self) -> u32 {
        self.with(|s| s.releases)
    }

    /// How many reads were attempted.
    pub fn reads(&self) -> u32 {
        self.with(|s| s.reads)
    }

    /// Controls accepted so far, in order.
    pub fn controls(&self) -> Vec<(CameraControl, i64)> {
        self.with(|s| s.controls.clone())
    }
}

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    frame_count: u32,
    pattern: TestPattern,
    mjpeg: bool,
    max_resolution: Option<(u32, u32)>,
    accept_controls: bool,
    failing_reads: HashSet<u32>,
    disconnect_after: Option<u32>,
    streaming: bool,
    recorder: MockRecorder,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(640, 480, FourCC::YUYV),
            frame_count: 0,
            pattern: TestPattern::ColorBars,
            mjpeg: true,
            max_resolution: None,
            accept_controls: true,
            failing_reads: HashSet::new(),
            disconnect_after: None,
            streaming: false,
            recorder: MockRecorder::default(),
        }
    }

    /// Set the test pattern for frame generation.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Share observations with `recorder`.
    #[must_use]
    pub fn with_recorder(mut self, recorder: MockRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    /// Refuse MJPEG, keeping YUYV.
    #[must_use]
    pub fn without_mjpeg(mut self) -> Self {
        self.mjpeg = false;
        self
    }

    /// Clamp requested resolutions like a real driver would.
    #[must_use]
    pub fn with_max_resolution(mut self, width: u32, height: u32) -> Self {
        self.max_resolution = Some((width, height));
        self
    }

    /// Refuse every control.
    #[must_use]
    pub fn rejecting_controls(mut self) -> Self {
        self.accept_controls = false;
        self
    }

    /// Report no capture capability.
    #[must_use]
    pub fn without_capture(mut self) -> Self {
        self.capabilities.can_capture = false;
        self
    }

    /// Fail the reads with these zero-based attempt numbers.
    #[must_use]
    pub fn with_read_failures(mut self, attempts: &[u32]) -> Self {
        self.failing_reads.extend(attempts);
        self
    }

    /// Behave as unplugged once `reads` read attempts were made.
    #[must_use]
    pub fn disconnect_after(mut self, reads: u32) -> Self {
        self.disconnect_after = Some(reads);
        self
    }
}

impl CameraDevice for MockDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        let fourcc = if format.fourcc == FourCC::MJPG && !self.mjpeg {
            FourCC::YUYV
        } else {
            format.fourcc
        };
        let (width, height) = match self.max_resolution {
            Some((w, h)) => (format.width.min(w), format.height.min(h)),
            None => (format.width, format.height),
        };
        self.format = Format::new(width, height, fourcc);
        Ok(self.format.clone())
    }

    fn set_control(&mut self, control: CameraControl, value: i64) -> Result<()> {
        if !self.accept_controls {
            return Err(CameraError::ConfigurationRejected(format!(
                "{control} not supported by mock"
            )));
        }
        self.recorder.with(|s| s.controls.push((control, value)));
        Ok(())
    }

    fn start_stream(&mut self, _buffer_count: u32, _timeout: Option<Duration>) -> Result<()> {
        self.streaming = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        let attempt = self.recorder.with(|s| {
            s.reads += 1;
            s.reads - 1
        });
        if !self.streaming {
            return Err(CameraError::ReadFailure("stream not started".to_owned()));
        }
        if self.disconnect_after.is_some_and(|limit| attempt >= limit) {
            return Err(CameraError::DeviceUnavailable {
                device: "mock".to_owned(),
                reason: "No such device".to_owned(),
            });
        }
        if self.failing_reads.contains(&attempt) {
            return Err(CameraError::ReadFailure(format!(
                "simulated failure on read {attempt}"
            )));
        }

        let yuyv = Format::new(self.format.width, self.format.height, FourCC::YUYV);
        let mut data = generate_test_frame(&yuyv, self.pattern);
        if self.format.fourcc == FourCC::MJPG {
            let raw = RawFrame {
                data,
                metadata: FrameMetadata::default(),
            };
            let frame = Frame::decode(&raw, &yuyv)?;
            data = encode_jpeg(&frame, 90)
                .map_err(|err| CameraError::ReadFailure(err.to_string()))?;
        }

        let seq = self.frame_count;
        self.frame_count += 1;

        #[allow(clippy::cast_possible_truncation)]
        let bytes_used = data.len() as u32;
        Ok(RawFrame {
            data,
            metadata: FrameMetadata {
                sequence: seq,
                timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
                bytes_used,
            },
        })
    }

    fn release(&mut self) {
        self.streaming = false;
        self.recorder.with(|s| s.releases += 1);
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Generate YUYV test frame data based on pattern.
fn generate_test_frame(format: &Format, pattern: TestPattern) -> Vec<u8> {
    let size = (format.width * format.height * 2) as usize; // YUYV = 2 bytes/pixel
    let mut data = vec![0u8; size];

    match pattern {
        TestPattern::ColorBars => {
            generate_color_bars(&mut data, format.width, format.height);
        }
        TestPattern::Gradient => {
            generate_gradient(&mut data, format.width, format.height);
        }
        TestPattern::Solid(y, u, v) => {
            generate_solid(&mut data, y, u, v);
        }
    }

    data
}

/// Generate YUYV color bars pattern.
fn generate_color_bars(data: &mut [u8], width: u32, height: u32) {
    // 8 color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    let bars: [(u8, u8, u8); 8] = [
        (235, 128, 128), // White
        (210, 16, 146),  // Yellow
        (170, 166, 16),  // Cyan
        (145, 54, 34),   // Green
        (106, 202, 222), // Magenta
        (81, 90, 240),   // Red
        (41, 240, 110),  // Blue
        (16, 128, 128),  // Black
    ];

    let bar_width = (width / 8).max(1);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let bar_idx = (x / bar_width).min(7) as usize;
            let (y_val, u_val, v_val) = bars[bar_idx];

            let offset = ((y * width + x) * 2) as usize;
            if offset + 3 < data.len() {
                data[offset] = y_val;
                data[offset + 1] = u_val;
                data[offset + 2] = y_val;
                data[offset + 3] = v_val;
            }
        }
    }
}

/// Generate YUYV horizontal gradient pattern.
fn generate_gradient(data: &mut [u8], width: u32, height: u32) {
    for y in 0..height {
        for x in (0..width).step_by(2) {
            #[allow(clippy::cast_possible_truncation)]
            let y_val = ((x * 255) / width) as u8;
            let offset = ((y * width + x) * 2) as usize;

            if offset + 3 < data.len() {
                data[offset] = y_val;
                data[offset + 1] = 128;
                data[offset + 2] = y_val;
                data[offset + 3] = 128;
            }
        }
    }
}

/// Generate solid color YUYV frame.
fn generate_solid(data: &mut [u8], y: u8, u: u8, v: u8) {
    for pixel_pair in data.chunks_exact_mut(4) {
        pixel_pair.copy_from_slice(&[y, u, y, v]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        assert_eq!(device.capabilities().driver, "mock");
        assert!(device.capabilities().can_capture);
        assert!(device.capabilities().can_stream);
    }

    #[test]
    fn test_mock_device_format() {
        let mut device = MockDevice::new();
        let format = device.format().expect("format should succeed");
        assert_eq!(format.width, 640);
        assert_eq!(format.height, 480);

        let new_format = Format::new(1280, 720, FourCC::MJPG);
        let actual = device.set_format(&new_format).expect("set_format should succeed");
        assert_eq!(actual.width, 1280);
        assert_eq!(actual.fourcc, FourCC::MJPG);
    }

    #[test]
    fn test_mock_mjpeg_frames_decode() {
        let mut device = MockDevice::new();
        let format = device
            .set_format(&Format::new(64, 48, FourCC::MJPG))
            .expect("set_format should succeed");
        device.start_stream(2, None).expect("start should succeed");

        let raw = device.next_frame().expect("next_frame should succeed");
        assert_eq!(raw.data.get(..2), Some(&[0xff, 0xd8][..]));
        let frame = Frame::decode(&raw, &format).expect("JPEG should decode");
        assert_eq!((frame.width, frame.height), (64, 48));
    }

    #[test]
    fn test_mock_sequence_and_failures() {
        let mut device = MockDevice::new().with_read_failures(&[1]);
        device.start_stream(2, None).expect("start should succeed");

        let frame1 = device.next_frame().expect("first read succeeds");
        assert_eq!(frame1.metadata.sequence, 0);
        assert!(device.next_frame().is_err());
        let frame2 = device.next_frame().expect("third read succeeds");
        assert_eq!(frame2.metadata.sequence, 1);
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::ColorBars);

        assert_eq!(data.len(), (640 * 480 * 2) as usize);
        // First bar should be white (Y=235)
        assert_eq!(data[0], 235);
    }

    #[test]
    fn test_solid_pattern() {
        let format = Format::new(64, 64, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Solid(128, 64, 192));

        assert_eq!(data[0], 128);
        assert_eq!(data[2], 128);
        assert_eq!(data[1], 64);
        assert_eq!(data[3], 192);
    }
}
