//! V4L2 device implementation using the v4l crate.

use std::io;
use std::time::Duration;

use log::debug;
use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::error::{CameraError, Result};
use crate::traits::{
    CameraControl, CameraDevice, DeviceCapabilities, Format, FourCC, FrameMetadata, RawFrame,
};

/// `ENODEV`: the device node disappeared (camera unplugged).
const ENODEV: i32 = 19;

/// V4L2 device implementation wrapping the v4l crate.
pub struct V4L2Device {
    index: u32,
    device: Option<Device>,
    stream: Option<Stream<'static>>,
    capabilities: DeviceCapabilities,
}

impl V4L2Device {
    /// Open a V4L2 device by index (e.g., 0 for /dev/video0).
    pub fn open(index: u32) -> Result<Self> {
        let unavailable = |err: io::Error| CameraError::DeviceUnavailable {
            device: format!("/dev/video{index}"),
            reason: err.to_string(),
        };

        let device = Device::new(index as usize).map_err(unavailable)?;
        let caps = device.query_caps().map_err(unavailable)?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };

        Ok(Self {
            index,
            device: Some(device),
            stream: None,
            capabilities,
        })
    }

    fn device(&self) -> Result<&Device> {
        self.device.as_ref().ok_or_else(|| CameraError::DeviceUnavailable {
            device: format!("/dev/video{}", self.index),
            reason: "device already released".to_owned(),
        })
    }

    fn read_error(&self, err: &io::Error) -> CameraError {
        if err.raw_os_error() == Some(ENODEV) {
            CameraError::DeviceUnavailable {
                device: format!("/dev/video{}", self.index),
                reason: err.to_string(),
            }
        } else {
            CameraError::ReadFailure(err.to_string())
        }
    }
}

fn to_format(fmt: &v4l::Format) -> Format {
    Format {
        width: fmt.width,
        height: fmt.height,
        fourcc: FourCC::from(fmt.fourcc),
        stride: fmt.stride,
        size: fmt.size,
    }
}

impl CameraDevice for V4L2Device {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        let fmt = self
            .device()?
            .format()
            .map_err(|err| CameraError::ConfigurationRejected(err.to_string()))?;
        Ok(to_format(&fmt))
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        let device = self.device()?;
        let mut fmt = device
            .format()
            .map_err(|err| CameraError::ConfigurationRejected(err.to_string()))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();

        let fmt = device
            .set_format(&fmt)
            .map_err(|err| CameraError::ConfigurationRejected(err.to_string()))?;
        Ok(to_format(&fmt))
    }

    fn set_control(&mut self, control: CameraControl, value: i64) -> Result<()> {
        debug!("setting {control}={value} on /dev/video{}", self.index);
        self.device()?
            .set_control(Control {
                id: control.id(),
                value: Value::Integer(value),
            })
            .map_err(|err| CameraError::ConfigurationRejected(format!("{control}: {err}")))
    }

    fn start_stream(&mut self, buffer_count: u32, timeout: Option<Duration>) -> Result<()> {
        let mut stream = Stream::with_buffers(self.device()?, Type::VideoCapture, buffer_count)
            .map_err(|err| CameraError::DeviceUnavailable {
                device: format!("/dev/video{}", self.index),
                reason: format!("cannot start streaming: {err}"),
            })?;
        if let Some(timeout) = timeout {
            stream.set_timeout(timeout);
        }
        self.stream = Some(stream);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        let result = match self.stream.as_mut() {
            Some(stream) => stream.next().map(|(buf, meta)| {
                // Safe conversions: V4L2 timestamps are always non-negative in practice
                #[allow(clippy::cast_sign_loss)]
                let secs = meta.timestamp.sec.max(0) as u64;
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

                let used = buf.get(..meta.bytesused as usize).unwrap_or(buf);
                RawFrame {
                    data: used.to_vec(),
                    metadata: FrameMetadata {
                        sequence: meta.sequence,
                        timestamp: Duration::new(secs, nanos),
                        bytes_used: meta.bytesused,
                    },
                }
            }),
            None => return Err(CameraError::ReadFailure("stream not started".to_owned())),
        };
        result.map_err(|err| self.read_error(&err))
    }

    fn release(&mut self) {
        // The stream must go first: it stops streaming on the device handle.
        self.stream = None;
        if self.device.take().is_some() {
            debug!("released /dev/video{}", self.index);
        }
    }
}
