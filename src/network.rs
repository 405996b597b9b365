//! HTTP capture source: multipart MJPEG streams and JPEG snapshot URLs.

use std::io::{BufRead, BufReader, Read};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::{CameraError, Result};
use crate::frame::decode_jpeg;
use crate::traits::{
    CameraControl, CameraDevice, DeviceCapabilities, Format, FourCC, FrameMetadata, RawFrame,
};

/// Largest JPEG accepted from the network.
const MAX_JPEG_BYTES: usize = 16 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads consecutive JPEG images out of a byte stream.
///
/// Images start at an SOI (`FF D8`) marker. Marker segments are skipped by
/// their declared length, so an EXIF thumbnail carried inside APP1 does not
/// end the outer image early. Entropy-coded data is scanned for the next
/// real marker, ignoring stuffed `FF 00` and fill bytes. Multipart headers
/// and boundaries between images are skipped.
pub struct JpegScanner<R> {
    reader: BufReader<R>,
}

impl<R: Read> JpegScanner<R> {
    /// Wrap a byte stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Next complete JPEG, or `None` at end of stream.
    pub fn next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut prev = 0u8;
        loop {
            let Some(byte) = self.next_byte()? else {
                return Ok(None);
            };
            if prev == 0xff && byte == 0xd8 {
                break;
            }
            prev = byte;
        }

        let mut image = vec![0xff, 0xd8];
        loop {
            match self.next_marker(&mut image)? {
                0xd9 => return Ok(Some(image)),
                // Standalone markers carry no length.
                0x01 | 0xd0..=0xd8 => {}
                _ => {
                    let high = self.take(&mut image)?;
                    let low = self.take(&mut image)?;
                    let length = u16::from_be_bytes([high, low]);
                    for _ in 2..length {
                        self.take(&mut image)?;
                    }
                }
            }
        }
    }

    /// Advance to the next `FF xx` marker, returning `xx`.
    fn next_marker(&mut self, image: &mut Vec<u8>) -> Result<u8> {
        let mut prev = 0u8;
        loop {
            let byte = self.take(image)?;
            if prev == 0xff && byte != 0x00 && byte != 0xff {
                return Ok(byte);
            }
            prev = byte;
        }
    }

    /// Next byte of an image in progress, appended to `image`.
    fn take(&mut self, image: &mut Vec<u8>) -> Result<u8> {
        let Some(byte) = self.next_byte()? else {
            return Err(CameraError::ReadFailure(
                "stream ended inside a JPEG image".to_owned(),
            ));
        };
        if image.len() >= MAX_JPEG_BYTES {
            return Err(CameraError::ReadFailure(format!(
                "JPEG image exceeds {MAX_JPEG_BYTES} bytes"
            )));
        }
        image.push(byte);
        Ok(byte)
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let buf = self
            .reader
            .fill_buf()
            .map_err(|err| CameraError::ReadFailure(err.to_string()))?;
        let Some(&byte) = buf.first() else {
            return Ok(None);
        };
        self.reader.consume(1);
        Ok(Some(byte))
    }
}

type BodyReader = Box<dyn Read + Send + Sync + 'static>;

enum Source {
    /// Long-lived multipart response.
    Stream(JpegScanner<BodyReader>),
    /// One GET per frame.
    Snapshot,
}

/// Camera reached over HTTP.
///
/// Resolution and pixel format are whatever the server sends; controls are
/// not supported.
pub struct HttpMjpegDevice {
    url: String,
    agent: ureq::Agent,
    capabilities: DeviceCapabilities,
    format: Format,
    source: Option<Source>,
    pending: Option<Vec<u8>>,
    sequence: u32,
    started: Instant,
}

impl HttpMjpegDevice {
    /// Connect to `url` and read one image to learn the frame size.
    pub fn open(url: &str) -> Result<Self> {
        if !url.starts_with("http://") {
            return Err(CameraError::DeviceUnavailable {
                device: url.to_owned(),
                reason: "only http:// MJPEG and snapshot URLs are supported".to_owned(),
            });
        }

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(Duration::from_secs(5))
            .build();

        let mut device = Self {
            url: url.to_owned(),
            agent,
            capabilities: DeviceCapabilities {
                driver: "http".to_owned(),
                card: url.to_owned(),
                bus_info: url.to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(0, 0, FourCC::MJPG),
            source: None,
            pending: None,
            sequence: 0,
            started: Instant::now(),
        };

        let first = device.connect()?;
        let sample = decode_jpeg(&first).map_err(|err| CameraError::DeviceUnavailable {
            device: url.to_owned(),
            reason: format!("first image is not a JPEG: {err}"),
        })?;
        device.format = Format::new(sample.width, sample.height, FourCC::MJPG);
        device.pending = Some(first);
        info!(
            "connected to {url}: {}x{} MJPEG",
            sample.width, sample.height
        );
        Ok(device)
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> CameraError {
        CameraError::DeviceUnavailable {
            device: self.url.clone(),
            reason: reason.to_string(),
        }
    }

    /// Issue the GET, pick stream or snapshot mode, and return the first image.
    fn connect(&mut self) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .map_err(|err| self.unavailable(err))?;
        let multipart = response.content_type().starts_with("multipart/");
        debug!(
            "{} answered {} ({})",
            self.url,
            response.status(),
            response.content_type()
        );

        let mut scanner = JpegScanner::new(response.into_reader());
        let image = scanner
            .next_jpeg()?
            .ok_or_else(|| self.unavailable("response contained no JPEG image"))?;
        self.source = Some(if multipart {
            Source::Stream(scanner)
        } else {
            Source::Snapshot
        });
        Ok(image)
    }

    fn fetch(&mut self) -> Result<Vec<u8>> {
        match self.source.as_mut() {
            Some(Source::Stream(scanner)) => scanner.next_jpeg()?.ok_or_else(|| {
                CameraError::ReadFailure("MJPEG stream ended".to_owned())
            }),
            Some(Source::Snapshot) => {
                let response = self
                    .agent
                    .get(&self.url)
                    .call()
                    .map_err(|err| CameraError::ReadFailure(err.to_string()))?;
                JpegScanner::new(response.into_reader())
                    .next_jpeg()?
                    .ok_or_else(|| CameraError::ReadFailure("empty snapshot".to_owned()))
            }
            None => Err(CameraError::DeviceUnavailable {
                device: self.url.clone(),
                reason: "device already released".to_owned(),
            }),
        }
    }
}

impl CameraDevice for HttpMjpegDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, _format: &Format) -> Result<Format> {
        // The server decides; report what it sends.
        Ok(self.format.clone())
    }

    fn set_control(&mut self, control: CameraControl, _value: i64) -> Result<()> {
        Err(CameraError::ConfigurationRejected(format!(
            "{control} is not available on network cameras"
        )))
    }

    fn start_stream(&mut self, _buffer_count: u32, timeout: Option<Duration>) -> Result<()> {
        if let Some(timeout) = timeout {
            self.agent = ureq::AgentBuilder::new()
                .timeout_connect(CONNECT_TIMEOUT)
                .timeout_read(timeout)
                .build();
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        let data = match self.pending.take() {
            Some(data) => data,
            None => self.fetch()?,
        };
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        #[allow(clippy::cast_possible_truncation)]
        let bytes_used = data.len() as u32;
        Ok(RawFrame {
            data,
            metadata: FrameMetadata {
                sequence,
                timestamp: self.started.elapsed(),
                bytes_used,
            },
        })
    }

    fn release(&mut self) {
        if self.source.take().is_some() {
            debug!("closed {}", self.url);
        }
        self.pending = None;
    }
}
