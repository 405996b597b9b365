//! Decoded frame bitmaps.

use std::time::Duration;

use image::ImageFormat;

use crate::error::{CameraError, Result};
use crate::traits::{Format, FourCC, RawFrame};

/// Channel layout of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 3 bytes per pixel, R G B.
    Rgb,
    /// 1 byte per pixel, luma only.
    Luma,
}

impl PixelLayout {
    /// Number of bytes per pixel.
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Luma => 1,
        }
    }
}

/// A decoded video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Tightly packed pixel data.
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Channel layout.
    pub layout: PixelLayout,
    /// Driver sequence number.
    pub sequence: u32,
    /// Driver timestamp.
    pub timestamp: Duration,
}

impl Frame {
    /// Build an RGB frame from packed pixel data.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::with_layout(width, height, PixelLayout::Rgb, data)
    }

    /// Build a frame, checking the buffer length against the dimensions.
    pub fn with_layout(width: u32, height: u32, layout: PixelLayout, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * layout.channels();
        if data.len() != expected {
            return Err(CameraError::ReadFailure(format!(
                "frame buffer holds {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            layout,
            sequence: 0,
            timestamp: Duration::ZERO,
        })
    }

    /// Number of bytes per pixel.
    pub const fn channels(&self) -> usize {
        self.layout.channels()
    }

    /// RGB values of the pixel at `(x, y)`. Luma frames report the
    /// channel replicated.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * self.channels();
        match self.layout {
            PixelLayout::Rgb => {
                let px = self.data.get(offset..offset + 3)?;
                Some((*px.first()?, *px.get(1)?, *px.get(2)?))
            }
            PixelLayout::Luma => {
                let v = *self.data.get(offset)?;
                Some((v, v, v))
            }
        }
    }

    /// Copy of this frame with three channels, replicating luma if needed.
    #[must_use]
    pub fn to_rgb(&self) -> Self {
        match self.layout {
            PixelLayout::Rgb => self.clone(),
            PixelLayout::Luma => Self {
                data: self.data.iter().flat_map(|&v| [v, v, v]).collect(),
                layout: PixelLayout::Rgb,
                ..*self
            },
        }
    }

    /// Decode a driver buffer in the given format into an RGB frame.
    pub fn decode(raw: &RawFrame, format: &Format) -> Result<Self> {
        let mut frame = match format.fourcc {
            FourCC::MJPG => decode_jpeg(&raw.data)?,
            FourCC::YUYV => {
                let row_bytes = format.width as usize * 2;
                let packed = packed_rows(&raw.data, row_bytes, format)?;
                decode_yuyv(&packed, format.width, format.height)?
            }
            FourCC::RGB3 => {
                let row_bytes = format.width as usize * 3;
                let packed = packed_rows(&raw.data, row_bytes, format)?;
                Self::from_rgb(format.width, format.height, packed)?
            }
            other => {
                return Err(CameraError::ReadFailure(format!(
                    "cannot decode pixel format {other}"
                )))
            }
        };
        frame.sequence = raw.metadata.sequence;
        frame.timestamp = raw.metadata.timestamp;
        Ok(frame)
    }
}

/// Decode a JPEG image into an RGB frame.
pub fn decode_jpeg(data: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map_err(|err| CameraError::ReadFailure(format!("corrupt MJPEG frame: {err}")))?
        .into_rgb8();
    let (width, height) = image.dimensions();
    Frame::from_rgb(width, height, image.into_raw())
}

/// Rows of `row_bytes` each, with any per-row padding up to the format's
/// stride dropped.
fn packed_rows(data: &[u8], row_bytes: usize, format: &Format) -> Result<Vec<u8>> {
    let stride = (format.stride as usize).max(row_bytes);
    let height = format.height as usize;
    // The last row may end without padding.
    let needed = height
        .checked_sub(1)
        .map_or(0, |rows| rows * stride + row_bytes);
    if data.len() < needed {
        return Err(CameraError::ReadFailure(format!(
            "short {} buffer: {} of {needed} bytes",
            format.fourcc,
            data.len()
        )));
    }

    let mut packed = Vec::with_capacity(row_bytes * height);
    for row in data.chunks(stride).take(height) {
        packed.extend_from_slice(row.get(..row_bytes).unwrap_or(row));
    }
    Ok(packed)
}

/// Convert a packed YUYV buffer into an RGB frame.
fn decode_yuyv(data: &[u8], width: u32, height: u32) -> Result<Frame> {
    let pixels = width as usize * height as usize;
    if data.len() < pixels * 2 {
        return Err(CameraError::ReadFailure(format!(
            "short YUYV buffer: {} of {} bytes",
            data.len(),
            pixels * 2
        )));
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    // YUYV format: [Y0 U Y1 V] repeats, each pair of pixels shares U and V
    for chunk in data.chunks_exact(4).take(pixels.div_ceil(2)) {
        if let &[y0, u, y1, v] = chunk {
            let (r, g, b) = yuv_to_rgb(y0, u, v);
            rgb.extend_from_slice(&[r, g, b]);
            let (r, g, b) = yuv_to_rgb(y1, u, v);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
    rgb.truncate(pixels * 3);
    Frame::from_rgb(width, height, rgb)
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula.
///
/// # Arguments
///
/// * `y` - Luminance value (16-235 for studio range)
/// * `u` - Blue-difference chroma value (16-240)
/// * `v` - Red-difference chroma value (16-240)
///
/// # Returns
///
/// RGB tuple with values clamped to 0-255 range.
#[must_use]
#[allow(clippy::many_single_char_names)]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| -> u8 { val.clamp(0.0, 255.0) as u8 };

    (clamp(r), clamp(g), clamp(b))
}
