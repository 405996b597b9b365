//! Brightness, contrast and night-mode frame adjustment.

use crate::config::Adjustment;
use crate::frame::{Frame, PixelLayout};

/// Apply `adjustment` to `frame`, returning a new frame.
///
/// Every channel becomes `clamp(round(v * contrast + brightness), 0, 255)`.
/// In night mode the frame is reduced to BT.601 luma first, so the result
/// has a single channel; use [`Frame::to_rgb`] where three are needed.
#[must_use]
pub fn adjust(frame: &Frame, adjustment: &Adjustment) -> Frame {
    if adjustment.is_identity() {
        return frame.clone();
    }
    let source = if adjustment.night_mode {
        to_luma(frame)
    } else {
        frame.clone()
    };

    let lut = build_lut(adjustment.brightness, adjustment.contrast);
    Frame {
        data: source
            .data
            .iter()
            .map(|&v| lut.get(usize::from(v)).copied().unwrap_or(v))
            .collect(),
        ..source
    }
}

/// Single-channel luma copy of `frame`. Luma frames are returned as is.
#[must_use]
pub fn to_luma(frame: &Frame) -> Frame {
    match frame.layout {
        PixelLayout::Luma => frame.clone(),
        PixelLayout::Rgb => Frame {
            data: frame
                .data
                .chunks_exact(3)
                .map(|px| match px {
                    &[r, g, b] => luma(r, g, b),
                    _ => 0,
                })
                .collect(),
            layout: PixelLayout::Luma,
            ..*frame
        },
    }
}

/// BT.601 luma with integer rounding.
#[allow(clippy::cast_possible_truncation)]
const fn luma(r: u8, g: u8, b: u8) -> u8 {
    let weighted = 299 * r as u32 + 587 * g as u32 + 114 * b as u32;
    ((weighted + 500) / 1000) as u8
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn build_lut(brightness: i32, contrast: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (value, slot) in (0u8..=255).zip(lut.iter_mut()) {
        #[allow(clippy::cast_precision_loss)]
        let scaled = f32::from(value).mul_add(contrast, brightness as f32);
        *slot = scaled.round().clamp(0.0, 255.0) as u8;
    }
    lut
}
