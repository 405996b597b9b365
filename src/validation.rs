//! Frame validation utilities for test pattern verification.
//!
//! These check that decoded frames contain the expected test patterns and
//! that adjusted frames honor their invariants. Useful for integration
//! testing with virtual cameras.

use crate::error::{CameraError, Result};
use crate::frame::Frame;

/// Expected RGB values for SMPTE color bars (8 bars).
///
/// These are the RGB values resulting from converting the YUV values
/// used by the mock device's color bar pattern.
///
/// Colors in order: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
const SMPTE_COLOR_BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235), // White
    (235, 235, 11),  // Yellow
    (12, 236, 237),  // Cyan
    (13, 237, 13),   // Green
    (237, 13, 237),  // Magenta
    (238, 14, 13),   // Red
    (15, 15, 239),   // Blue
    (16, 16, 16),    // Black
];

/// Tolerance for RGB color matching (accounts for YUV->RGB conversion errors).
const COLOR_TOLERANCE: u8 = 15;

fn mismatch(message: String) -> CameraError {
    CameraError::ReadFailure(message)
}

/// Validates that a frame contains the SMPTE color bar pattern.
///
/// Checks 8 vertical stripes at their center positions, verifying that each
/// stripe contains the expected color within a tolerance for YUV-to-RGB
/// conversion inaccuracies.
///
/// # Errors
///
/// Returns `ReadFailure` if any bar is missing or has the wrong color.
pub fn validate_color_bars(frame: &Frame) -> Result<()> {
    let bar_width = frame.width / 8;
    let center_y = frame.height / 2;

    for (bar_idx, expected_rgb) in SMPTE_COLOR_BARS.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let sample_x = (bar_idx as u32 * bar_width) + (bar_width / 2);

        let actual_rgb = frame
            .pixel_at(sample_x, center_y)
            .ok_or_else(|| mismatch(format!("no pixel at ({sample_x}, {center_y})")))?;

        if !colors_match(actual_rgb, *expected_rgb, COLOR_TOLERANCE) {
            return Err(mismatch(format!(
                "color bar {bar_idx} mismatch at ({sample_x}, {center_y}): \
                 expected RGB{expected_rgb:?}, got RGB{actual_rgb:?}"
            )));
        }
    }

    Ok(())
}

/// Validates that a frame contains a horizontal gradient pattern.
///
/// Samples the center row every 10 pixels and requires the luminance to
/// increase (allowing rounding noise) by at least 50 across the frame.
pub fn validate_gradient(frame: &Frame) -> Result<()> {
    let center_y = frame.height / 2;
    let mut first: Option<f32> = None;
    let mut prev: Option<f32> = None;

    for x in (0..frame.width).step_by(10) {
        let (r, g, b) = frame
            .pixel_at(x, center_y)
            .ok_or_else(|| mismatch(format!("no pixel at ({x}, {center_y})")))?;

        // Rec. 601 luma
        let luminance = 0.114f32.mul_add(
            f32::from(b),
            0.587f32.mul_add(f32::from(g), 0.299 * f32::from(r)),
        );

        if let Some(prev) = prev {
            if luminance < prev - 1.0 {
                return Err(mismatch(format!(
                    "gradient not increasing at x={x}: {luminance} < {prev}"
                )));
            }
        }
        first.get_or_insert(luminance);
        prev = Some(luminance);
    }

    let change = prev.zip(first).map_or(0.0, |(last, first)| last - first);
    if change < 50.0 {
        return Err(mismatch(format!(
            "insufficient luminance change for gradient: {change} (expected at least 50)"
        )));
    }
    Ok(())
}

/// Validates that every pixel has equal channels, as night-mode output must.
pub fn validate_grayscale(frame: &Frame) -> Result<()> {
    for y in 0..frame.height {
        for x in 0..frame.width {
            match frame.pixel_at(x, y) {
                Some((r, g, b)) if r == g && g == b => {}
                Some(rgb) => {
                    return Err(mismatch(format!("pixel ({x}, {y}) is not gray: {rgb:?}")));
                }
                None => return Err(mismatch(format!("no pixel at ({x}, {y})"))),
            }
        }
    }
    Ok(())
}

/// Validates that frame sequence numbers increment by 1 with no gaps.
pub fn validate_frame_sequence(frames: &[Frame]) -> Result<()> {
    if frames.is_empty() {
        return Err(mismatch("cannot validate empty frame sequence".to_owned()));
    }

    for (i, pair) in frames.windows(2).enumerate() {
        if let [prev, curr] = pair {
            let expected = prev.sequence.wrapping_add(1);
            if curr.sequence != expected {
                return Err(mismatch(format!(
                    "frame sequence gap at index {}: expected {expected}, got {}",
                    i + 1,
                    curr.sequence
                )));
            }
        }
    }

    Ok(())
}

/// Whether all three channels are within `tolerance`.
const fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u8) -> bool {
    actual.0.abs_diff(expected.0) <= tolerance
        && actual.1.abs_diff(expected.1) <= tolerance
        && actual.2.abs_diff(expected.2) <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjust::adjust;
    use crate::config::Adjustment;
    use crate::mock::{MockDevice, TestPattern};
    use crate::traits::{CameraDevice, Format, FourCC};

    fn capture(pattern: TestPattern, count: usize) -> Vec<Frame> {
        let mut device = MockDevice::new().with_pattern(pattern);
        let format = device
            .set_format(&Format::new(640, 480, FourCC::YUYV))
            .expect("set_format failed");
        device.start_stream(2, None).expect("start_stream failed");
        (0..count)
            .map(|_| {
                let raw = device.next_frame().expect("next_frame failed");
                Frame::decode(&raw, &format).expect("decode failed")
            })
            .collect()
    }

    fn one(pattern: TestPattern) -> Frame {
        capture(pattern, 1).remove(0)
    }

    #[test]
    fn test_validate_color_bars_success() {
        let result = validate_color_bars(&one(TestPattern::ColorBars));
        assert!(result.is_ok(), "color bars should validate: {result:?}");
    }

    #[test]
    fn test_validate_color_bars_wrong_pattern() {
        assert!(validate_color_bars(&one(TestPattern::Gradient)).is_err());
    }

    #[test]
    fn test_validate_gradient_success() {
        let result = validate_gradient(&one(TestPattern::Gradient));
        assert!(result.is_ok(), "gradient should validate: {result:?}");
    }

    #[test]
    fn test_validate_gradient_wrong_pattern() {
        assert!(validate_gradient(&one(TestPattern::Solid(128, 128, 128))).is_err());
    }

    #[test]
    fn test_validate_grayscale_after_night_adjustment() {
        let frame = one(TestPattern::ColorBars);
        assert!(validate_grayscale(&frame).is_err());
        let night = adjust(&frame, &Adjustment::NIGHT_PRESET);
        assert!(validate_grayscale(&night).is_ok());
    }

    #[test]
    fn test_validate_frame_sequence_success() {
        let frames = capture(TestPattern::ColorBars, 5);
        let result = validate_frame_sequence(&frames);
        assert!(result.is_ok(), "sequence should validate: {result:?}");
    }

    #[test]
    fn test_validate_frame_sequence_empty() {
        assert!(validate_frame_sequence(&[]).is_err());
    }

    #[test]
    fn test_validate_frame_sequence_with_gap() {
        let mut frames = capture(TestPattern::ColorBars, 4);
        frames.remove(2);
        assert!(validate_frame_sequence(&frames).is_err());
    }

    #[test]
    fn test_colors_match_tolerance() {
        assert!(colors_match((100, 150, 200), (100, 150, 200), 10));
        assert!(colors_match((100, 150, 200), (105, 155, 205), 10));
        assert!(!colors_match((100, 150, 200), (120, 150, 200), 10));
    }
}
