// THEORY:
// The `NoiseExtractor` produces the sensor pattern noise (SPN) view. It is a plain
// single-frame high-pass filter, not a forensic fingerprint:
//
// 1.  **Low pass**: a 5x5 Gaussian blur. For a 5-tap kernel with no explicit sigma the
//     weights are the binomial row [1 4 6 4 1] / 16, applied separably by
//     `imageproc`. Borders replicate the edge sample.
// 2.  **Residue**: original minus blurred. What remains is the fine texture and noise
//     the low-frequency structure does not explain.
// 3.  **Visualization**: the residue is min-max normalized into [0, 255] using this
//     frame's own extremes, then boosted with `|gain * v + offset|` and saturated to
//     8 bits. The boosted values only carry relative magnitude; two frames are never
//     on a shared scale.
//
// A constant frame blurs to itself, so its residue is all zeros and the normalized
// residue is all zeros too (a zero range maps everything to the lower bound).

use crate::core_modules::intensity_frame::{Intensity, IntensityFrame, saturate_abs};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;

pub const KERNEL_SIZE: usize = 5;
pub const DEFAULT_GAIN: f32 = 5.0;
pub const DEFAULT_OFFSET: f32 = 128.0;

const BINOMIAL_KERNEL: [Intensity; KERNEL_SIZE] = [0.0625, 0.25, 0.375, 0.25, 0.0625];
const NORMALIZED_MAX: Intensity = 255.0;

/// The contrast-boosted SPN image handed to the renderer.
pub type VisualFrame = GrayImage;

/// The SPN visualization with the default boost.
pub fn extract(frame: &IntensityFrame) -> VisualFrame {
    extract_with(frame, DEFAULT_GAIN, DEFAULT_OFFSET)
}

pub fn extract_with(frame: &IntensityFrame, gain: f32, offset: f32) -> VisualFrame {
    let residue = residue(frame);
    let raw = normalize_min_max(residue.samples())
        .into_iter()
        .map(|v| saturate_abs(v * gain + offset))
        .collect();
    GrayImage::from_raw(frame.width(), frame.height(), raw)
        .unwrap_or_else(|| GrayImage::new(frame.width(), frame.height()))
}

/// The un-normalized high-frequency residue: `frame - blur(frame)`.
pub fn residue(frame: &IntensityFrame) -> IntensityFrame {
    let blurred = gaussian_blur(frame);
    IntensityFrame::from_fn(frame.width(), frame.height(), |x, y| {
        let index = (y * frame.width() + x) as usize;
        frame.samples()[index] - blurred.samples()[index]
    })
}

/// Separable 5x5 binomial blur with replicated borders.
pub fn gaussian_blur(frame: &IntensityFrame) -> IntensityFrame {
    if frame.width() == 0 || frame.height() == 0 {
        return frame.clone();
    }
    let Some(buffer) =
        ImageBuffer::<Luma<Intensity>, Vec<Intensity>>::from_raw(frame.width(), frame.height(), frame.samples().to_vec())
    else {
        return frame.clone();
    };
    let blurred = separable_filter_equal(&buffer, &BINOMIAL_KERNEL);
    IntensityFrame::new(frame.width(), frame.height(), blurred.into_raw()).unwrap_or_else(|_| frame.clone())
}

fn normalize_min_max(values: &[Intensity]) -> Vec<Intensity> {
    let (min, max) = values
        .iter()
        .fold((Intensity::INFINITY, Intensity::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if !(range > Intensity::EPSILON) {
        return vec![0.0; values.len()];
    }
    let scale = NORMALIZED_MAX / range;
    values.iter().map(|&v| (v - min) * scale).collect()
}
