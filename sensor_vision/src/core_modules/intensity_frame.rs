// THEORY:
// The `IntensityFrame` is the most fundamental unit of the engine. It is a "dumb"
// container for one single-channel luminance frame: a fixed width and height plus a
// flattened, row-major vector of `f32` samples. Everything downstream (accumulation,
// thresholding, noise extraction) works on this one shape.
//
// Two conversion boundaries live here:
// 1.  **Into the engine**: acquired color buffers (RGB, BGR or RGBA bytes, or the
//     `image` crate's buffers) are collapsed to luminance with Rec. 601 weights and
//     quantized to whole 8-bit levels, exactly like a BGR->GRAY capture path.
// 2.  **Out to display**: `to_display` materializes samples into an 8-bit
//     `GrayImage` by rounding the magnitude and saturating into [0, 255]. The
//     float samples are never rewritten by this step.

use crate::error::{Result, SensorError};
use image::{GrayImage, RgbImage, RgbaImage};

pub type Intensity = f32;

/// An 8-bit view of a frame, shared by the renderer and the defect detector.
pub type DisplayFrame = GrayImage;

const LUMA_RED: f32 = 0.299;
const LUMA_GREEN: f32 = 0.587;
const LUMA_BLUE: f32 = 0.114;

/// Channel order of a packed 8-bit color buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb,
    Bgr,
    Rgba,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Rgb | PixelLayout::Bgr => 3,
            PixelLayout::Rgba => 4,
        }
    }

    /// Byte offsets of (red, green, blue) within one pixel.
    fn rgb_offsets(self) -> (usize, usize, usize) {
        match self {
            PixelLayout::Rgb | PixelLayout::Rgba => (0, 1, 2),
            PixelLayout::Bgr => (2, 1, 0),
        }
    }
}

/// Rec. 601 luma of one color sample.
pub fn luminance(red: u8, green: u8, blue: u8) -> Intensity {
    LUMA_RED * red as f32 + LUMA_GREEN * green as f32 + LUMA_BLUE * blue as f32
}

/// Rounds the magnitude of `value` half-to-even and clamps it into the 8-bit range.
pub fn saturate_abs(value: f32) -> u8 {
    value.abs().round_ties_even().min(255.0) as u8
}

/// A single-channel floating point frame.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityFrame {
    /// The width of the frame in pixels.
    width: u32,
    /// The height of the frame in pixels.
    height: u32,
    /// Row-major samples, `width * height` long.
    samples: Vec<Intensity>,
}

impl IntensityFrame {
    pub fn new(width: u32, height: u32, samples: Vec<Intensity>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(SensorError::BufferSize {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// A frame with every sample set to `value`.
    pub fn filled(width: u32, height: u32, value: Intensity) -> Self {
        Self {
            width,
            height,
            samples: vec![value; width as usize * height as usize],
        }
    }

    /// Builds a frame by evaluating `sample(x, y)` in row-major order.
    pub fn from_fn(width: u32, height: u32, mut sample: impl FnMut(u32, u32) -> Intensity) -> Self {
        let mut samples = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                samples.push(sample(x, y));
            }
        }
        Self {
            width,
            height,
            samples,
        }
    }

    /// Converts a packed 8-bit color buffer to luminance.
    pub fn from_bytes(buffer: &[u8], width: u32, height: u32, layout: PixelLayout) -> Result<Self> {
        let channels = layout.channels();
        let expected = width as usize * height as usize * channels;
        if buffer.len() != expected {
            return Err(SensorError::BufferSize {
                expected,
                actual: buffer.len(),
            });
        }

        let (r, g, b) = layout.rgb_offsets();
        let samples = buffer
            .chunks_exact(channels)
            .map(|px| luminance(px[r], px[g], px[b]).round_ties_even())
            .collect();

        Ok(Self {
            width,
            height,
            samples,
        })
    }

    pub fn from_rgb_image(image: &RgbImage) -> Self {
        Self::from_packed(image.width(), image.height(), image.as_raw(), PixelLayout::Rgb)
    }

    pub fn from_rgba_image(image: &RgbaImage) -> Self {
        Self::from_packed(image.width(), image.height(), image.as_raw(), PixelLayout::Rgba)
    }

    pub fn from_gray_image(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            samples: image.as_raw().iter().map(|&v| v as Intensity).collect(),
        }
    }

    // `image` buffers always carry exactly width * height * channels bytes.
    fn from_packed(width: u32, height: u32, raw: &[u8], layout: PixelLayout) -> Self {
        let (r, g, b) = layout.rgb_offsets();
        Self {
            width,
            height,
            samples: raw
                .chunks_exact(layout.channels())
                .map(|px| luminance(px[r], px[g], px[b]).round_ties_even())
                .collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn samples(&self) -> &[Intensity] {
        &self.samples
    }

    pub(crate) fn samples_mut(&mut self) -> &mut [Intensity] {
        &mut self.samples
    }

    /// The sample at `(x, y)`, or `None` outside the frame.
    pub fn get(&self, x: u32, y: u32) -> Option<Intensity> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.samples.get((y * self.width + x) as usize).copied()
    }

    /// Materializes the frame into the 8-bit display range.
    pub fn to_display(&self) -> DisplayFrame {
        let raw = self.samples.iter().map(|&v| saturate_abs(v)).collect();
        // Length is width * height by construction.
        GrayImage::from_raw(self.width, self.height, raw).unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }
}
