// THEORY:
// The `FrameAccumulator` is the temporal memory of a calibration. It integrates a
// noisy stream of `IntensityFrame`s into one running average using exponential
// smoothing:
//
//     acc = acc * (1 - alpha) + frame * alpha
//
// Random per-frame noise (shot noise, read noise) averages away, while anything that
// is constant across frames (hot pixels, dead pixels, sensor pattern noise) survives.
// After N frames of a constant input the remaining gap to that input is
// (1 - alpha)^N of the gap left by the first frame.
//
// The first frame bootstraps the average as an exact copy; smoothing against an
// undefined prior would mean nothing. The average stays in `f32` for the whole
// session. Only `materialize` produces an 8-bit view, and it never writes back.

use crate::core_modules::intensity_frame::{DisplayFrame, Intensity, IntensityFrame};
use crate::error::{Result, SensorError};
use tracing::debug;

pub const DEFAULT_SMOOTHING_FACTOR: f32 = 0.1;

/// The exponentially smoothed estimate of the sensor's steady-state response.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatedFrame {
    frame: IntensityFrame,
}

impl AccumulatedFrame {
    fn bootstrap(frame: &IntensityFrame) -> Self {
        Self {
            frame: frame.clone(),
        }
    }

    fn blend(&mut self, frame: &IntensityFrame, alpha: f32) {
        let keep = 1.0 - alpha;
        for (acc, &sample) in self.frame.samples_mut().iter_mut().zip(frame.samples()) {
            *acc = *acc * keep + sample * alpha;
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Intensity> {
        self.frame.get(x, y)
    }

    pub fn as_intensity(&self) -> &IntensityFrame {
        &self.frame
    }

    /// The explicit float -> 8-bit boundary feeding both detection and display.
    pub fn materialize(&self) -> DisplayFrame {
        self.frame.to_display()
    }
}

/// Owns one running average and the count of frames folded into it.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    /// Weight given to each new frame, in (0, 1].
    smoothing_factor: f32,
    /// `None` until the first frame of a session arrives.
    accumulated: Option<AccumulatedFrame>,
    /// Frames integrated since the last reset.
    frames_integrated: u32,
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_FACTOR)
    }
}

impl FrameAccumulator {
    pub fn new(smoothing_factor: f32) -> Self {
        Self {
            smoothing_factor,
            accumulated: None,
            frames_integrated: 0,
        }
    }

    /// Discards the running average and zeroes the frame counter.
    pub fn reset(&mut self) {
        self.accumulated = None;
        self.frames_integrated = 0;
    }

    /// Folds `frame` into the running average and returns the updated state.
    ///
    /// A frame whose dimensions differ from the current average is rejected and
    /// leaves the accumulator untouched.
    pub fn integrate(&mut self, frame: &IntensityFrame) -> Result<&AccumulatedFrame> {
        let accumulated = match self.accumulated.take() {
            Some(mut acc) => {
                if acc.dimensions() != frame.dimensions() {
                    let expected = acc.dimensions();
                    self.accumulated = Some(acc);
                    return Err(SensorError::DimensionMismatch {
                        expected,
                        actual: frame.dimensions(),
                    });
                }
                acc.blend(frame, self.smoothing_factor);
                acc
            }
            None => AccumulatedFrame::bootstrap(frame),
        };

        self.frames_integrated += 1;
        debug!(frames = self.frames_integrated, "Integrated frame");

        let accumulated: &AccumulatedFrame = self.accumulated.insert(accumulated);
        Ok(accumulated)
    }

    pub fn accumulated(&self) -> Option<&AccumulatedFrame> {
        self.accumulated.as_ref()
    }

    pub fn has_data(&self) -> bool {
        self.accumulated.is_some()
    }

    pub fn frames_integrated(&self) -> u32 {
        self.frames_integrated
    }

    pub fn smoothing_factor(&self) -> f32 {
        self.smoothing_factor
    }

    pub fn materialize(&self) -> Option<DisplayFrame> {
        self.accumulated.as_ref().map(AccumulatedFrame::materialize)
    }
}
