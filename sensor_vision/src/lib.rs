// THEORY:
// This file is the main entry point for the `sensor_vision` library crate. It exposes
// the `CalibrationSession` and its associated data structures (`SessionConfig`,
// `FrameReport`, `Mode`, ...) as the high-level interface of the defect detection
// engine. The numerical building blocks live in `core_modules` and stay usable on
// their own: `IntensityFrame` (luminance frames), `FrameAccumulator` (exponential
// averaging), `defect_detector` (threshold segmentation) and `noise_extractor`
// (the SPN high-pass view).
//
// Capture, rendering and key handling are left to the caller; see the
// `sensor_tester` binary for an OpenCV front end.

pub mod core_modules;
pub mod error;
pub mod logger;
pub mod session;
pub mod session_actor;

pub use crate::core_modules::defect_detector::defect_detector;
pub use crate::core_modules::defect_set::{DefectSet, PixelCoord};
pub use crate::core_modules::frame_accumulator::{AccumulatedFrame, FrameAccumulator};
pub use crate::core_modules::intensity_frame::{DisplayFrame, IntensityFrame, PixelLayout};
pub use crate::core_modules::noise_extractor::{self, VisualFrame};
pub use crate::error::{Result, SensorError};
pub use crate::session::{
    CalibrationKind, CalibrationOutcome, CalibrationSession, Command, FrameReport, Mode, SessionConfig,
    SpnSource,
};
pub use crate::session_actor::{SessionHandle, spawn_session};
