// THEORY:
// The `session` module is the top-level API of the engine. A `CalibrationSession`
// owns all mutable state for one camera (the running average, the progress counter,
// both defect sets and the current mode) and is driven one frame at a time.
//
// Key architectural principles:
// 1.  **Explicit session object**: there is no global analyzer. Each caller owns its
//     own session; concurrent users each get an isolated instance.
// 2.  **One transition function**: every user command goes through `apply`, which
//     validates it (SPN view needs accumulated data) and performs the side effects of
//     entering the new mode. The only transition `apply` does not handle is the
//     automatic return to `Live` when a calibration converges, which happens inside
//     `process_frame`.
// 3.  **Frame-synchronous**: `process_frame` fully handles one frame (integration,
//     possible detection, possible SPN extraction) and returns a `FrameReport`
//     snapshot for the renderer. Nothing runs in the background.
// 4.  **Two conversion boundaries**: accumulation stays in floating point; detection
//     and display both read the explicitly materialized 8-bit frame.

use crate::core_modules::defect_detector::defect_detector;
use crate::core_modules::defect_set::DefectSet;
use crate::core_modules::frame_accumulator::{AccumulatedFrame, DEFAULT_SMOOTHING_FACTOR, FrameAccumulator};
use crate::core_modules::intensity_frame::IntensityFrame;
use crate::core_modules::noise_extractor::{self, VisualFrame};
use crate::error::{Result, SensorError};
use std::fmt;
use tracing::{info, warn};

pub const DEFAULT_CONVERGENCE_FRAMES: u32 = 30;
pub const DEFAULT_DARK_THRESHOLD: f64 = 15.0;
pub const DEFAULT_FLAT_FRACTION: f64 = 0.5;

/// Below this mean brightness a flat field is almost certainly a mistake (lens capped).
const DEGENERATE_FLAT_MEAN: f64 = 1.0;

const READY_NOTICE: &str = "Ready. Live mode.";
const SPN_UNAVAILABLE_NOTICE: &str = "Collect data with a dark or flat calibration first.";

/// Which frame the SPN view is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpnSource {
    /// The materialized running average of the last calibration.
    #[default]
    Accumulated,
    /// The frame currently being processed.
    LiveFrame,
}

/// Configuration for a CalibrationSession, allowing for tunable behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// A calibration completes once more than this many frames have been integrated.
    pub convergence_frames: u32,
    /// Weight of each new frame in the running average, in (0, 1].
    pub smoothing_factor: f32,
    /// Absolute 8-bit level above which a dark-field pixel is hot.
    pub dark_threshold: f64,
    /// Fraction of the flat-field mean below which a pixel is dead, in (0, 1].
    pub flat_fraction: f64,
    /// Optional lower bound on the adaptive flat-field threshold. `None` keeps the
    /// threshold a pure fraction of the mean.
    pub min_flat_threshold: Option<f64>,
    pub spn_source: SpnSource,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            convergence_frames: DEFAULT_CONVERGENCE_FRAMES,
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            dark_threshold: DEFAULT_DARK_THRESHOLD,
            flat_fraction: DEFAULT_FLAT_FRACTION,
            min_flat_threshold: None,
            spn_source: SpnSource::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.convergence_frames == 0 {
            return Err(SensorError::InvalidConfig(
                "convergence_frames must be at least 1".to_string(),
            ));
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(SensorError::InvalidConfig(format!(
                "smoothing_factor must lie in (0, 1], got {}",
                self.smoothing_factor
            )));
        }
        if !self.dark_threshold.is_finite() {
            return Err(SensorError::InvalidConfig(format!(
                "dark_threshold must be finite, got {}",
                self.dark_threshold
            )));
        }
        if !(self.flat_fraction > 0.0 && self.flat_fraction <= 1.0) {
            return Err(SensorError::InvalidConfig(format!(
                "flat_fraction must lie in (0, 1], got {}",
                self.flat_fraction
            )));
        }
        if let Some(min) = self.min_flat_threshold {
            if !min.is_finite() {
                return Err(SensorError::InvalidConfig(format!(
                    "min_flat_threshold must be finite, got {min}"
                )));
            }
        }
        Ok(())
    }
}

/// The operating mode of a session. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Live,
    DarkCalib,
    FlatCalib,
    SpnView,
}

impl Mode {
    pub fn is_calibrating(self) -> bool {
        matches!(self, Mode::DarkCalib | Mode::FlatCalib)
    }

    fn calibration_kind(self) -> Option<CalibrationKind> {
        match self {
            Mode::DarkCalib => Some(CalibrationKind::Dark),
            Mode::FlatCalib => Some(CalibrationKind::Flat),
            Mode::Live | Mode::SpnView => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Mode::Live => "LIVE",
            Mode::DarkCalib => "DARK_CALIB",
            Mode::FlatCalib => "FLAT_CALIB",
            Mode::SpnView => "SPN_VIEW",
        };
        f.write_str(label)
    }
}

/// A user-triggered request to change mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartDarkCalibration,
    StartFlatCalibration,
    RequestSpnView,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationKind {
    /// Lens covered; looks for hot pixels.
    Dark,
    /// Uniformly lit white surface; looks for dead pixels.
    Flat,
}

impl fmt::Display for CalibrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationKind::Dark => f.write_str("Dark"),
            CalibrationKind::Flat => f.write_str("Flat-field"),
        }
    }
}

/// Published on the frame where a calibration converges.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutcome {
    pub kind: CalibrationKind,
    /// The threshold the converged average was segmented against.
    pub threshold: f64,
    /// Number of defective pixels found.
    pub defects: usize,
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// The mode after this frame was processed.
    pub mode: Mode,
    /// Frames integrated in the current calibration.
    pub progress: u32,
    /// The progress count a calibration must exceed to complete.
    pub target: u32,
    pub hot_pixels: DefectSet,
    pub dead_pixels: DefectSet,
    /// Present only in `SpnView`.
    pub spn_view: Option<VisualFrame>,
    /// Present only on the frame that completed a calibration.
    pub outcome: Option<CalibrationOutcome>,
    pub notice: String,
}

/// The stateful calibration engine for a single camera.
pub struct CalibrationSession {
    config: SessionConfig,
    accumulator: FrameAccumulator,
    mode: Mode,
    /// Replaced wholesale at the end of every dark calibration.
    hot_pixels: DefectSet,
    /// Replaced wholesale at the end of every flat-field calibration.
    dead_pixels: DefectSet,
    notice: String,
}

impl CalibrationSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            accumulator: FrameAccumulator::new(config.smoothing_factor),
            config,
            mode: Mode::Live,
            hot_pixels: DefectSet::new(),
            dead_pixels: DefectSet::new(),
            notice: READY_NOTICE.to_string(),
        })
    }

    /// Validates and performs a user-triggered transition, returning the new mode.
    ///
    /// A rejected transition leaves the mode unchanged and only updates the notice.
    pub fn apply(&mut self, command: Command) -> Result<Mode> {
        match command {
            Command::StartDarkCalibration => {
                self.accumulator.reset();
                self.hot_pixels.clear();
                self.mode = Mode::DarkCalib;
                self.notice = "Dark calibration started. Cover the lens.".to_string();
            }
            Command::StartFlatCalibration => {
                self.accumulator.reset();
                self.dead_pixels.clear();
                self.mode = Mode::FlatCalib;
                self.notice =
                    "Flat-field calibration started. Point the camera at a uniformly lit white surface."
                        .to_string();
            }
            Command::RequestSpnView => {
                if !self.accumulator.has_data() {
                    warn!(mode = %self.mode, "SPN view requested without accumulated data");
                    self.notice = SPN_UNAVAILABLE_NOTICE.to_string();
                    return Err(SensorError::SpnUnavailable);
                }
                self.mode = Mode::SpnView;
                self.notice = "SPN (sensor pattern noise) view.".to_string();
            }
            Command::Reset => {
                // Defect history survives a manual reset.
                self.accumulator.reset();
                self.mode = Mode::Live;
                self.notice = "Reset. Live mode.".to_string();
            }
        }
        info!(?command, mode = %self.mode, "Mode transition");
        Ok(self.mode)
    }

    pub fn start_dark_calibration(&mut self) -> Result<Mode> {
        self.apply(Command::StartDarkCalibration)
    }

    pub fn start_flat_calibration(&mut self) -> Result<Mode> {
        self.apply(Command::StartFlatCalibration)
    }

    pub fn request_spn_view(&mut self) -> Result<Mode> {
        self.apply(Command::RequestSpnView)
    }

    pub fn reset(&mut self) -> Result<Mode> {
        self.apply(Command::Reset)
    }

    /// Processes one intensity frame according to the current mode.
    pub fn process_frame(&mut self, frame: &IntensityFrame) -> Result<FrameReport> {
        let outcome = match self.mode.calibration_kind() {
            Some(kind) => self.advance_calibration(kind, frame)?,
            None => None,
        };

        let spn_view = match self.mode {
            Mode::SpnView => self.render_spn(frame),
            _ => None,
        };

        Ok(FrameReport {
            mode: self.mode,
            progress: self.progress(),
            target: self.config.convergence_frames,
            hot_pixels: self.hot_pixels.clone(),
            dead_pixels: self.dead_pixels.clone(),
            spn_view,
            outcome,
            notice: self.notice.clone(),
        })
    }

    /// Integrates one calibration frame and, once converged, segments the average.
    fn advance_calibration(
        &mut self,
        kind: CalibrationKind,
        frame: &IntensityFrame,
    ) -> Result<Option<CalibrationOutcome>> {
        // `integrate` counts exactly one frame on success.
        let progress = self.accumulator.frames_integrated() + 1;
        let accumulated = self.accumulator.integrate(frame)?;

        let target = self.config.convergence_frames;
        if progress <= target {
            self.notice = format!("{kind} calibration: {progress}/{target}");
            return Ok(None);
        }
        let average = accumulated.materialize();

        let outcome = match kind {
            CalibrationKind::Dark => {
                let threshold = self.config.dark_threshold;
                self.hot_pixels = defect_detector::detect_bright(&average, threshold);
                CalibrationOutcome {
                    kind,
                    threshold,
                    defects: self.hot_pixels.len(),
                }
            }
            CalibrationKind::Flat => {
                let mean = defect_detector::mean_intensity(&average);
                if mean < DEGENERATE_FLAT_MEAN {
                    warn!(mean, "Flat-field average is nearly black; dead pixel threshold degenerates");
                }
                let threshold = defect_detector::flat_field_threshold(
                    &average,
                    self.config.flat_fraction,
                    self.config.min_flat_threshold,
                );
                self.dead_pixels = defect_detector::detect_dark(&average, threshold);
                CalibrationOutcome {
                    kind,
                    threshold,
                    defects: self.dead_pixels.len(),
                }
            }
        };

        self.mode = Mode::Live;
        self.notice = match kind {
            CalibrationKind::Dark => format!(
                "Dark calibration finished: {} hot pixels found.",
                outcome.defects
            ),
            CalibrationKind::Flat => format!(
                "Flat-field calibration finished: {} dead pixels found.",
                outcome.defects
            ),
        };
        info!(
            %kind,
            frames = progress,
            threshold = outcome.threshold,
            defects = outcome.defects,
            "Calibration complete"
        );
        Ok(Some(outcome))
    }

    fn render_spn(&self, frame: &IntensityFrame) -> Option<VisualFrame> {
        match self.config.spn_source {
            SpnSource::Accumulated => self
                .accumulator
                .materialize()
                .map(|average| noise_extractor::extract(&IntensityFrame::from_gray_image(&average))),
            SpnSource::LiveFrame => Some(noise_extractor::extract(frame)),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Frames integrated since the last calibration started. Meaningless outside
    /// the calibration modes.
    pub fn progress(&self) -> u32 {
        self.accumulator.frames_integrated()
    }

    pub fn convergence_target(&self) -> u32 {
        self.config.convergence_frames
    }

    pub fn hot_pixels(&self) -> &DefectSet {
        &self.hot_pixels
    }

    pub fn dead_pixels(&self) -> &DefectSet {
        &self.dead_pixels
    }

    pub fn accumulated(&self) -> Option<&AccumulatedFrame> {
        self.accumulator.accumulated()
    }

    pub fn notice(&self) -> &str {
        &self.notice
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
