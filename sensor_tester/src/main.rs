//! Interactive sensor defect tester.
//!
//! Reads frames from a camera or a video file, drives a `CalibrationSession` with
//! them and draws the results: hot pixels in red, dead pixels in blue, a progress
//! line while calibrating and the SPN visualization in SPN mode.
//!
//! Keys: `d` dark calibration, `f` flat-field calibration, `s` SPN view,
//! `r` reset to live mode, `q` quit.

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use opencv::{
    core::{self, Mat, Point, Scalar, Size},
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use sensor_vision::session::{DEFAULT_CONVERGENCE_FRAMES, DEFAULT_DARK_THRESHOLD, DEFAULT_FLAT_FRACTION};
use sensor_vision::{
    CalibrationSession, Command, FrameReport, IntensityFrame, Mode, PixelLayout, SessionConfig, SpnSource,
    VisualFrame, logger,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const WINDOW_NAME: &str = "Sensor Analysis";
const MARKER_RADIUS: i32 = 5;
const FALLBACK_FPS: f64 = 30.0;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Live hot pixel, dead pixel and sensor pattern noise analysis"
)]
struct Args {
    #[arg(short = 'c', long, default_value_t = 0, help = "Camera index")]
    camera: i32,

    #[arg(
        short = 'i',
        long,
        help = "Read frames from a video file instead of a camera",
        conflicts_with = "camera"
    )]
    input: Option<PathBuf>,

    #[arg(short = 'o', long, help = "Write the annotated stream to a video file")]
    output: Option<PathBuf>,

    #[arg(long, default_value_t = 640, help = "Requested camera frame width")]
    width: u32,

    #[arg(long, default_value_t = 480, help = "Requested camera frame height")]
    height: u32,

    #[arg(long, default_value_t = DEFAULT_DARK_THRESHOLD, help = "8-bit level above which a dark-field pixel is hot")]
    dark_threshold: f64,

    #[arg(long, default_value_t = DEFAULT_FLAT_FRACTION, help = "Fraction of the flat-field mean below which a pixel is dead")]
    flat_fraction: f64,

    #[arg(long, value_name = "LEVEL", help = "Lower bound for the adaptive dead pixel threshold")]
    min_flat_threshold: Option<f64>,

    #[arg(short = 'n', long, default_value_t = DEFAULT_CONVERGENCE_FRAMES, help = "Frames to integrate per calibration")]
    frames: u32,

    #[arg(long, help = "Mirror frames horizontally (selfie webcams)")]
    mirror: bool,

    #[arg(long, help = "Compute the SPN view from the live frame instead of the average")]
    live_spn: bool,

    #[arg(long, value_enum, help = "Start this calibration on the first frame")]
    calibrate: Option<CalibrationArg>,

    #[arg(long, help = "Do not open a window; useful with --input and --calibrate")]
    headless: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CalibrationArg {
    Dark,
    Flat,
}

impl From<CalibrationArg> for Command {
    fn from(arg: CalibrationArg) -> Self {
        match arg {
            CalibrationArg::Dark => Command::StartDarkCalibration,
            CalibrationArg::Flat => Command::StartFlatCalibration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Engine(Command),
    Quit,
}

fn key_action(key: i32) -> Option<KeyAction> {
    let key = u8::try_from(key & 0xFF).ok()?;
    match key {
        b'd' => Some(KeyAction::Engine(Command::StartDarkCalibration)),
        b'f' => Some(KeyAction::Engine(Command::StartFlatCalibration)),
        b's' => Some(KeyAction::Engine(Command::RequestSpnView)),
        b'r' => Some(KeyAction::Engine(Command::Reset)),
        b'q' => Some(KeyAction::Quit),
        _ => None,
    }
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            convergence_frames: self.frames,
            dark_threshold: self.dark_threshold,
            flat_fraction: self.flat_fraction,
            min_flat_threshold: self.min_flat_threshold,
            spn_source: if self.live_spn {
                SpnSource::LiveFrame
            } else {
                SpnSource::Accumulated
            },
            ..SessionConfig::default()
        }
    }
}

fn main() -> Result<()> {
    logger::init();
    let args = Args::parse();

    let mut cap = open_capture(&args)?;
    let fps = match cap.get(videoio::CAP_PROP_FPS)? {
        fps if fps > 0.0 => fps,
        _ => FALLBACK_FPS,
    };

    let mut session = CalibrationSession::new(args.session_config()).context("Invalid calibration settings")?;

    info!("--- CAMERA SENSOR ANALYSIS ---");
    info!("'d': dark calibration (cover the lens)");
    info!("'f': flat-field calibration (point at a white surface)");
    info!("'s': sensor pattern noise view");
    info!("'r': reset / live mode");
    info!("'q': quit");

    if !args.headless {
        highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE)?;
    }
    if let Some(calibration) = args.calibrate {
        session.apply(calibration.into())?;
    }

    let mut writer: Option<VideoWriter> = None;
    let mut frame = Mat::default();
    loop {
        if !cap.read(&mut frame)? || frame.empty() {
            info!("End of stream");
            break;
        }
        if args.mirror {
            let mut mirrored = Mat::default();
            core::flip(&frame, &mut mirrored, 1)?;
            frame = mirrored;
        }

        if !args.headless {
            match key_action(highgui::wait_key(1)?) {
                Some(KeyAction::Quit) => break,
                Some(KeyAction::Engine(command)) => {
                    if let Err(e) = session.apply(command) {
                        warn!("{e}");
                    }
                }
                None => {}
            }
        }

        let intensity = to_intensity(&frame)?;
        let report = session.process_frame(&intensity)?;
        if let Some(outcome) = &report.outcome {
            info!(
                "{} calibration complete: {} defects (threshold {:.1})",
                outcome.kind, outcome.defects, outcome.threshold
            );
        }

        let display = render(&frame, &report)?;

        if let Some(path) = &args.output {
            if writer.is_none() {
                writer = Some(open_writer(path, fps, display.size()?)?);
            }
            if let Some(writer) = writer.as_mut() {
                writer.write(&display)?;
            }
        }
        if !args.headless {
            highgui::imshow(WINDOW_NAME, &display)?;
        }
    }

    info!(
        hot = session.hot_pixels().len(),
        dead = session.dead_pixels().len(),
        "Session finished"
    );
    if !args.headless {
        highgui::destroy_all_windows()?;
    }
    Ok(())
}

fn open_capture(args: &Args) -> Result<VideoCapture> {
    let cap = match &args.input {
        Some(path) => {
            let path = path.to_str().context("Input path is not valid UTF-8")?;
            VideoCapture::from_file(path, videoio::CAP_ANY)?
        }
        None => {
            let mut cap = VideoCapture::new(args.camera, videoio::CAP_ANY)?;
            cap.set(videoio::CAP_PROP_FRAME_WIDTH, args.width as f64)?;
            cap.set(videoio::CAP_PROP_FRAME_HEIGHT, args.height as f64)?;
            cap
        }
    };
    if !cap.is_opened()? {
        bail!("Could not open the video source");
    }
    Ok(cap)
}

fn open_writer(path: &Path, fps: f64, size: Size) -> Result<VideoWriter> {
    let path = path.to_str().context("Output path is not valid UTF-8")?;
    let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
    let writer = VideoWriter::new(path, fourcc, fps, size, true)?;
    if !writer.is_opened()? {
        bail!("Could not open {path} for writing");
    }
    Ok(writer)
}

/// Converts an OpenCV BGR frame to the engine's luminance frame.
fn to_intensity(frame: &Mat) -> Result<IntensityFrame> {
    let width = frame.cols() as u32;
    let height = frame.rows() as u32;
    let packed;
    let frame = if frame.is_continuous() {
        frame
    } else {
        let mut copy = Mat::default();
        frame.copy_to(&mut copy)?;
        packed = copy;
        &packed
    };
    let intensity = IntensityFrame::from_bytes(frame.data_bytes()?, width, height, PixelLayout::Bgr)
        .context("Unexpected frame layout; expected 8-bit BGR")?;
    Ok(intensity)
}

fn visual_to_bgr(visual: &VisualFrame) -> Result<Mat> {
    let size = Size::new(visual.width() as i32, visual.height() as i32);
    let mut gray = Mat::new_size_with_default(size, core::CV_8UC1, Scalar::all(0.0))?;
    gray.data_bytes_mut()?.copy_from_slice(visual.as_raw());
    let mut bgr = Mat::default();
    imgproc::cvt_color(&gray, &mut bgr, imgproc::COLOR_GRAY2BGR, 0)?;
    Ok(bgr)
}

/// Draws the overlays for the current mode onto a copy of the input frame.
fn render(frame: &Mat, report: &FrameReport) -> Result<Mat> {
    let mut display = match &report.spn_view {
        Some(visual) => visual_to_bgr(visual)?,
        None => frame.try_clone()?,
    };
    let height = display.rows();

    let red = Scalar::new(0.0, 0.0, 255.0, 0.0);
    let blue = Scalar::new(255.0, 0.0, 0.0, 0.0);
    let green = Scalar::new(0.0, 255.0, 0.0, 0.0);
    let yellow = Scalar::new(0.0, 255.0, 255.0, 0.0);
    let white = Scalar::new(255.0, 255.0, 255.0, 0.0);

    match report.mode {
        Mode::DarkCalib | Mode::FlatCalib => {
            let (label, color) = match report.mode {
                Mode::DarkCalib => ("Dark calibration", red),
                _ => ("Flat-field calibration", blue),
            };
            let text = format!("{label}: {}/{}", report.progress, report.target);
            draw_text(&mut display, &text, Point::new(10, 30), 0.7, color, 2)?;
        }
        Mode::SpnView => {
            draw_text(&mut display, "SPN (Sensor Pattern Noise) view", Point::new(10, 30), 0.7, yellow, 2)?;
        }
        Mode::Live => {
            for coord in &report.hot_pixels {
                let center = Point::new(coord.x as i32, coord.y as i32);
                imgproc::circle(&mut display, center, MARKER_RADIUS, red, 1, imgproc::LINE_8, 0)?;
            }
            for coord in &report.dead_pixels {
                let center = Point::new(coord.x as i32, coord.y as i32);
                imgproc::circle(&mut display, center, MARKER_RADIUS, blue, 1, imgproc::LINE_8, 0)?;
            }
            let info = format!("Hot: {} | Dead: {}", report.hot_pixels.len(), report.dead_pixels.len());
            draw_text(&mut display, &info, Point::new(10, height - 20), 0.6, white, 1)?;
        }
    }

    if report.outcome.is_some() {
        draw_text(&mut display, "Analysis complete!", Point::new(10, 60), 0.7, green, 2)?;
    }
    draw_text(&mut display, &report.notice, Point::new(10, height - 45), 0.5, green, 1)?;

    Ok(display)
}

fn draw_text(img: &mut Mat, text: &str, org: Point, scale: f64, color: Scalar, thickness: i32) -> Result<()> {
    imgproc::put_text(
        img,
        text,
        org,
        imgproc::FONT_HERSHEY_SIMPLEX,
        scale,
        color,
        thickness,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(key_action('d' as i32), Some(KeyAction::Engine(Command::StartDarkCalibration)));
        assert_eq!(key_action('f' as i32), Some(KeyAction::Engine(Command::StartFlatCalibration)));
        assert_eq!(key_action('s' as i32), Some(KeyAction::Engine(Command::RequestSpnView)));
        assert_eq!(key_action('r' as i32), Some(KeyAction::Engine(Command::Reset)));
        assert_eq!(key_action('q' as i32), Some(KeyAction::Quit));
        assert_eq!(key_action(-1), None);
        assert_eq!(key_action('x' as i32), None);
    }

    #[test]
    fn high_bits_are_masked() {
        assert_eq!(key_action(0x100 | 'q' as i32), Some(KeyAction::Quit));
    }

    #[test]
    fn args_parse_headless_calibration() {
        let args = Args::parse_from(["sensor_tester", "--input", "clip.mp4", "--calibrate", "dark", "--headless"]);
        assert!(args.headless);
        assert!(matches!(args.calibrate, Some(CalibrationArg::Dark)));
        assert_eq!(args.frames, DEFAULT_CONVERGENCE_FRAMES);
        assert_eq!(Command::from(CalibrationArg::Flat), Command::StartFlatCalibration);
    }

    #[test]
    fn args_build_a_valid_config() {
        let args = Args::parse_from([
            "sensor_tester",
            "--frames",
            "12",
            "--flat-fraction",
            "0.4",
            "--min-flat-threshold",
            "8",
            "--live-spn",
        ]);
        let config = args.session_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.convergence_frames, 12);
        assert_eq!(config.flat_fraction, 0.4);
        assert_eq!(config.min_flat_threshold, Some(8.0));
        assert_eq!(config.spn_source, SpnSource::LiveFrame);
        assert_eq!(config.dark_threshold, DEFAULT_DARK_THRESHOLD);

        let defaults = Args::parse_from(["sensor_tester"]).session_config();
        assert_eq!(defaults, SessionConfig::default());
    }

    #[test]
    fn out_of_range_flat_fraction_fails_validation() {
        let args = Args::parse_from(["sensor_tester", "--flat-fraction", "1.5"]);
        assert!(args.session_config().validate().is_err());
    }
}
