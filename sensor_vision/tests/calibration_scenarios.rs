use sensor_vision::{
    CalibrationKind, CalibrationSession, IntensityFrame, Mode, PixelLayout, SensorError, SessionConfig,
};

const WIDTH: u32 = 16;
const HEIGHT: u32 = 12;
const HOT: (u32, u32) = (5, 7);

fn dark_frame_with_hot_pixel() -> IntensityFrame {
    IntensityFrame::from_fn(WIDTH, HEIGHT, |x, y| if (x, y) == HOT { 200.0 } else { 0.0 })
}

fn session() -> CalibrationSession {
    CalibrationSession::new(SessionConfig::default()).unwrap()
}

/// Runs the dark calibration scenario and returns the session in its final state.
fn run_dark_calibration() -> CalibrationSession {
    let mut session = session();
    session.start_dark_calibration().unwrap();
    let frame = dark_frame_with_hot_pixel();
    for _ in 0..31 {
        session.process_frame(&frame).unwrap();
    }
    session
}

#[test]
fn starting_dark_calibration_clears_state() {
    let mut session = session();
    assert_eq!(session.mode(), Mode::Live);

    assert_eq!(session.start_dark_calibration(), Ok(Mode::DarkCalib));
    assert_eq!(session.mode(), Mode::DarkCalib);
    assert_eq!(session.progress(), 0);
    assert!(session.hot_pixels().is_empty());
}

#[test]
fn dark_calibration_finds_the_hot_pixel_after_31_frames() {
    let mut session = session();
    session.start_dark_calibration().unwrap();
    let frame = dark_frame_with_hot_pixel();

    for n in 1..=30 {
        let report = session.process_frame(&frame).unwrap();
        assert_eq!(report.mode, Mode::DarkCalib, "frame {n} must not complete the calibration");
        assert_eq!(report.progress, n);
        assert_eq!(report.target, 30);
        assert!(report.outcome.is_none());
        assert!(report.hot_pixels.is_empty());
    }

    let report = session.process_frame(&frame).unwrap();
    assert_eq!(report.mode, Mode::Live);
    assert_eq!(report.progress, 31);
    let outcome = report.outcome.expect("calibration completes on frame 31");
    assert_eq!(outcome.kind, CalibrationKind::Dark);
    assert_eq!(outcome.threshold, 15.0);
    assert_eq!(outcome.defects, 1);

    assert_eq!(session.hot_pixels().len(), 1);
    assert!(session.hot_pixels().contains(HOT));
    assert_eq!(report.hot_pixels, *session.hot_pixels());
    assert_eq!(report.notice, "Dark calibration finished: 1 hot pixels found.");
}

#[test]
fn spn_request_without_data_is_rejected() {
    let mut session = session();
    assert!(session.hot_pixels().is_empty());
    assert!(session.dead_pixels().is_empty());

    assert_eq!(session.request_spn_view(), Err(SensorError::SpnUnavailable));
    assert_eq!(session.mode(), Mode::Live);
}

#[test]
fn manual_reset_keeps_defect_history() {
    let mut session = run_dark_calibration();
    assert!(session.accumulated().is_some());

    assert_eq!(session.reset(), Ok(Mode::Live));
    assert_eq!(session.mode(), Mode::Live);
    assert!(session.accumulated().is_none());
    assert_eq!(session.progress(), 0);
    assert!(session.hot_pixels().contains(HOT));

    // With the average gone, SPN view is unavailable again.
    assert_eq!(session.request_spn_view(), Err(SensorError::SpnUnavailable));
}

#[test]
fn spn_view_follows_a_completed_calibration() {
    let mut session = run_dark_calibration();
    assert_eq!(session.request_spn_view(), Ok(Mode::SpnView));

    let report = session.process_frame(&dark_frame_with_hot_pixel()).unwrap();
    assert_eq!(report.mode, Mode::SpnView);
    let spn = report.spn_view.expect("SPN view carries a visual frame");
    assert_eq!(spn.dimensions(), (WIDTH, HEIGHT));
    assert_eq!(spn.get_pixel(HOT.0, HOT.1).0[0], 255);
    // Defect sets stay visible while viewing SPN.
    assert!(report.hot_pixels.contains(HOT));
}

#[test]
fn flat_calibration_uses_the_adaptive_threshold() {
    let mut session = session();
    session.start_flat_calibration().unwrap();

    let dead = [(0, 0), (9, 4)];
    let dim = (3, 3);
    let frame = IntensityFrame::from_fn(WIDTH, HEIGHT, |x, y| {
        if dead.contains(&(x, y)) {
            4.0
        } else if (x, y) == dim {
            // Below the mean but above half of it.
            120.0
        } else {
            180.0
        }
    });

    let mut outcome = None;
    for _ in 0..31 {
        outcome = session.process_frame(&frame).unwrap().outcome;
    }
    let outcome = outcome.expect("flat calibration completes on frame 31");
    assert_eq!(outcome.kind, CalibrationKind::Flat);

    let pixels = (WIDTH * HEIGHT) as f64;
    let expected_mean = (4.0 * 2.0 + 120.0 + 180.0 * (pixels - 3.0)) / pixels;
    assert!((outcome.threshold - expected_mean * 0.5).abs() < 1e-9);

    assert_eq!(session.mode(), Mode::Live);
    assert_eq!(session.dead_pixels().len(), 2);
    for coord in dead {
        assert!(session.dead_pixels().contains(coord));
    }
    assert!(!session.dead_pixels().contains(dim));
}

#[test]
fn each_calibration_kind_only_replaces_its_own_set() {
    let mut session = run_dark_calibration();

    session.start_flat_calibration().unwrap();
    assert!(session.hot_pixels().contains(HOT));
    assert!(session.dead_pixels().is_empty());

    let flat = IntensityFrame::from_fn(WIDTH, HEIGHT, |x, y| if (x, y) == (1, 1) { 0.0 } else { 200.0 });
    for _ in 0..31 {
        session.process_frame(&flat).unwrap();
    }
    assert!(session.dead_pixels().contains((1, 1)));
    assert!(session.hot_pixels().contains(HOT));

    // A new dark calibration clears hot pixels immediately; dead pixels stay.
    session.start_dark_calibration().unwrap();
    assert!(session.hot_pixels().is_empty());
    assert!(session.dead_pixels().contains((1, 1)));
}

#[test]
fn noisy_dark_frames_converge_to_the_fixed_defect() {
    let mut session = session();
    session.start_dark_calibration().unwrap();

    // A single-frame flash at (10, 2) is transient; the hot pixel is always on.
    for n in 0..31u32 {
        let frame = IntensityFrame::from_fn(WIDTH, HEIGHT, |x, y| {
            if (x, y) == HOT {
                90.0
            } else if (x, y) == (10, 2) && n == 7 {
                250.0
            } else {
                ((x + y + n) % 5) as f32
            }
        });
        session.process_frame(&frame).unwrap();
    }

    let hot = session.hot_pixels();
    assert_eq!(hot.len(), 1);
    assert!(hot.contains(HOT));
    assert!(!hot.contains((10, 2)));
}

#[test]
fn bgr_capture_path_feeds_the_session() {
    let mut session = session();
    session.start_dark_calibration().unwrap();

    let mut bgr = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    let offset = ((HOT.1 * WIDTH + HOT.0) * 3) as usize;
    bgr[offset..offset + 3].copy_from_slice(&[255, 255, 255]);
    let frame = IntensityFrame::from_bytes(&bgr, WIDTH, HEIGHT, PixelLayout::Bgr).unwrap();

    for _ in 0..31 {
        session.process_frame(&frame).unwrap();
    }
    assert_eq!(session.hot_pixels().len(), 1);
    assert!(session.hot_pixels().contains(HOT));
}

#[test]
fn cancelled_calibration_publishes_nothing() {
    let mut session = run_dark_calibration();
    assert!(session.hot_pixels().contains(HOT));

    session.start_dark_calibration().unwrap();
    let frame = dark_frame_with_hot_pixel();
    for _ in 0..10 {
        let report = session.process_frame(&frame).unwrap();
        assert!(report.outcome.is_none());
    }

    assert_eq!(session.reset(), Ok(Mode::Live));
    let report = session.process_frame(&frame).unwrap();
    assert_eq!(report.mode, Mode::Live);
    assert_eq!(report.progress, 0);
    assert!(report.outcome.is_none());
    assert!(report.hot_pixels.is_empty());
    assert!(session.hot_pixels().is_empty());
    assert!(session.accumulated().is_none());
}
