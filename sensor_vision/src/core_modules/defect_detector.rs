// THEORY:
// The `DefectDetector` is the segmentation layer. It takes the materialized 8-bit view
// of a converged average and reports every coordinate that crosses a threshold:
//
// - `detect_bright` finds hot pixels on a dark-field average (strictly above).
// - `detect_dark` finds dead pixels on a flat-field average (strictly below).
//
// It is a stateless utility with no memory of previous frames and no spatial
// reasoning. Adjacent defects are reported one by one; nothing is clustered.
//
// Threshold policy belongs to the caller. The helpers below compute the adaptive
// flat-field threshold (a fraction of mean brightness) because a flat field's
// absolute level depends on the ambient light and cannot be hardcoded.

use crate::core_modules::defect_set::{DefectSet, PixelCoord};
use crate::core_modules::intensity_frame::DisplayFrame;

pub mod defect_detector {
    use super::*;

    /// Coordinates whose 8-bit intensity is strictly greater than `threshold`.
    pub fn detect_bright(avg: &DisplayFrame, threshold: f64) -> DefectSet {
        collect_where(avg, |value| value > threshold)
    }

    /// Coordinates whose 8-bit intensity is strictly less than `threshold`.
    pub fn detect_dark(avg: &DisplayFrame, threshold: f64) -> DefectSet {
        collect_where(avg, |value| value < threshold)
    }

    /// Mean 8-bit intensity; an empty frame has mean zero.
    pub fn mean_intensity(avg: &DisplayFrame) -> f64 {
        let raw = avg.as_raw();
        if raw.is_empty() {
            return 0.0;
        }
        raw.iter().map(|&v| v as u64).sum::<u64>() as f64 / raw.len() as f64
    }

    /// The adaptive dead-pixel threshold: `fraction` of the mean, raised to `floor`
    /// when one is given.
    pub fn flat_field_threshold(avg: &DisplayFrame, fraction: f64, floor: Option<f64>) -> f64 {
        let threshold = mean_intensity(avg) * fraction;
        match floor {
            Some(min) => threshold.max(min),
            None => threshold,
        }
    }

    fn collect_where(avg: &DisplayFrame, predicate: impl Fn(f64) -> bool) -> DefectSet {
        avg.enumerate_pixels()
            .filter(|(_, _, pixel)| predicate(pixel.0[0] as f64))
            .map(|(x, y, _)| PixelCoord::new(x, y))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::defect_detector::*;
    use image::{GrayImage, Luma};

    fn dark_field_with_hot_pixels() -> GrayImage {
        let mut frame = GrayImage::from_pixel(8, 6, Luma([3]));
        frame.put_pixel(2, 1, Luma([200]));
        frame.put_pixel(7, 5, Luma([40]));
        frame.put_pixel(4, 3, Luma([16]));
        frame.put_pixel(0, 0, Luma([15]));
        frame
    }

    #[test]
    fn bright_detection_is_strictly_greater() {
        let hot = detect_bright(&dark_field_with_hot_pixels(), 15.0);
        assert_eq!(hot.len(), 3);
        assert!(hot.contains((2, 1)));
        assert!(hot.contains((4, 3)));
        assert!(hot.contains((7, 5)));
        // Exactly at the threshold does not count.
        assert!(!hot.contains((0, 0)));
    }

    #[test]
    fn dark_detection_is_strictly_less() {
        let mut flat = GrayImage::from_pixel(5, 5, Luma([180]));
        flat.put_pixel(1, 4, Luma([0]));
        flat.put_pixel(3, 2, Luma([90]));
        flat.put_pixel(0, 1, Luma([89]));

        let dead = detect_dark(&flat, 90.0);
        assert_eq!(dead.len(), 2);
        assert!(dead.contains((1, 4)));
        assert!(dead.contains((0, 1)));
        assert!(!dead.contains((3, 2)));
    }

    #[test]
    fn raising_the_threshold_never_adds_hot_pixels() {
        let frame = GrayImage::from_fn(16, 16, |x, y| Luma([((x * 37 + y * 11) % 256) as u8]));
        let mut previous = usize::MAX;
        for threshold in (0..=260).step_by(5) {
            let count = detect_bright(&frame, threshold as f64).len();
            assert!(count <= previous);
            previous = count;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn lowering_the_threshold_never_adds_dead_pixels() {
        let frame = GrayImage::from_fn(16, 16, |x, y| Luma([((x * 19 + y * 23) % 256) as u8]));
        let mut previous = usize::MAX;
        for threshold in (0..=260).rev().step_by(5) {
            let count = detect_dark(&frame, threshold as f64).len();
            assert!(count <= previous);
            previous = count;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn uniform_average_yields_empty_sets() {
        let v = 120u8;
        let frame = GrayImage::from_pixel(10, 10, Luma([v]));
        for threshold in [120.0, 120.5, 200.0, 255.0] {
            assert!(detect_bright(&frame, threshold).is_empty());
        }
        for threshold in [0.0, 60.0, 119.9, 120.0] {
            assert!(detect_dark(&frame, threshold).is_empty());
        }
    }

    #[test]
    fn flat_threshold_follows_the_mean() {
        let mut flat = GrayImage::from_pixel(4, 1, Luma([200]));
        flat.put_pixel(0, 0, Luma([0]));
        // mean = 150
        assert!((mean_intensity(&flat) - 150.0).abs() < 1e-9);
        assert!((flat_field_threshold(&flat, 0.5, None) - 75.0).abs() < 1e-9);
        assert!((flat_field_threshold(&flat, 0.5, Some(100.0)) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn black_flat_field_degenerates_to_zero_threshold() {
        let black = GrayImage::new(3, 3);
        let threshold = flat_field_threshold(&black, 0.5, None);
        assert_eq!(threshold, 0.0);
        assert!(detect_dark(&black, threshold).is_empty());
    }
}
