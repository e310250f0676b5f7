use crate::preprocess::to_gray;
use image::RgbaImage;

pub const DEFAULT_DIFF_THRESHOLD: f64 = 0.03;

/// Mean absolute greyscale difference between two crops, normalized to [0, 1].
/// The candidate is resized to the reference's dimensions when they differ.
pub fn diff_score(reference: &RgbaImage, candidate: &RgbaImage) -> f64 {
    let (w, h) = reference.dimensions();
    if w == 0 || h == 0 || candidate.width() == 0 || candidate.height() == 0 {
        return 0.0;
    }

    let a = to_gray(reference);
    let b = if candidate.dimensions() != (w, h) {
        image::imageops::resize(
            &to_gray(candidate),
            w,
            h,
            image::imageops::FilterType::Triangle,
        )
    } else {
        to_gray(candidate)
    };

    let total: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(pa, pb)| pa[0].abs_diff(pb[0]) as u64)
        .sum();

    total as f64 / (w as f64 * h as f64) / 255.0
}

pub fn changed(reference: &RgbaImage, candidate: &RgbaImage, threshold: f64) -> bool {
    diff_score(reference, candidate) >= threshold
}

/// Stateless gate; the caller owns the last accepted crop.
#[derive(Debug, Clone, Copy)]
pub struct ChangeGate {
    pub threshold: f64,
}

impl Default for ChangeGate {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DIFF_THRESHOLD,
        }
    }
}

impl ChangeGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// A region with no reference yet always counts as changed.
    pub fn should_resample(&self, reference: Option<&RgbaImage>, candidate: &RgbaImage) -> bool {
        match reference {
            Some(r) => changed(r, candidate, self.threshold),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba([0, 0, 0, 255]))
    }

    fn with_white_square(base: &RgbaImage, size: u32) -> RgbaImage {
        let mut out = base.clone();
        for y in 5..5 + size {
            for x in 5..5 + size {
                out.put_pixel(x, y, image::Rgba([255, 255, 255, 255]));
            }
        }
        out
    }

    #[test]
    fn test_diff_score_detects_change() {
        let a = black(20, 20);
        let b = with_white_square(&a, 5);
        let score = diff_score(&a, &b);
        assert!((score - 25.0 / 400.0).abs() < 1e-9, "score was {}", score);
        assert!(changed(&a, &b, DEFAULT_DIFF_THRESHOLD));
    }

    #[test]
    fn test_identical_crops_never_change() {
        let a = with_white_square(&black(20, 20), 7);
        for threshold in [1e-6, 0.03, 0.5, 1.0] {
            assert!(!changed(&a, &a, threshold));
        }
    }

    #[test]
    fn test_larger_disturbance_scores_higher() {
        let base = black(30, 30);
        let small = diff_score(&base, &with_white_square(&base, 3));
        let large = diff_score(&base, &with_white_square(&base, 9));
        assert!(large > small);
    }

    #[test]
    fn test_mismatched_dimensions_are_resized() {
        let a = black(20, 20);
        let b = black(40, 10);
        assert_eq!(diff_score(&a, &b), 0.0);
    }

    #[test]
    fn test_gate_without_reference() {
        let gate = ChangeGate::default();
        let crop = black(8, 8);
        assert!(gate.should_resample(None, &crop));
        assert!(!gate.should_resample(Some(&crop), &crop));
    }
}
