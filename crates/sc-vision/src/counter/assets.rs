use crate::correlate::{compute_stats, normalized_cross_correlation};
use crate::preprocess::{binarize_minority, invert};
use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Canonical size glyph crops and digit templates are resized to before NCC
pub const GLYPH_MATCH_WIDTH: u32 = 16;
pub const GLYPH_MATCH_HEIGHT: u32 = 24;

/// File stem of the divider glyph asset
pub const DIVIDER_STEM: &str = "slash";

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Pre-processed digit template for matching
struct DigitTemplate {
    digit: char,
    gray: GrayImage,
    /// Pre-computed mean and std for NCC
    mean: f64,
    std_dev: f64,
}

/// Reference glyphs for the counter: digits 0-9 plus the divider.
pub struct GlyphTemplates {
    digits: Vec<DigitTemplate>,
    divider: GrayImage,
}

impl GlyphTemplates {
    /// Load `0.png` .. `9.png` and `slash.png` (png/jpg/jpeg) from `dir`.
    /// Missing digits are tolerated; a missing divider is a configuration error.
    pub fn load(dir: &Path) -> Result<Self> {
        let divider_path = find_asset(dir, DIVIDER_STEM)
            .ok_or_else(|| anyhow!("Divider template not found in {}", dir.display()))?;
        let divider = image::open(&divider_path)
            .with_context(|| format!("Failed to open {}", divider_path.display()))?
            .to_luma8();

        let mut digits = Vec::new();
        for d in 0..10u32 {
            let Some(ch) = char::from_digit(d, 10) else {
                continue;
            };
            let Some(path) = find_asset(dir, &d.to_string()) else {
                debug!("Missing digit template {} in {}", d, dir.display());
                continue;
            };
            let img = image::open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?
                .to_luma8();
            digits.push((ch, img));
        }

        let templates = Self::from_images(digits, divider);
        info!(
            "Glyph templates loaded from {}: {} digit(s) + divider",
            dir.display(),
            templates.digit_count()
        );
        Ok(templates)
    }

    /// Build from in-memory images. Digit images are trimmed to their glyph.
    pub fn from_images(digits: Vec<(char, GrayImage)>, divider: GrayImage) -> Self {
        let digits = digits
            .into_iter()
            .filter_map(|(digit, img)| {
                let gray = normalize_glyph(&trim_to_glyph(&img)?);
                let (mean, std_dev) = compute_stats(&gray);
                Some(DigitTemplate {
                    digit,
                    gray,
                    mean,
                    std_dev,
                })
            })
            .collect();
        Self { digits, divider }
    }

    pub fn divider(&self) -> &GrayImage {
        &self.divider
    }

    pub fn digit_count(&self) -> usize {
        self.digits.len()
    }

    /// Best digit for one glyph crop, trying the crop and its tonal inverse.
    /// Returns `None` only when no digit templates are loaded.
    pub fn classify(&self, glyph: &GrayImage) -> Option<(char, f64)> {
        if self.digits.is_empty() || glyph.width() == 0 || glyph.height() == 0 {
            return None;
        }

        let direct = normalize_glyph(glyph);
        let inverse = invert(&direct);
        let (d_mean, d_std) = compute_stats(&direct);
        let (i_mean, i_std) = compute_stats(&inverse);

        let mut best: Option<(char, f64)> = None;
        for tmpl in &self.digits {
            let score = normalized_cross_correlation(
                &direct, d_mean, d_std, &tmpl.gray, tmpl.mean, tmpl.std_dev,
            )
            .max(normalized_cross_correlation(
                &inverse, i_mean, i_std, &tmpl.gray, tmpl.mean, tmpl.std_dev,
            ));
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((tmpl.digit, score));
            }
        }

        best.map(|(digit, score)| (digit, score.clamp(0.0, 1.0)))
    }
}

fn find_asset(dir: &Path, stem: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|p| p.exists())
}

/// Crop an image to the bounding box of its minority-tone pixels.
fn trim_to_glyph(img: &GrayImage) -> Option<GrayImage> {
    let mask = binarize_minority(img);
    let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0u32, 0u32);
    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] > 0 {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
    }
    if x0 == u32::MAX {
        return None;
    }
    Some(image::imageops::crop_imm(img, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image())
}

pub(crate) fn normalize_glyph(img: &GrayImage) -> GrayImage {
    image::imageops::resize(
        img,
        GLYPH_MATCH_WIDTH,
        GLYPH_MATCH_HEIGHT,
        image::imageops::FilterType::Triangle,
    )
}
