//! Counter decoder: turns a `used/total` crop into a validated pair.
//!
//! The crop is split at the divider glyph (or, failing that, at the emptiest
//! middle column), each side is read by an ordered strategy chain, and the
//! result is only as confident as its weakest step.

mod assets;
mod glyph;
mod strategy;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use assets::{GlyphTemplates, DIVIDER_STEM, GLYPH_MATCH_HEIGHT, GLYPH_MATCH_WIDTH};
pub use glyph::{foreground_box, glyph_boxes, projection_split_column, GlyphBox};
pub use strategy::{
    BestOf, FirstNonEmpty, GlyphComponents, GlyphProjection, OcrDigits, ReadStrategy,
};

use crate::correlate::match_template_any_polarity;
use crate::preprocess::{binarize_minority, to_gray, Polarity, PreprocessConfig};
use crate::recognizer::{Recognition, TextRecognizer};
use anyhow::Result;
use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Decoded counter value. Both fields are set only for a valid pair
/// (`0 < used <= total`); otherwise they are `None` and `raw_text` /
/// `confidence` still describe what was read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterReading {
    pub used: Option<u32>,
    pub total: Option<u32>,
    pub raw_text: String,
    pub confidence: f64,
}

impl CounterReading {
    pub fn value(&self) -> Option<(u32, u32)> {
        Some((self.used?, self.total?))
    }

    fn unread(confidence: f64) -> Self {
        Self {
            confidence,
            ..Self::default()
        }
    }
}

/// Decoder thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Divider correlation at or above this splits at the divider
    pub divider_min_confidence: f64,
    /// Fallback split search band, as fractions of the width
    pub split_band_start: f64,
    pub split_band_end: f64,
    /// A split column must have fewer foreground pixels than this fraction of the height
    pub max_gap_ratio: f64,
    pub max_glyphs_per_side: usize,
    pub min_glyph_height_ratio: f64,
    pub preprocess: PreprocessConfig,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            divider_min_confidence: 0.6,
            split_band_start: 0.30,
            split_band_end: 0.70,
            max_gap_ratio: 0.10,
            max_glyphs_per_side: 2,
            min_glyph_height_ratio: 0.35,
            preprocess: PreprocessConfig::default(),
        }
    }
}

/// Where the divider was found in the crop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DividerHit {
    pub x: u32,
    pub width: u32,
    pub confidence: f64,
}

pub struct CounterDecoder {
    templates: GlyphTemplates,
    config: DecoderConfig,
}

impl CounterDecoder {
    pub fn new(templates: GlyphTemplates, config: DecoderConfig) -> Self {
        Self { templates, config }
    }

    /// Load glyph templates from `dir`. Fails when the divider asset is missing.
    pub fn load(dir: &Path, config: DecoderConfig) -> Result<Self> {
        Ok(Self::new(GlyphTemplates::load(dir)?, config))
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn decode(&self, crop: &RgbaImage, recognizer: &dyn TextRecognizer) -> CounterReading {
        let gray = to_gray(crop);
        let divider = self.locate_divider(&gray);
        let divider_confidence = divider.map_or(0.0, |d| d.confidence);

        let Some((left, right)) = self.split_sides(&gray, divider) else {
            debug!("Counter crop has no split point (divider {:.3})", divider_confidence);
            return CounterReading::unread(0.0);
        };

        let chain = self.side_chain(recognizer);
        let left = chain.read(&left);
        let right = chain.read(&right);

        let confidence = left
            .confidence
            .min(right.confidence)
            .min(divider_confidence)
            .clamp(0.0, 1.0);
        validate(&left, &right, confidence)
    }

    /// Best divider placement over the crop and its inverse. `None` when the
    /// crop is smaller than the divider template.
    pub fn locate_divider(&self, gray: &GrayImage) -> Option<DividerHit> {
        let divider = self.templates.divider();
        let hit = match_template_any_polarity(gray, divider)?;
        Some(DividerHit {
            x: hit.x,
            width: divider.width(),
            confidence: hit.score.clamp(0.0, 1.0),
        })
    }

    /// Left and right sides of the counter, divider excluded.
    fn split_sides(&self, gray: &GrayImage, divider: Option<DividerHit>) -> Option<(GrayImage, GrayImage)> {
        let w = gray.width();
        match divider {
            Some(d) if d.confidence >= self.config.divider_min_confidence => {
                // One pixel of margin on each side of the divider
                let left_end = d.x.saturating_sub(1).max(1);
                let right_start = d.x + d.width + 1;
                Some((columns(gray, 0, left_end), columns(gray, right_start, w)))
            }
            _ => {
                let mask = binarize_minority(gray);
                let col = projection_split_column(
                    &mask,
                    self.config.split_band_start,
                    self.config.split_band_end,
                    self.config.max_gap_ratio,
                )?;
                debug!("Counter split by projection at column {}", col);
                Some((columns(gray, 0, col), columns(gray, col + 1, w)))
            }
        }
    }

    /// Digit OCR first; when it reads nothing, the best glyph-template read
    /// across both polarities.
    fn side_chain<'a>(&'a self, recognizer: &'a dyn TextRecognizer) -> FirstNonEmpty<'a> {
        let mut glyph_reads: Vec<Box<dyn ReadStrategy + 'a>> = Vec::new();
        for polarity in Polarity::BOTH {
            glyph_reads.push(Box::new(GlyphComponents::new(
                &self.templates,
                &self.config,
                polarity,
            )));
            glyph_reads.push(Box::new(GlyphProjection::new(
                &self.templates,
                &self.config,
                polarity,
            )));
        }
        FirstNonEmpty::new(vec![
            Box::new(OcrDigits::new(recognizer, &self.config)),
            Box::new(BestOf::new(glyph_reads)),
        ])
    }
}

fn columns(gray: &GrayImage, x0: u32, x1: u32) -> GrayImage {
    let x1 = x1.min(gray.width());
    if x1 <= x0 {
        return GrayImage::new(0, 0);
    }
    image::imageops::crop_imm(gray, x0, 0, x1 - x0, gray.height()).to_image()
}

fn validate(left: &Recognition, right: &Recognition, confidence: f64) -> CounterReading {
    if left.is_empty() || right.is_empty() {
        return CounterReading::unread(confidence);
    }

    let raw_text = format!("{}/{}", left.text, right.text);
    let pair = match (left.text.parse::<u32>(), right.text.parse::<u32>()) {
        (Ok(used), Ok(total)) if used > 0 && used <= total => Some((used, total)),
        _ => None,
    };
    if pair.is_none() {
        debug!("Counter read '{}' rejected", raw_text);
    }

    CounterReading {
        used: pair.map(|(u, _)| u),
        total: pair.map(|(_, t)| t),
        raw_text,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{compose, glyph, glyph_templates, to_rgba};
    use super::*;
    use crate::recognizer::NullRecognizer;
    use image::Luma;

    struct Fixed(&'static str, f64);

    impl TextRecognizer for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn read(&self, _image: &GrayImage, _whitelist: Option<&str>) -> Recognition {
            Recognition::new(self.0, self.1)
        }
    }

    fn decoder() -> CounterDecoder {
        CounterDecoder::new(glyph_templates(), DecoderConfig::default())
    }

    #[test]
    fn test_decode_single_digits() {
        let crop = to_rgba(&compose(&['4', '/', '9'], 2));
        let reading = decoder().decode(&crop, &NullRecognizer);
        assert_eq!(reading.value(), Some((4, 9)));
        assert_eq!(reading.raw_text, "4/9");
        assert!(reading.confidence > 0.99);
    }

    #[test]
    fn test_decode_two_digit_sides() {
        let crop = to_rgba(&compose(&['1', '2', '/', '3', '4'], 2));
        let reading = decoder().decode(&crop, &NullRecognizer);
        assert_eq!(reading.used, Some(12));
        assert_eq!(reading.total, Some(34));
        assert_eq!(reading.raw_text, "12/34");
    }

    #[test]
    fn test_decode_dark_on_light_palette() {
        let mut gray = compose(&['4', '/', '9'], 2);
        image::imageops::invert(&mut gray);
        let reading = decoder().decode(&to_rgba(&gray), &NullRecognizer);
        assert_eq!(reading.value(), Some((4, 9)));
    }

    #[test]
    fn test_used_above_total_is_nulled_with_diagnostics() {
        let crop = to_rgba(&compose(&['9', '/', '4'], 2));
        let reading = decoder().decode(&crop, &NullRecognizer);
        assert_eq!(reading.value(), None);
        assert_eq!(reading.raw_text, "9/4");
        assert!(reading.confidence > 0.99);
    }

    #[test]
    fn test_recognizer_read_takes_precedence() {
        let crop = to_rgba(&compose(&['4', '/', '9'], 2));
        let reading = decoder().decode(&crop, &Fixed("7", 0.8));
        assert_eq!(reading.value(), Some((7, 7)));
        assert!((reading.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_zero_used_is_rejected() {
        let crop = to_rgba(&compose(&['4', '/', '9'], 2));
        let reading = decoder().decode(&crop, &Fixed("0", 0.9));
        assert_eq!(reading.value(), None);
        assert_eq!(reading.raw_text, "0/0");
    }

    #[test]
    fn test_projection_fallback_without_divider_match() {
        // A flat divider template never correlates
        let flat = GrayImage::from_pixel(5, 5, Luma([128]));
        let digits = "0123456789".chars().map(|d| (d, glyph(d))).collect();
        let decoder = CounterDecoder::new(GlyphTemplates::from_images(digits, flat), DecoderConfig::default());

        let crop = to_rgba(&compose(&['4', '9'], 6));
        let reading = decoder.decode(&crop, &NullRecognizer);
        assert_eq!(reading.value(), Some((4, 9)));
        assert_eq!(reading.confidence, 0.0);
    }

    #[test]
    fn test_blank_crop_reads_nothing() {
        let crop = RgbaImage::from_pixel(40, 27, image::Rgba([0, 0, 0, 255]));
        let reading = decoder().decode(&crop, &NullRecognizer);
        assert_eq!(reading, CounterReading::default());
    }

    #[test]
    fn test_crop_smaller_than_divider() {
        let decoder = decoder();
        assert!(decoder.locate_divider(&GrayImage::new(8, 8)).is_none());
        let reading = decoder.decode(&RgbaImage::new(8, 8), &NullRecognizer);
        assert_eq!(reading.value(), None);
    }

    #[test]
    fn test_divider_located() {
        let gray = compose(&['4', '/', '9'], 2);
        let hit = decoder().locate_divider(&gray).unwrap();
        assert_eq!(hit.x, 21);
        assert!(hit.confidence > 0.99);
    }
}
