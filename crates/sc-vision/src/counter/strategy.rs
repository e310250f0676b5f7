use super::assets::GlyphTemplates;
use super::glyph::{foreground_box, glyph_boxes, projection_split_column, GlyphBox};
use super::DecoderConfig;
use crate::preprocess::{binarize, otsu_level, preprocess_digits, Polarity};
use crate::recognizer::{whitelist, Recognition, TextRecognizer};
use image::GrayImage;

/// One way of turning a counter side into a digit string.
pub trait ReadStrategy {
    fn name(&self) -> &str;

    fn read(&self, side: &GrayImage) -> Recognition;
}

/// Longer strings outrank shorter ones, then confidence breaks the tie.
fn outranks(a: &Recognition, b: &Recognition) -> bool {
    (a.text.chars().count(), a.confidence) > (b.text.chars().count(), b.confidence)
}

/// Runs strategies in order and returns the first non-empty read.
pub struct FirstNonEmpty<'a> {
    strategies: Vec<Box<dyn ReadStrategy + 'a>>,
}

impl<'a> FirstNonEmpty<'a> {
    pub fn new(strategies: Vec<Box<dyn ReadStrategy + 'a>>) -> Self {
        Self { strategies }
    }
}

impl ReadStrategy for FirstNonEmpty<'_> {
    fn name(&self) -> &str {
        "first_non_empty"
    }

    fn read(&self, side: &GrayImage) -> Recognition {
        for strategy in &self.strategies {
            let r = strategy.read(side);
            if !r.is_empty() {
                tracing::trace!("{} read '{}' ({:.3})", strategy.name(), r.text, r.confidence);
                return r;
            }
        }
        Recognition::empty()
    }
}

/// Runs every strategy and keeps the best read by (length, confidence).
/// The earlier strategy wins an exact tie.
pub struct BestOf<'a> {
    strategies: Vec<Box<dyn ReadStrategy + 'a>>,
}

impl<'a> BestOf<'a> {
    pub fn new(strategies: Vec<Box<dyn ReadStrategy + 'a>>) -> Self {
        Self { strategies }
    }
}

impl ReadStrategy for BestOf<'_> {
    fn name(&self) -> &str {
        "best_of"
    }

    fn read(&self, side: &GrayImage) -> Recognition {
        let mut best = Recognition::empty();
        for strategy in &self.strategies {
            let r = strategy.read(side);
            if outranks(&r, &best) {
                best = r;
            }
        }
        best
    }
}

/// Text recognizer restricted to digits, fed the upscaled binarized side.
pub struct OcrDigits<'a> {
    recognizer: &'a dyn TextRecognizer,
    config: &'a DecoderConfig,
}

impl<'a> OcrDigits<'a> {
    pub fn new(recognizer: &'a dyn TextRecognizer, config: &'a DecoderConfig) -> Self {
        Self { recognizer, config }
    }
}

impl ReadStrategy for OcrDigits<'_> {
    fn name(&self) -> &str {
        "ocr_digits"
    }

    fn read(&self, side: &GrayImage) -> Recognition {
        if side.width() == 0 || side.height() == 0 {
            return Recognition::empty();
        }
        let prepared = preprocess_digits(side, &self.config.preprocess);
        let r = self.recognizer.read(&prepared, Some(whitelist::DIGITS));
        let digits: String = r.text.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Recognition::empty();
        }
        Recognition::new(digits, r.confidence.clamp(0.0, 1.0))
    }
}

/// Classify each glyph box against the digit set, concatenated left to right.
/// Confidence is the weakest glyph's.
fn classify_boxes(templates: &GlyphTemplates, side: &GrayImage, boxes: &[GlyphBox]) -> Recognition {
    if boxes.is_empty() {
        return Recognition::empty();
    }
    let mut text = String::new();
    let mut confidence = f64::INFINITY;
    for b in boxes {
        let Some((digit, score)) = templates.classify(&b.crop(side)) else {
            return Recognition::empty();
        };
        text.push(digit);
        confidence = confidence.min(score);
    }
    Recognition::new(text, confidence)
}

/// Connected components of the thresholded side, leftmost first.
pub struct GlyphComponents<'a> {
    templates: &'a GlyphTemplates,
    config: &'a DecoderConfig,
    polarity: Polarity,
}

impl<'a> GlyphComponents<'a> {
    pub fn new(templates: &'a GlyphTemplates, config: &'a DecoderConfig, polarity: Polarity) -> Self {
        Self {
            templates,
            config,
            polarity,
        }
    }
}

impl ReadStrategy for GlyphComponents<'_> {
    fn name(&self) -> &str {
        match self.polarity {
            Polarity::Bright => "components_bright",
            Polarity::Dark => "components_dark",
        }
    }

    fn read(&self, side: &GrayImage) -> Recognition {
        if side.width() == 0 || side.height() == 0 {
            return Recognition::empty();
        }
        let mask = binarize(side, otsu_level(side), self.polarity);
        let mut boxes = glyph_boxes(&mask, self.config.min_glyph_height_ratio);
        boxes.truncate(self.config.max_glyphs_per_side);
        classify_boxes(self.templates, side, &boxes)
    }
}

/// Two-glyph read: split the side at its emptiest middle column and
/// classify each half.
pub struct GlyphProjection<'a> {
    templates: &'a GlyphTemplates,
    config: &'a DecoderConfig,
    polarity: Polarity,
}

impl<'a> GlyphProjection<'a> {
    pub fn new(templates: &'a GlyphTemplates, config: &'a DecoderConfig, polarity: Polarity) -> Self {
        Self {
            templates,
            config,
            polarity,
        }
    }
}

impl ReadStrategy for GlyphProjection<'_> {
    fn name(&self) -> &str {
        match self.polarity {
            Polarity::Bright => "projection_bright",
            Polarity::Dark => "projection_dark",
        }
    }

    fn read(&self, side: &GrayImage) -> Recognition {
        if side.width() == 0 || side.height() == 0 {
            return Recognition::empty();
        }
        let mask = binarize(side, otsu_level(side), self.polarity);
        let Some(col) = projection_split_column(
            &mask,
            self.config.split_band_start,
            self.config.split_band_end,
            self.config.max_gap_ratio,
        ) else {
            return Recognition::empty();
        };

        let min_height = (side.height() as f64 * self.config.min_glyph_height_ratio).ceil() as u32;
        let halves = [
            foreground_box(&mask, 0, col),
            foreground_box(&mask, col + 1, side.width()),
        ];
        let mut boxes = Vec::with_capacity(2);
        for half in halves {
            match half {
                Some(b) if b.height() >= min_height => boxes.push(b),
                _ => return Recognition::empty(),
            }
        }
        classify_boxes(self.templates, side, &boxes)
    }
}
