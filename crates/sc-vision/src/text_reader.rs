use crate::preprocess::{preprocess_text, PreprocessConfig};
use crate::recognizer::{whitelist, Recognition, TextRecognizer};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Horizontal strip of a region, as fractions of its height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBand {
    pub top: f64,
    pub height: f64,
}

/// Unit name line of the selection panel
pub const NAME_BAND: TextBand = TextBand {
    top: 0.0,
    height: 0.35,
};
/// Health text line, right under the name
pub const HEALTH_BAND: TextBand = TextBand {
    top: 0.35,
    height: 0.25,
};
/// First line of the production queue
pub const QUEUE_BAND: TextBand = TextBand {
    top: 0.0,
    height: 0.4,
};

impl TextBand {
    /// Crop this band out of a region, at least one row tall. `None` when
    /// the band falls outside the crop.
    pub fn crop(&self, region: &RgbaImage) -> Option<RgbaImage> {
        let (w, h) = region.dimensions();
        if w == 0 || h == 0 {
            return None;
        }
        let y = (h as f64 * self.top) as u32;
        let band_h = ((h as f64 * self.height) as u32).max(1);
        if y >= h {
            return None;
        }
        let band_h = band_h.min(h - y);
        Some(image::imageops::crop_imm(region, 0, y, w, band_h).to_image())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionText {
    pub selected_name: Recognition,
    pub hp_text: Recognition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueText {
    pub queue_text: Recognition,
}

fn read_band(
    region: &RgbaImage,
    band: TextBand,
    recognizer: &dyn TextRecognizer,
    chars: &str,
    cfg: &PreprocessConfig,
) -> Recognition {
    match band.crop(region) {
        Some(crop) => recognizer.read(&preprocess_text(&crop, cfg), Some(chars)),
        None => Recognition::empty(),
    }
}

/// Name and health lines of the selection panel.
pub fn read_selection(
    region: &RgbaImage,
    recognizer: &dyn TextRecognizer,
    cfg: &PreprocessConfig,
) -> SelectionText {
    SelectionText {
        selected_name: read_band(region, NAME_BAND, recognizer, whitelist::ALPHANUMERIC, cfg),
        hp_text: read_band(region, HEALTH_BAND, recognizer, whitelist::HEALTH, cfg),
    }
}

pub fn read_queue(region: &RgbaImage, recognizer: &dyn TextRecognizer, cfg: &PreprocessConfig) -> QueueText {
    QueueText {
        queue_text: read_band(region, QUEUE_BAND, recognizer, whitelist::ALPHANUMERIC, cfg),
    }
}
