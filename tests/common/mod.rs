#![allow(dead_code)]

use image::{GrayImage, Rgba, RgbaImage};
use sc_signals::{EvidenceStore, PipelineConfig, SeriesBuilder};
use sc_vision::counter::testing::glyph;
use sc_vision::{
    CounterDecoder, NullRecognizer, Recognition, RegionExtractor, SelectedRecognizer,
    TextRecognizer,
};
use std::path::Path;

pub const FRAME_WIDTH: u32 = 160;
pub const FRAME_HEIGHT: u32 = 64;

const PROFILE: &str = r#"{
  "resolution": [160, 64],
  "rois": {
    "supply": {"mode": "static", "x": 0, "y": 0, "w": 100, "h": 27},
    "selection_panel": {"mode": "static", "x": 0, "y": 32, "w": 80, "h": 32},
    "production_queue": {"mode": "static", "x": 80, "y": 32, "w": 80, "h": 32}
  }
}"#;

pub fn write_templates(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    for d in '0'..='9' {
        glyph(d).save(dir.join(format!("{}.png", d))).unwrap();
    }
    glyph('/').save(dir.join("slash.png")).unwrap();
}

pub fn write_profile(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("profile_test.json");
    std::fs::write(&path, PROFILE).unwrap();
    path
}

/// Full frame: the counter text top-left, flat selection and queue panels below.
pub fn frame(counter: &str, selection_shade: u8, queue_shade: u8) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgba([0, 0, 0, 255]));
    let mut x = 2;
    for ch in counter.chars() {
        let g = glyph(ch);
        for (gx, gy, p) in g.enumerate_pixels() {
            let v = p[0];
            img.put_pixel(x + gx, 2 + gy, Rgba([v, v, v, 255]));
        }
        x += g.width() + 2;
    }
    for y in 32..FRAME_HEIGHT {
        for px in 0..FRAME_WIDTH {
            let v = if px < 80 { selection_shade } else { queue_shade };
            img.put_pixel(px, y, Rgba([v, v, v, 255]));
        }
    }
    img
}

/// Reads the same text for every image.
pub struct FixedText(pub &'static str, pub f64);

impl TextRecognizer for FixedText {
    fn name(&self) -> &str {
        "fixed"
    }

    fn read(&self, _image: &GrayImage, _whitelist: Option<&str>) -> Recognition {
        Recognition::new(self.0, self.1)
    }
}

pub fn null_recognizer() -> SelectedRecognizer {
    SelectedRecognizer {
        name: "none".to_string(),
        recognizer: Box::new(NullRecognizer),
    }
}

pub fn fixed_recognizer(text: &'static str, conf: f64) -> SelectedRecognizer {
    SelectedRecognizer {
        name: "fixed".to_string(),
        recognizer: Box::new(FixedText(text, conf)),
    }
}

/// Config sampling every half second with single-frame windows.
pub fn test_config(root: &Path, end_sec: f64) -> PipelineConfig {
    PipelineConfig {
        profile_path: root.join("profile_test.json"),
        templates_dir: root.join("templates"),
        output_path: root.join("out").join("signals.json"),
        start_sec: 0.0,
        end_sec,
        supply_fps: 2.0,
        supply_samples: 1,
        roi_samples: 1,
        ocr_engine: Some("none".to_string()),
        ..PipelineConfig::default()
    }
}

/// Assets on disk plus a builder wired to them.
pub fn builder(root: &Path, end_sec: f64, recognizer: SelectedRecognizer) -> SeriesBuilder {
    write_templates(&root.join("templates"));
    write_profile(root);
    let config = test_config(root, end_sec);
    let regions = RegionExtractor::load(&config.profile_path).unwrap();
    let decoder = CounterDecoder::load(&config.templates_dir, config.decoder.clone()).unwrap();
    let evidence = EvidenceStore::create(config.evidence_dir()).unwrap();
    SeriesBuilder::new(config, regions, decoder, recognizer, evidence)
}
