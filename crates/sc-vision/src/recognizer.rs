use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Character sets handed to recognizers
pub mod whitelist {
    pub const DIGITS: &str = "0123456789";
    pub const HEALTH: &str = "0123456789/ ";
    pub const ALPHANUMERIC: &str =
        "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 ";
}

/// Recognized text with a confidence in [0, 1]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    pub confidence: f64,
}

impl Recognition {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A text-recognition backend. Reads never fail: a backend that cannot read an
/// image returns empty text.
pub trait TextRecognizer {
    fn name(&self) -> &str;

    fn read(&self, image: &GrayImage, whitelist: Option<&str>) -> Recognition;
}

/// Stand-in used when no backend initializes
pub struct NullRecognizer;

impl TextRecognizer for NullRecognizer {
    fn name(&self) -> &str {
        "none"
    }

    fn read(&self, _image: &GrayImage, _whitelist: Option<&str>) -> Recognition {
        Recognition::empty()
    }
}

/// Tesseract invoked as an external process, single-line page segmentation.
pub struct TesseractCli {
    executable: PathBuf,
}

impl TesseractCli {
    /// Run `tesseract --version`; fails when the binary is not on PATH.
    pub fn detect() -> Result<Self> {
        let executable = PathBuf::from("tesseract");
        let ok = Command::new(&executable)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !ok {
            return Err(anyhow!("tesseract not found on PATH"));
        }
        debug!("Tesseract OCR available");
        Ok(Self { executable })
    }

    fn run(&self, image: &GrayImage, whitelist: Option<&str>) -> Result<Recognition> {
        let input = NamedTempFile::with_suffix(".png")?;
        image
            .save(input.path())
            .context("Failed to write OCR input image")?;

        let mut cmd = Command::new(&self.executable);
        cmd.arg(input.path()).arg("stdout").arg("--psm").arg("7"); // Single text line
        if let Some(chars) = whitelist {
            cmd.arg("-c").arg(format!("tessedit_char_whitelist={}", chars));
        }
        let output = cmd.arg("tsv").output().context("Failed to run tesseract")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        Ok(parse_tsv(&tsv, whitelist))
    }
}

impl TextRecognizer for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn read(&self, image: &GrayImage, whitelist: Option<&str>) -> Recognition {
        match self.run(image, whitelist) {
            Ok(r) => {
                if !r.is_empty() {
                    debug!("OCR result: '{}' ({:.2})", r.text, r.confidence);
                }
                r
            }
            Err(e) => {
                debug!("OCR read failed: {}", e);
                Recognition::empty()
            }
        }
    }
}

/// Parse Tesseract TSV output: word rows (level 5) joined with spaces,
/// confidence is the mean word confidence scaled to [0, 1].
fn parse_tsv(tsv: &str, whitelist: Option<&str>) -> Recognition {
    let mut words = Vec::new();
    let mut confs = Vec::new();

    // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
    //             left, top, width, height, conf, text
    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 || fields[0] != "5" {
            continue;
        }
        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }
        words.push(text.to_string());
        if let Ok(conf) = fields[10].parse::<f64>() {
            if conf >= 0.0 {
                confs.push(conf / 100.0);
            }
        }
    }

    if words.is_empty() {
        return Recognition::empty();
    }

    let mut text = words.join(" ");
    if let Some(chars) = whitelist {
        text = text.chars().filter(|c| chars.contains(*c)).collect();
    }
    let confidence = if confs.is_empty() {
        0.0
    } else {
        confs.iter().sum::<f64>() / confs.len() as f64
    };

    Recognition::new(text.trim(), confidence.clamp(0.0, 1.0))
}

type Factory = Box<dyn Fn() -> Result<Box<dyn TextRecognizer>>>;

/// Backend chosen by the registry, with the name kept for diagnostics
pub struct SelectedRecognizer {
    pub name: String,
    pub recognizer: Box<dyn TextRecognizer>,
}

/// Named backend factories in preference order.
pub struct RecognizerRegistry {
    entries: Vec<(String, Factory)>,
}

impl Default for RecognizerRegistry {
    /// Only the Tesseract CLI ships here. The PaddleOCR and EasyOCR backends
    /// that used to precede it in the `auto` order need Python runtimes and
    /// are left out.
    fn default() -> Self {
        Self::empty().register("tesseract", || {
            TesseractCli::detect().map(|t| Box::new(t) as Box<dyn TextRecognizer>)
        })
    }
}

impl RecognizerRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn TextRecognizer>> + 'static,
    {
        self.entries.push((name.into(), Box::new(factory)));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Resolve a backend. `None` or `"auto"` tries every entry in order;
    /// `"none"` or a name that fails to initialize yields the null backend.
    pub fn select(&self, requested: Option<&str>) -> SelectedRecognizer {
        let requested = requested.map(|r| r.trim().to_lowercase());
        let candidates: Vec<&(String, Factory)> = match requested.as_deref() {
            None | Some("auto") | Some("") => self.entries.iter().collect(),
            Some("none") => Vec::new(),
            Some(name) => {
                if !self.names().contains(&name) {
                    warn!(
                        "Unknown OCR backend {} (available: {})",
                        name,
                        self.names().join(", ")
                    );
                }
                self.entries.iter().filter(|(n, _)| n == name).collect()
            }
        };

        for (name, factory) in candidates {
            match factory() {
                Ok(recognizer) => {
                    info!("OCR backend: {}", name);
                    return SelectedRecognizer {
                        name: name.clone(),
                        recognizer,
                    };
                }
                Err(e) => debug!("OCR backend {} unavailable: {}", name, e),
            }
        }

        if requested.as_deref() != Some("none") {
            warn!("No OCR backend available. Text reads will be empty");
        }
        SelectedRecognizer {
            name: "none".to_string(),
            recognizer: Box::new(NullRecognizer),
        }
    }
}
