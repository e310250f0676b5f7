use anyhow::{anyhow, bail, Context, Result};
use sc_vision::{DecoderConfig, PreprocessConfig, DEFAULT_DIFF_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable consulted when no OCR engine is configured
pub const OCR_ENGINE_ENV: &str = "OCR_ENGINE";

pub const USAGE: &str = "Usage: extract_signals <video> [-o output.json] [--profile profile.json] \
[--templates dir] [--start sec] [--end sec] [--ocr engine] [--fps f] [--supply-samples n] \
[--roi-samples n] [--config config.json]";

/// Run configuration. Every field has a default so a config file only
/// needs the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub video_path: PathBuf,
    pub profile_path: PathBuf,
    pub output_path: PathBuf,
    pub templates_dir: PathBuf,
    pub start_sec: f64,
    pub end_sec: f64,
    /// Counter sampling rate; the text pass walks the same timeline
    pub supply_fps: f64,
    pub supply_window_sec: f64,
    pub supply_samples: usize,
    pub roi_window_sec: f64,
    pub roi_samples: usize,
    pub diff_threshold: f64,
    /// `tesseract`, `none` or `auto`
    pub ocr_engine: Option<String>,
    pub decoder: DecoderConfig,
    /// Text band preprocessing
    pub preprocess: PreprocessConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            video_path: PathBuf::new(),
            profile_path: PathBuf::from("profiles/profile_480p.json"),
            output_path: PathBuf::from("output.json"),
            templates_dir: PathBuf::from("assets/templates"),
            start_sec: 0.0,
            end_sec: 420.0,
            supply_fps: 2.0,
            supply_window_sec: 0.25,
            supply_samples: 7,
            roi_window_sec: 0.5,
            roi_samples: 10,
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            ocr_engine: None,
            decoder: DecoderConfig::default(),
            preprocess: PreprocessConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Configured engine, else `$OCR_ENGINE`. `None` means try every backend.
    pub fn resolved_ocr_engine(&self) -> Option<String> {
        self.ocr_engine
            .clone()
            .or_else(|| std::env::var(OCR_ENGINE_ENV).ok())
            .filter(|e| !e.trim().is_empty())
    }

    /// `evidence/` beside the output document
    pub fn evidence_dir(&self) -> PathBuf {
        match self.output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join("evidence"),
            _ => PathBuf::from("evidence"),
        }
    }

    /// Build from command-line arguments (program name excluded). A
    /// `--config` file is applied first, then every other flag on top of it.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut video = None;
        let mut config_file = None;
        let mut flags: Vec<(String, String)> = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg.starts_with('-') && arg.len() > 1 {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("{} needs a value", arg))?;
                if arg == "--config" {
                    config_file = Some(PathBuf::from(value));
                } else {
                    flags.push((arg, value));
                }
            } else if video.is_none() {
                video = Some(PathBuf::from(arg));
            } else {
                bail!("Unexpected argument: {}\n{}", arg, USAGE);
            }
        }

        let mut config = match config_file {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        for (flag, value) in &flags {
            config.apply_flag(flag, value)?;
        }
        if let Some(video) = video {
            config.video_path = video;
        }
        if config.video_path.as_os_str().is_empty() {
            bail!("No input video given\n{}", USAGE);
        }
        Ok(config)
    }

    fn apply_flag(&mut self, flag: &str, value: &str) -> Result<()> {
        match flag {
            "-o" | "--output" => self.output_path = PathBuf::from(value),
            "--profile" => self.profile_path = PathBuf::from(value),
            "--templates" => self.templates_dir = PathBuf::from(value),
            "--start" => self.start_sec = parse(flag, value)?,
            "--end" => self.end_sec = parse(flag, value)?,
            "--ocr" => self.ocr_engine = Some(value.to_string()),
            "--fps" => self.supply_fps = parse(flag, value)?,
            "--supply-samples" => self.supply_samples = parse(flag, value)?,
            "--roi-samples" => self.roi_samples = parse(flag, value)?,
            _ => bail!("Unknown option: {}\n{}", flag, USAGE),
        }
        Ok(())
    }
}

fn parse<T>(flag: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", flag, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.end_sec, 420.0);
        assert_eq!(config.supply_samples, 7);
        assert_eq!(config.roi_samples, 10);
        assert_eq!(config.diff_threshold, 0.03);
        assert_eq!(config.decoder.divider_min_confidence, 0.6);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = PipelineConfig::from_args(args(&[
            "game.mp4", "-o", "out/signals.json", "--start", "30", "--fps", "4", "--ocr", "none",
        ]))
        .unwrap();
        assert_eq!(config.video_path, PathBuf::from("game.mp4"));
        assert_eq!(config.start_sec, 30.0);
        assert_eq!(config.supply_fps, 4.0);
        assert_eq!(config.resolved_ocr_engine().as_deref(), Some("none"));
        assert_eq!(config.evidence_dir(), PathBuf::from("out/evidence"));
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"end_sec": 60.0, "roi_samples": 4, "decoder": {"max_glyphs_per_side": 3}}"#)
            .unwrap();

        let config = PipelineConfig::from_args(args(&[
            "--roi-samples",
            "6",
            "--config",
            path.to_str().unwrap(),
            "game.mp4",
        ]))
        .unwrap();
        assert_eq!(config.end_sec, 60.0);
        assert_eq!(config.roi_samples, 6);
        assert_eq!(config.decoder.max_glyphs_per_side, 3);
        assert_eq!(config.decoder.divider_min_confidence, 0.6);
        assert_eq!(config.supply_samples, 7);
    }

    #[test]
    fn test_bad_arguments() {
        assert!(PipelineConfig::from_args(args(&[])).is_err());
        assert!(PipelineConfig::from_args(args(&["a.mp4", "--fps", "fast"])).is_err());
        assert!(PipelineConfig::from_args(args(&["a.mp4", "--bogus", "1"])).is_err());
        assert!(PipelineConfig::from_args(args(&["a.mp4", "--end"])).is_err());
    }

    #[test]
    fn test_evidence_dir_without_parent() {
        let config = PipelineConfig::default();
        assert_eq!(config.evidence_dir(), PathBuf::from("evidence"));
    }
}
