use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub const OUTPUT_VERSION: u32 = 1;

/// `source` tag of events derived from the production queue
pub const QUEUE_EVENT_SOURCE: &str = "queue_ocr";

/// Suffix appended to a queued item's name to form its event id
pub const STARTED_SUFFIX: &str = "_started";

/// Timestamps and confidences are written with millisecond precision
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Everything extracted from one video segment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalDocument {
    pub version: u32,
    pub segment: Segment,
    /// Region profile identifier (file stem)
    pub roi_profile: String,
    pub signals: Signals,
    pub events: Vec<DiscreteEvent>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Segment {
    pub start_sec: f64,
    pub end_sec: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Signals {
    pub supply_series: Vec<SupplyEntry>,
    pub selection_changes: Vec<SelectionChange>,
    pub queue_events: Vec<QueueEntry>,
}

/// One point of the supply series, emitted only when the value changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyEntry {
    pub t: f64,
    pub used: u32,
    pub total: u32,
    pub raw_text: String,
    #[serde(rename = "conf")]
    pub confidence: f64,
    /// Evidence image path
    #[serde(rename = "frame")]
    pub evidence_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRead {
    pub text: String,
    pub conf: f64,
}

impl TextRead {
    pub fn new(text: impl Into<String>, conf: f64) -> Self {
        Self {
            text: text.into(),
            conf: round3(conf),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionOcr {
    pub selected_name: TextRead,
    pub hp_text: TextRead,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionChange {
    pub t: f64,
    #[serde(rename = "frame")]
    pub evidence_path: String,
    pub ocr: SelectionOcr,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueOcr {
    pub queue_text: TextRead,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub t: f64,
    #[serde(rename = "frame")]
    pub evidence_path: String,
    pub ocr: QueueOcr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteEvent {
    pub t: f64,
    pub id: String,
    pub count: u32,
    #[serde(rename = "conf")]
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub source: String,
}

impl DiscreteEvent {
    /// Event for a recognized queue line, or `None` when nothing was read.
    pub fn queue_started(t: f64, text: &str, confidence: f64, evidence_path: &str) -> Option<Self> {
        let name = text.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            t: round3(t),
            id: format!("{}{}", name.to_lowercase(), STARTED_SUFFIX),
            count: 1,
            confidence: round3(confidence),
            evidence: vec![evidence_path.to_string()],
            source: QUEUE_EVENT_SOURCE.to_string(),
        })
    }
}

/// Per-region recognition counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrTally {
    pub attempted: u32,
    pub succeeded: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
    pub ocr_engine: String,
    pub preprocess: String,
    #[serde(default)]
    pub ocr_stats: BTreeMap<String, OcrTally>,
}

impl Diagnostics {
    pub fn record_attempt(&mut self, region: &str, succeeded: bool) {
        let tally = self.ocr_stats.entry(region.to_string()).or_default();
        tally.attempted += 1;
        if succeeded {
            tally.succeeded += 1;
        }
    }
}

impl SignalDocument {
    pub fn new(segment: Segment, roi_profile: impl Into<String>) -> Self {
        Self {
            version: OUTPUT_VERSION,
            segment,
            roi_profile: roi_profile.into(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Write as pretty-printed JSON, creating the parent directory.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(
            "Wrote {}: {} supply point(s), {} selection change(s), {} queue event(s), {} event(s)",
            path.display(),
            self.signals.supply_series.len(),
            self.signals.selection_changes.len(),
            self.signals.queue_events.len(),
            self.events.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round3() {
        assert_eq!(round3(1.23456), 1.235);
        assert_eq!(round3(10.0), 10.0);
        assert_eq!(round3(0.0004), 0.0);
    }

    #[test]
    fn test_queue_event_id() {
        let event = DiscreteEvent::queue_started(12.34567, "  Marine ", 0.87654, "evidence/q_000001.png").unwrap();
        assert_eq!(event.id, "marine_started");
        assert_eq!(event.t, 12.346);
        assert_eq!(event.confidence, 0.877);
        assert_eq!(event.count, 1);
        assert_eq!(event.source, QUEUE_EVENT_SOURCE);
        assert!(DiscreteEvent::queue_started(1.0, "", 0.9, "x.png").is_none());
        assert!(DiscreteEvent::queue_started(1.0, "  ", 0.9, "x.png").is_none());
    }

    #[test]
    fn test_ocr_tally() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.record_attempt("supply", true);
        diagnostics.record_attempt("supply", false);
        diagnostics.record_attempt("production_queue", false);
        assert_eq!(
            diagnostics.ocr_stats["supply"],
            OcrTally {
                attempted: 2,
                succeeded: 1
            }
        );
        assert_eq!(diagnostics.ocr_stats["production_queue"].succeeded, 0);
    }

    #[test]
    fn test_document_json_shape() {
        let mut doc = SignalDocument::new(
            Segment {
                start_sec: 0.0,
                end_sec: 420.0,
            },
            "profile_480p",
        );
        doc.signals.supply_series.push(SupplyEntry {
            t: 1.5,
            used: 12,
            total: 15,
            raw_text: "12/15".to_string(),
            confidence: 0.9,
            evidence_path: "evidence/supply_000001.png".to_string(),
        });
        doc.signals.queue_events.push(QueueEntry {
            t: 3.0,
            evidence_path: "evidence/q_000001.png".to_string(),
            ocr: QueueOcr {
                queue_text: TextRead::new("SCV", 0.5),
            },
        });

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["roi_profile"], "profile_480p");
        let supply = &value["signals"]["supply_series"][0];
        assert_eq!(supply["conf"], 0.9);
        assert_eq!(supply["frame"], "evidence/supply_000001.png");
        assert!(supply.get("confidence").is_none());
        assert_eq!(value["signals"]["queue_events"][0]["ocr"]["queue_text"]["text"], "SCV");
        assert!(value["diagnostics"]["ocr_stats"].is_object());
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("signals.json");
        let doc = SignalDocument::new(Segment::default(), "p");
        doc.write(&path).unwrap();
        let loaded = SignalDocument::load(&path).unwrap();
        assert_eq!(loaded.version, OUTPUT_VERSION);
        assert_eq!(loaded.roi_profile, "p");
    }
}
