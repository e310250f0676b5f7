mod common;

use anyhow::{anyhow, Result};
use common::{builder, fixed_recognizer, frame, null_recognizer, test_config, write_profile, write_templates};
use image::RgbaImage;
use sc_capture::{FrameSequence, FrameSource};
use sc_signals::run_pipeline;
use sc_state::SignalDocument;
use std::path::Path;

fn sequence(frames: Vec<RgbaImage>) -> impl FnMut() -> Result<FrameSequence> {
    move || Ok(FrameSequence::new(frames.clone(), 2.0))
}

/// Serves frames until `fail_from`, then errors.
struct FailingSource {
    inner: FrameSequence,
    fail_from: f64,
}

impl FrameSource for FailingSource {
    fn frame_at(&mut self, t: f64) -> Result<Option<RgbaImage>> {
        if t >= self.fail_from {
            return Err(anyhow!("decoder error"));
        }
        self.inner.frame_at(t)
    }
}

#[test]
fn test_identical_values_produce_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    let frames = vec![frame("4/9", 60, 90), frame("4/9", 60, 90)];
    let doc = builder(dir.path(), 0.5, null_recognizer())
        .run(sequence(frames))
        .unwrap();

    let series = &doc.signals.supply_series;
    assert_eq!(series.len(), 1);
    assert_eq!((series[0].used, series[0].total), (4, 9));
    assert_eq!(series[0].raw_text, "4/9");
    assert_eq!(series[0].t, 0.0);
}

#[test]
fn test_change_and_revert_produce_three_entries() {
    let dir = tempfile::tempdir().unwrap();
    let frames = vec![
        frame("4/9", 60, 90),
        frame("4/9", 60, 90),
        frame("5/9", 60, 90),
        frame("4/9", 60, 90),
    ];
    let doc = builder(dir.path(), 1.5, null_recognizer())
        .run(sequence(frames))
        .unwrap();

    let values: Vec<(u32, u32, f64)> = doc
        .signals
        .supply_series
        .iter()
        .map(|e| (e.used, e.total, e.t))
        .collect();
    assert_eq!(values, vec![(4, 9, 0.0), (5, 9, 1.0), (4, 9, 1.5)]);

    for (i, entry) in doc.signals.supply_series.iter().enumerate() {
        assert!(entry.evidence_path.ends_with(&format!("supply_{:06}.png", i + 1)));
        assert!(Path::new(&entry.evidence_path).exists());
    }
}

#[test]
fn test_invalid_pairs_never_reach_output() {
    let dir = tempfile::tempdir().unwrap();
    // 9/4 decodes but is not a valid pair
    let frames = vec![frame("9/4", 60, 90), frame("12/34", 60, 90)];
    let doc = builder(dir.path(), 0.5, null_recognizer())
        .run(sequence(frames))
        .unwrap();

    assert_eq!(doc.signals.supply_series.len(), 1);
    for entry in &doc.signals.supply_series {
        assert!(entry.total > 0);
        assert!(entry.used > 0 && entry.used <= entry.total);
    }
    assert_eq!(doc.signals.supply_series[0].t, 0.5);
    let stats = doc.diagnostics.ocr_stats["supply"];
    assert_eq!((stats.attempted, stats.succeeded), (2, 1));
}

#[test]
fn test_text_regions_follow_change_gate() {
    let dir = tempfile::tempdir().unwrap();
    let frames = vec![
        frame("4/9", 60, 90),
        frame("4/9", 60, 90),
        frame("4/9", 200, 90),
        frame("4/9", 200, 90),
    ];
    let doc = builder(dir.path(), 1.5, fixed_recognizer("Marine", 0.9))
        .run(sequence(frames))
        .unwrap();

    // Selection triggers on the first tick and on the shade change
    let selection = &doc.signals.selection_changes;
    assert_eq!(selection.len(), 2);
    assert_eq!(selection[0].t, 0.0);
    assert_eq!(selection[1].t, 1.0);
    assert_eq!(selection[0].ocr.selected_name.text, "Marine");
    assert!(selection[0].evidence_path.ends_with("sel_000001.png"));
    assert!(selection[1].evidence_path.ends_with("sel_000003.png"));

    // The queue never changes: one read, one event, sharing the running index
    assert_eq!(doc.signals.queue_events.len(), 1);
    let queue = &doc.signals.queue_events[0];
    assert!(queue.evidence_path.ends_with("q_000002.png"));

    assert_eq!(doc.events.len(), 1);
    let event = &doc.events[0];
    assert_eq!(event.id, "marine_started");
    assert_eq!(event.count, 1);
    assert_eq!(event.confidence, 0.9);
    assert_eq!(event.source, "queue_ocr");
    assert_eq!(event.evidence, vec![queue.evidence_path.clone()]);
}

#[test]
fn test_empty_queue_text_produces_no_event() {
    let dir = tempfile::tempdir().unwrap();
    let frames = vec![frame("4/9", 60, 90)];
    let doc = builder(dir.path(), 0.0, null_recognizer())
        .run(sequence(frames))
        .unwrap();
    assert_eq!(doc.signals.queue_events.len(), 1);
    assert!(doc.events.is_empty());
}

#[test]
fn test_text_pass_starts_at_first_decode() {
    let dir = tempfile::tempdir().unwrap();
    // No counter on the first two frames
    let frames = vec![
        frame("", 60, 90),
        frame("", 200, 90),
        frame("4/9", 60, 90),
    ];
    let doc = builder(dir.path(), 1.0, null_recognizer())
        .run(sequence(frames))
        .unwrap();

    assert_eq!(doc.signals.supply_series[0].t, 1.0);
    assert_eq!(doc.signals.selection_changes.len(), 1);
    assert_eq!(doc.signals.selection_changes[0].t, 1.0);
}

#[test]
fn test_text_pass_uses_start_without_decode() {
    let dir = tempfile::tempdir().unwrap();
    let frames = vec![frame("", 60, 90), frame("", 200, 90)];
    let doc = builder(dir.path(), 0.5, null_recognizer())
        .run(sequence(frames))
        .unwrap();

    assert!(doc.signals.supply_series.is_empty());
    assert_eq!(doc.signals.selection_changes.len(), 2);
    assert_eq!(doc.signals.selection_changes[0].t, 0.0);
}

#[test]
fn test_timeline_stops_at_end_of_video() {
    let dir = tempfile::tempdir().unwrap();
    let frames = vec![frame("4/9", 60, 90), frame("5/9", 60, 90)];
    let doc = builder(dir.path(), 420.0, null_recognizer())
        .run(sequence(frames))
        .unwrap();
    assert_eq!(doc.signals.supply_series.len(), 2);
    assert!(doc.diagnostics.warnings.is_empty());
}

#[test]
fn test_source_error_keeps_accumulated_entries() {
    let dir = tempfile::tempdir().unwrap();
    let frames = vec![frame("4/9", 60, 90), frame("5/9", 60, 90), frame("6/9", 60, 90)];
    let doc = builder(dir.path(), 420.0, null_recognizer())
        .run(|| {
            Ok(FailingSource {
                inner: FrameSequence::new(frames.clone(), 2.0),
                fail_from: 1.0,
            })
        })
        .unwrap();

    assert_eq!(doc.signals.supply_series.len(), 2);
    let warnings = &doc.diagnostics.warnings;
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].starts_with("supply pass stopped"));
    assert!(warnings[1].starts_with("text pass stopped"));
}

#[test]
fn test_unopenable_source_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let result = builder(dir.path(), 1.0, null_recognizer())
        .run(|| -> Result<FrameSequence> { Err(anyhow!("cannot open video")) });
    assert!(result.is_err());
}

#[test]
fn test_run_pipeline_writes_document() {
    let dir = tempfile::tempdir().unwrap();
    write_templates(&dir.path().join("templates"));
    write_profile(dir.path());
    let config = test_config(dir.path(), 0.5);
    let output_path = config.output_path.clone();

    let frames = vec![frame("12/34", 60, 90), frame("12/34", 60, 90)];
    run_pipeline(config, sequence(frames)).unwrap();

    let doc = SignalDocument::load(&output_path).unwrap();
    assert_eq!(doc.version, 1);
    assert_eq!(doc.roi_profile, "profile_test");
    assert_eq!(doc.segment.end_sec, 0.5);
    assert_eq!(doc.diagnostics.ocr_engine, "none");
    assert_eq!(doc.diagnostics.preprocess, "upscale3x+adaptive_threshold");
    assert_eq!(doc.signals.supply_series.len(), 1);
    assert_eq!(doc.signals.supply_series[0].raw_text, "12/34");

    let evidence = dir.path().join("out").join("evidence");
    assert!(evidence.join("supply_000001.png").exists());
    assert!(evidence.join("sel_000001.png").exists());
    assert!(evidence.join("q_000002.png").exists());

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output_path).unwrap()).unwrap();
    let entry = &raw["signals"]["supply_series"][0];
    for key in ["t", "used", "total", "raw_text", "conf", "frame"] {
        assert!(entry.get(key).is_some(), "missing {}", key);
    }
}

#[test]
fn test_missing_divider_template_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_templates(&dir.path().join("templates"));
    std::fs::remove_file(dir.path().join("templates").join("slash.png")).unwrap();
    write_profile(dir.path());

    let frames = vec![frame("4/9", 60, 90)];
    let err = run_pipeline(test_config(dir.path(), 0.0), sequence(frames)).unwrap_err();
    assert!(err.to_string().contains("Divider template not found"));
}

#[test]
fn test_missing_region_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_templates(&dir.path().join("templates"));
    let profile = dir.path().join("profile_test.json");
    std::fs::write(
        &profile,
        r#"{"rois": {"supply": {"x": 0, "y": 0, "w": 100, "h": 27}}}"#,
    )
    .unwrap();

    let frames = vec![frame("4/9", 60, 90)];
    let doc = run_pipeline(test_config(dir.path(), 0.0), sequence(frames)).unwrap();
    assert_eq!(doc.signals.supply_series.len(), 1);
    assert!(doc.signals.selection_changes.is_empty());
    assert_eq!(doc.diagnostics.warnings.len(), 2);
}

#[test]
fn test_bundled_profile_defines_every_region() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("profiles").join("profile_480p.json");
    let regions = sc_vision::RegionExtractor::load(&path).unwrap();
    assert_eq!(regions.profile_name(), "profile_480p");
    for name in [
        sc_vision::names::SUPPLY,
        sc_vision::names::SELECTION_PANEL,
        sc_vision::names::PRODUCTION_QUEUE,
    ] {
        assert!(regions.has_region(name), "{} missing", name);
    }
}
