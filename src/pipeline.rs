use anyhow::Result;
use image::RgbaImage;
use sc_capture::{sample_window, timeline, FrameSource, TimestampedFrame};
use sc_state::{
    round3, DiscreteEvent, QueueEntry, QueueOcr, SelectionChange, SelectionOcr, Segment,
    SignalDocument, SupplyEntry, TextRead,
};
use sc_vision::{
    names, read_queue, read_selection, select_most_confident, select_sharpest, CandidateReading,
    ChangeGate, CounterDecoder, Recognition, RecognizerRegistry, RegionExtractor,
    SelectedRecognizer, SharpestCrop, PREPROCESS_LABEL,
};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::evidence::{EvidenceKind, EvidenceStore};

/// Run-length dedup of the counter series: a value is emitted only when it
/// differs from the previous emitted value.
#[derive(Debug, Default)]
struct SupplyAccumulator {
    last: Option<(u32, u32)>,
    emitted: u32,
}

impl SupplyAccumulator {
    /// Evidence index for `value`, or `None` when it repeats the last one.
    fn accept(&mut self, value: (u32, u32)) -> Option<u32> {
        if self.last == Some(value) {
            return None;
        }
        self.last = Some(value);
        self.emitted += 1;
        Some(self.emitted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextRegion {
    Selection,
    Queue,
}

impl TextRegion {
    fn name(self) -> &'static str {
        match self {
            TextRegion::Selection => names::SELECTION_PANEL,
            TextRegion::Queue => names::PRODUCTION_QUEUE,
        }
    }

    fn evidence_kind(self) -> EvidenceKind {
        match self {
            TextRegion::Selection => EvidenceKind::Selection,
            TextRegion::Queue => EvidenceKind::Queue,
        }
    }
}

/// Change-gate reference for one text region during the text pass
struct TextTrack {
    region: TextRegion,
    last_crop: Option<RgbaImage>,
}

impl TextTrack {
    fn new(region: TextRegion) -> Self {
        Self {
            region,
            last_crop: None,
        }
    }
}

/// Frame at a timeline tick, or `None` when the pass has to stop. Source
/// errors are recorded as warnings; entries gathered so far are kept.
fn tick_frame<S: FrameSource>(
    source: &mut S,
    t: f64,
    pass: &str,
    warnings: &mut Vec<String>,
) -> Option<RgbaImage> {
    match source.frame_at(t) {
        Ok(Some(frame)) => Some(frame),
        Ok(None) => {
            debug!("{} pass: no frame at {:.3}s, stopping", pass, t);
            None
        }
        Err(e) => {
            let message = format!("{} pass stopped at {:.3}s: {:#}", pass, t, e);
            warn!("{}", message);
            warnings.push(message);
            None
        }
    }
}

fn text_read(r: &Recognition) -> TextRead {
    TextRead::new(r.text.clone(), r.confidence)
}

/// Drives sampling over the segment and assembles the output document.
pub struct SeriesBuilder {
    config: PipelineConfig,
    regions: RegionExtractor,
    decoder: CounterDecoder,
    recognizer: SelectedRecognizer,
    evidence: EvidenceStore,
}

impl SeriesBuilder {
    pub fn new(
        config: PipelineConfig,
        regions: RegionExtractor,
        decoder: CounterDecoder,
        recognizer: SelectedRecognizer,
        evidence: EvidenceStore,
    ) -> Self {
        Self {
            config,
            regions,
            decoder,
            recognizer,
            evidence,
        }
    }

    /// Load the profile and glyph templates, pick an OCR backend and create
    /// the evidence directory. Missing assets are fatal here.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let regions = RegionExtractor::load(&config.profile_path)?;
        let decoder = CounterDecoder::load(&config.templates_dir, config.decoder.clone())?;
        let recognizer = RecognizerRegistry::default().select(config.resolved_ocr_engine().as_deref());
        let evidence = EvidenceStore::create(config.evidence_dir())?;
        info!("Evidence directory: {}", evidence.dir().display());
        Ok(Self::new(config, regions, decoder, recognizer, evidence))
    }

    /// Counter pass, then text pass. `open_source` is called once per pass and
    /// the source is dropped when that pass ends.
    pub fn run<S, F>(&self, mut open_source: F) -> Result<SignalDocument>
    where
        S: FrameSource,
        F: FnMut() -> Result<S>,
    {
        let segment = Segment {
            start_sec: self.config.start_sec,
            end_sec: self.config.end_sec,
        };
        let mut doc = SignalDocument::new(segment, self.regions.profile_name());
        doc.diagnostics.ocr_engine = self.recognizer.name.clone();
        doc.diagnostics.preprocess = PREPROCESS_LABEL.to_string();

        for region in [names::SUPPLY, names::SELECTION_PANEL, names::PRODUCTION_QUEUE] {
            if !self.regions.has_region(region) {
                let message = format!(
                    "Region {} not available in profile {}",
                    region,
                    self.regions.profile_name()
                );
                warn!("{}", message);
                doc.diagnostics.warnings.push(message);
            }
        }

        let first_decode = {
            let mut source = open_source()?;
            self.supply_pass(&mut source, &mut doc)?
        };

        let text_start = first_decode.unwrap_or(self.config.start_sec);
        {
            let mut source = open_source()?;
            self.text_pass(&mut source, text_start, &mut doc)?;
        }

        info!(
            "Series built: {} supply point(s), {} selection change(s), {} queue read(s), {} event(s)",
            doc.signals.supply_series.len(),
            doc.signals.selection_changes.len(),
            doc.signals.queue_events.len(),
            doc.events.len()
        );
        Ok(doc)
    }

    /// Sample a window around every tick, keep the most confident valid
    /// decode and emit it when the value changed. Returns the tick of the
    /// first successful decode.
    fn supply_pass<S: FrameSource>(&self, source: &mut S, doc: &mut SignalDocument) -> Result<Option<f64>> {
        let cfg = &self.config;
        let recognizer = self.recognizer.recognizer.as_ref();
        let mut series = SupplyAccumulator::default();
        let mut first_decode = None;

        for t in timeline(cfg.start_sec, cfg.end_sec, cfg.supply_fps) {
            if tick_frame(source, t, "supply", &mut doc.diagnostics.warnings).is_none() {
                break;
            }

            let mut candidates = Vec::new();
            for sample in sample_window(source, t, cfg.supply_window_sec, cfg.supply_samples) {
                let Some(crop) = self.regions.crop(&sample.image, names::SUPPLY) else {
                    continue;
                };
                let reading = self.decoder.decode(&crop, recognizer);
                let valid = reading.value().is_some();
                doc.diagnostics.record_attempt(names::SUPPLY, valid);
                if valid {
                    candidates.push(CandidateReading {
                        t: sample.t,
                        crop,
                        confidence: reading.confidence,
                        value: reading,
                    });
                }
            }

            let Some(best) = select_most_confident(candidates) else {
                continue;
            };
            let Some(value) = best.value.value() else {
                continue;
            };
            first_decode.get_or_insert(t);

            let Some(index) = series.accept(value) else {
                continue;
            };
            let evidence_path = self.evidence.save(EvidenceKind::Supply, index, &best.crop)?;
            debug!("Supply {}/{} at {:.3}s", value.0, value.1, best.t);
            doc.signals.supply_series.push(SupplyEntry {
                t: round3(best.t),
                used: value.0,
                total: value.1,
                raw_text: best.value.raw_text,
                confidence: round3(best.confidence),
                evidence_path,
            });
        }

        info!(
            "Supply pass done: {} value change(s)",
            doc.signals.supply_series.len()
        );
        Ok(first_decode)
    }

    /// Walk the timeline from `start`; whenever a text region's crop moves
    /// past the change gate, read the sharpest crop of the surrounding window.
    fn text_pass<S: FrameSource>(&self, source: &mut S, start: f64, doc: &mut SignalDocument) -> Result<()> {
        let cfg = &self.config;
        let gate = ChangeGate::new(cfg.diff_threshold);
        let mut tracks = [
            TextTrack::new(TextRegion::Selection),
            TextTrack::new(TextRegion::Queue),
        ];
        // Shared by both regions
        let mut index = 0u32;

        for t in timeline(start, cfg.end_sec, cfg.supply_fps) {
            let Some(frame) = tick_frame(source, t, "text", &mut doc.diagnostics.warnings) else {
                break;
            };
            // Sampled on the first trigger of this tick, reused by the other region
            let mut window: Option<Vec<TimestampedFrame>> = None;

            for track in tracks.iter_mut() {
                let name = track.region.name();
                let Some(crop) = self.regions.crop(&frame, name) else {
                    continue;
                };
                if !gate.should_resample(track.last_crop.as_ref(), &crop) {
                    continue;
                }

                index += 1;
                let samples = window
                    .get_or_insert_with(|| sample_window(source, t, cfg.roi_window_sec, cfg.roi_samples));
                let crops = samples
                    .iter()
                    .filter_map(|s| self.regions.crop(&s.image, name).map(|c| (s.t, c)))
                    .collect();
                if let Some(best) = select_sharpest(crops) {
                    self.emit_text(track.region, index, best, doc)?;
                }
                track.last_crop = Some(crop);
            }
        }

        info!(
            "Text pass done: {} selection change(s), {} queue read(s)",
            doc.signals.selection_changes.len(),
            doc.signals.queue_events.len()
        );
        Ok(())
    }

    fn emit_text(&self, region: TextRegion, index: u32, best: SharpestCrop, doc: &mut SignalDocument) -> Result<()> {
        let recognizer = self.recognizer.recognizer.as_ref();
        let evidence_path = self.evidence.save(region.evidence_kind(), index, &best.crop)?;
        let t = round3(best.t);

        match region {
            TextRegion::Selection => {
                let read = read_selection(&best.crop, recognizer, &self.config.preprocess);
                doc.diagnostics
                    .record_attempt(region.name(), !read.selected_name.is_empty());
                doc.signals.selection_changes.push(SelectionChange {
                    t,
                    evidence_path,
                    ocr: SelectionOcr {
                        selected_name: text_read(&read.selected_name),
                        hp_text: text_read(&read.hp_text),
                    },
                });
            }
            TextRegion::Queue => {
                let read = read_queue(&best.crop, recognizer, &self.config.preprocess);
                let text = &read.queue_text;
                doc.diagnostics.record_attempt(region.name(), !text.is_empty());
                if let Some(event) =
                    DiscreteEvent::queue_started(best.t, &text.text, text.confidence, &evidence_path)
                {
                    debug!("Event {} at {:.3}s", event.id, event.t);
                    doc.events.push(event);
                }
                doc.signals.queue_events.push(QueueEntry {
                    t,
                    evidence_path,
                    ocr: QueueOcr {
                        queue_text: text_read(text),
                    },
                });
            }
        }
        Ok(())
    }
}

/// Build the series for `config` and write the document to its output path.
pub fn run_pipeline<S, F>(config: PipelineConfig, open_source: F) -> Result<SignalDocument>
where
    S: FrameSource,
    F: FnMut() -> Result<S>,
{
    let output_path = config.output_path.clone();
    let builder = SeriesBuilder::from_config(config)?;
    let doc = builder.run(open_source)?;
    doc.write(&output_path)?;
    Ok(doc)
}
