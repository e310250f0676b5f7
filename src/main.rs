use anyhow::Result;
use sc_capture::video::VideoFrameSource;
use sc_signals::{init_tracing, run_pipeline, PipelineConfig};
use tracing::info;

fn main() -> Result<()> {
    init_tracing();

    let config = PipelineConfig::from_args(std::env::args().skip(1))?;
    info!(
        "Extracting {} [{:.1}s, {:.1}s] with profile {}",
        config.video_path.display(),
        config.start_sec,
        config.end_sec,
        config.profile_path.display()
    );

    let video_path = config.video_path.clone();
    let output_path = config.output_path.clone();
    let doc = run_pipeline(config, || VideoFrameSource::open(&video_path))?;

    println!(
        "{}: {} supply point(s), {} event(s), ocr={}",
        output_path.display(),
        doc.signals.supply_series.len(),
        doc.events.len(),
        doc.diagnostics.ocr_engine
    );
    Ok(())
}
