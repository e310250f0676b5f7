use anyhow::Result;
use sc_capture::video::VideoFrameSource;
use sc_signals::{calibrate, init_tracing, CalibrationRequest};
use tracing::info;

fn main() -> Result<()> {
    init_tracing();

    let request = CalibrationRequest::from_args(std::env::args().skip(1))?;
    info!(
        "Calibrating from {} at {:.1}s",
        request.video_path.display(),
        request.time_sec
    );

    let mut source = VideoFrameSource::open(&request.video_path)?;
    let profile = calibrate(&mut source, &request)?;

    println!(
        "{}: {} region(s), resolution {:?}",
        request.output_path.display(),
        profile.rois.len(),
        profile.resolution
    );
    Ok(())
}
