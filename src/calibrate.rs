use anyhow::{anyhow, bail, Context, Result};
use image::{GrayImage, RgbaImage};
use sc_capture::{FrameSource, PixelRect};
use sc_vision::correlate::match_template;
use sc_vision::preprocess::to_gray;
use sc_vision::{names, RegionDefinition, RegionProfile};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CALIBRATE_USAGE: &str = "Usage: calibrate_profile <video> --selection x,y,w,h \
--queue x,y,w,h [--time sec] [--supply-template png] [--out profile.json]";

/// Supply template scores below this are written anyway but flagged
const WEAK_MATCH: f64 = 0.5;

/// Inputs for writing a static region profile from one frame of a video.
#[derive(Debug, Clone)]
pub struct CalibrationRequest {
    pub video_path: PathBuf,
    pub time_sec: f64,
    pub supply_template: PathBuf,
    pub selection: PixelRect,
    pub queue: PixelRect,
    pub output_path: PathBuf,
}

impl CalibrationRequest {
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut video_path = None;
        let mut time_sec = 10.0;
        let mut supply_template = PathBuf::from("assets/supply_frame.png");
        let mut selection = None;
        let mut queue = None;
        let mut output_path = PathBuf::from("profiles/profile_480p.json");

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if !arg.starts_with('-') {
                if video_path.replace(PathBuf::from(&arg)).is_some() {
                    bail!("Unexpected argument: {}\n{}", arg, CALIBRATE_USAGE);
                }
                continue;
            }
            let value = args
                .next()
                .ok_or_else(|| anyhow!("{} needs a value", arg))?;
            match arg.as_str() {
                "--time" => {
                    time_sec = value
                        .parse()
                        .with_context(|| format!("Invalid value for --time: {}", value))?
                }
                "--supply-template" => supply_template = PathBuf::from(value),
                "--selection" => selection = Some(parse_rect(&value)?),
                "--queue" => queue = Some(parse_rect(&value)?),
                "-o" | "--out" => output_path = PathBuf::from(value),
                _ => bail!("Unknown option: {}\n{}", arg, CALIBRATE_USAGE),
            }
        }

        Ok(Self {
            video_path: video_path.ok_or_else(|| anyhow!("No input video given\n{}", CALIBRATE_USAGE))?,
            time_sec,
            supply_template,
            selection: selection.ok_or_else(|| anyhow!("--selection is required\n{}", CALIBRATE_USAGE))?,
            queue: queue.ok_or_else(|| anyhow!("--queue is required\n{}", CALIBRATE_USAGE))?,
            output_path,
        })
    }
}

/// Parse `x,y,w,h` into a rectangle.
pub fn parse_rect(value: &str) -> Result<PixelRect> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid rectangle {}", value))?;
    match parts[..] {
        [x, y, w, h] if w > 0 && h > 0 => Ok(PixelRect::new(x, y, w, h)),
        _ => bail!("Rectangle must be x,y,w,h with a non-zero size: {}", value),
    }
}

/// Static profile for `frame`: the supply region is placed where the supply
/// template matches best, the text regions are taken as given.
pub fn calibrate_profile(
    frame: &RgbaImage,
    supply_template: &GrayImage,
    selection: PixelRect,
    queue: PixelRect,
) -> Result<RegionProfile> {
    let hit = match_template(&to_gray(frame), supply_template)
        .ok_or_else(|| anyhow!("Supply template is larger than the frame"))?;
    if hit.score < WEAK_MATCH {
        warn!("Weak supply template match ({:.3}); check the profile", hit.score);
    }
    info!("Supply template at ({}, {}), score {:.3}", hit.x, hit.y, hit.score);

    let supply = PixelRect::new(hit.x, hit.y, supply_template.width(), supply_template.height());
    let mut profile = RegionProfile {
        resolution: Some([frame.width(), frame.height()]),
        ..RegionProfile::default()
    };
    for (name, rect) in [
        (names::SUPPLY, supply),
        (names::SELECTION_PANEL, selection),
        (names::PRODUCTION_QUEUE, queue),
    ] {
        profile.rois.insert(name.to_string(), RegionDefinition::fixed(rect));
    }
    Ok(profile)
}

/// Grab the frame at the requested time, build the profile and write it.
pub fn calibrate<S: FrameSource>(source: &mut S, request: &CalibrationRequest) -> Result<RegionProfile> {
    let template = load_template(&request.supply_template)?;
    let frame = source
        .frame_at(request.time_sec)?
        .ok_or_else(|| anyhow!("No frame at {:.3}s in {}", request.time_sec, request.video_path.display()))?;
    let profile = calibrate_profile(&frame, &template, request.selection, request.queue)?;
    profile.save(&request.output_path)?;
    Ok(profile)
}

fn load_template(path: &Path) -> Result<GrayImage> {
    if !path.exists() {
        bail!("Supply template not found: {}", path.display());
    }
    let img = image::open(path)
        .with_context(|| format!("Failed to load supply template {}", path.display()))?;
    Ok(img.to_luma8())
}
