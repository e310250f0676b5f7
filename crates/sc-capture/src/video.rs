use crate::FrameSource;
use anyhow::{anyhow, Context, Result};
use ffmpeg_next::format::context::Input;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as Scaler, Flags};
use ffmpeg_next::{codec, decoder, frame, media, Rational};
use image::RgbaImage;
use std::path::Path;
use tracing::{debug, info};

/// Frames decoded within this distance before the target still count as "at" it.
const SEEK_TOLERANCE_SEC: f64 = 0.0005;

/// Seekable video file decoded with ffmpeg-next into RGBA frames.
///
/// The demuxer and decoder are owned here and closed when the source is dropped,
/// so a pass that holds one releases it on every exit path.
pub struct VideoFrameSource {
    input: Input,
    decoder: decoder::Video,
    scaler: Scaler,
    stream_index: usize,
    time_base: Rational,
    width: u32,
    height: u32,
    /// Last decoded frame; window sampling re-requests the centre tick.
    last: Option<(f64, RgbaImage)>,
}

impl VideoFrameSource {
    pub fn open(path: &Path) -> Result<Self> {
        ffmpeg_next::init()?;

        let input = ffmpeg_next::format::input(path)
            .with_context(|| format!("Failed to open video: {}", path.display()))?;

        let (stream_index, time_base, parameters) = {
            let stream = input
                .streams()
                .best(media::Type::Video)
                .ok_or_else(|| anyhow!("No video stream found in {}", path.display()))?;
            (stream.index(), stream.time_base(), stream.parameters())
        };

        let decoder_ctx = codec::context::Context::from_parameters(parameters)?;
        let decoder = decoder_ctx.decoder().video()?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = Scaler::get(
            decoder.format(),
            width,
            height,
            Pixel::RGBA,
            width,
            height,
            Flags::BILINEAR,
        )?;

        info!(
            "Video opened: {} ({}x{}, format {:?})",
            path.display(),
            width,
            height,
            decoder.format()
        );

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            width,
            height,
            last: None,
        })
    }

    /// Decode forward from the current demuxer position until the first frame
    /// at or after `t`. Returns `None` if the stream ends first.
    fn decode_until(&mut self, t: f64) -> Result<Option<RgbaImage>> {
        let stream_index = self.stream_index;
        let time_base = f64::from(self.time_base);
        let (width, height) = (self.width, self.height);
        let mut decoded = frame::Video::empty();

        for (stream, packet) in self.input.packets() {
            if stream.index() != stream_index {
                continue;
            }
            self.decoder.send_packet(&packet)?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                if frame_seconds(&decoded, time_base) + SEEK_TOLERANCE_SEC >= t {
                    return to_rgba(&mut self.scaler, &decoded, width, height).map(Some);
                }
            }
        }

        // Flush whatever the decoder still buffers
        self.decoder.send_eof()?;
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            if frame_seconds(&decoded, time_base) + SEEK_TOLERANCE_SEC >= t {
                return to_rgba(&mut self.scaler, &decoded, width, height).map(Some);
            }
        }

        Ok(None)
    }
}

impl FrameSource for VideoFrameSource {
    fn frame_at(&mut self, t: f64) -> Result<Option<RgbaImage>> {
        let t = t.max(0.0);
        if let Some((last_t, img)) = &self.last {
            if (last_t - t).abs() < 1e-6 {
                return Ok(Some(img.clone()));
            }
        }

        let target = (t * f64::from(ffmpeg_next::ffi::AV_TIME_BASE)) as i64;
        self.input
            .seek(target, ..target)
            .with_context(|| format!("Seek to {:.3}s failed", t))?;
        self.decoder.flush();

        let found = self.decode_until(t)?;
        match &found {
            Some(img) => self.last = Some((t, img.clone())),
            None => debug!("End of stream before {:.3}s", t),
        }
        Ok(found)
    }
}

fn frame_seconds(frame: &frame::Video, time_base: f64) -> f64 {
    frame
        .timestamp()
        .or_else(|| frame.pts())
        .map(|ts| ts as f64 * time_base)
        .unwrap_or(0.0)
}

fn to_rgba(
    scaler: &mut Scaler,
    decoded: &frame::Video,
    width: u32,
    height: u32,
) -> Result<RgbaImage> {
    let mut rgba_frame = frame::Video::empty();
    scaler.run(decoded, &mut rgba_frame)?;

    let data = rgba_frame.data(0);
    let stride = rgba_frame.stride(0);

    // Copy row-by-row in case stride != width*4
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height as usize {
        let row_start = y * stride;
        let row_end = row_start + (width as usize * 4);
        pixels.extend_from_slice(&data[row_start..row_end]);
    }

    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("Decoded frame has unexpected size {}x{}", width, height))
}
