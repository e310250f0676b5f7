use image::{GrayImage, Luma, RgbaImage};
use imageproc::integral_image::{integral_image, sum_image_pixels};
use serde::{Deserialize, Serialize};

/// Label written into the output diagnostics for the recognizer input pipeline
pub const PREPROCESS_LABEL: &str = "upscale3x+adaptive_threshold";

/// Which tone counts as foreground after a global threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Light glyphs on a dark background
    Bright,
    /// Dark glyphs on a light background
    Dark,
}

impl Polarity {
    pub const BOTH: [Polarity; 2] = [Polarity::Bright, Polarity::Dark];
}

/// Knobs for the recognizer input pipeline (upscale → denoise → adaptive threshold).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub upscale: u32,
    pub denoise_radius: u32,
    pub adaptive_block_size: u32,
    pub adaptive_c: i32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            upscale: 3,
            denoise_radius: 1,
            adaptive_block_size: 15,
            adaptive_c: 5,
        }
    }
}

pub fn to_gray(image: &RgbaImage) -> GrayImage {
    image::imageops::grayscale(image)
}

pub fn invert(image: &GrayImage) -> GrayImage {
    let mut out = image.clone();
    image::imageops::invert(&mut out);
    out
}

/// Integer upscale with cubic interpolation. Factors <= 1 return a copy.
pub fn upscale(image: &GrayImage, factor: u32) -> GrayImage {
    if factor <= 1 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    image::imageops::resize(
        image,
        image.width() * factor,
        image.height() * factor,
        image::imageops::FilterType::CatmullRom,
    )
}

pub fn denoise(image: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return image.clone();
    }
    imageproc::filter::median_filter(image, radius, radius)
}

/// Local-mean threshold: a pixel is white when it exceeds the mean of its
/// `block_size` neighbourhood minus `c`, black otherwise.
pub fn adaptive_threshold(image: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    // Block size must be odd
    let block_size = if block_size % 2 == 0 {
        block_size + 1
    } else {
        block_size
    };
    let radius = (block_size / 2) as i64;
    let integral = integral_image::<_, u64>(image);

    GrayImage::from_fn(w, h, |x, y| {
        let x0 = (x as i64 - radius).max(0) as u32;
        let y0 = (y as i64 - radius).max(0) as u32;
        let x1 = (x as i64 + radius).min(w as i64 - 1) as u32;
        let y1 = (y as i64 + radius).min(h as i64 - 1) as u32;
        let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;
        let mean = sum_image_pixels(&integral, x0, y0, x1, y1)[0] as f64 / area;
        if image.get_pixel(x, y)[0] as f64 > mean - c as f64 {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Global threshold level that maximises inter-class variance.
pub fn otsu_level(image: &GrayImage) -> u8 {
    imageproc::contrast::otsu_level(image)
}

/// Binary mask (foreground = 255) split at `level` with the given polarity.
pub fn binarize(image: &GrayImage, level: u8, polarity: Polarity) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y)[0];
        let fg = match polarity {
            Polarity::Bright => p > level,
            Polarity::Dark => p <= level,
        };
        if fg {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Otsu mask whose foreground is the minority class, i.e. the glyph strokes
/// regardless of palette.
pub fn binarize_minority(image: &GrayImage) -> GrayImage {
    let level = otsu_level(image);
    let bright = binarize(image, level, Polarity::Bright);
    let fg = bright.pixels().filter(|p| p[0] > 0).count();
    let total = (image.width() * image.height()) as usize;
    if fg * 2 > total {
        invert(&bright)
    } else {
        bright
    }
}

/// Recognizer input for digit fields: upscale, denoise, adaptive binarize.
pub fn preprocess_digits(image: &GrayImage, cfg: &PreprocessConfig) -> GrayImage {
    let out = upscale(image, cfg.upscale);
    let out = denoise(&out, cfg.denoise_radius);
    adaptive_threshold(&out, cfg.adaptive_block_size, cfg.adaptive_c)
}

/// Recognizer input for text bands: upscale, denoise, then a global
/// threshold rendering the glyphs dark on white (Tesseract preference).
pub fn preprocess_text(image: &RgbaImage, cfg: &PreprocessConfig) -> GrayImage {
    let gray = to_gray(image);
    let out = upscale(&gray, cfg.upscale);
    let out = denoise(&out, cfg.denoise_radius);
    invert(&binarize_minority(&out))
}

/// Variance of the 3x3 Laplacian response. Blurry captures score low.
pub fn sharpness(image: &RgbaImage) -> f64 {
    laplacian_variance(&to_gray(image))
}

/// Population variance of `imageproc`'s 4-neighbour Laplacian response.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    if gray.width() == 0 || gray.height() == 0 {
        return 0.0;
    }
    let response = imageproc::filter::laplacian_filter(gray);
    let n = (response.width() * response.height()) as f64;
    let mean = response.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    response
        .pixels()
        .map(|p| (p[0] as f64 - mean).powi(2))
        .sum::<f64>()
        / n
}
