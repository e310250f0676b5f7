use crate::preprocess::invert;
use image::GrayImage;
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};
use imageproc::template_matching::MatchTemplateMethod;

/// Best placement of a template inside a larger image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    /// Top-left corner of the matched window
    pub x: u32,
    pub y: u32,
    /// Zero-mean normalized cross-correlation in [-1, 1]
    pub score: f64,
}

/// Compute mean and standard deviation of pixel values
pub fn compute_stats(img: &GrayImage) -> (f64, f64) {
    let n = (img.width() * img.height()) as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = img.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let variance = img
        .pixels()
        .map(|p| (p[0] as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}

/// Zero-mean Normalized Cross-Correlation between two same-sized images.
/// Returns a value between -1.0 (inverse) and 1.0 (perfect match).
pub fn normalized_cross_correlation(
    img: &GrayImage,
    img_mean: f64,
    img_std: f64,
    tmpl: &GrayImage,
    tmpl_mean: f64,
    tmpl_std: f64,
) -> f64 {
    debug_assert_eq!(img.dimensions(), tmpl.dimensions());

    let denom = img_std * tmpl_std;
    if denom < 1e-10 {
        return 0.0;
    }

    let n = (img.width() * img.height()) as f64;
    let cross: f64 = img
        .pixels()
        .zip(tmpl.pixels())
        .map(|(ip, tp)| (ip[0] as f64 - img_mean) * (tp[0] as f64 - tmpl_mean))
        .sum();

    cross / (n * denom)
}

/// Slide `template` over every position of `image` and return the highest
/// ZNCC placement. The first maximum in raster order wins ties.
///
/// Returns `None` when the template does not fit inside the image.
pub fn match_template(image: &GrayImage, template: &GrayImage) -> Option<TemplateMatch> {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return None;
    }

    let n = (tw * th) as f64;
    let (t_mean, t_std) = compute_stats(template);
    let t_norm = t_std * n.sqrt();

    // sum(I * (T - mean_T)) = sum(I * T) - mean_T * sum(I)
    let cross = imageproc::template_matching::match_template(
        image,
        template,
        MatchTemplateMethod::CrossCorrelation,
    );
    let sums = integral_image::<_, u64>(image);
    let squares = integral_squared_image::<_, u64>(image);

    let mut best = TemplateMatch {
        x: 0,
        y: 0,
        score: f64::NEG_INFINITY,
    };

    for y in 0..=(ih - th) {
        for x in 0..=(iw - tw) {
            let (x1, y1) = (x + tw - 1, y + th - 1);
            let sum = sum_image_pixels(&sums, x, y, x1, y1)[0] as f64;
            let sum_sq = sum_image_pixels(&squares, x, y, x1, y1)[0] as f64;
            let window_var = (sum_sq - sum * sum / n).max(0.0);
            let denom = window_var.sqrt() * t_norm;

            let score = if denom < 1e-10 {
                0.0
            } else {
                let numerator = cross.get_pixel(x, y)[0] as f64 - t_mean * sum;
                (numerator / denom).clamp(-1.0, 1.0)
            };

            if score > best.score {
                best = TemplateMatch { x, y, score };
            }
        }
    }

    Some(best)
}

/// Match against the image and its tonal inverse, keeping whichever scores
/// higher. Handles light-on-dark and dark-on-light palettes with one template.
pub fn match_template_any_polarity(
    image: &GrayImage,
    template: &GrayImage,
) -> Option<TemplateMatch> {
    let direct = match_template(image, template)?;
    let inverse = match_template(&invert(image), template)?;
    if inverse.score > direct.score {
        Some(inverse)
    } else {
        Some(direct)
    }
}
