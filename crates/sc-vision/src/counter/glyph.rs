use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Inclusive pixel bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
    pub pixels: u32,
}

impl GlyphBox {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0 + 1
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0 + 1
    }

    fn include(&mut self, x: u32, y: u32) {
        self.x0 = self.x0.min(x);
        self.y0 = self.y0.min(y);
        self.x1 = self.x1.max(x);
        self.y1 = self.y1.max(y);
        self.pixels += 1;
    }

    fn seeded(x: u32, y: u32) -> Self {
        Self {
            x0: x,
            y0: y,
            x1: x,
            y1: y,
            pixels: 1,
        }
    }

    pub fn crop(&self, image: &GrayImage) -> GrayImage {
        image::imageops::crop_imm(image, self.x0, self.y0, self.width(), self.height()).to_image()
    }
}

/// Connected components of a foreground mask that plausibly are glyphs,
/// ordered left to right. Drops specks, blobs shorter than
/// `min_height_ratio` of the mask, and anything touching all four borders
/// (that is the background, not a glyph).
pub fn glyph_boxes(mask: &GrayImage, min_height_ratio: f64) -> Vec<GlyphBox> {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let mut boxes: Vec<Option<GlyphBox>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let id = label[0] as usize;
        if id == 0 {
            continue;
        }
        if boxes.len() < id {
            boxes.resize(id, None);
        }
        match &mut boxes[id - 1] {
            Some(b) => b.include(x, y),
            slot => *slot = Some(GlyphBox::seeded(x, y)),
        }
    }

    let min_height = (h as f64 * min_height_ratio).ceil() as u32;
    let mut glyphs: Vec<GlyphBox> = boxes
        .into_iter()
        .flatten()
        .filter(|b| b.pixels >= 3)
        .filter(|b| b.height() >= min_height)
        .filter(|b| !(b.x0 == 0 && b.y0 == 0 && b.x1 == w - 1 && b.y1 == h - 1))
        .collect();
    glyphs.sort_by_key(|b| b.x0);
    glyphs
}

/// Column with the fewest foreground pixels inside `[band_start, band_end]`
/// of the width, accepted only when its count is below `max_gap_ratio` of
/// the height. The first minimum wins.
pub fn projection_split_column(
    mask: &GrayImage,
    band_start: f64,
    band_end: f64,
    max_gap_ratio: f64,
) -> Option<u32> {
    let (w, h) = mask.dimensions();
    if w < 3 || h == 0 {
        return None;
    }
    let lo = (w as f64 * band_start).floor() as u32;
    let hi = ((w as f64 * band_end).ceil() as u32).min(w - 1);
    if lo > hi {
        return None;
    }

    let (col, count) = (lo..=hi)
        .map(|x| (x, (0..h).filter(|&y| mask.get_pixel(x, y)[0] > 0).count()))
        .fold(None, |best: Option<(u32, usize)>, (x, c)| match best {
            Some((_, bc)) if bc <= c => best,
            _ => Some((x, c)),
        })?;

    if (count as f64) < h as f64 * max_gap_ratio {
        Some(col)
    } else {
        None
    }
}

/// Bounding box of the foreground within columns `[x_start, x_end)`.
pub fn foreground_box(mask: &GrayImage, x_start: u32, x_end: u32) -> Option<GlyphBox> {
    let mut bbox: Option<GlyphBox> = None;
    for y in 0..mask.height() {
        for x in x_start..x_end.min(mask.width()) {
            if mask.get_pixel(x, y)[0] > 0 {
                match &mut bbox {
                    Some(b) => b.include(x, y),
                    None => bbox = Some(GlyphBox::seeded(x, y)),
                }
            }
        }
    }
    bbox
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_bars(w: u32, h: u32, bars: &[(u32, u32)]) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let on = y >= 2 && y < h - 2 && bars.iter().any(|&(a, b)| x >= a && x < b);
            Luma([if on { 255 } else { 0 }])
        })
    }

    #[test]
    fn test_glyph_boxes_left_to_right() {
        let mask = mask_with_bars(30, 20, &[(18, 22), (4, 8)]);
        let boxes = glyph_boxes(&mask, 0.35);
        assert_eq!(boxes.len(), 2);
        assert_eq!((boxes[0].x0, boxes[0].x1), (4, 7));
        assert_eq!((boxes[1].x0, boxes[1].x1), (18, 21));
        assert_eq!(boxes[0].height(), 16);
    }

    #[test]
    fn test_glyph_boxes_drop_background_and_specks() {
        // Inverted bars: the background touches every border
        let mut mask = mask_with_bars(30, 20, &[(4, 8)]);
        image::imageops::invert(&mut mask);
        assert!(glyph_boxes(&mask, 0.35).is_empty());

        let mut specks = GrayImage::new(30, 20);
        specks.put_pixel(10, 10, Luma([255]));
        assert!(glyph_boxes(&specks, 0.35).is_empty());
    }

    #[test]
    fn test_projection_split_in_gap() {
        let mask = mask_with_bars(40, 20, &[(2, 16), (19, 38)]);
        assert_eq!(projection_split_column(&mask, 0.3, 0.7, 0.1), Some(16));
    }

    #[test]
    fn test_projection_split_rejects_solid_band() {
        let mask = mask_with_bars(40, 20, &[(2, 38)]);
        assert_eq!(projection_split_column(&mask, 0.3, 0.7, 0.1), None);
    }

    #[test]
    fn test_foreground_box_limited_to_columns() {
        let mask = mask_with_bars(40, 20, &[(2, 6), (30, 34)]);
        let b = foreground_box(&mask, 20, 40).unwrap();
        assert_eq!((b.x0, b.x1, b.y0, b.y1), (30, 33, 2, 17));
        assert!(foreground_box(&mask, 10, 20).is_none());
    }
}
