//! Synthetic counter glyphs: a 5x7 bitmap font drawn white on black at 3x.

use super::assets::GlyphTemplates;
use image::{GrayImage, Luma, RgbaImage};

const SCALE: u32 = 3;
const MARGIN: u32 = 1;

fn pattern(ch: char) -> [&'static str; 7] {
    match ch {
        '0' => [".###.", "#...#", "#..##", "#.#.#", "##..#", "#...#", ".###."],
        '1' => ["..#..", ".##..", "..#..", "..#..", "..#..", "..#..", ".###."],
        '2' => [".###.", "#...#", "....#", "...#.", "..#..", ".#...", "#####"],
        '3' => ["#####", "...#.", "..#..", "...#.", "....#", "#...#", ".###."],
        '4' => ["...#.", "..##.", ".#.#.", "#..#.", "#####", "...#.", "...#."],
        '5' => ["#####", "#....", "####.", "....#", "....#", "#...#", ".###."],
        '6' => ["..##.", ".#...", "#....", "####.", "#...#", "#...#", ".###."],
        '7' => ["#####", "....#", "...#.", "..#..", ".#...", ".#...", ".#..."],
        '8' => [".###.", "#...#", "#...#", ".###.", "#...#", "#...#", ".###."],
        '9' => [".###.", "#...#", "#...#", ".####", "....#", "...#.", ".##.."],
        '/' => ["....#", "....#", "...#.", "..#..", ".#...", "#....", "#...."],
        other => panic!("no test glyph for {:?}", other),
    }
}

/// 17x23 glyph image with a one-pixel black margin.
pub fn glyph(ch: char) -> GrayImage {
    let rows = pattern(ch);
    GrayImage::from_fn(5 * SCALE + 2 * MARGIN, 7 * SCALE + 2 * MARGIN, |x, y| {
        if x < MARGIN || y < MARGIN || x >= 5 * SCALE + MARGIN || y >= 7 * SCALE + MARGIN {
            return Luma([0]);
        }
        let (col, row) = ((x - MARGIN) / SCALE, (y - MARGIN) / SCALE);
        let on = rows[row as usize].as_bytes()[col as usize] == b'#';
        Luma([if on { 255 } else { 0 }])
    })
}

pub fn glyph_templates() -> GlyphTemplates {
    let digits = "0123456789".chars().map(|d| (d, glyph(d))).collect();
    GlyphTemplates::from_images(digits, glyph('/'))
}

/// Glyphs laid side by side on black with `gap` pixels between them and a
/// two-pixel border.
pub fn compose(chars: &[char], gap: u32) -> GrayImage {
    let glyphs: Vec<GrayImage> = chars.iter().map(|&c| glyph(c)).collect();
    let height = glyphs.first().map_or(0, |g| g.height()) + 4;
    let width = glyphs.iter().map(|g| g.width()).sum::<u32>()
        + gap * (glyphs.len() as u32).saturating_sub(1)
        + 4;
    let mut canvas = GrayImage::new(width, height);
    let mut x = 2i64;
    for g in &glyphs {
        image::imageops::replace(&mut canvas, g, x, 2);
        x += (g.width() + gap) as i64;
    }
    canvas
}

pub fn to_rgba(gray: &GrayImage) -> RgbaImage {
    image::DynamicImage::ImageLuma8(gray.clone()).to_rgba8()
}
