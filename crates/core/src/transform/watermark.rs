//! Tiled text watermark.
//!
//! The text is rendered with an 8x8 bitmap font, scaled up, and repeated
//! across the whole canvas on a fixed grid. Glyph pixels are blended over
//! the original in white at constant low opacity. Dimensions never change.

use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{DynamicImage, Rgba, RgbaImage};

/// Watermark opacity: 51/255, roughly 20%.
pub const WATERMARK_ALPHA: u8 = 51;

/// Horizontal distance between tile origins, in pixels.
pub const STEP_X: u32 = 150;

/// Vertical distance between tile origins, in pixels.
pub const STEP_Y: u32 = 50;

/// Each font pixel is drawn as a `GLYPH_SCALE` x `GLYPH_SCALE` block.
const GLYPH_SCALE: u32 = 2;

const GLYPH_SIZE: u32 = 8;

const INK: Rgba<u8> = Rgba([255, 255, 255, WATERMARK_ALPHA]);

/// Looks up the bitmap for a character, if the font has one.
fn glyph(c: char) -> Option<[u8; 8]> {
    BASIC_FONTS.get(c).or_else(|| LATIN_FONTS.get(c))
}

/// Tiles `text` across `img` and returns the composited image.
pub fn apply(img: &DynamicImage, text: &str) -> DynamicImage {
    let mut canvas = img.to_rgba8();
    let (width, height) = canvas.dimensions();

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            draw_text(&mut canvas, x, y, text);
            x += STEP_X;
        }
        y += STEP_Y;
    }

    DynamicImage::ImageRgba8(canvas)
}

fn draw_text(canvas: &mut RgbaImage, origin_x: u32, origin_y: u32, text: &str) {
    let advance = GLYPH_SIZE * GLYPH_SCALE;

    for (i, c) in text.chars().enumerate() {
        let pen_x = origin_x.saturating_add(i as u32 * advance);
        if pen_x >= canvas.width() {
            break;
        }
        // Characters without a bitmap leave a gap.
        if let Some(bitmap) = glyph(c) {
            draw_glyph(canvas, pen_x, origin_y, &bitmap);
        }
    }
}

fn draw_glyph(canvas: &mut RgbaImage, pen_x: u32, pen_y: u32, bitmap: &[u8; 8]) {
    let (width, height) = canvas.dimensions();

    for (row, bits) in bitmap.iter().enumerate() {
        for col in 0..GLYPH_SIZE {
            if bits & (1 << col) == 0 {
                continue;
            }
            for dy in 0..GLYPH_SCALE {
                for dx in 0..GLYPH_SCALE {
                    let px = pen_x + col * GLYPH_SCALE + dx;
                    let py = pen_y + row as u32 * GLYPH_SCALE + dy;
                    if px < width && py < height {
                        let dst = canvas.get_pixel_mut(px, py);
                        *dst = blend(*dst, INK);
                    }
                }
            }
        }
    }
}

/// Source-over compositing of `src` onto `dst`.
fn blend(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);

    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |s: u8, d: u8| -> u8 {
        let c = (s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a;
        c.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        (out_a * 255.0).round() as u8,
    ])
}
