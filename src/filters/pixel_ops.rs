//! Structural pixel effects: block pixelation, alpha rescaling, noise,
//! scatter, and halftone dotting.

use crate::color::{self, Color};
use crate::filters::DotShape;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use rand::Rng;

/// Replace each `block`×`block` cell with its average color. Blocks of 0 or
/// 1 are the identity.
pub fn pixelate(img: RgbaImage, block: u32) -> RgbaImage {
    if block <= 1 {
        return img;
    }
    let (w, h) = img.dimensions();
    let mut img = img;
    for by in (0..h).step_by(block as usize) {
        for bx in (0..w).step_by(block as usize) {
            let x_end = (bx + block).min(w);
            let y_end = (by + block).min(h);

            let mut sum = [0u64; 4];
            let mut count = 0u64;
            for y in by..y_end {
                for x in bx..x_end {
                    let p = img.get_pixel(x, y);
                    for c in 0..4 {
                        sum[c] += p[c] as u64;
                    }
                    count += 1;
                }
            }
            let avg = Rgba([
                ((sum[0] + count / 2) / count) as u8,
                ((sum[1] + count / 2) / count) as u8,
                ((sum[2] + count / 2) / count) as u8,
                ((sum[3] + count / 2) / count) as u8,
            ]);
            for y in by..y_end {
                for x in bx..x_end {
                    img.put_pixel(x, y, avg);
                }
            }
        }
    }
    img
}

/// Rescale alpha so the most opaque pixel ends at `percent` of its original
/// alpha.
///
/// Every pixel's alpha shifts toward transparency by the same amount,
/// `(100 − percent)% × max_alpha`, clamping at fully transparent. This is a
/// uniform shift rather than a multiply, so partially transparent pixels
/// fade out before opaque ones. 100 is the identity.
pub fn opacity(img: RgbaImage, percent: u32) -> RgbaImage {
    if percent >= 100 {
        return img;
    }
    let max_alpha = img.pixels().map(|p| p[3] as u32).max().unwrap_or(0);
    if max_alpha == 0 {
        return img;
    }
    let shift = (((100 - percent) * max_alpha + 50) / 100) as u8;
    let mut img = img;
    for px in img.pixels_mut() {
        px[3] = px[3].saturating_sub(shift);
    }
    img
}

/// Add impulse noise: roughly half the pixels shift all three channels by
/// `(random_step & level) × random_sign`. The bitwise AND (not a modulo)
/// biases steps toward the set bits of `level`; level 0 is the identity.
/// Alpha is never touched.
pub fn noise(img: RgbaImage, level: u8) -> RgbaImage {
    if level == 0 {
        return img;
    }
    let mut rng = rand::thread_rng();
    let mut img = img;
    for px in img.pixels_mut() {
        if rng.gen_bool(0.5) {
            continue;
        }
        let step = rng.r#gen::<u8>() & level;
        if step == 0 {
            continue;
        }
        let up = rng.gen_bool(0.5);
        for c in 0..3 {
            px[c] = if up {
                px[c].saturating_add(step)
            } else {
                px[c].saturating_sub(step)
            };
        }
    }
    img
}

/// Swap each pixel with a random neighbor at distance `sub..=add`. Swapping
/// only rearranges pixels, never invents new colors.
pub fn scatter(img: RgbaImage, sub: u32, add: u32) -> RgbaImage {
    if add == 0 {
        return img;
    }
    let (w, h) = img.dimensions();
    let mut rng = rand::thread_rng();
    let mut img = img;
    for y in 0..h {
        for x in 0..w {
            let d = rng.gen_range(sub..=add) as i64;
            let nx = x as i64 + rng.gen_range(-d..=d);
            let ny = y as i64 + rng.gen_range(-d..=d);
            if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                continue;
            }
            let (nx, ny) = (nx as u32, ny as u32);
            let a = *img.get_pixel(x, y);
            let b = *img.get_pixel(nx, ny);
            img.put_pixel(x, y, b);
            img.put_pixel(nx, ny, a);
        }
    }
    img
}

/// Halftone dots: downscale by `block`, then draw one dot per reduced pixel
/// on a black canvas, radius proportional to the pixel's luma. Bright areas
/// get large dots. Dots carry the source color unless `color` overrides.
pub fn dot(img: RgbaImage, block: u32, shape: DotShape, color: Option<Color>) -> RgbaImage {
    if block <= 1 {
        return img;
    }
    let (w, h) = img.dimensions();
    let reduced = imageops::resize(
        &img,
        (w / block).max(1),
        (h / block).max(1),
        FilterType::Triangle,
    );

    let mut canvas = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]));
    for (rx, ry, px) in reduced.enumerate_pixels() {
        let intensity = color::luma(px[0], px[1], px[2]) / 255.0;
        let radius = intensity * block as f32 / 2.0;
        if radius < 0.5 {
            continue;
        }
        let cx = (rx * block + block / 2) as i32;
        let cy = (ry * block + block / 2) as i32;
        let ink = color.map(Color::to_rgba).unwrap_or(*px);
        match shape {
            DotShape::Circle => {
                draw_filled_circle_mut(&mut canvas, (cx, cy), radius.round() as i32, ink);
            }
            DotShape::Square => {
                let side = (radius * 2.0).round() as u32;
                if side == 0 {
                    continue;
                }
                let rect = Rect::at(cx - radius.round() as i32, cy - radius.round() as i32)
                    .of_size(side, side);
                draw_filled_rect_mut(&mut canvas, rect, ink);
            }
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 30) as u8, (y * 30) as u8, 128, 255])
        })
    }

    // =========================================================================
    // Pixelate
    // =========================================================================

    #[test]
    fn pixelate_block_one_is_identity() {
        let img = gradient(6, 6);
        assert_eq!(pixelate(img.clone(), 0), img);
        assert_eq!(pixelate(img.clone(), 1), img);
    }

    #[test]
    fn pixelate_whole_image_blocks_flatten_to_average() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        for y in 0..4 {
            for x in 2..4 {
                img.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let out = pixelate(img, 4);
        let expected = Rgba([128, 128, 128, 255]);
        for (_, _, p) in out.enumerate_pixels() {
            assert_eq!(p, &expected);
        }
    }

    #[test]
    fn pixelate_cells_are_uniform() {
        let out = pixelate(gradient(8, 8), 4);
        let anchor = out.get_pixel(0, 0);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(out.get_pixel(x, y), anchor);
            }
        }
        assert_ne!(out.get_pixel(4, 4), anchor);
    }

    // =========================================================================
    // Opacity
    // =========================================================================

    #[test]
    fn opacity_100_is_identity() {
        let img = gradient(4, 4);
        assert_eq!(opacity(img.clone(), 100), img);
    }

    #[test]
    fn opacity_shifts_relative_to_most_opaque_pixel() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([9, 9, 9, 200]));
        img.put_pixel(1, 0, Rgba([9, 9, 9, 90]));
        let out = opacity(img, 50);
        // Shift is 50% of the max (100): 200 → 100, 90 → 0.
        assert_eq!(out.get_pixel(0, 0)[3], 100);
        assert_eq!(out.get_pixel(1, 0)[3], 0);
    }

    #[test]
    fn opacity_zero_clears_everything() {
        let out = opacity(gradient(3, 3), 0);
        assert!(out.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn opacity_leaves_color_channels_alone() {
        let out = opacity(RgbaImage::from_pixel(2, 2, Rgba([11, 22, 33, 255])), 40);
        let p = out.get_pixel(0, 0);
        assert_eq!((p[0], p[1], p[2]), (11, 22, 33));
    }

    // =========================================================================
    // Noise and scatter
    // =========================================================================

    #[test]
    fn noise_level_zero_is_identity() {
        let img = gradient(5, 5);
        assert_eq!(noise(img.clone(), 0), img);
    }

    #[test]
    fn noise_never_touches_alpha() {
        let img = RgbaImage::from_pixel(16, 16, Rgba([100, 100, 100, 77]));
        let out = noise(img, 255);
        assert!(out.pixels().all(|p| p[3] == 77));
    }

    #[test]
    fn scatter_only_rearranges_pixels() {
        let img = gradient(8, 8);
        let mut before: Vec<[u8; 4]> = img.pixels().map(|p| p.0).collect();
        let out = scatter(img, 1, 3);
        let mut after: Vec<[u8; 4]> = out.pixels().map(|p| p.0).collect();
        before.sort_unstable();
        after.sort_unstable();
        assert_eq!(before, after);
    }

    #[test]
    fn scatter_zero_add_is_identity() {
        let img = gradient(4, 4);
        assert_eq!(scatter(img.clone(), 0, 0), img);
    }

    // =========================================================================
    // Dot halftone
    // =========================================================================

    #[test]
    fn dot_block_one_is_identity() {
        let img = gradient(4, 4);
        assert_eq!(dot(img.clone(), 1, DotShape::Circle, None), img);
    }

    #[test]
    fn dot_draws_bright_dots_on_black() {
        let white = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
        let out = dot(white, 4, DotShape::Circle, None);
        // Dot centers are lit, the canvas corner stays black.
        assert_eq!(out.get_pixel(2, 2), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn dot_black_source_renders_no_dots() {
        let black = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let out = dot(black.clone(), 4, DotShape::Square, None);
        assert_eq!(out, black);
    }

    #[test]
    fn dot_override_color_wins() {
        let white = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
        let out = dot(white, 4, DotShape::Square, Some(Color::rgb(255, 0, 0)));
        // A full-intensity square covers its whole block.
        assert_eq!(out.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }
}
