//! Per-pixel color adjustments.
//!
//! Everything here touches RGB only; alpha passes through unchanged. The
//! brightness/contrast curves match the classic GD formulas so existing
//! parameter values keep their meaning.

use crate::color::{self, Color, Hsl};
use image::RgbaImage;

fn map_rgb(mut img: RgbaImage, f: impl Fn(u8, u8, u8) -> (u8, u8, u8)) -> RgbaImage {
    for px in img.pixels_mut() {
        let (r, g, b) = f(px[0], px[1], px[2]);
        px[0] = r;
        px[1] = g;
        px[2] = b;
    }
    img
}

fn shift_channel(c: u8, by: i32) -> u8 {
    (c as i32 + by).clamp(0, 255) as u8
}

/// Shift all channels by `level` (internal −100..100 scale; ±100 is ±255).
pub fn brightness(img: RgbaImage, level: i32) -> RgbaImage {
    if level == 0 {
        return img;
    }
    let shift = ((level as f32) * 2.55).round() as i32;
    map_rgb(img, |r, g, b| {
        (
            shift_channel(r, shift),
            shift_channel(g, shift),
            shift_channel(b, shift),
        )
    })
}

/// GD contrast curve. `level` arrives sign-inverted from parsing, so
/// negative values here increase contrast.
pub fn contrast(img: RgbaImage, level: i32) -> RgbaImage {
    if level == 0 {
        return img;
    }
    let factor = {
        let f = (100 - level) as f32 / 100.0;
        f * f
    };
    let curve = |c: u8| {
        let v = (c as f32 / 255.0 - 0.5) * factor + 0.5;
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };
    map_rgb(img, |r, g, b| (curve(r), curve(g), curve(b)))
}

/// Add per-channel deltas (−255..255 each).
pub fn colorize(img: RgbaImage, r: i32, g: i32, b: i32) -> RgbaImage {
    if r == 0 && g == 0 && b == 0 {
        return img;
    }
    map_rgb(img, |pr, pg, pb| {
        (
            shift_channel(pr, r),
            shift_channel(pg, g),
            shift_channel(pb, b),
        )
    })
}

/// Rec.601 luma grayscale.
pub fn grayscale(img: RgbaImage) -> RgbaImage {
    map_rgb(img, |r, g, b| {
        let l = color::luma(r, g, b).round().clamp(0.0, 255.0) as u8;
        (l, l, l)
    })
}

pub fn invert(img: RgbaImage) -> RgbaImage {
    map_rgb(img, |r, g, b| (255 - r, 255 - g, 255 - b))
}

/// Sepia tone. The fast method is grayscale plus a warm colorize; the slow
/// method applies the classic sepia matrix per pixel.
pub fn sepia(img: RgbaImage, slow: bool) -> RgbaImage {
    if slow {
        map_rgb(img, |r, g, b| {
            let (r, g, b) = (r as f32, g as f32, b as f32);
            let clamp = |v: f32| v.round().clamp(0.0, 255.0) as u8;
            (
                clamp(0.393 * r + 0.769 * g + 0.189 * b),
                clamp(0.349 * r + 0.686 * g + 0.168 * b),
                clamp(0.272 * r + 0.534 * g + 0.131 * b),
            )
        })
    } else {
        colorize(grayscale(img), 90, 55, 30)
    }
}

/// Replace hues near `from` with `to`, preserving each pixel's lightness.
///
/// `tolerance` (0–100) widens the matched hue window by 1.8° per unit.
/// Replacing a color with itself is the identity.
pub fn replace_color(img: RgbaImage, from: Color, to: Color, tolerance: u32) -> RgbaImage {
    if from == to {
        return img;
    }
    let window = tolerance as f32 * 1.8;
    let from_hue = color::rgb_to_hsl(from.r, from.g, from.b).h;
    let target = color::rgb_to_hsl(to.r, to.g, to.b);

    map_rgb(img, |r, g, b| {
        let hsl = color::rgb_to_hsl(r, g, b);
        if color::hue_distance(hsl.h, from_hue) <= window {
            color::hsl_to_rgb(Hsl {
                h: target.h,
                s: target.s,
                l: hsl.l,
            })
        } else {
            (r, g, b)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(3, 3, Rgba(rgba))
    }

    fn first(img: &RgbaImage) -> [u8; 4] {
        img.get_pixel(0, 0).0
    }

    // =========================================================================
    // Brightness / contrast
    // =========================================================================

    #[test]
    fn brightness_zero_is_identity() {
        let img = solid([12, 34, 56, 200]);
        assert_eq!(brightness(img.clone(), 0), img);
    }

    #[test]
    fn brightness_extremes_saturate() {
        assert_eq!(first(&brightness(solid([100, 100, 100, 255]), 100)), [255, 255, 255, 255]);
        assert_eq!(first(&brightness(solid([100, 100, 100, 255]), -100)), [0, 0, 0, 255]);
    }

    #[test]
    fn brightness_shifts_midtones() {
        // Internal 20 is a shift of 51 levels.
        assert_eq!(first(&brightness(solid([100, 50, 0, 255]), 20)), [151, 101, 51, 255]);
    }

    #[test]
    fn contrast_zero_is_identity() {
        let img = solid([80, 120, 200, 255]);
        assert_eq!(contrast(img.clone(), 0), img);
    }

    #[test]
    fn negative_level_pushes_away_from_midpoint() {
        // Parsing maps user +50 to level −50: factor 2.25.
        let out = contrast(solid([64, 192, 128, 255]), -50);
        let [r, g, _, _] = first(&out);
        assert!(r < 64, "dark got darker: {r}");
        assert!(g > 192, "bright got brighter: {g}");
    }

    #[test]
    fn full_positive_level_flattens_to_gray() {
        // User −100 (level 100): factor 0, everything collapses to the midpoint.
        let out = contrast(solid([0, 255, 77, 255]), 100);
        assert_eq!(first(&out), [128, 128, 128, 255]);
    }

    // =========================================================================
    // Colorize / grayscale / invert / sepia
    // =========================================================================

    #[test]
    fn colorize_adds_and_clamps() {
        let out = colorize(solid([200, 100, 10, 255]), 90, -120, -20);
        assert_eq!(first(&out), [255, 0, 0, 255]);
    }

    #[test]
    fn grayscale_equalizes_channels_at_luma() {
        let out = grayscale(solid([255, 0, 0, 255]));
        let [r, g, b, a] = first(&out);
        assert_eq!((r, g, b), (76, 76, 76));
        assert_eq!(a, 255);
    }

    #[test]
    fn invert_is_its_own_inverse() {
        let img = solid([3, 141, 59, 180]);
        assert_eq!(invert(invert(img.clone())), img);
    }

    #[test]
    fn sepia_fast_is_grayscale_plus_warm_colorize() {
        let src = solid([60, 130, 220, 255]);
        let expected = colorize(grayscale(src.clone()), 90, 55, 30);
        assert_eq!(sepia(src, false), expected);
    }

    #[test]
    fn sepia_slow_tints_white_warm() {
        let [r, g, b, _] = first(&sepia(solid([255, 255, 255, 255]), true));
        assert!(r >= g && g >= b, "warm ordering: {r} {g} {b}");
        assert_eq!(r, 255); // 1.351 × 255 clamps
        assert_eq!(b, 239); // 0.937 × 255
    }

    // =========================================================================
    // Color replace
    // =========================================================================

    #[test]
    fn replace_color_with_itself_is_identity() {
        let img = solid([210, 40, 40, 255]);
        let c = Color::rgb(255, 0, 0);
        assert_eq!(replace_color(img.clone(), c, c, 100), img);
    }

    #[test]
    fn replace_color_swaps_hue_and_keeps_lightness() {
        // Pure red and pure green share lightness 0.5, so the swap is exact.
        let out = replace_color(
            solid([255, 0, 0, 255]),
            Color::rgb(255, 0, 0),
            Color::rgb(0, 255, 0),
            10,
        );
        assert_eq!(first(&out), [0, 255, 0, 255]);
    }

    #[test]
    fn replace_color_ignores_hues_outside_tolerance() {
        let img = solid([0, 0, 255, 255]);
        let out = replace_color(
            img.clone(),
            Color::rgb(255, 0, 0),
            Color::rgb(0, 255, 0),
            10,
        );
        assert_eq!(out, img);
    }

    #[test]
    fn replace_color_keeps_dark_pixels_dark() {
        // A dark red keeps its lightness when pushed to the green hue.
        let out = replace_color(
            solid([80, 0, 0, 255]),
            Color::rgb(255, 0, 0),
            Color::rgb(0, 255, 0),
            10,
        );
        let [r, g, b, _] = first(&out);
        assert_eq!((r, b), (0, 0));
        assert_eq!(g, 80);
    }
}
