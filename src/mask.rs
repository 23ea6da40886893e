//! Alpha masking through an explicit grayscale mask channel.
//!
//! A mask is a [`GrayImage`] the size of the buffer: 255 keeps a pixel, 0
//! removes it, intermediate values scale alpha proportionally. Composition
//! multiplies the mask into the alpha channel, so stacked masks combine
//! naturally and no color value is ever reserved for transparency tricks.
//!
//! Masks come from two places: rounded-corner geometry ([`rounded`]) and
//! user-supplied mask images ([`from_luma`], white keeps / black removes).

use crate::color;
use crate::params::CornersSpec;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};

/// Multiply a mask into the buffer's alpha channel. The mask must match the
/// buffer's dimensions (see [`fit_to`]).
pub fn apply(img: &mut RgbaImage, mask: &GrayImage) {
    debug_assert_eq!(img.dimensions(), mask.dimensions());
    for (x, y, px) in img.enumerate_pixels_mut() {
        let m = mask.get_pixel(x, y)[0] as u32;
        px[3] = ((px[3] as u32 * m + 127) / 255) as u8;
    }
}

/// Resize a mask to the given dimensions (no-op when it already fits).
pub fn fit_to(mask: GrayImage, w: u32, h: u32) -> GrayImage {
    if mask.dimensions() == (w, h) {
        mask
    } else {
        imageops::resize(&mask, w, h, FilterType::Triangle)
    }
}

/// Build a mask from an image's luma: white keeps, black removes.
pub fn from_luma(img: &RgbaImage) -> GrayImage {
    let (w, h) = img.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let p = img.get_pixel(x, y);
        Luma([color::luma(p[0], p[1], p[2]).round().clamp(0.0, 255.0) as u8])
    })
}

/// Build a rounded-corner mask: fully opaque except outside the quarter
/// circles of the selected corners, with a one-pixel soft edge. The radius
/// is capped at half the shorter side.
pub fn rounded(w: u32, h: u32, spec: &CornersSpec) -> GrayImage {
    let mut mask = GrayImage::from_pixel(w, h, Luma([255]));
    let radius = spec.radius.min(w / 2).min(h / 2);
    if radius == 0 || !spec.any() {
        return mask;
    }

    // (corner pixel origin, circle center in continuous coordinates)
    let r = radius as f32;
    let corners = [
        (spec.top_left, 0, 0, r, r),
        (spec.top_right, w - radius, 0, w as f32 - r, r),
        (spec.bottom_left, 0, h - radius, r, h as f32 - r),
        (spec.bottom_right, w - radius, h - radius, w as f32 - r, h as f32 - r),
    ];

    for (enabled, ox, oy, cx, cy) in corners {
        if !enabled {
            continue;
        }
        for y in oy..(oy + radius).min(h) {
            for x in ox..(ox + radius).min(w) {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                let dist = (dx * dx + dy * dy).sqrt();
                let cover = ((r + 0.5 - dist) * 255.0).clamp(0.0, 255.0) as u8;
                let px = mask.get_pixel_mut(x, y);
                px[0] = px[0].min(cover);
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn full_mask_is_identity() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 200]));
        let expected = img.clone();
        apply(&mut img, &GrayImage::from_pixel(4, 4, Luma([255])));
        assert_eq!(img, expected);
    }

    #[test]
    fn zero_mask_clears_alpha_only() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 200]));
        apply(&mut img, &GrayImage::from_pixel(2, 2, Luma([0])));
        let p = img.get_pixel(0, 0);
        assert_eq!(p.0, [10, 20, 30, 0]);
    }

    #[test]
    fn half_mask_halves_alpha() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        apply(&mut img, &GrayImage::from_pixel(1, 1, Luma([128])));
        assert_eq!(img.get_pixel(0, 0)[3], 128);
    }

    #[test]
    fn masks_compose_multiplicatively() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let half = GrayImage::from_pixel(1, 1, Luma([128]));
        apply(&mut img, &half);
        apply(&mut img, &half);
        // 255 × 0.502 × 0.502 ≈ 64
        assert_eq!(img.get_pixel(0, 0)[3], 64);
    }

    #[test]
    fn luma_mask_white_keeps_black_removes() {
        let mut src = RgbaImage::from_pixel(2, 1, Rgba([255, 255, 255, 255]));
        src.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let mask = from_luma(&src);
        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(1, 0)[0], 0);
    }

    // =========================================================================
    // Rounded corners
    // =========================================================================

    #[test]
    fn rounded_cuts_selected_corners_only() {
        let spec = CornersSpec::parse("8|yes,no,no,no").unwrap();
        let mask = rounded(32, 32, &spec);
        assert_eq!(mask.get_pixel(0, 0)[0], 0, "top-left corner cut");
        assert_eq!(mask.get_pixel(31, 0)[0], 255, "top-right kept");
        assert_eq!(mask.get_pixel(0, 31)[0], 255, "bottom-left kept");
        assert_eq!(mask.get_pixel(31, 31)[0], 255, "bottom-right kept");
    }

    #[test]
    fn rounded_keeps_the_interior() {
        let spec = CornersSpec::parse("8").unwrap();
        let mask = rounded(32, 32, &spec);
        assert_eq!(mask.get_pixel(16, 16)[0], 255);
        assert_eq!(mask.get_pixel(8, 8)[0], 255);
    }

    #[test]
    fn rounded_radius_caps_at_half_size() {
        // A huge radius must not panic or wrap; it degrades to a circle.
        let spec = CornersSpec::parse("500").unwrap();
        let mask = rounded(16, 16, &spec);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(8, 8)[0], 255);
    }

    #[test]
    fn fit_to_resizes_only_when_needed() {
        let mask = GrayImage::from_pixel(4, 4, Luma([200]));
        assert_eq!(fit_to(mask.clone(), 4, 4), mask);
        let grown = fit_to(mask, 8, 8);
        assert_eq!(grown.dimensions(), (8, 8));
    }
}
