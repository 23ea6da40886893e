//! Lazy-load placeholders.
//!
//! Two flavors, both derived from the finished primary render and cached as
//! suffixed variants of its identity:
//!
//! - `_lazy`: the render pixelated then blurred, encoded at low quality.
//!   Same dimensions as the primary so the page doesn't reflow on swap.
//! - `_dominant`: a solid fill of the extracted dominant color.

use crate::color::Color;
use crate::filters::Filter;
use crate::request::Quality;
use image::RgbaImage;

pub const LAZY_SUFFIX: &str = "lazy";
pub const DOMINANT_SUFFIX: &str = "dominant";

const LAZY_PIXELATE_BLOCK: u32 = 10;
const LAZY_BLUR_PASSES: u32 = 3;
const LAZY_QUALITY: u32 = 30;

/// Encoding quality for the blurred preview. Only lossy formats honor it.
pub fn lazy_quality() -> Quality {
    Quality::new(LAZY_QUALITY)
}

/// Degrade a finished render into its blurred preview.
pub fn lazy_preview(image: RgbaImage) -> RgbaImage {
    let pixelated = Filter::Pixelate {
        block: LAZY_PIXELATE_BLOCK,
    }
    .apply(image);
    Filter::Blur {
        passes: LAZY_BLUR_PASSES,
    }
    .apply(pixelated)
}

/// A solid fill of the dominant color at the render's size.
pub fn dominant_fill(color: Color, width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width.max(1), height.max(1), color.to_rgba())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn lazy_preview_keeps_dimensions() {
        let img = RgbaImage::from_fn(64, 48, |x, y| {
            Rgba([(x * 4) as u8, (y * 5) as u8, 0, 255])
        });
        let preview = lazy_preview(img);
        assert_eq!(preview.dimensions(), (64, 48));
    }

    #[test]
    fn lazy_preview_flattens_detail() {
        // A checkerboard has maximal local contrast; the preview should not.
        let img = RgbaImage::from_fn(40, 40, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        let preview = lazy_preview(img);
        let a = preview.get_pixel(20, 20)[0] as i32;
        let b = preview.get_pixel(21, 20)[0] as i32;
        assert!((a - b).abs() < 64, "neighbors still differ by {}", (a - b).abs());
    }

    #[test]
    fn dominant_fill_is_solid_at_size() {
        let fill = dominant_fill(Color::rgb(10, 20, 30), 8, 6);
        assert_eq!(fill.dimensions(), (8, 6));
        assert!(fill.pixels().all(|p| p.0 == [10, 20, 30, 255]));
    }

    #[test]
    fn lazy_quality_is_reduced() {
        assert_eq!(lazy_quality().value(), 30);
    }
}
