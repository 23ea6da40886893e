//! Pluggable analysis services: face detection and dominant color.
//!
//! Both are trait seams so deployments can wire in real detectors. The
//! defaults shipped here are deliberately small: [`NoFaceDetector`] finds
//! nothing (face-targeted crops fall back to center), and
//! [`GridColorExtractor`] averages a deterministic sample grid.

use crate::color::Color;
use image::RgbaImage;

/// An axis-aligned region of interest, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Bounding box of a set of regions. `None` when the set is empty.
    pub fn covering(regions: &[Region]) -> Option<Region> {
        let first = regions.first()?;
        let mut x0 = first.x;
        let mut y0 = first.y;
        let mut x1 = first.x + first.width;
        let mut y1 = first.y + first.height;
        for r in &regions[1..] {
            x0 = x0.min(r.x);
            y0 = y0.min(r.y);
            x1 = x1.max(r.x + r.width);
            y1 = y1.max(r.y + r.height);
        }
        Some(Region {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Face detection seam for face-targeted crops.
pub trait FaceDetector: Send + Sync {
    /// `sensitivity` ranges 1..=10; higher means more permissive matching.
    fn detect(&self, image: &RgbaImage, sensitivity: u32) -> Vec<Region>;
}

/// Default detector: finds nothing, so crops fall back to center.
pub struct NoFaceDetector;

impl FaceDetector for NoFaceDetector {
    fn detect(&self, _image: &RgbaImage, _sensitivity: u32) -> Vec<Region> {
        Vec::new()
    }
}

/// Dominant-color seam for placeholder fills.
pub trait ColorExtractor: Send + Sync {
    fn extract(&self, image: &RgbaImage, sample_count: u32) -> Color;
}

/// Default extractor: averages an evenly spaced sample grid, weighting by
/// alpha so transparent padding does not wash the color out.
pub struct GridColorExtractor;

impl ColorExtractor for GridColorExtractor {
    fn extract(&self, image: &RgbaImage, sample_count: u32) -> Color {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Color::WHITE;
        }
        let per_axis = (sample_count.max(1) as f32).sqrt().ceil() as u32;
        let (mut r, mut g, mut b, mut weight) = (0u64, 0u64, 0u64, 0u64);
        for j in 0..per_axis {
            for i in 0..per_axis {
                let x = ((i as u64 * 2 + 1) * w as u64 / (per_axis as u64 * 2)) as u32;
                let y = ((j as u64 * 2 + 1) * h as u64 / (per_axis as u64 * 2)) as u32;
                let px = image.get_pixel(x.min(w - 1), y.min(h - 1));
                let a = px[3] as u64;
                r += px[0] as u64 * a;
                g += px[1] as u64 * a;
                b += px[2] as u64 * a;
                weight += a;
            }
        }
        if weight == 0 {
            return Color::WHITE;
        }
        Color::rgb(
            ((r + weight / 2) / weight) as u8,
            ((g + weight / 2) / weight) as u8,
            ((b + weight / 2) / weight) as u8,
        )
    }
}
