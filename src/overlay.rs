//! Overlay drawing: text, watermarks, borders, and reflections.
//!
//! Everything here draws into an already-sized buffer; resource loading
//! (font bytes, watermark decode) happens upstream so these stay pure pixel
//! work. Text and watermarks share one anchor model: [`place`] turns a
//! [`Position`] plus an edge offset into top-left coordinates.

use crate::mask;
use crate::params::{
    BorderSpec, HorizontalAnchor, Position, ReflectionSpec, TextSpec, VerticalAnchor,
};
use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use log::warn;

/// Top-left coordinates for an item anchored inside a canvas.
///
/// Offsets measure inward from the anchored edge; centered axes ignore
/// them. Face anchors behave as center here, since faces only steer crops.
pub fn place(
    position: &Position,
    offset: (u32, u32),
    item: (u32, u32),
    canvas: (u32, u32),
) -> (i64, i64) {
    let x = match position.h {
        HorizontalAnchor::Left => offset.0 as i64,
        HorizontalAnchor::Right => canvas.0 as i64 - item.0 as i64 - offset.0 as i64,
        HorizontalAnchor::Center | HorizontalAnchor::FaceDetect => {
            (canvas.0 as i64 - item.0 as i64) / 2
        }
    };
    let y = match position.v {
        VerticalAnchor::Top => offset.1 as i64,
        VerticalAnchor::Bottom => canvas.1 as i64 - item.1 as i64 - offset.1 as i64,
        VerticalAnchor::Center | VerticalAnchor::FaceDetect => {
            (canvas.1 as i64 - item.1 as i64) / 2
        }
    };
    (x, y)
}

/// Draw a text overlay. Without a loaded font the step is a logged no-op.
pub fn draw_text(image: &mut RgbaImage, spec: &TextSpec, font: Option<&FontVec>) {
    let Some(font) = font else {
        warn!("text overlay requested but no font is configured; skipping");
        return;
    };
    let scale = PxScale::from(spec.size as f32);
    let (tw, th) = text_size(scale, font, &spec.content);
    let (x, y) = place(&spec.position, spec.offset, (tw, th), image.dimensions());
    draw_text_mut(
        image,
        spec.color.to_rgba(),
        x as i32,
        y as i32,
        scale,
        font,
        &spec.content,
    );
}

/// Composite a watermark image at an anchored position with optional
/// opacity. Marks larger than the canvas are shrunk to fit first.
pub fn apply_watermark(image: &mut RgbaImage, mark: &RgbaImage, position: &Position, offset: (u32, u32), opacity: u32) {
    let (cw, ch) = image.dimensions();
    if cw == 0 || ch == 0 {
        return;
    }
    let mut mark = if mark.width() > cw || mark.height() > ch {
        let scale = (cw as f32 / mark.width() as f32).min(ch as f32 / mark.height() as f32);
        let w = ((mark.width() as f32 * scale) as u32).max(1);
        let h = ((mark.height() as f32 * scale) as u32).max(1);
        imageops::resize(mark, w, h, FilterType::Triangle)
    } else {
        mark.clone()
    };
    if opacity < 100 {
        for px in mark.pixels_mut() {
            px[3] = ((px[3] as u32 * opacity + 50) / 100) as u8;
        }
    }
    let (x, y) = place(position, offset, mark.dimensions(), (cw, ch));
    imageops::overlay(image, &mark, x, y);
}

/// Paint a solid frame of `spec.size` pixels inside the image edges.
pub fn draw_border(image: &mut RgbaImage, spec: &BorderSpec) {
    let (w, h) = image.dimensions();
    let size = spec.size.min(w).min(h);
    if size == 0 || w == 0 || h == 0 {
        return;
    }
    let color = spec.color.to_rgba();
    draw_filled_rect_mut(image, Rect::at(0, 0).of_size(w, size), color);
    draw_filled_rect_mut(
        image,
        Rect::at(0, (h - size) as i32).of_size(w, size),
        color,
    );
    draw_filled_rect_mut(image, Rect::at(0, 0).of_size(size, h), color);
    draw_filled_rect_mut(
        image,
        Rect::at((w - size) as i32, 0).of_size(size, h),
        color,
    );
}

/// Border that follows rounded corners: the frame is painted on its own
/// layer, clipped by the same corner mask, then composited.
pub fn draw_border_masked(image: &mut RgbaImage, spec: &BorderSpec, corner_mask: &GrayImage) {
    let mut layer = RgbaImage::from_pixel(image.width(), image.height(), Rgba([0, 0, 0, 0]));
    draw_border(&mut layer, spec);
    mask::apply(&mut layer, corner_mask);
    imageops::overlay(image, &layer, 0, 0);
}

/// Append a mirrored, fading reflection under the image.
///
/// The returned canvas is `gap + reflection_height` taller; gap rows and
/// the fade itself stay transparent, so lossy output formats show the
/// request background through them. Reflection height and gap each cap at
/// the image height.
pub fn add_reflection(image: &RgbaImage, spec: &ReflectionSpec) -> RgbaImage {
    let (w, h) = image.dimensions();
    let rh = spec.height.resolve(h).min(h);
    if w == 0 || h == 0 || rh == 0 {
        return image.clone();
    }
    let gap = spec.gap.min(h);
    let start = spec.start_opacity.min(100);

    let mut canvas = RgbaImage::from_pixel(w, h + gap + rh, Rgba([0, 0, 0, 0]));
    imageops::overlay(&mut canvas, image, 0, 0);

    for row in 0..rh {
        let src_y = h - 1 - row;
        // Linear fade from start_opacity down to zero.
        let fade = start * (rh - row) / rh;
        for x in 0..w {
            let mut px = *image.get_pixel(x, src_y);
            px[3] = ((px[3] as u32 * fade + 50) / 100) as u8;
            canvas.put_pixel(x, h + gap + row, px);
        }
    }
    canvas
}
