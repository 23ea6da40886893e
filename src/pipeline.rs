//! The transformation pipeline: a fixed-order plan of steps over one buffer.
//!
//! [`build_steps`] turns a normalized request plus resolved geometry into a
//! `Vec<Step>`; [`run`] executes them in order. The order never varies:
//!
//! 1. prescale (smart-scale cover pass)
//! 2. crop, or whole-frame resize
//! 3. flip
//! 4. filter chain
//! 5. text overlay
//! 6. watermark
//! 7. image mask
//! 8. rounded corners (with the border baked in when both are requested)
//! 9. plain border
//! 10. reflection
//! 11. rotation
//!
//! Steps carry their resources pre-loaded (watermark buffer, mask channel),
//! so execution touches no storage. Rounded corners and borders interact:
//! when both are requested the border is clipped by the corner mask inside
//! the corners step and no standalone border step is planned.

use crate::filters::Filter;
use crate::geometry::GeometryResult;
use crate::mask;
use crate::overlay;
use crate::params::{
    BorderSpec, CornersSpec, FlipAxis, Position, ReflectionSpec, RotationSpec, TextSpec,
};
use crate::request::ImageRequest;
use crate::services::{FaceDetector, Region};
use ab_glyph::FontVec;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("crop window {want_w}x{want_h} exceeds image bounds {have_w}x{have_h}")]
    Geometry {
        want_w: u32,
        want_h: u32,
        have_w: u32,
        have_h: u32,
    },
    #[error("step {step} failed: {reason}")]
    Step { step: &'static str, reason: String },
}

/// One planned operation. Resources are owned by the step.
#[derive(Debug, Clone)]
pub enum Step {
    /// Cover-resize before a smart-scale crop.
    Prescale { width: u32, height: u32 },
    /// Take a window out of the current buffer.
    Crop {
        window: (u32, u32),
        position: Position,
        offset: (u32, u32),
        sensitivity: u32,
    },
    /// Scale the whole frame to the target box.
    Resize { width: u32, height: u32 },
    Flip(FlipAxis),
    Filters(Vec<Filter>),
    Text(TextSpec),
    Watermark {
        image: RgbaImage,
        position: Position,
        offset: (u32, u32),
        opacity: u32,
    },
    /// Multiply a grayscale channel into the alpha channel.
    MaskImage(GrayImage),
    RoundedCorners {
        corners: CornersSpec,
        border: Option<BorderSpec>,
    },
    Border(BorderSpec),
    Reflection(ReflectionSpec),
    Rotate(RotationSpec),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Prescale { .. } => "prescale",
            Step::Crop { .. } => "crop",
            Step::Resize { .. } => "resize",
            Step::Flip(_) => "flip",
            Step::Filters(_) => "filters",
            Step::Text(_) => "text",
            Step::Watermark { .. } => "watermark",
            Step::MaskImage(_) => "mask",
            Step::RoundedCorners { .. } => "rounded_corners",
            Step::Border(_) => "border",
            Step::Reflection(_) => "reflection",
            Step::Rotate(_) => "rotate",
        }
    }
}

/// What execution produced: the buffer plus counters for logging and output
/// variables.
pub struct Outcome {
    pub image: RgbaImage,
    /// Individual operations executed (filters count one each).
    pub steps_run: u32,
    /// Whether any step introduced or reshaped transparency.
    pub masked: bool,
}

/// Plan the step list for a request. `original` is the decoded source size;
/// `watermark` and `mask_image` arrive pre-loaded (absent when their source
/// could not be read, which skips the step).
pub fn build_steps(
    request: &ImageRequest,
    geometry: &GeometryResult,
    original: (u32, u32),
    watermark: Option<RgbaImage>,
    mask_image: Option<GrayImage>,
) -> Vec<Step> {
    let mut steps = Vec::new();

    if let Some((width, height)) = geometry.prescale {
        steps.push(Step::Prescale { width, height });
    }

    let window = (geometry.crop_w, geometry.crop_h);
    let target = (geometry.target_w, geometry.target_h);
    let cropping = request.crop.is_some() || window != target;
    if cropping {
        let (position, offset, sensitivity) = match &request.crop {
            Some(c) => (c.position, c.offset, c.sensitivity),
            // Cover-fit crops have no crop parameter; they center.
            None => (Position::CENTER, (0, 0), 5),
        };
        steps.push(Step::Crop {
            window,
            position,
            offset,
            sensitivity,
        });
        if window != target {
            steps.push(Step::Resize {
                width: target.0,
                height: target.1,
            });
        }
    } else if target != original {
        steps.push(Step::Resize {
            width: target.0,
            height: target.1,
        });
    }

    if let Some(axis) = request.flip {
        steps.push(Step::Flip(axis));
    }
    if !request.filters.is_empty() {
        steps.push(Step::Filters(request.filters.clone()));
    }
    if let Some(text) = &request.text {
        steps.push(Step::Text(text.clone()));
    }
    if let (Some(spec), Some(image)) = (&request.watermark, watermark) {
        steps.push(Step::Watermark {
            image,
            position: spec.position,
            offset: spec.offset,
            opacity: spec.opacity,
        });
    }
    if let Some(mask_image) = mask_image {
        steps.push(Step::MaskImage(mask_image));
    }
    match &request.corners {
        Some(corners) if corners.any() => {
            steps.push(Step::RoundedCorners {
                corners: *corners,
                border: request.border,
            });
        }
        _ => {
            if let Some(border) = request.border {
                steps.push(Step::Border(border));
            }
        }
    }
    if let Some(reflection) = request.reflection {
        steps.push(Step::Reflection(reflection));
    }
    if let Some(rotate) = request.rotate {
        steps.push(Step::Rotate(rotate));
    }

    steps
}

/// Execute a plan over a buffer.
pub fn run(
    mut image: RgbaImage,
    steps: &[Step],
    faces: &dyn FaceDetector,
    font: Option<&FontVec>,
) -> Result<Outcome, PipelineError> {
    let mut steps_run = 0u32;
    let mut masked = false;

    for step in steps {
        match step {
            Step::Prescale { width, height } | Step::Resize { width, height } => {
                image = imageops::resize(&image, *width, *height, FilterType::Lanczos3);
                steps_run += 1;
            }
            Step::Crop {
                window,
                position,
                offset,
                sensitivity,
            } => {
                image = crop(image, *window, position, *offset, *sensitivity, faces)?;
                steps_run += 1;
            }
            Step::Flip(axis) => {
                image = match axis {
                    FlipAxis::Horizontal => imageops::flip_horizontal(&image),
                    FlipAxis::Vertical => imageops::flip_vertical(&image),
                    FlipAxis::Both => imageops::flip_vertical(&imageops::flip_horizontal(&image)),
                };
                steps_run += 1;
            }
            Step::Filters(chain) => {
                for filter in chain {
                    image = filter.apply(image);
                    steps_run += 1;
                }
            }
            Step::Text(spec) => {
                overlay::draw_text(&mut image, spec, font);
                steps_run += 1;
            }
            Step::Watermark {
                image: mark,
                position,
                offset,
                opacity,
            } => {
                overlay::apply_watermark(&mut image, mark, position, *offset, *opacity);
                steps_run += 1;
            }
            Step::MaskImage(channel) => {
                let fitted = mask::fit_to(channel.clone(), image.width(), image.height());
                mask::apply(&mut image, &fitted);
                masked = true;
                steps_run += 1;
            }
            Step::RoundedCorners { corners, border } => {
                let channel = mask::rounded(image.width(), image.height(), corners);
                mask::apply(&mut image, &channel);
                if let Some(border) = border {
                    overlay::draw_border_masked(&mut image, border, &channel);
                }
                masked = true;
                steps_run += 1;
            }
            Step::Border(spec) => {
                overlay::draw_border(&mut image, spec);
                steps_run += 1;
            }
            Step::Reflection(spec) => {
                image = overlay::add_reflection(&image, spec);
                masked = true;
                steps_run += 1;
            }
            Step::Rotate(spec) => {
                image = rotate(image, spec);
                // Quarter turns expose no fill.
                masked |= spec.quarter_turns().is_none() && spec.fill.a < 255;
                steps_run += 1;
            }
        }
    }

    Ok(Outcome {
        image,
        steps_run,
        masked,
    })
}

/// Place and take the crop window. Face-targeted positions center the window
/// on the covering box of detected regions, clamped to the frame; everything
/// else anchors like an overlay.
fn crop(
    image: RgbaImage,
    window: (u32, u32),
    position: &Position,
    offset: (u32, u32),
    sensitivity: u32,
    faces: &dyn FaceDetector,
) -> Result<RgbaImage, PipelineError> {
    let (w, h) = image.dimensions();
    let (cw, ch) = window;
    if cw > w || ch > h {
        return Err(PipelineError::Geometry {
            want_w: cw,
            want_h: ch,
            have_w: w,
            have_h: h,
        });
    }
    if (cw, ch) == (w, h) {
        return Ok(image);
    }

    let focal = if position.wants_faces() {
        Region::covering(&faces.detect(&image, sensitivity)).map(|r| r.center())
    } else {
        None
    };

    let (x, y) = match focal {
        Some((fx, fy)) => (
            fx.saturating_sub(cw / 2).min(w - cw),
            fy.saturating_sub(ch / 2).min(h - ch),
        ),
        None => {
            let (x, y) = overlay::place(position, offset, window, (w, h));
            (
                (x.max(0) as u32).min(w - cw),
                (y.max(0) as u32).min(h - ch),
            )
        }
    };

    Ok(imageops::crop_imm(&image, x, y, cw, ch).to_image())
}

/// Rotate the buffer. Right-angle multiples are lossless; anything else
/// grows the canvas to the rotated bounding box first so no content clips,
/// with the fill color showing through the exposed corners.
fn rotate(image: RgbaImage, spec: &RotationSpec) -> RgbaImage {
    if let Some(turns) = spec.quarter_turns() {
        return match turns {
            1 => imageops::rotate90(&image),
            2 => imageops::rotate180(&image),
            3 => imageops::rotate270(&image),
            _ => image,
        };
    }

    let theta = spec.angle.to_radians();
    let (w, h) = image.dimensions();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let new_w = ((w as f32 * cos + h as f32 * sin).ceil() as u32).max(1);
    let new_h = ((w as f32 * sin + h as f32 * cos).ceil() as u32).max(1);

    let fill = spec.fill.to_rgba();
    let mut canvas = RgbaImage::from_pixel(new_w, new_h, fill);
    imageops::overlay(
        &mut canvas,
        &image,
        ((new_w - w) / 2) as i64,
        ((new_h - h) / 2) as i64,
    );
    rotate_about_center(&canvas, theta, Interpolation::Bilinear, fill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::geometry;
    use crate::request::RequestOptions;
    use crate::services::tests::FixedFaceDetector;
    use crate::services::NoFaceDetector;
    use image::{Luma, Rgba};

    fn request(f: impl FnOnce(&mut RequestOptions)) -> ImageRequest {
        let mut opts = RequestOptions::default();
        opts.src = Some("x.jpg".into());
        f(&mut opts);
        opts.normalize(&EngineConfig::default())
    }

    fn plan(req: &ImageRequest, original: (u32, u32)) -> Vec<Step> {
        let g = geometry::resolve(original, &req.geometry_spec());
        build_steps(req, &g, original, None, None)
    }

    fn run_plain(image: RgbaImage, steps: &[Step]) -> Outcome {
        run(image, steps, &NoFaceDetector, None).unwrap()
    }

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
        })
    }

    // =========================================================================
    // Planning
    // =========================================================================

    #[test]
    fn steps_follow_the_fixed_order() {
        let req = request(|o| {
            o.width = Some("100".into());
            o.flip = Some("h".into());
            o.filters = Some("grayscale".into());
            o.text = Some("hi".into());
            o.border = Some("2|#000".into());
            o.reflection = Some("10".into());
            o.rotate = Some("90".into());
        });
        let names: Vec<&str> = plan(&req, (800, 600)).iter().map(Step::name).collect();
        assert_eq!(
            names,
            vec!["resize", "flip", "filters", "text", "border", "reflection", "rotate"]
        );
    }

    #[test]
    fn corners_swallow_the_border_step() {
        let req = request(|o| {
            o.border = Some("2|#000".into());
            o.rounded_corners = Some("8".into());
        });
        let steps = plan(&req, (100, 100));
        assert_eq!(steps.len(), 1);
        assert!(matches!(
            &steps[0],
            Step::RoundedCorners { border: Some(_), .. }
        ));
    }

    #[test]
    fn same_size_render_plans_no_steps() {
        let req = request(|_| ());
        assert!(plan(&req, (640, 480)).is_empty());
    }

    #[test]
    fn smart_scale_plans_prescale_then_crop() {
        let req = request(|o| {
            o.width = Some("300".into());
            o.height = Some("300".into());
            o.crop = Some("yes|center|0|yes".into());
        });
        let names: Vec<&str> = plan(&req, (800, 600)).iter().map(Step::name).collect();
        assert_eq!(names, vec!["prescale", "crop"]);
    }

    #[test]
    fn cover_fit_plans_crop_then_resize() {
        let req = request(|o| {
            o.width = Some("400".into());
            o.height = Some("400".into());
            o.fit = Some("cover".into());
        });
        let names: Vec<&str> = plan(&req, (800, 600)).iter().map(Step::name).collect();
        assert_eq!(names, vec!["crop", "resize"]);
    }

    // =========================================================================
    // Execution
    // =========================================================================

    #[test]
    fn resize_hits_exact_target_dimensions() {
        let out = run_plain(
            gradient(80, 60),
            &[Step::Resize {
                width: 40,
                height: 20,
            }],
        );
        assert_eq!(out.image.dimensions(), (40, 20));
        assert_eq!(out.steps_run, 1);
        assert!(!out.masked);
    }

    #[test]
    fn crop_anchors_top_left_with_offset() {
        let img = gradient(100, 100);
        let steps = [Step::Crop {
            window: (10, 10),
            position: Position::parse("left,top"),
            offset: (20, 30),
            sensitivity: 5,
        }];
        let out = run_plain(img, &steps);
        assert_eq!(out.image.dimensions(), (10, 10));
        // Gradient encodes coordinates: pixel (0,0) came from (20,30).
        assert_eq!(out.image.get_pixel(0, 0).0[..2], [20, 30]);
    }

    #[test]
    fn oversized_crop_window_is_a_geometry_error() {
        let err = run(
            gradient(50, 50),
            &[Step::Crop {
                window: (60, 40),
                position: Position::CENTER,
                offset: (0, 0),
                sensitivity: 5,
            }],
            &NoFaceDetector,
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(err, PipelineError::Geometry { want_w: 60, .. }));
    }

    #[test]
    fn face_targeted_crop_centers_on_detections() {
        let detector = FixedFaceDetector(vec![Region {
            x: 70,
            y: 10,
            width: 20,
            height: 20,
        }]);
        let steps = [Step::Crop {
            window: (30, 30),
            position: Position::parse("face_detect"),
            offset: (0, 0),
            sensitivity: 5,
        }];
        let out = run(gradient(100, 100), &steps, &detector, None).unwrap();
        // Face center (80, 20), window 30x30: x = 80-15 = 65, y clamps to 5.
        assert_eq!(out.image.get_pixel(0, 0).0[..2], [65, 5]);
    }

    #[test]
    fn face_crop_without_detections_falls_back_to_center() {
        let steps = [Step::Crop {
            window: (20, 20),
            position: Position::parse("face_detect"),
            offset: (0, 0),
            sensitivity: 5,
        }];
        let out = run(gradient(100, 100), &steps, &NoFaceDetector, None).unwrap();
        assert_eq!(out.image.get_pixel(0, 0).0[..2], [40, 40]);
    }

    #[test]
    fn flip_both_mirrors_both_axes() {
        let mut img = gradient(4, 4);
        img.put_pixel(0, 0, Rgba([200, 200, 200, 255]));
        let out = run_plain(img, &[Step::Flip(FlipAxis::Both)]);
        assert_eq!(out.image.get_pixel(3, 3).0, [200, 200, 200, 255]);
    }

    #[test]
    fn filters_count_individually() {
        let steps = [Step::Filters(vec![
            Filter::Grayscale,
            Filter::Invert,
            Filter::Brightness { level: 10 },
        ])];
        let out = run_plain(gradient(8, 8), &steps);
        assert_eq!(out.steps_run, 3);
    }

    #[test]
    fn quarter_rotation_swaps_dimensions_losslessly() {
        let spec = RotationSpec::parse("90").unwrap();
        let out = run_plain(gradient(40, 20), &[Step::Rotate(spec)]);
        assert_eq!(out.image.dimensions(), (20, 40));
        // Opaque content, no fill exposed: not masked.
        assert!(!out.masked);
    }

    #[test]
    fn arbitrary_rotation_grows_the_canvas() {
        let spec = RotationSpec::parse("45").unwrap();
        let out = run_plain(gradient(100, 100), &[Step::Rotate(spec)]);
        let (w, h) = out.image.dimensions();
        // 100 * (sin 45 + cos 45) ≈ 141.4, ceiled.
        assert!(w >= 141 && w <= 143, "rotated width {w}");
        assert!(h >= 141 && h <= 143, "rotated height {h}");
        // Transparent fill shows in the exposed corners.
        assert_eq!(out.image.get_pixel(0, 0)[3], 0);
        assert!(out.masked);
    }

    #[test]
    fn mask_and_corner_steps_report_masked() {
        let corners = CornersSpec::parse("6").unwrap();
        let out = run_plain(
            gradient(30, 30),
            &[Step::RoundedCorners {
                corners,
                border: None,
            }],
        );
        assert!(out.masked);
        assert_eq!(out.image.get_pixel(0, 0)[3], 0);
        assert_eq!(out.image.get_pixel(15, 15)[3], 255);
    }

    #[test]
    fn mask_image_step_fits_the_channel_to_the_buffer() {
        // A 2x2 channel against a 10x10 buffer: left half keeps, right cuts.
        let mut channel = GrayImage::from_pixel(2, 2, Luma([255]));
        channel.put_pixel(1, 0, Luma([0]));
        channel.put_pixel(1, 1, Luma([0]));
        let out = run_plain(gradient(10, 10), &[Step::MaskImage(channel)]);
        assert!(out.masked);
        assert_eq!(out.image.dimensions(), (10, 10));
        assert_eq!(out.image.get_pixel(0, 5)[3], 255);
        assert_eq!(out.image.get_pixel(9, 5)[3], 0);
    }

    #[test]
    fn reflection_step_extends_and_masks() {
        let req_spec = ReflectionSpec::parse("10|60|3").unwrap();
        let out = run_plain(gradient(20, 20), &[Step::Reflection(req_spec)]);
        assert_eq!(out.image.dimensions(), (20, 33));
        assert!(out.masked);
    }

    #[test]
    fn end_to_end_smart_scale_crop_hits_target() {
        let req = request(|o| {
            o.width = Some("300".into());
            o.height = Some("300".into());
            o.crop = Some("yes|center|0|yes".into());
        });
        let g = geometry::resolve((800, 600), &req.geometry_spec());
        let steps = build_steps(&req, &g, (800, 600), None, None);
        let out = run(gradient(800, 600), &steps, &NoFaceDetector, None).unwrap();
        assert_eq!(out.image.dimensions(), (300, 300));
    }
}
