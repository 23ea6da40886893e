//! Target-geometry resolution: pure dimension math, no pixels.
//!
//! Given the source dimensions and the sizing half of a request, compute
//! the final output size plus the crop window needed to honor it. The
//! rules, in order:
//!
//! 1. Aspect ratio: requested width/height when both are given, else the
//!    source's, else the configured default.
//! 2. A missing width or height is derived from the other via that ratio.
//! 3. Max bounds clamp, then min bounds re-raise (min wins a conflict).
//! 4. With upscaling disallowed, a target exceeding the source in either
//!    axis resets both axes to the source size.
//! 5. Fit-mode correction applies only when no crop was requested: `contain`
//!    shrinks the box to keep the whole image visible, `cover` keeps the box
//!    and derives the source crop window that fills it, `distort` changes
//!    nothing.
//! 6. Smart-scale computes a cover-resize of the source to run before an
//!    explicit crop.
//!
//! Every computed dimension has a floor of 1px; hitting the floor logs a
//! correction. All functions are pure and deterministic.

use log::warn;

/// How the image relates to the target box when no crop is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Shrink the box to the source's aspect ratio; the whole image stays
    /// visible.
    Contain,
    /// Keep the box and fill it completely, cropping the overflow.
    Cover,
    /// Resize to the box exactly, ignoring aspect ratio.
    #[default]
    Distort,
}

impl FitMode {
    /// Lenient parse: unknown values log and fall back to `distort`
    /// (`stretch` is accepted as an alias).
    pub fn parse(raw: &str) -> FitMode {
        match raw.trim().to_ascii_lowercase().as_str() {
            "contain" => FitMode::Contain,
            "cover" => FitMode::Cover,
            "" | "distort" | "stretch" => FitMode::Distort,
            other => {
                warn!("unknown fit mode {other:?}; using distort");
                FitMode::Distort
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FitMode::Contain => "contain",
            FitMode::Cover => "cover",
            FitMode::Distort => "distort",
        }
    }
}

/// The sizing half of a request, with per-axis bounds already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometrySpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub fit: FitMode,
    /// An explicit crop was requested.
    pub crop: bool,
    /// Cover-resize the source before cropping.
    pub smart_scale: bool,
    pub allow_scale_larger: bool,
    /// Fallback aspect ratio when neither the request nor the source
    /// provides one (width, height).
    pub default_aspect: (u32, u32),
}

impl Default for GeometrySpec {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            min_width: None,
            min_height: None,
            max_width: None,
            max_height: None,
            fit: FitMode::Distort,
            crop: false,
            smart_scale: false,
            allow_scale_larger: true,
            default_aspect: (4, 3),
        }
    }
}

/// Resolved output geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryResult {
    pub target_w: u32,
    pub target_h: u32,
    /// Crop window dimensions in source space (after any prescale). Equal to
    /// the target when no cropping is involved.
    pub crop_w: u32,
    pub crop_h: u32,
    /// Cover-resize of the source to run before the crop (smart-scale).
    pub prescale: Option<(u32, u32)>,
}

impl GeometryResult {
    /// True when the plan takes pixels from a window instead of resizing the
    /// whole frame.
    pub fn needs_crop(&self) -> bool {
        self.crop_w != self.target_w || self.crop_h != self.target_h || self.prescale.is_some()
    }
}

fn floor_one(value: u32, axis: &str) -> u32 {
    if value == 0 {
        warn!("computed {axis} of 0px corrected to 1px");
        1
    } else {
        value
    }
}

/// Resolve the output geometry for a source of `original` dimensions. A zero
/// component in `original` means the source size is unknown (vector
/// passthrough, solid fill) and the configured default aspect applies.
pub fn resolve(original: (u32, u32), spec: &GeometrySpec) -> GeometryResult {
    let (ow, oh) = original;
    let known = ow > 0 && oh > 0;

    // 1. Aspect ratio: request, source, configured default.
    let aspect = match (spec.width, spec.height) {
        (Some(w), Some(h)) if h > 0 => w as f64 / h as f64,
        _ if known => ow as f64 / oh as f64,
        _ => {
            let (aw, ah) = spec.default_aspect;
            if ah == 0 { 4.0 / 3.0 } else { aw as f64 / ah as f64 }
        }
    };

    // 2. Derive the missing axis.
    let (mut tw, mut th) = match (spec.width, spec.height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, (w as f64 / aspect).round() as u32),
        (None, Some(h)) => ((h as f64 * aspect).round() as u32, h),
        (None, None) => (ow, oh),
    };
    tw = floor_one(tw, "width");
    th = floor_one(th, "height");

    // 3. Max clamps, then min re-raises: a min that still exceeds the maxed
    //    value wins.
    if let Some(max_w) = spec.max_width {
        tw = tw.min(max_w.max(1));
    }
    if let Some(max_h) = spec.max_height {
        th = th.min(max_h.max(1));
    }
    if let Some(min_w) = spec.min_width {
        tw = tw.max(min_w);
    }
    if let Some(min_h) = spec.min_height {
        th = th.max(min_h);
    }

    // 4. No upscaling: exceeding the source in either axis resets both.
    if !spec.allow_scale_larger && known && (tw > ow || th > oh) {
        tw = ow;
        th = oh;
    }

    let mut crop_w = tw;
    let mut crop_h = th;
    let mut prescale = None;

    if spec.crop {
        if spec.smart_scale && known {
            let scale = f64::max(tw as f64 / ow as f64, th as f64 / oh as f64);
            let pw = ((ow as f64 * scale).round() as u32).max(tw);
            let ph = ((oh as f64 * scale).round() as u32).max(th);
            prescale = Some((floor_one(pw, "prescale width"), floor_one(ph, "prescale height")));
        }
    } else {
        // 5. Fit-mode correction.
        match spec.fit {
            FitMode::Contain if known => {
                let scale = f64::min(tw as f64 / ow as f64, th as f64 / oh as f64);
                tw = floor_one((ow as f64 * scale).round() as u32, "width");
                th = floor_one((oh as f64 * scale).round() as u32, "height");
                crop_w = tw;
                crop_h = th;
            }
            FitMode::Cover if known => {
                let box_ar = tw as f64 / th as f64;
                if ow as f64 / oh as f64 > box_ar {
                    crop_h = oh;
                    crop_w = floor_one((oh as f64 * box_ar).round() as u32, "crop width").min(ow);
                } else {
                    crop_w = ow;
                    crop_h = floor_one((ow as f64 / box_ar).round() as u32, "crop height").min(oh);
                }
            }
            _ => {}
        }
    }

    GeometryResult {
        target_w: tw,
        target_h: th,
        crop_w,
        crop_h,
        prescale,
    }
}
