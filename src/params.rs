//! Compact option-string parsing for crop and overlay specs.
//!
//! Structured request options travel as single strings with `|`-separated
//! fields, the way they arrive from a template tag or a CLI flag:
//!
//! - crop: `"yes|center,top|0,20|yes|5"` (enabled, position, offset,
//!   smart-scale, face-detect sensitivity)
//! - border: `"4|#336699"` (size, color)
//! - rounded corners: `"12"` or `"12|yes,yes,no,no"` (radius, per-corner
//!   flags in tl,tr,bl,br order; all corners when omitted)
//! - reflection: `"40%|60|4"` (height in px or % of image, start opacity, gap)
//! - watermark: `"logo.png|right,bottom|8|60"` (path, position, offset, opacity)
//! - text: `"© studio|left,bottom|10|14|#fff"` (content, position, offset,
//!   size, color)
//! - rotation: `"90"` or `"12.5|#000"` (angle in degrees, fill color)
//!
//! Parsing never fails. A malformed field falls back to its documented
//! default and logs a warning; only a spec that is disabled or empty parses
//! to `None`. Every spec type implements [`std::fmt::Display`] in a stable
//! canonical form; that form is what the cache identity hashes, so two
//! spellings of the same spec always cache to the same file.

use crate::color::Color;
use log::warn;
use std::fmt;

/// Parse a dimension-like value: a non-negative integer, optionally suffixed
/// with `px`. Junk and negative values become 0.
pub fn parse_dimension(raw: &str) -> u32 {
    let trimmed = raw.trim().trim_end_matches("px").trim();
    match trimmed.parse::<i64>() {
        Ok(v) if v > 0 => v.min(u32::MAX as i64) as u32,
        _ => 0,
    }
}

/// Truthy strings: `yes`, `true`, `1`, `on` (case-insensitive). Everything
/// else, including junk, is false.
pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "yes" | "true" | "1" | "on"
    )
}

/// Parse a color field, falling back to `default` (logged) on junk.
fn parse_color_or(raw: &str, default: Color, context: &str) -> Color {
    match Color::parse(raw) {
        Ok(c) => c,
        Err(err) => {
            warn!("{context}: {err}; using default");
            default
        }
    }
}

// =============================================================================
// Anchored positions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalAnchor {
    Left,
    Center,
    Right,
    /// Center on detected faces; falls back to plain center when the
    /// detector returns nothing.
    FaceDetect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAnchor {
    Top,
    Center,
    Bottom,
    FaceDetect,
}

/// A 2-axis anchor, written `"horizontal,vertical"` (e.g. `"left,top"`).
///
/// A single token anchors the axis it names and centers the other;
/// `"face_detect"` alone applies to both axes. Unknown tokens center the
/// axis and log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub h: HorizontalAnchor,
    pub v: VerticalAnchor,
}

impl Position {
    pub const CENTER: Position = Position {
        h: HorizontalAnchor::Center,
        v: VerticalAnchor::Center,
    };

    pub fn parse(raw: &str) -> Position {
        let mut parts = raw.split(',').map(str::trim);
        let first = parts.next().unwrap_or("");
        let second = parts.next();

        match second {
            Some(second) => Position {
                h: Self::horizontal(first),
                v: Self::vertical(second),
            },
            // Single token: let it claim whichever axis it names.
            None => match first.to_ascii_lowercase().as_str() {
                "" | "center" | "middle" => Position::CENTER,
                "left" => Position { h: HorizontalAnchor::Left, ..Position::CENTER },
                "right" => Position { h: HorizontalAnchor::Right, ..Position::CENTER },
                "top" => Position { v: VerticalAnchor::Top, ..Position::CENTER },
                "bottom" => Position { v: VerticalAnchor::Bottom, ..Position::CENTER },
                "face_detect" | "face" => Position {
                    h: HorizontalAnchor::FaceDetect,
                    v: VerticalAnchor::FaceDetect,
                },
                other => {
                    warn!("unknown position {other:?}; using center");
                    Position::CENTER
                }
            },
        }
    }

    fn horizontal(token: &str) -> HorizontalAnchor {
        match token.to_ascii_lowercase().as_str() {
            "left" => HorizontalAnchor::Left,
            "" | "center" | "middle" => HorizontalAnchor::Center,
            "right" => HorizontalAnchor::Right,
            "face_detect" | "face" => HorizontalAnchor::FaceDetect,
            other => {
                warn!("unknown horizontal anchor {other:?}; using center");
                HorizontalAnchor::Center
            }
        }
    }

    fn vertical(token: &str) -> VerticalAnchor {
        match token.to_ascii_lowercase().as_str() {
            "top" => VerticalAnchor::Top,
            "" | "center" | "middle" => VerticalAnchor::Center,
            "bottom" => VerticalAnchor::Bottom,
            "face_detect" | "face" => VerticalAnchor::FaceDetect,
            other => {
                warn!("unknown vertical anchor {other:?}; using center");
                VerticalAnchor::Center
            }
        }
    }

    pub fn wants_faces(&self) -> bool {
        self.h == HorizontalAnchor::FaceDetect || self.v == VerticalAnchor::FaceDetect
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = match self.h {
            HorizontalAnchor::Left => "left",
            HorizontalAnchor::Center => "center",
            HorizontalAnchor::Right => "right",
            HorizontalAnchor::FaceDetect => "face_detect",
        };
        let v = match self.v {
            VerticalAnchor::Top => "top",
            VerticalAnchor::Center => "center",
            VerticalAnchor::Bottom => "bottom",
            VerticalAnchor::FaceDetect => "face_detect",
        };
        write!(f, "{h},{v}")
    }
}

/// Parse an `"x,y"` offset pair. A single value applies to both axes; each
/// value follows the dimension rule (junk → 0).
pub fn parse_offset(raw: &str) -> (u32, u32) {
    let mut parts = raw.split(',');
    let x = parse_dimension(parts.next().unwrap_or(""));
    match parts.next() {
        Some(y) => (x, parse_dimension(y)),
        None => (x, x),
    }
}

// =============================================================================
// Crop
// =============================================================================

/// A parsed crop request: `enabled|position|offset|smart_scale|sensitivity`.
#[derive(Debug, Clone, PartialEq)]
pub struct CropSpec {
    pub position: Position,
    /// Extra shift applied after anchoring, in output pixels.
    pub offset: (u32, u32),
    /// Resize the source to cover the target box before cropping.
    pub smart_scale: bool,
    /// Face-detection sensitivity, ≥ 1.
    pub sensitivity: u32,
}

impl CropSpec {
    /// Parse a crop spec. Returns `None` when the string is empty or the
    /// leading enabled flag is falsy.
    pub fn parse(raw: &str) -> Option<CropSpec> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let fields: Vec<&str> = raw.split('|').collect();
        if !parse_bool(fields[0]) {
            return None;
        }
        let position = fields.get(1).map(|s| Position::parse(s)).unwrap_or(Position::CENTER);
        let offset = fields.get(2).map(|s| parse_offset(s)).unwrap_or((0, 0));
        let smart_scale = fields.get(3).map(|s| parse_bool(s)).unwrap_or(false);
        let sensitivity = match fields.get(4) {
            Some(s) => match s.trim().parse::<u32>() {
                Ok(v) => v.max(1),
                Err(_) => 5,
            },
            None => 5,
        };
        Some(CropSpec {
            position,
            offset,
            smart_scale,
            sensitivity,
        })
    }
}

impl fmt::Display for CropSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{},{}|{}|{}",
            self.position, self.offset.0, self.offset.1, self.smart_scale as u8, self.sensitivity
        )
    }
}

// =============================================================================
// Border and rounded corners
// =============================================================================

/// A solid border: `size|color`. Size 0 disables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderSpec {
    pub size: u32,
    pub color: Color,
}

impl BorderSpec {
    pub fn parse(raw: &str) -> Option<BorderSpec> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let mut fields = raw.split('|');
        let size = parse_dimension(fields.next().unwrap_or(""));
        if size == 0 {
            return None;
        }
        let color = match fields.next() {
            Some(c) => parse_color_or(c, Color::BLACK, "border color"),
            None => Color::BLACK,
        };
        Some(BorderSpec { size, color })
    }
}

impl fmt::Display for BorderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.size, self.color)
    }
}

/// Rounded corners: `radius` alone rounds all four, `radius|tl,tr,bl,br`
/// selects corners with truthy flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CornersSpec {
    pub radius: u32,
    pub top_left: bool,
    pub top_right: bool,
    pub bottom_left: bool,
    pub bottom_right: bool,
}

impl CornersSpec {
    pub fn parse(raw: &str) -> Option<CornersSpec> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let mut fields = raw.split('|');
        let radius = parse_dimension(fields.next().unwrap_or(""));
        if radius == 0 {
            return None;
        }
        let (tl, tr, bl, br) = match fields.next() {
            Some(flags) => {
                let flags: Vec<bool> = flags.split(',').map(parse_bool).collect();
                if flags.len() != 4 {
                    warn!("rounded corners expect 4 flags (tl,tr,bl,br), got {}", flags.len());
                }
                let get = |i: usize| flags.get(i).copied().unwrap_or(false);
                (get(0), get(1), get(2), get(3))
            }
            None => (true, true, true, true),
        };
        Some(CornersSpec {
            radius,
            top_left: tl,
            top_right: tr,
            bottom_left: bl,
            bottom_right: br,
        })
    }

    pub fn any(&self) -> bool {
        self.top_left || self.top_right || self.bottom_left || self.bottom_right
    }
}

impl fmt::Display for CornersSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{},{},{},{}",
            self.radius,
            self.top_left as u8,
            self.top_right as u8,
            self.bottom_left as u8,
            self.bottom_right as u8
        )
    }
}

// =============================================================================
// Reflection
// =============================================================================

/// Reflection height, absolute or relative to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionHeight {
    Px(u32),
    /// Percent of the image height, 1–100.
    Percent(u32),
}

impl ReflectionHeight {
    pub fn resolve(&self, image_height: u32) -> u32 {
        match *self {
            ReflectionHeight::Px(px) => px.min(image_height),
            ReflectionHeight::Percent(pct) => (image_height * pct) / 100,
        }
    }
}

impl fmt::Display for ReflectionHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ReflectionHeight::Px(px) => write!(f, "{px}px"),
            ReflectionHeight::Percent(pct) => write!(f, "{pct}%"),
        }
    }
}

/// A mirror-below-the-image effect: `height|start_opacity|gap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflectionSpec {
    pub height: ReflectionHeight,
    /// Opacity of the reflection's first row, 0–100. Fades to 0 at the bottom.
    pub start_opacity: u32,
    /// Transparent rows between the image and its reflection.
    pub gap: u32,
}

impl ReflectionSpec {
    pub fn parse(raw: &str) -> Option<ReflectionSpec> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let mut fields = raw.split('|');
        let height_raw = fields.next().unwrap_or("").trim();
        let height = if let Some(pct) = height_raw.strip_suffix('%') {
            let pct = parse_dimension(pct).clamp(1, 100);
            ReflectionHeight::Percent(pct)
        } else {
            let px = parse_dimension(height_raw);
            if px == 0 {
                return None;
            }
            ReflectionHeight::Px(px)
        };
        let start_opacity = fields
            .next()
            .map(|s| parse_dimension(s).min(100))
            .unwrap_or(50);
        let gap = fields.next().map(parse_dimension).unwrap_or(0);
        Some(ReflectionSpec {
            height,
            start_opacity,
            gap,
        })
    }
}

impl fmt::Display for ReflectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.height, self.start_opacity, self.gap)
    }
}

// =============================================================================
// Watermark and text overlays
// =============================================================================

/// An image stamped over the render: `path|position|offset|opacity`.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSpec {
    pub path: String,
    pub position: Position,
    pub offset: (u32, u32),
    /// 0–100; applied relative to the mark's most opaque pixel.
    pub opacity: u32,
}

impl WatermarkSpec {
    pub fn parse(raw: &str) -> Option<WatermarkSpec> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let fields: Vec<&str> = raw.split('|').collect();
        let path = fields[0].trim();
        if path.is_empty() {
            return None;
        }
        let position = fields
            .get(1)
            .map(|s| Position::parse(s))
            .unwrap_or(Position {
                h: HorizontalAnchor::Right,
                v: VerticalAnchor::Bottom,
            });
        let offset = fields.get(2).map(|s| parse_offset(s)).unwrap_or((0, 0));
        let opacity = fields
            .get(3)
            .map(|s| parse_dimension(s).min(100))
            .unwrap_or(100);
        Some(WatermarkSpec {
            path: path.to_string(),
            position,
            offset,
            opacity,
        })
    }
}

impl fmt::Display for WatermarkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{},{}|{}",
            self.path, self.position, self.offset.0, self.offset.1, self.opacity
        )
    }
}

/// A text caption: `content|position|offset|size|color`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpec {
    pub content: String,
    pub position: Position,
    pub offset: (u32, u32),
    /// Pixel height of the rendered glyphs.
    pub size: u32,
    pub color: Color,
}

impl TextSpec {
    pub fn parse(raw: &str) -> Option<TextSpec> {
        if raw.trim().is_empty() {
            return None;
        }
        let fields: Vec<&str> = raw.split('|').collect();
        let content = fields[0].to_string();
        let position = fields
            .get(1)
            .map(|s| Position::parse(s))
            .unwrap_or(Position {
                h: HorizontalAnchor::Left,
                v: VerticalAnchor::Bottom,
            });
        let offset = fields.get(2).map(|s| parse_offset(s)).unwrap_or((0, 0));
        let size = fields
            .get(3)
            .map(|s| parse_dimension(s))
            .filter(|&s| s > 0)
            .unwrap_or(16);
        let color = match fields.get(4) {
            Some(c) => parse_color_or(c, Color::WHITE, "text color"),
            None => Color::WHITE,
        };
        Some(TextSpec {
            content,
            position,
            offset,
            size,
            color,
        })
    }
}

impl fmt::Display for TextSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{},{}|{}|{}",
            self.content, self.position, self.offset.0, self.offset.1, self.size, self.color
        )
    }
}

// =============================================================================
// Rotation and flip
// =============================================================================

/// Rotation: `angle|fill`. The angle is normalized into [0, 360); right-angle
/// multiples take a lossless fast path. Fill shows through the corners of
/// non-right-angle rotations and defaults to transparent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationSpec {
    pub angle: f32,
    pub fill: Color,
}

impl RotationSpec {
    pub fn parse(raw: &str) -> Option<RotationSpec> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let mut fields = raw.split('|');
        let angle = match fields.next().unwrap_or("").trim().parse::<f32>() {
            Ok(a) if a.is_finite() => a.rem_euclid(360.0),
            _ => return None,
        };
        if angle == 0.0 {
            return None;
        }
        let fill = match fields.next() {
            Some(c) => parse_color_or(c, Color::rgba(0, 0, 0, 0), "rotation fill"),
            None => Color::rgba(0, 0, 0, 0),
        };
        Some(RotationSpec { angle, fill })
    }

    /// The quarter-turn count when the angle is an exact right-angle multiple.
    pub fn quarter_turns(&self) -> Option<u32> {
        if self.angle % 90.0 == 0.0 {
            Some((self.angle / 90.0) as u32 % 4)
        } else {
            None
        }
    }
}

impl fmt::Display for RotationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.angle, self.fill)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
    Both,
}

impl FlipAxis {
    pub fn parse(raw: &str) -> Option<FlipAxis> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "h" | "x" | "horizontal" => Some(FlipAxis::Horizontal),
            "v" | "y" | "vertical" => Some(FlipAxis::Vertical),
            "hv" | "vh" | "both" => Some(FlipAxis::Both),
            "" => None,
            other => {
                warn!("unknown flip axis {other:?}; skipping flip");
                None
            }
        }
    }
}

impl fmt::Display for FlipAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlipAxis::Horizontal => "h",
            FlipAxis::Vertical => "v",
            FlipAxis::Both => "hv",
        };
        f.write_str(s)
    }
}
