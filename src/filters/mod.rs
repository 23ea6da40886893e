//! The filter library: independent pixel algorithms behind one enum.
//!
//! A filter chain arrives as a single string: filters separated by `|`,
//! name and arguments separated by `,`:
//!
//! ```text
//! brightness,40|sharpen,120|sepia
//! ```
//!
//! [`parse_filter_chain`] turns that into a `Vec<Filter>`, clamping every
//! argument into its valid range. Unknown filter names are skipped and
//! logged; missing or junk arguments fall back to the documented default.
//! Parsing never fails.
//!
//! | filter | args | range / default |
//! |---|---|---|
//! | `noise` | level | 0–255, default 50 |
//! | `brightness` | amount | −255–255, default 0; stored as −100..100 |
//! | `colorize` | r,g,b | −255–255 each, default 0 |
//! | `contrast` | level | −100–100, default 0; sign inverted on parse |
//! | `opacity` | percent | 0–100, default 100 |
//! | `blur` | level | 0–100 passes, default 3 |
//! | `sharpen` | amount | 0–500, default 100 |
//! | `pixelate` | block | ≥ 0, default 10 |
//! | `sepia` | method | `fast` (default) or `slow` |
//! | `scatter` | sub,add | sub < add enforced, defaults 2,4 |
//! | `grayscale`, `invert`, `gaussian_blur`, `edge_detect`, `emboss`, `mean_removal` | — | — |
//! | `smooth` | weight | default 6 |
//! | `replace_color` | from,to,tolerance | hex colors, tolerance 0–100 default 30 |
//! | `dot` | block,shape,color | block ≥ 1 default 4; `circle` (default) or `square` |
//!
//! Colors inside a chain use hex form (`#rrggbb` / `#rgb`): the `r,g,b`
//! channel form would collide with the argument separator.
//!
//! Each variant implements [`std::fmt::Display`] in a canonical `name,args`
//! form; the cache identity hashes that form, so equivalent spellings of a
//! chain always produce the same cache file.

pub mod color_ops;
pub mod convolve;
pub mod pixel_ops;

use crate::color::Color;
use image::RgbaImage;
use log::warn;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DotShape {
    Circle,
    Square,
}

/// One parsed, clamped filter invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    Noise { level: u8 },
    /// Brightness level on the internal −100..100 scale.
    Brightness { level: i32 },
    Colorize { r: i32, g: i32, b: i32 },
    /// Contrast level with the user's sign already inverted, −100..100.
    Contrast { level: i32 },
    Opacity { percent: u32 },
    Blur { passes: u32 },
    Sharpen { amount: u32 },
    Pixelate { block: u32 },
    Sepia { slow: bool },
    Scatter { sub: u32, add: u32 },
    Grayscale,
    Invert,
    Smooth { weight: f32 },
    GaussianBlur,
    EdgeDetect,
    Emboss,
    MeanRemoval,
    ReplaceColor { from: Color, to: Color, tolerance: u32 },
    Dot { block: u32, shape: DotShape, color: Option<Color> },
}

impl Filter {
    /// Run the filter over an owned buffer.
    pub fn apply(&self, img: RgbaImage) -> RgbaImage {
        match *self {
            Filter::Noise { level } => pixel_ops::noise(img, level),
            Filter::Brightness { level } => color_ops::brightness(img, level),
            Filter::Colorize { r, g, b } => color_ops::colorize(img, r, g, b),
            Filter::Contrast { level } => color_ops::contrast(img, level),
            Filter::Opacity { percent } => pixel_ops::opacity(img, percent),
            Filter::Blur { passes } => convolve::blur(img, passes),
            Filter::Sharpen { amount } => convolve::unsharp_mask(img, amount, 0),
            Filter::Pixelate { block } => pixel_ops::pixelate(img, block),
            Filter::Sepia { slow } => color_ops::sepia(img, slow),
            Filter::Scatter { sub, add } => pixel_ops::scatter(img, sub, add),
            Filter::Grayscale => color_ops::grayscale(img),
            Filter::Invert => color_ops::invert(img),
            Filter::Smooth { weight } => convolve::smooth(img, weight),
            Filter::GaussianBlur => convolve::gaussian_pass(&img),
            Filter::EdgeDetect => convolve::edge_detect(&img),
            Filter::Emboss => convolve::emboss(&img),
            Filter::MeanRemoval => convolve::mean_removal(&img),
            Filter::ReplaceColor { from, to, tolerance } => {
                color_ops::replace_color(img, from, to, tolerance)
            }
            Filter::Dot { block, shape, color } => pixel_ops::dot(img, block, shape, color),
        }
    }

    /// The filter's wire name, as accepted by [`parse_filter_chain`].
    pub fn name(&self) -> &'static str {
        match self {
            Filter::Noise { .. } => "noise",
            Filter::Brightness { .. } => "brightness",
            Filter::Colorize { .. } => "colorize",
            Filter::Contrast { .. } => "contrast",
            Filter::Opacity { .. } => "opacity",
            Filter::Blur { .. } => "blur",
            Filter::Sharpen { .. } => "sharpen",
            Filter::Pixelate { .. } => "pixelate",
            Filter::Sepia { .. } => "sepia",
            Filter::Scatter { .. } => "scatter",
            Filter::Grayscale => "grayscale",
            Filter::Invert => "invert",
            Filter::Smooth { .. } => "smooth",
            Filter::GaussianBlur => "gaussian_blur",
            Filter::EdgeDetect => "edge_detect",
            Filter::Emboss => "emboss",
            Filter::MeanRemoval => "mean_removal",
            Filter::ReplaceColor { .. } => "replace_color",
            Filter::Dot { .. } => "dot",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Filter::Noise { level } => write!(f, "noise,{level}"),
            Filter::Brightness { level } => write!(f, "brightness,{level}"),
            Filter::Colorize { r, g, b } => write!(f, "colorize,{r},{g},{b}"),
            Filter::Contrast { level } => write!(f, "contrast,{level}"),
            Filter::Opacity { percent } => write!(f, "opacity,{percent}"),
            Filter::Blur { passes } => write!(f, "blur,{passes}"),
            Filter::Sharpen { amount } => write!(f, "sharpen,{amount}"),
            Filter::Pixelate { block } => write!(f, "pixelate,{block}"),
            Filter::Sepia { slow } => write!(f, "sepia,{}", if slow { "slow" } else { "fast" }),
            Filter::Scatter { sub, add } => write!(f, "scatter,{sub},{add}"),
            Filter::Grayscale
            | Filter::Invert
            | Filter::GaussianBlur
            | Filter::EdgeDetect
            | Filter::Emboss
            | Filter::MeanRemoval => f.write_str(self.name()),
            Filter::Smooth { weight } => write!(f, "smooth,{weight}"),
            Filter::ReplaceColor { from, to, tolerance } => {
                write!(f, "replace_color,{from},{to},{tolerance}")
            }
            Filter::Dot { block, shape, color } => {
                write!(
                    f,
                    "dot,{block},{}",
                    if shape == DotShape::Square { "square" } else { "circle" }
                )?;
                if let Some(c) = color {
                    write!(f, ",{c}")?;
                }
                Ok(())
            }
        }
    }
}

/// Integer argument at position `i`, clamped to [min, max]; missing or junk
/// arguments become `default`.
fn clamped_arg(args: &[&str], i: usize, min: i64, max: i64, default: i64) -> i64 {
    match args.get(i).map(|s| s.trim().parse::<i64>()) {
        Some(Ok(v)) => v.clamp(min, max),
        Some(Err(_)) => {
            warn!("non-numeric filter argument {:?}; using {default}", args[i]);
            default
        }
        None => default,
    }
}

fn float_arg(args: &[&str], i: usize, default: f32) -> f32 {
    match args.get(i).map(|s| s.trim().parse::<f32>()) {
        Some(Ok(v)) if v.is_finite() => v,
        Some(_) => {
            warn!("non-numeric filter argument {:?}; using {default}", args[i]);
            default
        }
        None => default,
    }
}

fn color_arg(args: &[&str], i: usize) -> Option<Color> {
    let raw = args.get(i)?;
    match Color::parse(raw) {
        Ok(c) => Some(c),
        Err(err) => {
            warn!("{err}; ignoring color argument");
            None
        }
    }
}

/// Parse a `|`-separated filter chain into clamped [`Filter`]s, preserving
/// the requested order. Unknown names are skipped and logged.
pub fn parse_filter_chain(raw: &str) -> Vec<Filter> {
    let mut chain = Vec::new();
    for entry in raw.split('|') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let mut parts = entry.split(',');
        let name = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let args: Vec<&str> = parts.collect();
        if let Some(filter) = parse_filter(&name, &args) {
            chain.push(filter);
        }
    }
    chain
}

fn parse_filter(name: &str, args: &[&str]) -> Option<Filter> {
    let filter = match name {
        "noise" => Filter::Noise {
            level: clamped_arg(args, 0, 0, 255, 50) as u8,
        },
        "brightness" => {
            let raw = clamped_arg(args, 0, -255, 255, 0);
            // User scale is −255..255; internally the level lives on −100..100.
            Filter::Brightness {
                level: ((raw as f64) * 100.0 / 255.0).round() as i32,
            }
        }
        "colorize" => Filter::Colorize {
            r: clamped_arg(args, 0, -255, 255, 0) as i32,
            g: clamped_arg(args, 1, -255, 255, 0) as i32,
            b: clamped_arg(args, 2, -255, 255, 0) as i32,
        },
        "contrast" => Filter::Contrast {
            // Positive user values mean more contrast; the curve wants the
            // opposite sign.
            level: -(clamped_arg(args, 0, -100, 100, 0) as i32),
        },
        "opacity" => Filter::Opacity {
            percent: clamped_arg(args, 0, 0, 100, 100) as u32,
        },
        "blur" => Filter::Blur {
            passes: clamped_arg(args, 0, 0, 100, 3) as u32,
        },
        "sharpen" => Filter::Sharpen {
            amount: clamped_arg(args, 0, 0, 500, 100) as u32,
        },
        "pixelate" => Filter::Pixelate {
            block: clamped_arg(args, 0, 0, u32::MAX as i64, 10) as u32,
        },
        "sepia" => match args.first().map(|s| s.trim().to_ascii_lowercase()) {
            Some(m) if m == "slow" => Filter::Sepia { slow: true },
            Some(m) if m == "fast" || m.is_empty() => Filter::Sepia { slow: false },
            Some(m) => {
                warn!("unknown sepia method {m:?}; using fast");
                Filter::Sepia { slow: false }
            }
            None => Filter::Sepia { slow: false },
        },
        "scatter" => {
            let mut sub = clamped_arg(args, 0, 0, u32::MAX as i64, 2) as u32;
            let add = clamped_arg(args, 1, 0, u32::MAX as i64, 4) as u32;
            if sub >= add {
                sub = add.div_ceil(2);
            }
            Filter::Scatter { sub, add }
        }
        "grayscale" | "greyscale" => Filter::Grayscale,
        "invert" | "negate" => Filter::Invert,
        "smooth" => {
            let mut weight = float_arg(args, 0, 6.0);
            if (weight + 8.0).abs() < f32::EPSILON {
                warn!("smooth weight {weight} sums the kernel to zero; using 6");
                weight = 6.0;
            }
            Filter::Smooth { weight }
        }
        "gaussian_blur" | "gaussian" => Filter::GaussianBlur,
        "edge_detect" | "edges" => Filter::EdgeDetect,
        "emboss" => Filter::Emboss,
        "mean_removal" => Filter::MeanRemoval,
        "replace_color" => {
            let (Some(from), Some(to)) = (color_arg(args, 0), color_arg(args, 1)) else {
                warn!("replace_color needs from and to colors; skipping");
                return None;
            };
            Filter::ReplaceColor {
                from,
                to,
                tolerance: clamped_arg(args, 2, 0, 100, 30) as u32,
            }
        }
        "dot" | "halftone" => Filter::Dot {
            block: clamped_arg(args, 0, 1, u32::MAX as i64, 4) as u32,
            shape: match args.get(1).map(|s| s.trim().to_ascii_lowercase()) {
                Some(s) if s == "square" => DotShape::Square,
                _ => DotShape::Circle,
            },
            color: color_arg(args, 2),
        },
        other => {
            warn!("unknown filter {other:?}; skipping");
            return None;
        }
    };
    Some(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Chain splitting
    // =========================================================================

    #[test]
    fn chain_preserves_requested_order() {
        let chain = parse_filter_chain("brightness,40|sharpen,120|sepia");
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].name(), "brightness");
        assert_eq!(chain[1].name(), "sharpen");
        assert_eq!(chain[2].name(), "sepia");
    }

    #[test]
    fn unknown_filters_are_skipped() {
        let chain = parse_filter_chain("swirl,5|grayscale");
        assert_eq!(chain, vec![Filter::Grayscale]);
    }

    #[test]
    fn empty_entries_and_whitespace_are_ignored() {
        let chain = parse_filter_chain(" | invert ||");
        assert_eq!(chain, vec![Filter::Invert]);
    }

    #[test]
    fn empty_chain_parses_to_nothing() {
        assert!(parse_filter_chain("").is_empty());
    }

    // =========================================================================
    // Clamping rules
    // =========================================================================

    #[test]
    fn brightness_clamps_then_rescales() {
        // 300 clamps to 255, which is 100 on the internal scale.
        assert_eq!(
            parse_filter_chain("brightness,300"),
            vec![Filter::Brightness { level: 100 }]
        );
        assert_eq!(
            parse_filter_chain("brightness,-300"),
            vec![Filter::Brightness { level: -100 }]
        );
        assert_eq!(
            parse_filter_chain("brightness,128"),
            vec![Filter::Brightness { level: 50 }]
        );
    }

    #[test]
    fn contrast_inverts_sign() {
        assert_eq!(
            parse_filter_chain("contrast,60"),
            vec![Filter::Contrast { level: -60 }]
        );
        assert_eq!(
            parse_filter_chain("contrast,-150"),
            vec![Filter::Contrast { level: 100 }]
        );
    }

    #[test]
    fn noise_level_clamps_to_byte() {
        assert_eq!(parse_filter_chain("noise,999"), vec![Filter::Noise { level: 255 }]);
        assert_eq!(parse_filter_chain("noise,-4"), vec![Filter::Noise { level: 0 }]);
    }

    #[test]
    fn sharpen_caps_at_500() {
        assert_eq!(
            parse_filter_chain("sharpen,9000"),
            vec![Filter::Sharpen { amount: 500 }]
        );
    }

    #[test]
    fn opacity_and_blur_cap_at_100() {
        assert_eq!(
            parse_filter_chain("opacity,150|blur,150"),
            vec![Filter::Opacity { percent: 100 }, Filter::Blur { passes: 100 }]
        );
    }

    #[test]
    fn scatter_sub_must_stay_below_add() {
        // Violating sub is replaced with half of add, rounded up.
        assert_eq!(
            parse_filter_chain("scatter,10,5"),
            vec![Filter::Scatter { sub: 3, add: 5 }]
        );
        assert_eq!(
            parse_filter_chain("scatter,2,8"),
            vec![Filter::Scatter { sub: 2, add: 8 }]
        );
    }

    #[test]
    fn sepia_method_defaults_to_fast() {
        assert_eq!(parse_filter_chain("sepia"), vec![Filter::Sepia { slow: false }]);
        assert_eq!(parse_filter_chain("sepia,slow"), vec![Filter::Sepia { slow: true }]);
        assert_eq!(parse_filter_chain("sepia,vintage"), vec![Filter::Sepia { slow: false }]);
    }

    #[test]
    fn missing_args_take_documented_defaults() {
        assert_eq!(parse_filter_chain("noise"), vec![Filter::Noise { level: 50 }]);
        assert_eq!(parse_filter_chain("blur"), vec![Filter::Blur { passes: 3 }]);
        assert_eq!(parse_filter_chain("pixelate"), vec![Filter::Pixelate { block: 10 }]);
        assert_eq!(parse_filter_chain("sharpen"), vec![Filter::Sharpen { amount: 100 }]);
    }

    #[test]
    fn junk_args_take_documented_defaults() {
        assert_eq!(parse_filter_chain("noise,fuzzy"), vec![Filter::Noise { level: 50 }]);
    }

    #[test]
    fn replace_color_requires_both_colors() {
        assert!(parse_filter_chain("replace_color,#ff0000").is_empty());
        let chain = parse_filter_chain("replace_color,#ff0000,#00ff00");
        assert_eq!(
            chain,
            vec![Filter::ReplaceColor {
                from: Color::rgb(255, 0, 0),
                to: Color::rgb(0, 255, 0),
                tolerance: 30,
            }]
        );
    }

    #[test]
    fn dot_block_floor_is_one() {
        assert_eq!(
            parse_filter_chain("dot,0,square"),
            vec![Filter::Dot {
                block: 1,
                shape: DotShape::Square,
                color: None
            }]
        );
    }

    // =========================================================================
    // Canonical display
    // =========================================================================

    #[test]
    fn display_is_reparsable_and_stable() {
        let chain = parse_filter_chain("brightness,40|scatter,10,5|sepia,slow");
        let canonical: Vec<String> = chain.iter().map(Filter::to_string).collect();
        assert_eq!(canonical, vec!["brightness,16", "scatter,3,5", "sepia,slow"]);

        let reparsed = parse_filter_chain(&canonical.join("|"));
        // Brightness has already been rescaled once, so reparse differs; the
        // structural filters round-trip exactly.
        assert_eq!(reparsed[1], chain[1]);
        assert_eq!(reparsed[2], chain[2]);
    }
}
