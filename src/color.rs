//! Color parsing and color-space conversions.
//!
//! Colors arrive as compact strings (`#rrggbb`, `#rgb`, bare hex, or
//! `r,g,b[,a]` channel lists) and are parsed once at the normalization
//! boundary into [`Color`]. The HSL conversions back the hue-based color
//! replacement filter, which matches hues in degrees and rewrites
//! hue/saturation while preserving per-pixel lightness.

use image::Rgba;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ColorParseError {
    #[error("empty color spec")]
    Empty,
    #[error("invalid hex color: {0}")]
    InvalidHex(String),
    #[error("invalid channel list: {0}")]
    InvalidChannels(String),
}

/// An 8-bit RGBA color.
///
/// The cache identity serializes this as its four raw channel values, so two
/// equal colors always hash identically regardless of how they were written
/// (`#fff` and `255,255,255` are the same color).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse a color spec: `#rrggbb`, `#rgb`, bare 6/3-digit hex, or a
    /// `r,g,b[,a]` channel list (channels clamped to 0–255).
    pub fn parse(spec: &str) -> Result<Self, ColorParseError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ColorParseError::Empty);
        }
        if spec.contains(',') {
            return Self::parse_channels(spec);
        }
        Self::parse_hex(spec)
    }

    fn parse_hex(spec: &str) -> Result<Self, ColorParseError> {
        let hex = spec.trim_start_matches('#');
        let expand = |c: u8| (c << 4) | c;
        match hex.len() {
            6 => {
                let n = u32::from_str_radix(hex, 16)
                    .map_err(|_| ColorParseError::InvalidHex(spec.to_string()))?;
                Ok(Self::rgb((n >> 16) as u8, (n >> 8) as u8, n as u8))
            }
            3 => {
                let n = u16::from_str_radix(hex, 16)
                    .map_err(|_| ColorParseError::InvalidHex(spec.to_string()))?;
                Ok(Self::rgb(
                    expand(((n >> 8) & 0xf) as u8),
                    expand(((n >> 4) & 0xf) as u8),
                    expand((n & 0xf) as u8),
                ))
            }
            _ => Err(ColorParseError::InvalidHex(spec.to_string())),
        }
    }

    fn parse_channels(spec: &str) -> Result<Self, ColorParseError> {
        let parts: Vec<i64> = spec
            .split(',')
            .map(|p| p.trim().parse::<i64>())
            .collect::<Result<_, _>>()
            .map_err(|_| ColorParseError::InvalidChannels(spec.to_string()))?;
        let ch = |i: usize| parts[i].clamp(0, 255) as u8;
        match parts.len() {
            3 => Ok(Self::rgb(ch(0), ch(1), ch(2))),
            4 => Ok(Self::rgba(ch(0), ch(1), ch(2), ch(3))),
            _ => Err(ColorParseError::InvalidChannels(spec.to_string())),
        }
    }

    /// Raw channel values in RGBA order, as hashed into the cache identity.
    pub fn channels(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }
}

impl From<Color> for Rgba<u8> {
    fn from(c: Color) -> Self {
        c.to_rgba()
    }
}

impl fmt::Display for Color {
    /// Canonical form: the four raw channel values, comma-separated. This is
    /// the form cache identities hash, so it must stay stable.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.r, self.g, self.b, self.a)
    }
}

/// A color in HSL space: hue in degrees [0, 360), saturation and lightness
/// in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f32,
    pub s: f32,
    pub l: f32,
}

/// Convert 8-bit RGB to HSL.
pub fn rgb_to_hsl(r: u8, g: u8, b: u8) -> Hsl {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if max == min {
        return Hsl { h: 0.0, s: 0.0, l };
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if max == r {
        60.0 * ((g - b) / d).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / d + 2.0)
    } else {
        60.0 * ((r - g) / d + 4.0)
    };
    Hsl { h, s, l }
}

/// Convert HSL back to 8-bit RGB.
pub fn hsl_to_rgb(hsl: Hsl) -> (u8, u8, u8) {
    let Hsl { h, s, l } = hsl;
    if s == 0.0 {
        let v = (l * 255.0).round().clamp(0.0, 255.0) as u8;
        return (v, v, v);
    }

    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_byte(r1), to_byte(g1), to_byte(b1))
}

/// Shortest angular distance between two hues, in degrees [0, 180].
pub fn hue_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Rec.601 luma of an RGB triple, in [0, 255].
pub fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Color parsing
    // =========================================================================

    #[test]
    fn parse_six_digit_hex() {
        assert_eq!(Color::parse("#336699").unwrap(), Color::rgb(0x33, 0x66, 0x99));
    }

    #[test]
    fn parse_hex_without_hash() {
        assert_eq!(Color::parse("ff0000").unwrap(), Color::rgb(255, 0, 0));
    }

    #[test]
    fn parse_three_digit_hex_expands() {
        assert_eq!(Color::parse("#fff").unwrap(), Color::WHITE);
        assert_eq!(Color::parse("#369").unwrap(), Color::rgb(0x33, 0x66, 0x99));
    }

    #[test]
    fn parse_channel_list() {
        assert_eq!(Color::parse("10, 20,30").unwrap(), Color::rgb(10, 20, 30));
        assert_eq!(
            Color::parse("10,20,30,40").unwrap(),
            Color::rgba(10, 20, 30, 40)
        );
    }

    #[test]
    fn parse_channel_list_clamps() {
        assert_eq!(Color::parse("300,-5,128").unwrap(), Color::rgb(255, 0, 128));
    }

    #[test]
    fn parse_rejects_junk() {
        assert!(Color::parse("").is_err());
        assert!(Color::parse("#12345").is_err());
        assert!(Color::parse("not-a-color").is_err());
        assert!(Color::parse("1,2").is_err());
        assert!(Color::parse("1,2,x").is_err());
    }

    #[test]
    fn channels_are_rgba_order() {
        assert_eq!(Color::rgba(1, 2, 3, 4).channels(), [1, 2, 3, 4]);
    }

    #[test]
    fn display_is_raw_channels() {
        assert_eq!(Color::rgba(1, 2, 3, 4).to_string(), "1,2,3,4");
        assert_eq!(Color::parse("#fff").unwrap().to_string(), "255,255,255,255");
    }

    // =========================================================================
    // HSL conversions
    // =========================================================================

    #[test]
    fn primaries_round_trip() {
        for (r, g, b) in [
            (255u8, 0u8, 0u8),
            (0, 255, 0),
            (0, 0, 255),
            (255, 255, 0),
            (0, 255, 255),
            (255, 0, 255),
        ] {
            let hsl = rgb_to_hsl(r, g, b);
            assert_eq!(hsl_to_rgb(hsl), (r, g, b), "({r},{g},{b})");
        }
    }

    #[test]
    fn gray_has_zero_saturation() {
        let hsl = rgb_to_hsl(128, 128, 128);
        assert_eq!(hsl.s, 0.0);
        assert!((hsl.l - 0.502).abs() < 0.01);
    }

    #[test]
    fn red_hue_is_zero() {
        assert_eq!(rgb_to_hsl(255, 0, 0).h, 0.0);
    }

    #[test]
    fn green_hue_is_120() {
        assert!((rgb_to_hsl(0, 255, 0).h - 120.0).abs() < 0.01);
    }

    #[test]
    fn hue_distance_wraps_around() {
        assert_eq!(hue_distance(350.0, 10.0), 20.0);
        assert_eq!(hue_distance(10.0, 350.0), 20.0);
        assert_eq!(hue_distance(180.0, 0.0), 180.0);
    }

    #[test]
    fn luma_weights_sum_to_white() {
        assert!((luma(255, 255, 255) - 255.0).abs() < 0.01);
        assert_eq!(luma(0, 0, 0), 0.0);
    }
}
