//! The typed image request and its normalization from raw options.
//!
//! Options arrive as strings, the way a template tag or a CLI flag hands
//! them over, collected into [`RequestOptions`]. [`RequestOptions::normalize`]
//! turns them into an [`ImageRequest`]: every value parsed, clamped, and
//! defaulted so that nothing downstream ever sees an invalid parameter.
//! Normalization never fails; junk values fall back to documented defaults
//! and log.
//!
//! An [`ImageRequest`] is immutable after normalization and self-contained:
//! engine defaults (quality, TTL, aspect ratio, background) are already
//! resolved into it.

use crate::color::Color;
use crate::config::EngineConfig;
use crate::filters::{self, Filter};
use crate::geometry::{FitMode, GeometrySpec};
use crate::params::{
    self, BorderSpec, CornersSpec, CropSpec, FlipAxis, ReflectionSpec, RotationSpec, TextSpec,
    WatermarkSpec,
};
use log::warn;
use serde::Deserialize;
use std::path::PathBuf;

/// Where source pixels come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A filesystem path, absolute or relative to the configured source root.
    Local(PathBuf),
    /// An http(s) URL fetched at render time.
    Remote(String),
}

impl Source {
    pub fn parse(raw: &str) -> Option<Source> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Some(Source::Remote(raw.to_string()))
        } else {
            Some(Source::Local(PathBuf::from(raw)))
        }
    }

    /// The reference string as given; cache identities hash this.
    pub fn reference(&self) -> String {
        match self {
            Source::Local(p) => p.display().to_string(),
            Source::Remote(url) => url.clone(),
        }
    }

    /// The file stem for identity building. URLs have none; their identity
    /// basename is derived by hashing instead.
    pub fn basename(&self) -> Option<String> {
        match self {
            Source::Local(p) => p
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string()),
            Source::Remote(_) => None,
        }
    }

    /// Lowercased extension, with any URL query/fragment stripped.
    pub fn extension(&self) -> Option<String> {
        match self {
            Source::Local(p) => p
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase()),
            Source::Remote(url) => {
                let tail = url.rsplit('/').next()?;
                let tail = tail.split(['?', '#']).next()?;
                let (_, ext) = tail.rsplit_once('.')?;
                if ext.is_empty() {
                    None
                } else {
                    Some(ext.to_ascii_lowercase())
                }
            }
        }
    }
}

/// Output encodings the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl OutputFormat {
    pub fn from_ext(ext: &str) -> Option<OutputFormat> {
        match ext.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::Webp),
            "gif" => Some(OutputFormat::Gif),
            _ => None,
        }
    }

    pub fn ext(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Gif => "gif",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Gif => "image/gif",
        }
    }

    /// JPEG has no alpha channel; the encoder flattens over the request
    /// background first.
    pub fn supports_alpha(&self) -> bool {
        !matches!(self, OutputFormat::Jpeg)
    }

    /// Whether the encoder honors a quality setting.
    pub fn is_lossy(&self) -> bool {
        matches!(self, OutputFormat::Jpeg)
    }
}

/// Lazy-load placeholder mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LazyMode {
    #[default]
    Off,
    /// Pixelated-and-blurred low-fidelity preview.
    Blurred,
    /// Single dominant-color fill.
    Dominant,
}

impl LazyMode {
    pub fn parse(raw: &str) -> LazyMode {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "no" | "false" | "0" | "off" => LazyMode::Off,
            "yes" | "true" | "1" | "on" | "blur" => LazyMode::Blurred,
            "dominant" => LazyMode::Dominant,
            other => {
                warn!("unknown lazy mode {other:?}; lazy loading disabled");
                LazyMode::Off
            }
        }
    }

    pub fn enabled(&self) -> bool {
        *self != LazyMode::Off
    }
}

/// Quality setting for lossy encoding (1–100). Clamped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// How long a cached variant stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    Forever,
    Seconds(u64),
}

impl CacheTtl {
    /// `"0"`, `"forever"` and empty mean forever; anything else parses as
    /// seconds, with junk falling back to `default`.
    pub fn parse(raw: &str, default: CacheTtl) -> CacheTtl {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => default,
            "0" | "forever" => CacheTtl::Forever,
            s => match s.parse::<u64>() {
                Ok(secs) => CacheTtl::Seconds(secs),
                Err(_) => {
                    warn!("invalid cache ttl {raw:?}; using default");
                    default
                }
            },
        }
    }

    pub fn from_secs(secs: u64) -> CacheTtl {
        if secs == 0 {
            CacheTtl::Forever
        } else {
            CacheTtl::Seconds(secs)
        }
    }

    /// The cache-tag filename segment: lowercase hex seconds, or the literal
    /// `0` sentinel for forever.
    pub fn tag(&self) -> String {
        match self {
            CacheTtl::Forever => "0".to_string(),
            CacheTtl::Seconds(s) => format!("{s:x}"),
        }
    }

    pub fn seconds(&self) -> Option<u64> {
        match self {
            CacheTtl::Forever => None,
            CacheTtl::Seconds(s) => Some(*s),
        }
    }
}

/// Raw request options, exactly as supplied by the caller.
///
/// Every field is an optional string; batch files deserialize straight into
/// this (values are written as strings there too). Unknown keys are
/// rejected so a typo'd option never silently disappears.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestOptions {
    pub src: Option<String>,
    pub fallback_src: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    pub min_width: Option<String>,
    pub min_height: Option<String>,
    pub max_width: Option<String>,
    pub max_height: Option<String>,
    pub fit: Option<String>,
    pub crop: Option<String>,
    pub filters: Option<String>,
    pub flip: Option<String>,
    pub rotate: Option<String>,
    pub text: Option<String>,
    pub watermark: Option<String>,
    pub border: Option<String>,
    pub rounded_corners: Option<String>,
    pub reflection: Option<String>,
    pub mask: Option<String>,
    pub format: Option<String>,
    pub quality: Option<String>,
    pub srcset: Option<String>,
    pub lazy: Option<String>,
    pub allow_scale_larger: Option<String>,
    pub cache_ttl: Option<String>,
    pub filename: Option<String>,
    pub background: Option<String>,
    pub base64: Option<String>,
    pub auto_tag: Option<String>,
    pub alt: Option<String>,
    pub attributes: Option<String>,
}

impl RequestOptions {
    /// Normalize into a typed request against the engine's defaults. Never
    /// fails; invalid values are replaced and logged.
    pub fn normalize(&self, config: &EngineConfig) -> ImageRequest {
        let dim = |raw: &Option<String>| -> Option<u32> {
            raw.as_deref()
                .map(params::parse_dimension)
                .filter(|&v| v > 0)
        };

        // Combined min/max seed both axes; per-axis values override.
        let min = dim(&self.min);
        let max = dim(&self.max);
        let min_width = dim(&self.min_width).or(min);
        let min_height = dim(&self.min_height).or(min);
        let max_width = dim(&self.max_width).or(max);
        let max_height = dim(&self.max_height).or(max);

        let quality = match &self.quality {
            Some(q) => match q.trim().parse::<u32>() {
                Ok(v) => Quality::new(v),
                Err(_) => {
                    warn!("invalid quality {q:?}; using default");
                    Quality::new(config.default_quality)
                }
            },
            None => Quality::new(config.default_quality),
        };

        let format = self.format.as_deref().and_then(|f| {
            let parsed = OutputFormat::from_ext(f);
            if parsed.is_none() && !f.trim().is_empty() {
                warn!("unknown output format {f:?}; keeping source format");
            }
            parsed
        });

        let srcset = self
            .srcset
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(params::parse_dimension)
                    .filter(|&w| w > 0)
                    .collect()
            })
            .unwrap_or_default();

        let background = self
            .background
            .as_deref()
            .map(|b| match Color::parse(b) {
                Ok(c) => c,
                Err(err) => {
                    warn!("background color: {err}; using configured default");
                    config.background_color()
                }
            })
            .unwrap_or_else(|| config.background_color());

        ImageRequest {
            source: self.src.as_deref().and_then(Source::parse),
            fallback: self.fallback_src.as_deref().and_then(Source::parse),
            width: dim(&self.width),
            height: dim(&self.height),
            min_width,
            min_height,
            max_width,
            max_height,
            fit: self
                .fit
                .as_deref()
                .map(FitMode::parse)
                .unwrap_or_default(),
            crop: self.crop.as_deref().and_then(CropSpec::parse),
            filters: self
                .filters
                .as_deref()
                .map(filters::parse_filter_chain)
                .unwrap_or_default(),
            flip: self.flip.as_deref().and_then(FlipAxis::parse),
            rotate: self.rotate.as_deref().and_then(RotationSpec::parse),
            text: self.text.as_deref().and_then(TextSpec::parse),
            watermark: self.watermark.as_deref().and_then(WatermarkSpec::parse),
            border: self.border.as_deref().and_then(BorderSpec::parse),
            corners: self
                .rounded_corners
                .as_deref()
                .and_then(CornersSpec::parse),
            reflection: self.reflection.as_deref().and_then(ReflectionSpec::parse),
            mask: self
                .mask
                .as_ref()
                .map(|m| m.trim())
                .filter(|m| !m.is_empty())
                .map(PathBuf::from),
            format,
            quality,
            srcset,
            lazy: self
                .lazy
                .as_deref()
                .map(LazyMode::parse)
                .unwrap_or_default(),
            allow_scale_larger: self
                .allow_scale_larger
                .as_deref()
                .map(params::parse_bool)
                .unwrap_or(config.allow_scale_larger),
            ttl: self
                .cache_ttl
                .as_deref()
                .map(|raw| CacheTtl::parse(raw, CacheTtl::from_secs(config.default_ttl_secs)))
                .unwrap_or(CacheTtl::from_secs(config.default_ttl_secs)),
            filename: self
                .filename
                .as_ref()
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .map(str::to_string),
            background,
            base64: self
                .base64
                .as_deref()
                .map(params::parse_bool)
                .unwrap_or(false),
            auto_tag: self
                .auto_tag
                .as_deref()
                .map(params::parse_bool)
                .unwrap_or(false),
            alt: self.alt.clone(),
            attributes: self.attributes.clone(),
            default_aspect: config.aspect(),
        }
    }
}

/// A fully normalized request. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub source: Option<Source>,
    pub fallback: Option<Source>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub fit: FitMode,
    pub crop: Option<CropSpec>,
    pub filters: Vec<Filter>,
    pub flip: Option<FlipAxis>,
    pub rotate: Option<RotationSpec>,
    pub text: Option<TextSpec>,
    pub watermark: Option<WatermarkSpec>,
    pub border: Option<BorderSpec>,
    pub corners: Option<CornersSpec>,
    pub reflection: Option<ReflectionSpec>,
    /// Mask image whose luma multiplies into the buffer's alpha.
    pub mask: Option<PathBuf>,
    /// Requested output format; `None` keeps the source's.
    pub format: Option<OutputFormat>,
    pub quality: Quality,
    /// Raw srcset widths in request order; planning validates them.
    pub srcset: Vec<u32>,
    pub lazy: LazyMode,
    pub allow_scale_larger: bool,
    pub ttl: CacheTtl,
    /// Explicit cache basename, overriding the source-derived one.
    pub filename: Option<String>,
    pub background: Color,
    /// Emit a base64 data URI in the output variables.
    pub base64: bool,
    /// Emit an `<img>` markup fragment.
    pub auto_tag: bool,
    pub alt: Option<String>,
    pub attributes: Option<String>,
    pub default_aspect: (u32, u32),
}

impl ImageRequest {
    /// The sizing half of this request, ready for the geometry resolver.
    pub fn geometry_spec(&self) -> GeometrySpec {
        GeometrySpec {
            width: self.width,
            height: self.height,
            min_width: self.min_width,
            min_height: self.min_height,
            max_width: self.max_width,
            max_height: self.max_height,
            fit: self.fit,
            crop: self.crop.is_some(),
            smart_scale: self.crop.as_ref().is_some_and(|c| c.smart_scale),
            allow_scale_larger: self.allow_scale_larger,
            default_aspect: self.default_aspect,
        }
    }

    /// Requests with no pixel work at all still render (plain re-encode).
    pub fn wants_resize(&self) -> bool {
        self.width.is_some()
            || self.height.is_some()
            || self.min_width.is_some()
            || self.min_height.is_some()
            || self.max_width.is_some()
            || self.max_height.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(f: impl FnOnce(&mut RequestOptions)) -> ImageRequest {
        let mut opts = RequestOptions::default();
        f(&mut opts);
        opts.normalize(&EngineConfig::default())
    }

    // =========================================================================
    // Sources
    // =========================================================================

    #[test]
    fn source_detects_urls() {
        assert_eq!(
            Source::parse("https://example.com/a/photo.png?v=2"),
            Some(Source::Remote("https://example.com/a/photo.png?v=2".into()))
        );
        assert_eq!(
            Source::parse("photos/cat.jpg"),
            Some(Source::Local(PathBuf::from("photos/cat.jpg")))
        );
        assert_eq!(Source::parse("  "), None);
    }

    #[test]
    fn url_extension_strips_query_and_fragment() {
        let s = Source::parse("https://example.com/img/pic.JPG?w=1#frag").unwrap();
        assert_eq!(s.extension(), Some("jpg".into()));
        let bare = Source::parse("https://example.com/img/pic").unwrap();
        assert_eq!(bare.extension(), None);
    }

    #[test]
    fn local_basename_is_file_stem() {
        let s = Source::parse("photos/My Cat.jpeg").unwrap();
        assert_eq!(s.basename(), Some("My Cat".into()));
        assert!(Source::parse("https://example.com/x.png").unwrap().basename().is_none());
    }

    // =========================================================================
    // Normalization
    // =========================================================================

    #[test]
    fn combined_bounds_seed_both_axes() {
        let req = options(|o| {
            o.max = Some("500".into());
            o.min = Some("50".into());
        });
        assert_eq!(req.max_width, Some(500));
        assert_eq!(req.max_height, Some(500));
        assert_eq!(req.min_width, Some(50));
        assert_eq!(req.min_height, Some(50));
    }

    #[test]
    fn per_axis_bounds_override_combined() {
        let req = options(|o| {
            o.max = Some("500".into());
            o.max_width = Some("300".into());
        });
        assert_eq!(req.max_width, Some(300));
        assert_eq!(req.max_height, Some(500));
    }

    #[test]
    fn junk_dimensions_become_unset() {
        let req = options(|o| {
            o.width = Some("wide".into());
            o.height = Some("-4".into());
        });
        assert_eq!(req.width, None);
        assert_eq!(req.height, None);
    }

    #[test]
    fn quality_clamps_and_defaults() {
        assert_eq!(options(|o| o.quality = Some("150".into())).quality.value(), 100);
        assert_eq!(options(|o| o.quality = Some("seventy".into())).quality.value(), 90);
        assert_eq!(options(|_| ()).quality.value(), 90);
    }

    #[test]
    fn ttl_forever_sentinels() {
        assert_eq!(options(|o| o.cache_ttl = Some("0".into())).ttl, CacheTtl::Forever);
        assert_eq!(options(|o| o.cache_ttl = Some("forever".into())).ttl, CacheTtl::Forever);
        assert_eq!(
            options(|o| o.cache_ttl = Some("3600".into())).ttl,
            CacheTtl::Seconds(3600)
        );
        assert_eq!(options(|_| ()).ttl, CacheTtl::Forever);
    }

    #[test]
    fn ttl_tag_is_lowercase_hex_or_zero() {
        assert_eq!(CacheTtl::Forever.tag(), "0");
        assert_eq!(CacheTtl::Seconds(3600).tag(), "e10");
        assert_eq!(CacheTtl::Seconds(255).tag(), "ff");
    }

    #[test]
    fn filter_chain_flows_into_request() {
        let req = options(|o| o.filters = Some("grayscale|brightness,40".into()));
        assert_eq!(req.filters.len(), 2);
    }

    #[test]
    fn srcset_drops_junk_entries() {
        let req = options(|o| o.srcset = Some("200, 400, wide, 800".into()));
        assert_eq!(req.srcset, vec![200, 400, 800]);
    }

    #[test]
    fn unknown_format_keeps_source_format() {
        assert_eq!(options(|o| o.format = Some("bmp".into())).format, None);
        assert_eq!(
            options(|o| o.format = Some("webp".into())).format,
            Some(OutputFormat::Webp)
        );
    }

    #[test]
    fn lazy_mode_parsing() {
        assert_eq!(options(|o| o.lazy = Some("yes".into())).lazy, LazyMode::Blurred);
        assert_eq!(options(|o| o.lazy = Some("dominant".into())).lazy, LazyMode::Dominant);
        assert_eq!(options(|_| ()).lazy, LazyMode::Off);
    }

    #[test]
    fn geometry_spec_carries_crop_and_smart_scale() {
        let req = options(|o| {
            o.width = Some("300".into());
            o.crop = Some("yes|center|0|yes".into());
        });
        let spec = req.geometry_spec();
        assert!(spec.crop);
        assert!(spec.smart_scale);
        assert_eq!(spec.width, Some(300));
    }

    #[test]
    fn background_falls_back_to_configured_default() {
        let req = options(|o| o.background = Some("not-a-color".into()));
        assert_eq!(req.background, Color::WHITE);
        let req = options(|o| o.background = Some("#000".into()));
        assert_eq!(req.background, Color::BLACK);
    }
}
