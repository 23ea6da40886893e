//! Cache identity: deterministic file names for rendered variants.
//!
//! Every rendered image is addressed by `{basename}_{tag}_{hash}.{ext}`:
//!
//! - **basename**: the explicit `filename` option, else the source file
//!   stem, else a short hash of the source URL. Sanitized to a lowercase
//!   `[a-z0-9._-]` alphabet and length-capped.
//! - **tag**: the TTL segment from [`CacheTtl::tag`](crate::request::CacheTtl::tag),
//!   hex seconds or `0`
//!   for images cached forever. Expiry sweeps read it back off the file
//!   name without consulting any index.
//! - **hash**: SHA-256 over every pixel-affecting parameter, truncated to
//!   32 hex chars. Parameters that cannot change the pixels (TTL, markup
//!   options, srcset widths) are excluded, so toggling them reuses the
//!   cached file.
//!
//! The hash input is a fixed field sequence, each field serialized through
//! its canonical `Display` form and NUL-terminated. Absent fields hash as
//! `-` so that presence itself is part of the identity.

use crate::request::{ImageRequest, OutputFormat};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;

/// Longest basename kept verbatim; longer ones are truncated and suffixed.
const MAX_BASENAME: usize = 64;

/// Stem length for truncated basenames: 57 + `_` + 6 random chars = 64.
const TRUNCATED_STEM: usize = 57;

/// Hex chars kept from the parameter digest.
const HASH_LEN: usize = 32;

/// Hex chars kept when deriving a basename from a source URL.
const URL_BASENAME_LEN: usize = 16;

/// The resolved identity of one rendered image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageIdentity {
    pub basename: String,
    pub tag: String,
    pub hash: String,
    pub format: OutputFormat,
}

impl ImageIdentity {
    /// `{basename}_{tag}_{hash}` without extension.
    pub fn stem(&self) -> String {
        format!("{}_{}_{}", self.basename, self.tag, self.hash)
    }

    /// The primary cache file name.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem(), self.format.ext())
    }

    /// A derived variant's file name (`_w400` srcset entries, `_lazy` and
    /// `_dominant` placeholders).
    pub fn variant_file_name(&self, suffix: &str) -> String {
        format!("{}_{}.{}", self.stem(), suffix, self.format.ext())
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Build the identity for a normalized request.
///
/// `format` is the already-resolved output format (explicit request format,
/// else the format discovered from the fetched source). `using_fallback` and
/// `demo_mode` are hashed as markers so a fallback render never shadows the
/// real image and demo output never collides with production output.
pub fn build(
    request: &ImageRequest,
    format: OutputFormat,
    using_fallback: bool,
    demo_mode: bool,
) -> ImageIdentity {
    ImageIdentity {
        basename: basename_for(request),
        tag: request.ttl.tag(),
        hash: pixel_hash(request, format, using_fallback, demo_mode),
        format,
    }
}

fn basename_for(request: &ImageRequest) -> String {
    if let Some(name) = &request.filename {
        return sanitize_basename(name);
    }
    match &request.source {
        Some(src) => match src.basename() {
            Some(stem) => sanitize_basename(&stem),
            None => url_basename(&src.reference()),
        },
        None => "image".to_string(),
    }
}

/// Lowercase and replace anything outside `[a-z0-9._-]` with `_`. Names
/// longer than 64 chars are cut to 57 and suffixed with 6 random
/// alphanumerics so two distinct long names cannot collide silently.
pub fn sanitize_basename(raw: &str) -> String {
    let mut clean: String = raw
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if clean.is_empty() {
        clean.push_str("image");
    }
    if clean.len() > MAX_BASENAME {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();
        clean.truncate(TRUNCATED_STEM);
        clean.push('_');
        clean.push_str(&suffix.to_ascii_lowercase());
    }
    clean
}

/// Basename for URL sources: first 16 hex chars of the URL's SHA-256.
pub fn url_basename(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(URL_BASENAME_LEN);
    hex
}

/// SHA-256 over the pixel-affecting parameters, truncated to 32 hex chars.
///
/// The field order is fixed; adding a field or changing a canonical
/// serialization invalidates existing caches, which is the correct failure
/// mode.
pub fn pixel_hash(
    request: &ImageRequest,
    format: OutputFormat,
    using_fallback: bool,
    demo_mode: bool,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"render\0");

    field(&mut hasher, &opt(&request.source.as_ref().map(|s| s.reference())));
    field(&mut hasher, &opt(&request.width));
    field(&mut hasher, &opt(&request.height));
    field(&mut hasher, &opt(&request.min_width));
    field(&mut hasher, &opt(&request.min_height));
    field(&mut hasher, &opt(&request.max_width));
    field(&mut hasher, &opt(&request.max_height));
    field(&mut hasher, request.fit.as_str());
    field(&mut hasher, &opt(&request.crop));
    let chain: Vec<String> = request.filters.iter().map(|f| f.to_string()).collect();
    field(&mut hasher, &chain.join("|"));
    field(&mut hasher, &opt(&request.flip));
    field(&mut hasher, &opt(&request.rotate));
    field(&mut hasher, &opt(&request.text));
    field(&mut hasher, &opt(&request.watermark));
    field(&mut hasher, &opt(&request.border));
    field(&mut hasher, &opt(&request.corners));
    field(&mut hasher, &opt(&request.reflection));
    field(
        &mut hasher,
        &opt(&request.mask.as_ref().map(|p| p.display().to_string())),
    );
    field(&mut hasher, format.ext());
    field(&mut hasher, &request.quality.value().to_string());
    field(&mut hasher, if request.allow_scale_larger { "1" } else { "0" });
    // Background as its four raw channel values, never a color name.
    field(&mut hasher, &request.background.to_string());
    hasher.update(if demo_mode { b"\x01" } else { b"\x00" });
    hasher.update(if using_fallback { b"\x01" } else { b"\x00" });

    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(HASH_LEN);
    hex
}

fn field(hasher: &mut Sha256, value: &str) {
    hasher.update(value.as_bytes());
    hasher.update(b"\0");
}

fn opt<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}
