//! Responsive variant planning and the `srcset` / `sizes` strings.
//!
//! Variant widths come straight from the request and are validated here:
//! they must be strictly increasing (violators are skipped and logged), and
//! widths above the primary render are skipped unless upscaling was
//! explicitly allowed. Each accepted width becomes an independently cached
//! render whose height follows the primary aspect ratio.

use log::warn;

/// Validate requested srcset widths against the primary render width.
pub fn plan_widths(requested: &[u32], primary_width: u32, allow_scale_larger: bool) -> Vec<u32> {
    let mut widths = Vec::new();
    let mut previous = 0u32;
    for &w in requested {
        if w <= previous {
            warn!("srcset width {w} not strictly increasing; skipping");
            continue;
        }
        previous = w;
        if w > primary_width && !allow_scale_larger {
            warn!("srcset width {w} exceeds primary width {primary_width}; skipping");
            continue;
        }
        widths.push(w);
    }
    widths
}

/// Height of a variant, keeping the primary render's aspect ratio.
pub fn variant_height(width: u32, primary: (u32, u32)) -> u32 {
    let (pw, ph) = primary;
    if pw == 0 {
        return 1;
    }
    (((width as u64 * ph as u64) + pw as u64 / 2) / pw as u64).max(1) as u32
}

/// The cache-name suffix for a variant width.
pub fn variant_suffix(width: u32) -> String {
    format!("w{width}")
}

/// Build the `srcset` attribute: variant entries in width order, the
/// primary image appended last.
pub fn srcset_attribute(variants: &[(String, u32)], primary_url: &str, primary_width: u32) -> String {
    let mut parts: Vec<String> = variants
        .iter()
        .map(|(url, w)| format!("{url} {w}w"))
        .collect();
    parts.push(format!("{primary_url} {primary_width}w"));
    parts.join(", ")
}

/// Build the `sizes` attribute for the primary width.
pub fn sizes_attribute(primary_width: u32) -> String {
    format!("(max-width: {primary_width}px) 100vw, {primary_width}px")
}
