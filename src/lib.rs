//! # Enlarger
//!
//! An on-demand image transformation and caching engine. Callers describe the
//! image they want (dimensions, crop, filters, overlays, output format) and
//! Enlarger renders it once, stores it under a content-addressed name, and
//! serves the cached file for every identical request after that.
//!
//! # Architecture: Normalize → Identify → Probe → Render
//!
//! Every render moves through four phases:
//!
//! ```text
//! 1. Normalize   raw options   →  ImageRequest     (strings → validated types)
//! 2. Identify    request       →  cache name       ({base}_{ttl}_{hash}.{ext})
//! 3. Probe       cache name    →  hit? emit variables and stop
//! 4. Render      source        →  pipeline → encode → store → variables
//! ```
//!
//! This separation exists for three reasons:
//!
//! - **Requests never fail on bad input**: normalization replaces every
//!   invalid value with a default and logs a warning, so a typo in a filter
//!   name degrades the output instead of breaking the page embedding it.
//! - **The cache needs no database**: the file name alone carries the source
//!   identity, the parameter hash, and the expiry policy. A cache directory
//!   can be swept or served with nothing but the names.
//! - **Renders are deterministic**: the same typed request always produces
//!   the same pipeline plan, so the parameter hash is safe as an identity.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`request`] | Untyped request options → validated [`request::ImageRequest`] |
//! | [`geometry`] | Output dimension resolution: fit, fill, min/max clamps, aspect defaults |
//! | [`params`] | Parameter grammar: crop, border, corner, reflection, watermark, text, rotation specs |
//! | [`color`] | Color parsing and HSL conversion shared by filters and overlays |
//! | [`filters`] | The filter library: a closed enum, its parser, and the pixel/color/convolution kernels |
//! | [`mask`] | Grayscale alpha masks and rounded-corner cutting |
//! | [`overlay`] | Compositing: the 3×3 placement grid, text, watermarks, borders, reflections |
//! | [`pipeline`] | Ordered step plan built from a request, executed over a working image |
//! | [`identity`] | Cache naming: sanitized basename, TTL tag, parameter hash |
//! | [`cache`] | Cache log, TTL recovery from file names, expiry sweeps |
//! | [`codec`] | Decode/encode seam over the `image` crate, format sniffing, alpha flattening |
//! | [`storage`] | Source and cache IO seam: filesystem reads/writes, remote fetches |
//! | [`services`] | Face detection and dominant-color seams with stock implementations |
//! | [`placeholder`] | Lazy-load previews and dominant-color fills |
//! | [`srcset`] | Responsive width planning and `srcset`/`sizes` attribute strings |
//! | [`vars`] | What a render reports back: URLs, dimensions, data URIs, the `<img>` tag |
//! | [`render`] | The engine: probes the cache, then orchestrates renders and their variants |
//! | [`config`] | `enlarger.toml` loading, validation, and the documented stock config |
//!
//! # Design Decisions
//!
//! ## Content-Addressed Cache Names
//!
//! A cached variant is named `{basename}_{ttl}_{hash}.{ext}`: a sanitized
//! source basename for human readability, the TTL encoded as readable hex,
//! and a SHA-256 hash over every parameter that affects pixels. Two requests
//! differing only in non-pixel options (alt text, extra attributes) share a
//! file; changing any pixel-affecting option produces a new one. Because the
//! TTL is recoverable from the name itself, expiry sweeps work on a plain
//! directory listing; see [`cache::ttl_from_name`].
//!
//! ## One Canonical Pipeline Order
//!
//! Requests are declarative: callers say *what* they want, never in what
//! order. [`pipeline::build_steps`] always arranges work the same way
//! (prescale, crop or resize, flip, filters, text, watermark, mask, corners,
//! border, reflection, rotation), so equal parameter sets produce equal
//! plans, and therefore equal hashes and cache entries.
//!
//! ## A Closed Filter Enum
//!
//! Filter chains parse into [`filters::Filter`] variants up front, with
//! every argument validated and clamped at parse time. Unknown filter names
//! are dropped with a warning instead of failing mid-render, and the apply
//! step is a total match, with no stringly-typed dispatch deep in the
//! pipeline.
//!
//! ## Trait Seams for IO and Analysis
//!
//! The engine talks to [`codec::ImageCodec`], [`storage::Storage`],
//! [`services::FaceDetector`], and [`services::ColorExtractor`], never to
//! the `image` crate or the filesystem directly. Production wires up the
//! stock implementations; tests swap in recording mocks and run the full
//! render path on synthetic pixels without touching a disk or an encoder.
//!
//! ## Maud Over String Templates
//!
//! Auto-tag mode builds its `<img>` fragment with [Maud](https://maud.lambda.xyz/)
//! rather than string formatting: attribute interpolation is escaped by
//! default, optional attributes collapse cleanly, and malformed markup is a
//! compile error rather than corrupt output in a page.

pub mod cache;
pub mod codec;
pub mod color;
pub mod config;
pub mod filters;
pub mod geometry;
pub mod identity;
pub mod mask;
pub mod overlay;
pub mod params;
pub mod pipeline;
pub mod placeholder;
pub mod render;
pub mod request;
pub mod services;
pub mod srcset;
pub mod storage;
pub mod vars;
