//! Render orchestration: one request in, one cached variant out.
//!
//! [`Engine`] owns the pluggable services (codec, storage, face detection,
//! color extraction) plus the shared cache log, and walks a request through
//! the full flow: normalize → fetch source → cache-identity short circuit →
//! decode → geometry → pipeline → encode → cache write → srcset/placeholder
//! variants → output variables.
//!
//! Recovery order for an unreadable source: fallback source, then a solid
//! background fill at the requested size, then failure. Anything recoverable
//! logs and continues; anything fatal returns [`RenderError`] with no partial
//! cache artifact.

use ab_glyph::FontVec;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::{debug, warn};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::cache::{self, CacheEntry, CacheLog, SweepStats};
use crate::codec::{self, ImageCodec, ImageRsCodec};
use crate::color::Color;
use crate::config::EngineConfig;
use crate::geometry;
use crate::identity::{self, ImageIdentity};
use crate::mask;
use crate::pipeline::{self, PipelineError};
use crate::placeholder;
use crate::request::{
    CacheTtl, ImageRequest, LazyMode, OutputFormat, Quality, RequestOptions, Source,
};
use crate::services::{ColorExtractor, FaceDetector, GridColorExtractor, NoFaceDetector};
use crate::srcset;
use crate::storage::{FsStorage, Storage, StorageError};
use crate::vars::{self, OutputVars};

const SVG_MIME: &str = "image/svg+xml";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    /// Reserved: normalization repairs bad parameters instead of rejecting
    /// them, so the engine itself never returns this.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("crop window {want_w}x{want_h} exceeds source {have_w}x{have_h}")]
    GeometryViolation {
        want_w: u32,
        want_h: u32,
        have_w: u32,
        have_h: u32,
    },
    #[error("{step} failed: {reason}")]
    PipelineStep { step: &'static str, reason: String },
    #[error("cache write failed: {0}")]
    CacheWrite(#[from] StorageError),
}

impl From<PipelineError> for RenderError {
    fn from(err: PipelineError) -> RenderError {
        match err {
            PipelineError::Geometry {
                want_w,
                want_h,
                have_w,
                have_h,
            } => RenderError::GeometryViolation {
                want_w,
                want_h,
                have_w,
                have_h,
            },
            PipelineError::Step { step, reason } => RenderError::PipelineStep { step, reason },
        }
    }
}

/// The transformation engine. One instance serves many requests; all methods
/// take `&self` so batch callers can share it across rayon workers.
pub struct Engine {
    config: EngineConfig,
    codec: Arc<dyn ImageCodec>,
    storage: Arc<dyn Storage>,
    faces: Arc<dyn FaceDetector>,
    colors: Arc<dyn ColorExtractor>,
    font: Option<FontVec>,
    log: Mutex<CacheLog>,
}

impl Engine {
    /// Build an engine with the production services from config: the `image`
    /// codec, filesystem storage, no face detection, grid color extraction.
    pub fn new(config: EngineConfig) -> Engine {
        let storage = FsStorage::new(
            config.source_root.clone(),
            config.cache_dir.clone(),
            config.url_prefix.clone(),
        );
        Engine::with_services(
            config,
            Arc::new(ImageRsCodec::new()),
            Arc::new(storage),
            Arc::new(NoFaceDetector),
            Arc::new(GridColorExtractor),
        )
    }

    /// Build an engine with explicit services. Tests inject mocks here; a
    /// deployment with a real face detector plugs it in the same way.
    pub fn with_services(
        config: EngineConfig,
        codec: Arc<dyn ImageCodec>,
        storage: Arc<dyn Storage>,
        faces: Arc<dyn FaceDetector>,
        colors: Arc<dyn ColorExtractor>,
    ) -> Engine {
        let font = load_font(config.font_path.as_deref());
        let log = Mutex::new(CacheLog::load(Path::new(&config.cache_dir)));
        Engine {
            config,
            codec,
            storage,
            faces,
            colors,
            font,
            log,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Normalize raw options and render.
    pub fn render(&self, options: &RequestOptions) -> Result<OutputVars, RenderError> {
        let request = options.normalize(&self.config);
        self.render_request(&request)
    }

    /// Render an already-normalized request.
    pub fn render_request(&self, request: &ImageRequest) -> Result<OutputVars, RenderError> {
        let Some((bytes, source, using_fallback)) = self.source_bytes(request) else {
            return self.render_fill(request);
        };

        if source.extension().as_deref() == Some("svg") {
            return self.render_passthrough(request, &bytes, using_fallback);
        }

        let format = request
            .format
            .or_else(|| codec::sniff_format(&bytes))
            .unwrap_or(OutputFormat::Jpeg);
        let identity = identity::build(request, format, using_fallback, self.config.demo_mode);
        let file_name = identity.file_name();

        if self.cache_fresh(&file_name, request.ttl) {
            if let Some(hit) = self.cache_hit_vars(request, &identity, using_fallback) {
                debug!("cache hit {file_name}");
                return Ok(hit);
            }
        }

        let decoded = self.codec.decode(&bytes).map_err(|e| RenderError::PipelineStep {
            step: "decode",
            reason: e.to_string(),
        })?;
        let image = decoded.to_rgba8();
        let original = image.dimensions();
        let geometry = geometry::resolve(original, &request.geometry_spec());
        debug!(
            "{file_name}: {}x{} -> {}x{}",
            original.0, original.1, geometry.target_w, geometry.target_h
        );

        let watermark = self.load_watermark(request);
        let mask_image = self.load_mask(request);
        let steps = pipeline::build_steps(request, &geometry, original, watermark, mask_image);
        let outcome = pipeline::run(image, &steps, self.faces.as_ref(), self.font.as_ref())?;
        debug!("{file_name}: {} steps", outcome.steps_run);
        if outcome.masked && !format.supports_alpha() {
            debug!("{file_name}: transparency flattens over {}", request.background);
        }

        self.finish_render(request, &identity, outcome.image, using_fallback)
    }

    /// Sweep expired cache files and persist the pruned log.
    pub fn sweep(&self) -> std::io::Result<SweepStats> {
        let dir = Path::new(&self.config.cache_dir);
        let mut log = self.lock_log();
        let stats = cache::sweep_expired(dir, &mut log)?;
        log.save(dir)?;
        Ok(stats)
    }

    // -------------------------------------------------------------------
    // Source acquisition
    // -------------------------------------------------------------------

    /// Bytes of the first readable source, with the source that supplied
    /// them and whether it was the fallback. Failures log and move on.
    fn source_bytes<'r>(
        &self,
        request: &'r ImageRequest,
    ) -> Option<(Vec<u8>, &'r Source, bool)> {
        let candidates = [
            (request.source.as_ref(), false),
            (request.fallback.as_ref(), true),
        ];
        for (source, is_fallback) in candidates {
            let Some(source) = source else { continue };
            match self.load_source(source) {
                Ok(Some(bytes)) => return Some((bytes, source, is_fallback)),
                Ok(None) => warn!("source {} not found", source.reference()),
                Err(err) => warn!("source {}: {err}", source.reference()),
            }
        }
        None
    }

    fn load_source(&self, source: &Source) -> Result<Option<Vec<u8>>, StorageError> {
        match source {
            Source::Local(path) => self.storage.read(path),
            Source::Remote(url) => self.storage.fetch(url).map(Some),
        }
    }

    fn load_watermark(&self, request: &ImageRequest) -> Option<RgbaImage> {
        let spec = request.watermark.as_ref()?;
        let source = Source::parse(&spec.path)?;
        match self.load_source(&source) {
            Ok(Some(bytes)) => match self.codec.decode(&bytes) {
                Ok(img) => Some(img.to_rgba8()),
                Err(err) => {
                    warn!("watermark {}: {err}; skipping", spec.path);
                    None
                }
            },
            Ok(None) => {
                warn!("watermark {} not found; skipping", spec.path);
                None
            }
            Err(err) => {
                warn!("watermark {}: {err}; skipping", spec.path);
                None
            }
        }
    }

    fn load_mask(&self, request: &ImageRequest) -> Option<image::GrayImage> {
        let path = request.mask.as_ref()?;
        match self.storage.read(path) {
            Ok(Some(bytes)) => match self.codec.decode(&bytes) {
                Ok(img) => Some(mask::from_luma(&img.to_rgba8())),
                Err(err) => {
                    warn!("mask {}: {err}; skipping", path.display());
                    None
                }
            },
            Ok(None) => {
                warn!("mask {} not found; skipping", path.display());
                None
            }
            Err(err) => {
                warn!("mask {}: {err}; skipping", path.display());
                None
            }
        }
    }

    // -------------------------------------------------------------------
    // Degraded renders
    // -------------------------------------------------------------------

    /// No readable source at all: render a solid background fill at the
    /// requested size, or fail when the request names no size to fill.
    fn render_fill(&self, request: &ImageRequest) -> Result<OutputVars, RenderError> {
        if !request.wants_resize() {
            return Err(RenderError::SourceUnavailable(
                "no readable source and no dimensions for a solid fill".into(),
            ));
        }
        warn!("no readable source; rendering a solid fill");
        let geometry = geometry::resolve((0, 0), &request.geometry_spec());
        let format = request.format.unwrap_or(OutputFormat::Png);
        let identity = identity::build(request, format, true, self.config.demo_mode);

        if self.cache_fresh(&identity.file_name(), request.ttl) {
            if let Some(hit) = self.cache_hit_vars(request, &identity, true) {
                return Ok(hit);
            }
        }

        let fill = RgbaImage::from_pixel(
            geometry.target_w,
            geometry.target_h,
            request.background.to_rgba(),
        );
        self.finish_render(request, &identity, fill, true)
    }

    /// Sources the pipeline cannot rasterize (SVG) are cached byte-for-byte
    /// under their identity and reported with unknown (0×0) dimensions.
    fn render_passthrough(
        &self,
        request: &ImageRequest,
        bytes: &[u8],
        using_fallback: bool,
    ) -> Result<OutputVars, RenderError> {
        // The format slot only feeds the identity hash here; the bytes are
        // copied untouched.
        let hint = request.format.unwrap_or(OutputFormat::Jpeg);
        let identity = identity::build(request, hint, using_fallback, self.config.demo_mode);
        let file_name = format!("{}.svg", identity.stem());

        if request.lazy.enabled() || !request.srcset.is_empty() {
            warn!("{file_name}: vector passthrough skips srcset and placeholders");
        }

        let hit = self.cache_fresh(&file_name, request.ttl);
        {
            let mut log = self.lock_log();
            if hit {
                log.hit(&file_name);
            } else {
                self.storage.write(&file_name, bytes)?;
                let entry = CacheEntry {
                    width: 0,
                    height: 0,
                    mime: SVG_MIME.to_string(),
                    source: source_ref(request, using_fallback),
                    created: cache::unix_now(),
                    hits: 0,
                    ttl_secs: request.ttl.seconds().unwrap_or(0),
                };
                log.update(&file_name, entry, true);
            }
            self.save_log(&mut log);
        }

        let base64 = request.base64.then(|| vars::data_uri(SVG_MIME, bytes));
        Ok(OutputVars {
            url: file_name.clone(),
            url_prefixed: self.storage.url_for(&file_name),
            width: 0,
            height: 0,
            mime: SVG_MIME.to_string(),
            base64,
            srcset: None,
            sizes: None,
            placeholder_url: None,
            alt: request.alt.clone(),
            attributes: request.attributes.clone(),
            cache_hit: hit,
            fallback_used: using_fallback,
        })
    }

    // -------------------------------------------------------------------
    // Cache interplay
    // -------------------------------------------------------------------

    /// Whether a cache file exists and its TTL has not lapsed. Unknown age
    /// counts as stale so a re-render recovers the metadata.
    fn cache_fresh(&self, file_name: &str, ttl: CacheTtl) -> bool {
        if !self.storage.exists(file_name) {
            return false;
        }
        match ttl {
            CacheTtl::Forever => true,
            CacheTtl::Seconds(limit) => self
                .storage
                .age(file_name)
                .map(|age| age.as_secs() <= limit)
                .unwrap_or(false),
        }
    }

    /// Assemble output variables for a fresh cache file without re-rendering.
    /// Returns `None` when the log has lost the entry's dimensions or any
    /// requested variant file is missing; the caller re-renders, which
    /// regenerates only the absent files.
    fn cache_hit_vars(
        &self,
        request: &ImageRequest,
        identity: &ImageIdentity,
        using_fallback: bool,
    ) -> Option<OutputVars> {
        let file_name = identity.file_name();
        let entry = {
            let log = self.lock_log();
            match log.get(&file_name) {
                Some(entry) if entry.width > 0 => entry.clone(),
                _ => return None,
            }
        };
        let (out_w, out_h) = (entry.width, entry.height);

        // Variant files share the primary's TTL tag, so their names are
        // reconstructible without the log. A hit must only name files that
        // exist: srcset widths or a placeholder added after the primary was
        // cached have no files yet, and a sweep can take a variant without
        // taking the primary.
        let planned = srcset::plan_widths(&request.srcset, out_w, request.allow_scale_larger);
        let variants: Vec<(String, u32)> = planned
            .into_iter()
            .map(|w| (identity.variant_file_name(&srcset::variant_suffix(w)), w))
            .collect();
        let placeholder_name = match request.lazy {
            LazyMode::Off => None,
            LazyMode::Blurred => Some(identity.variant_file_name(placeholder::LAZY_SUFFIX)),
            LazyMode::Dominant => Some(identity.variant_file_name(placeholder::DOMINANT_SUFFIX)),
        };
        let missing = variants
            .iter()
            .map(|(name, _)| name)
            .chain(placeholder_name.as_ref())
            .any(|name| !self.cache_fresh(name, request.ttl));
        if missing {
            debug!("{file_name}: cached without requested variants; re-rendering");
            return None;
        }

        {
            let mut log = self.lock_log();
            log.hit(&file_name);
            self.save_log(&mut log);
        }

        let variant_urls: Vec<(String, u32)> = variants
            .into_iter()
            .map(|(name, w)| (self.storage.url_for(&name), w))
            .collect();
        let srcset_attr = (!request.srcset.is_empty()).then(|| {
            srcset::srcset_attribute(&variant_urls, &self.storage.url_for(&file_name), out_w)
        });
        let sizes_attr = (!request.srcset.is_empty()).then(|| srcset::sizes_attribute(out_w));
        let placeholder_url = placeholder_name.map(|name| self.storage.url_for(&name));

        let base64 = if request.base64 {
            match self.storage.read_cache(&file_name) {
                Ok(Some(bytes)) => Some(vars::data_uri(identity.format.mime(), &bytes)),
                Ok(None) => None,
                Err(err) => {
                    warn!("{file_name}: base64 read failed: {err}");
                    None
                }
            }
        } else {
            None
        };

        Some(OutputVars {
            url: file_name.clone(),
            url_prefixed: self.storage.url_for(&file_name),
            width: out_w,
            height: out_h,
            mime: identity.format.mime().to_string(),
            base64,
            srcset: srcset_attr,
            sizes: sizes_attr,
            placeholder_url,
            alt: request.alt.clone(),
            attributes: request.attributes.clone(),
            cache_hit: true,
            fallback_used: using_fallback,
        })
    }

    // -------------------------------------------------------------------
    // Persistence and variant generation
    // -------------------------------------------------------------------

    /// Encode, cache, and log the rendered buffer, then generate srcset and
    /// placeholder variants and assemble the output variables.
    fn finish_render(
        &self,
        request: &ImageRequest,
        identity: &ImageIdentity,
        image: RgbaImage,
        using_fallback: bool,
    ) -> Result<OutputVars, RenderError> {
        let file_name = identity.file_name();
        let format = identity.format;
        let encoded = self.encode(&image, format, request.quality, request.background)?;
        self.storage.write(&file_name, &encoded)?;
        let (out_w, out_h) = image.dimensions();
        // Variants share the primary's stamp; only dimensions differ.
        let stamp = CacheEntry {
            width: out_w,
            height: out_h,
            mime: format.mime().to_string(),
            source: source_ref(request, using_fallback),
            created: cache::unix_now(),
            hits: 0,
            ttl_secs: request.ttl.seconds().unwrap_or(0),
        };
        let mut entries = vec![(file_name.clone(), stamp.clone())];

        let planned = srcset::plan_widths(&request.srcset, out_w, request.allow_scale_larger);
        let mut variant_urls = Vec::with_capacity(planned.len());
        for width in planned {
            let height = srcset::variant_height(width, (out_w, out_h));
            let name = identity.variant_file_name(&srcset::variant_suffix(width));
            if !self.cache_fresh(&name, request.ttl) {
                let resized = imageops::resize(&image, width, height, FilterType::Lanczos3);
                let bytes = self.encode(&resized, format, request.quality, request.background)?;
                self.storage.write(&name, &bytes)?;
                entries.push((
                    name.clone(),
                    CacheEntry {
                        width,
                        height,
                        ..stamp.clone()
                    },
                ));
            }
            variant_urls.push((self.storage.url_for(&name), width));
        }
        let srcset_attr = (!request.srcset.is_empty()).then(|| {
            srcset::srcset_attribute(&variant_urls, &self.storage.url_for(&file_name), out_w)
        });
        let sizes_attr = (!request.srcset.is_empty()).then(|| srcset::sizes_attribute(out_w));

        let placeholder_url = match request.lazy {
            LazyMode::Off => None,
            LazyMode::Blurred => {
                let name = identity.variant_file_name(placeholder::LAZY_SUFFIX);
                if !self.cache_fresh(&name, request.ttl) {
                    let preview = placeholder::lazy_preview(image.clone());
                    let quality = placeholder::lazy_quality();
                    let bytes = self.encode(&preview, format, quality, request.background)?;
                    self.storage.write(&name, &bytes)?;
                    entries.push((name.clone(), stamp.clone()));
                }
                Some(self.storage.url_for(&name))
            }
            LazyMode::Dominant => {
                let name = identity.variant_file_name(placeholder::DOMINANT_SUFFIX);
                if !self.cache_fresh(&name, request.ttl) {
                    let color = self.colors.extract(&image, self.config.dominant_samples);
                    let fill = placeholder::dominant_fill(color, out_w, out_h);
                    let bytes = self.encode(&fill, format, request.quality, request.background)?;
                    self.storage.write(&name, &bytes)?;
                    entries.push((name.clone(), stamp.clone()));
                }
                Some(self.storage.url_for(&name))
            }
        };

        {
            let mut log = self.lock_log();
            for (name, entry) in entries {
                log.update(&name, entry, true);
            }
            self.save_log(&mut log);
        }

        let base64 = request.base64.then(|| vars::data_uri(format.mime(), &encoded));
        Ok(OutputVars {
            url: file_name.clone(),
            url_prefixed: self.storage.url_for(&file_name),
            width: out_w,
            height: out_h,
            mime: format.mime().to_string(),
            base64,
            srcset: srcset_attr,
            sizes: sizes_attr,
            placeholder_url,
            alt: request.alt.clone(),
            attributes: request.attributes.clone(),
            cache_hit: false,
            fallback_used: using_fallback,
        })
    }

    fn encode(
        &self,
        image: &RgbaImage,
        format: OutputFormat,
        quality: Quality,
        background: Color,
    ) -> Result<Vec<u8>, RenderError> {
        self.codec
            .encode(image, format, quality, background)
            .map_err(|e| RenderError::PipelineStep {
                step: "encode",
                reason: e.to_string(),
            })
    }

    fn lock_log(&self) -> MutexGuard<'_, CacheLog> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The log is advisory (a lost entry just costs a re-render), so save
    /// failures warn instead of aborting a render that already succeeded.
    fn save_log(&self, log: &mut CacheLog) {
        if let Err(err) = log.save(Path::new(&self.config.cache_dir)) {
            warn!("cache log save: {err}");
        }
    }
}

/// The reference recorded in the log: whichever source actually supplied
/// the pixels.
fn source_ref(request: &ImageRequest, using_fallback: bool) -> String {
    let source = if using_fallback {
        request.fallback.as_ref().or(request.source.as_ref())
    } else {
        request.source.as_ref()
    };
    source.map(Source::reference).unwrap_or_default()
}

fn load_font(path: Option<&str>) -> Option<FontVec> {
    let path = path?;
    match std::fs::read(path) {
        Ok(bytes) => match FontVec::try_from_vec(bytes) {
            Ok(font) => Some(font),
            Err(err) => {
                warn!("font {path}: {err}; text overlays disabled");
                None
            }
        },
        Err(err) => {
            warn!("font {path}: {err}; text overlays disabled");
            None
        }
    }
}
