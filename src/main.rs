use clap::{Parser, Subcommand};
use enlarger::config;
use enlarger::render::Engine;
use enlarger::request::RequestOptions;
use rayon::prelude::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "enlarger")]
#[command(about = "On-demand image transformation and caching")]
#[command(long_about = "\
On-demand image transformation and caching

A request names a source image and describes the variant to produce. The
first render writes the variant into the cache directory under a
content-addressed name; identical requests afterwards are served straight
from that file without decoding the source again.

  enlarger render photo.jpg --width 300
  enlarger render photo.jpg --width 300 --height 300 --crop true
  enlarger render photo.jpg --crop 'true|face' --width 200 --height 200
  enlarger render photo.jpg --filters 'grayscale|sharpen,120' --format webp
  enlarger render hero.jpg --width 1200 --srcset '480,800,1200' --lazy blur --tag
  enlarger render banner.png --text '© 2026|left,bottom|12,12|18|#ffffff'
  enlarger render *.jpg --max-width 1600 --quality 80

Sources resolve against source_root from enlarger.toml; http(s) URLs are
fetched. Multi-value specs pack their fields with '|':

  --crop       enable|position|offset|smart_scale|sensitivity
  --text       content|position|offset|size|color
  --watermark  path|position|offset|opacity
  --filters    name,args|name,args  (e.g. 'blur,5|colorize,40,0,0')

Cached variants carry their lifetime in the file name; run
'enlarger sweep' to purge expired ones.

Run 'enlarger gen-config' to print a documented enlarger.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = "enlarger.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render one or more sources into cached variants
    Render(Box<RenderArgs>),
    /// Delete expired cache files and their log entries
    Sweep,
    /// Print a stock enlarger.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Source images: paths under source_root, or http(s) URLs
    #[arg(required = true)]
    sources: Vec<String>,

    /// Source to render when the primary one cannot be read
    #[arg(long)]
    fallback: Option<String>,

    /// Output width in pixels
    #[arg(long)]
    width: Option<String>,

    /// Output height in pixels
    #[arg(long)]
    height: Option<String>,

    /// Lower bound for both dimensions
    #[arg(long)]
    min: Option<String>,

    /// Upper bound for both dimensions
    #[arg(long)]
    max: Option<String>,

    /// Lower bound for the width
    #[arg(long)]
    min_width: Option<String>,

    /// Lower bound for the height
    #[arg(long)]
    min_height: Option<String>,

    /// Upper bound for the width
    #[arg(long)]
    max_width: Option<String>,

    /// Upper bound for the height
    #[arg(long)]
    max_height: Option<String>,

    /// Fit both given dimensions by shrinking instead of cropping
    #[arg(long)]
    fit: Option<String>,

    /// Crop to the target instead of distorting: enable|position|offset|smart|sensitivity
    #[arg(long)]
    crop: Option<String>,

    /// Filter chain, e.g. 'grayscale|sharpen,120'
    #[arg(long)]
    filters: Option<String>,

    /// Mirror the image: 'horizontal', 'vertical' or 'both'
    #[arg(long)]
    flip: Option<String>,

    /// Rotation: degrees, optionally '|background' for the uncovered corners
    #[arg(long)]
    rotate: Option<String>,

    /// Text caption: content|position|offset|size|color
    #[arg(long)]
    text: Option<String>,

    /// Watermark image: path|position|offset|opacity
    #[arg(long)]
    watermark: Option<String>,

    /// Border: width|color or per-side widths
    #[arg(long)]
    border: Option<String>,

    /// Rounded corners: radius, optionally per-corner toggles
    #[arg(long)]
    rounded_corners: Option<String>,

    /// Mirror-fade reflection below the image: height|start|end|gap
    #[arg(long)]
    reflection: Option<String>,

    /// Grayscale mask image applied to the alpha channel
    #[arg(long)]
    mask: Option<String>,

    /// Output format: jpg, png, webp or gif (default: keep source format)
    #[arg(long)]
    format: Option<String>,

    /// Lossy encode quality, 1-100
    #[arg(long)]
    quality: Option<String>,

    /// Comma-separated widths for a responsive srcset
    #[arg(long)]
    srcset: Option<String>,

    /// Lazy-load placeholder: 'blur' or 'dominant'
    #[arg(long)]
    lazy: Option<String>,

    /// Permit scaling past the source dimensions
    #[arg(long)]
    allow_scale_larger: bool,

    /// Cache lifetime for this render, in seconds
    #[arg(long)]
    cache_ttl: Option<String>,

    /// Explicit cache basename, replacing the source-derived one
    #[arg(long)]
    filename: Option<String>,

    /// Background color for flattening and rotation fill
    #[arg(long)]
    background: Option<String>,

    /// Also emit the encoded bytes as a data: URI
    #[arg(long)]
    base64: bool,

    /// Print a ready <img> tag instead of the bare URL
    #[arg(long)]
    tag: bool,

    /// Alt text for the <img> tag
    #[arg(long)]
    alt: Option<String>,

    /// Extra attribute text spliced into the <img> tag
    #[arg(long)]
    attributes: Option<String>,
}

impl RenderArgs {
    /// The request options for one source, shared flags cloned in.
    fn options_for(&self, src: &str) -> RequestOptions {
        RequestOptions {
            src: Some(src.to_string()),
            fallback_src: self.fallback.clone(),
            width: self.width.clone(),
            height: self.height.clone(),
            min: self.min.clone(),
            max: self.max.clone(),
            min_width: self.min_width.clone(),
            min_height: self.min_height.clone(),
            max_width: self.max_width.clone(),
            max_height: self.max_height.clone(),
            fit: self.fit.clone(),
            crop: self.crop.clone(),
            filters: self.filters.clone(),
            flip: self.flip.clone(),
            rotate: self.rotate.clone(),
            text: self.text.clone(),
            watermark: self.watermark.clone(),
            border: self.border.clone(),
            rounded_corners: self.rounded_corners.clone(),
            reflection: self.reflection.clone(),
            mask: self.mask.clone(),
            format: self.format.clone(),
            quality: self.quality.clone(),
            srcset: self.srcset.clone(),
            lazy: self.lazy.clone(),
            allow_scale_larger: self.allow_scale_larger.then(|| "true".to_string()),
            cache_ttl: self.cache_ttl.clone(),
            filename: self.filename.clone(),
            background: self.background.clone(),
            base64: self.base64.then(|| "true".to_string()),
            auto_tag: self.tag.then(|| "true".to_string()),
            alt: self.alt.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Command::Render(args) => {
            init_thread_pool(&config.processing);
            render_batch(Engine::new(config), &args)?;
        }
        Command::Sweep => {
            let engine = Engine::new(config);
            let stats = engine.sweep()?;
            println!("Sweep complete: {stats}");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Render every source in parallel, then print results in input order.
fn render_batch(engine: Engine, args: &RenderArgs) -> Result<(), Box<dyn std::error::Error>> {
    let results: Vec<_> = args
        .sources
        .par_iter()
        .map(|src| (src, engine.render(&args.options_for(src))))
        .collect();

    let mut failed = 0u32;
    for (src, result) in results {
        match result {
            Ok(vars) => {
                if args.tag {
                    println!("{}", vars.img_tag().into_string());
                } else {
                    let state = if vars.cache_hit { "cached" } else { "rendered" };
                    println!(
                        "{} {}x{} {} ({state})",
                        vars.url_prefixed, vars.width, vars.height, vars.mime
                    );
                    if let Some(data_uri) = &vars.base64 {
                        println!("{data_uri}");
                    }
                }
            }
            Err(err) => {
                eprintln!("{src}: {err}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {} renders failed", args.sources.len()).into());
    }
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; users can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
