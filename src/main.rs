use clap::{Parser, Subcommand};
use media_resizer::config::{self, ServiceConfig};
use media_resizer::pipeline::Pipeline;
use media_resizer::server::{self, AppState};
use media_resizer::types::{DeclaredFormat, ResizeRequest};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "media-resizer")]
#[command(about = "HTTP image resizing service with a content-addressed cache")]
#[command(long_about = "\
HTTP image resizing service with a content-addressed cache

Uploads are resized to the requested width and height and stored under a
fingerprint of the request. An identical upload is answered from storage
without decoding anything.

  POST /upload   multipart form: image (file), width, height
                 → 201 {\"path\": \"media/<fingerprint>.<ext>\"}
  GET  /health   liveness check

A 0 width or height is derived from the source aspect ratio.
Supported formats: JPEG, PNG (static) and GIF (animated, per-frame palettes).

Run 'media-resizer gen-config' to generate a documented config.toml.
Set RUST_LOG (e.g. RUST_LOG=media_resizer=debug) to adjust logging.")]
#[command(version)]
struct Cli {
    /// Service config file (defaults apply to anything it omits)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Listen address, overriding server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Resize one local file through the same pipeline and cache
    Resize {
        /// Image to resize
        input: PathBuf,
        /// Target width (0 = derive from height)
        #[arg(long)]
        width: Option<u32>,
        /// Target height (0 = derive from width)
        #[arg(long)]
        height: Option<u32>,
        /// Declared media type; inferred from the file extension when omitted
        #[arg(long)]
        media_type: Option<String>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Serve { bind } => {
            let config = config::load_config(cli.config.as_deref())?;
            init_thread_pool(&config.processing);
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let state = AppState::new(Pipeline::from_config(&config)?, &config);

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(server::serve(state, &bind))?;
        }
        Command::Resize {
            input,
            width,
            height,
            media_type,
        } => {
            let config = config::load_config(cli.config.as_deref())?;
            init_thread_pool(&config.processing);
            let request = local_request(&config, &input, width, height, media_type.as_deref())?;
            let pipeline = Pipeline::from_config(&config)?;
            let resolved = pipeline.handle(&request)?;
            let status = if resolved.cache_hit { "cached" } else { "resized" };
            println!("{} ({status})", resolved.path);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: the config can lower it, never raise it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Build a request from a local file, filling gaps from config defaults.
fn local_request(
    config: &ServiceConfig,
    input: &Path,
    width: Option<u32>,
    height: Option<u32>,
    media_type: Option<&str>,
) -> Result<ResizeRequest, Box<dyn std::error::Error>> {
    let format = match media_type {
        Some(media_type) => DeclaredFormat::from_media_type(media_type)?,
        None => DeclaredFormat::from_path(input)?,
    };
    let source_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(ResizeRequest {
        source_name,
        width: width.unwrap_or(config.images.default_width),
        height: height.unwrap_or(config.images.default_height),
        format,
        content: std::fs::read(input)?,
    })
}
