use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod batch;
mod config;
mod error;
mod output;
mod rasterizer;
mod rasterizers;
mod report;
mod segmentation;
mod server;
mod source;

use config::LayoutArgs;
use error::CutError;

#[derive(Parser, Debug)]
#[command(name = "exam-cutter")]
#[command(about = "Split scanned exam pages into per-question images")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "CUTTER_LOG_JSON", global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Segment every PDF, JPG and PNG in a directory
    Cut(CutArgs),
    /// Serve segmentation over HTTP
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
pub struct CutArgs {
    /// Directory holding the exam pages
    #[arg(long, env = "CUTTER_INPUT")]
    pub input: PathBuf,

    /// Directory receiving question crops and the batch report
    #[arg(long, env = "CUTTER_OUTPUT")]
    pub output: PathBuf,

    /// Directory for debug overlays (defaults to the output directory)
    #[arg(long, env = "CUTTER_DEBUG_DIR")]
    pub debug_dir: Option<PathBuf>,

    /// Pages processed concurrently (defaults to available cores)
    #[arg(long, env = "CUTTER_JOBS")]
    pub jobs: Option<usize>,

    /// Pixels per PDF point when rasterizing
    #[arg(long, env = "CUTTER_PDF_SCALE", default_value_t = 2.0)]
    pub pdf_scale: f32,

    /// JPEG quality of written crops and overlays
    #[arg(long, env = "CUTTER_JPEG_QUALITY", default_value_t = 90)]
    pub jpeg_quality: u8,

    #[command(flatten)]
    pub layout: LayoutArgs,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Host address to bind to
    #[arg(long, env = "CUTTER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "CUTTER_PORT", default_value = "9393")]
    pub port: u16,

    /// Maximum upload size in bytes (default: 50MB)
    #[arg(long, env = "CUTTER_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Pixels per PDF point when rasterizing
    #[arg(long, env = "CUTTER_PDF_SCALE", default_value_t = 2.0)]
    pub pdf_scale: f32,

    #[command(flatten)]
    pub layout: LayoutArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| args.log_level.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting exam-cutter v{}", env!("CARGO_PKG_VERSION"));

    let rasterizer = rasterizers::default_rasterizer();

    match args.command {
        Command::Cut(cut) => {
            let config = Arc::new(config::Config::try_from(cut)?);
            run_cut(config, rasterizer).await
        }
        Command::Serve(serve) => {
            let config = config::ServerConfig::try_from(serve)?;
            tracing::info!("Binding to {}:{}", config.host, config.port);
            server::run(config, rasterizer).await
        }
    }
}

async fn run_cut(
    config: Arc<config::Config>,
    rasterizer: Arc<dyn rasterizer::Rasterizer>,
) -> anyhow::Result<()> {
    let report = match batch::run(Arc::clone(&config), rasterizer).await {
        Ok(report) => report,
        Err(CutError::NoInput(dir)) => {
            tracing::warn!(input = %dir.display(), "No .pdf, .jpg or .png files to process");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let report_path = config.output.join(report::REPORT_FILE);
    report.write_json(&report_path)?;

    println!(
        "Segmented {} page(s) from {} file(s) into {} question(s); {} page(s) and {} file(s) failed. Report: {}",
        report.pages_processed - report.pages_failed,
        report.files.len(),
        report.questions,
        report.pages_failed,
        report.files_failed,
        report_path.display()
    );

    Ok(())
}
