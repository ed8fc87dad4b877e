use clap::{Parser, Subcommand};
use imgsync::config::{self, SyncConfig};
use imgsync::imaging::RustBackend;
use imgsync::matrix::resolve_variants;
use imgsync::output;
use imgsync::pipeline::{Pipeline, SyncEvent, SyncOptions};
use imgsync::report::SyncReport;
use imgsync::store::{S3Store, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Object store connection and bucket names.
///
/// Every flag can also come from the environment (or a `.env` file).
#[derive(clap::Args, Clone)]
struct StoreArgs {
    /// S3-compatible endpoint URL (omit for AWS)
    #[arg(long, env = "S3_ENDPOINT")]
    endpoint: Option<String>,

    /// Region name
    #[arg(long, env = "S3_REGION", default_value = "auto")]
    region: String,

    /// Access key ID
    #[arg(long, env = "S3_ACCESS_KEY", hide_env_values = true)]
    access_key: String,

    /// Secret access key
    #[arg(long, env = "S3_SECRET_KEY", hide_env_values = true)]
    secret_key: String,

    /// Bucket holding unmodified source images
    #[arg(long, env = "ORIGINALS_BUCKET")]
    originals_bucket: String,

    /// Bucket receiving resized variants
    #[arg(long, env = "PROCESSED_BUCKET")]
    processed_bucket: String,
}

impl StoreArgs {
    fn connect(&self) -> Result<Arc<S3Store>, Box<dyn std::error::Error>> {
        let store = S3Store::new(StoreConfig {
            endpoint_url: self.endpoint.clone(),
            region: self.region.clone(),
            access_key_id: self.access_key.clone(),
            secret_access_key: self.secret_key.clone(),
        })?;
        Ok(Arc::new(store))
    }
}

#[derive(Parser)]
#[command(name = "imgsync")]
#[command(about = "Sync a local image tree to object storage with resized variants")]
#[command(long_about = "\
Sync a local image tree to object storage with resized variants

Every image under --source is uploaded to the originals bucket together with
a matrix of derivatives in the processed bucket. Images whose MD5 matches the
ETag of their original in the store are skipped, so reruns only touch new or
edited files.

Key layout:

  local      <source>/reviews/2021/cover.jpg
  originals  reviews/2021/cover.jpg
  processed  reviews/2021/cover-small-square.webp
             reviews/2021/cover-small-square.jpg      ([original] format)

The original is written last, only after every variant was stored. An image
that fails is left without an original and is retried on the next run.

Run 'imgsync gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Local image root
    #[arg(long, default_value = "data/images", global = true)]
    source: PathBuf,

    /// Matrix/encoding config (TOML, or JSON when the name ends in .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Maximum images processed at once (overrides processing.max_jobs)
    #[arg(long, global = true)]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload new and changed images with all their variants
    Sync(StoreArgs),
    /// Show which images a sync would process, without writing anything
    Plan(StoreArgs),
    /// Print the resolved variant matrix
    Variants,
    /// Print a stock config file with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match &cli.command {
        Command::Sync(store_args) => {
            let config = load(&cli)?;
            init_thread_pool(&config.processing);
            let (tx, printer) = spawn_printer();
            let report = run(&cli, &config, store_args, false, tx).await;
            join_printer(printer);
            let report = report?;
            println!();
            output::print_report(&report);
            if report.has_failures() {
                std::process::exit(1);
            }
        }
        Command::Plan(store_args) => {
            let config = load(&cli)?;
            let (tx, printer) = spawn_printer();
            let report = run(&cli, &config, store_args, true, tx).await;
            join_printer(printer);
            let report = report?;
            output::print_plan(&report);
            println!();
            output::print_report(&report);
        }
        Command::Variants => {
            let config = load(&cli)?;
            output::print_variants(&resolve_variants(&config));
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load config and apply CLI overrides.
fn load(cli: &Cli) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(jobs) = cli.jobs {
        config.processing.max_jobs = jobs;
        config.validate()?;
    }
    Ok(config)
}

async fn run(
    cli: &Cli,
    config: &SyncConfig,
    store_args: &StoreArgs,
    dry_run: bool,
    events: Sender<SyncEvent>,
) -> Result<SyncReport, Box<dyn std::error::Error>> {
    let store = store_args.connect()?;
    let mut options =
        SyncOptions::new(&store_args.originals_bucket, &store_args.processed_bucket)
            .with_processing(config);
    options.dry_run = dry_run;

    info!(
        source = %cli.source.display(),
        max_jobs = options.max_jobs,
        dry_run,
        "Starting sync"
    );
    let pipeline =
        Pipeline::new(store, Arc::new(RustBackend::new()), config, options).with_events(events);
    Ok(pipeline.run(&cli.source).await?)
}

/// Print progress events on a dedicated thread as they arrive.
fn spawn_printer() -> (Sender<SyncEvent>, JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_sync_event(&event) {
                println!("{}", line);
            }
        }
    });
    (tx, printer)
}

fn join_printer(printer: JoinHandle<()>) {
    if printer.join().is_err() {
        eprintln!("progress printer panicked");
    }
}

/// Diagnostics go to stderr; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("imgsync=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(env_filter)
            .init();
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. User can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
