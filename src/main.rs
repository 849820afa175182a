/// Version injected at compile time via SIDELOAD_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("SIDELOAD_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sideload::config::Config;
use sideload::resource::{install_registry, load_schema, Registry};
use sideload::{
    Document, IncludeTree, MemoryAdapter, RequestParams, RestAdapter, Sideloader, StorageAdapter,
};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Resolve include trees into compound documents
#[derive(Parser, Debug)]
#[command(name = "sideload", version = VERSION, about, long_about = None)]
struct Args {
    /// Base resource type
    resource: String,

    /// Resource schema file (YAML or JSON); defaults to the last one used
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Fixture file for the in-memory backend
    #[arg(short, long, conflicts_with = "endpoint")]
    data: Option<PathBuf>,

    /// REST backend base URL
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Include paths, e.g. `books.genre,dwelling`
    #[arg(short, long, default_value = "")]
    include: String,

    /// Request parameter file (YAML or JSON)
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Default page size
    #[arg(long)]
    page_size: Option<u32>,

    /// Paginate sideloaded types with the default page
    #[arg(long)]
    paginate_sideloads: bool,

    /// Pretty-print the document
    #[arg(long)]
    pretty: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // RUST_LOG narrows further, e.g. `sideload::sideload=trace`
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("sideload started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("sideload").join("sideload.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".sideload").join("sideload.log");
    }
    PathBuf::from("sideload.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    // Step 1: Load configuration
    let mut config = Config::load();

    // Step 2: Build and install the registry
    let registry = build_registry(&args, &mut config)?;

    // Step 3: Read the request
    let includes = IncludeTree::parse(&args.include);
    let params = match &args.params {
        Some(path) => load_params(path)?,
        None => RequestParams::default(),
    };

    // Step 4: Run against the selected backend
    let document = match (&args.data, config.effective_endpoint(args.endpoint.as_deref())) {
        (Some(data), _) => {
            let adapter = MemoryAdapter::load(data)
                .with_context(|| format!("loading fixture {}", data.display()))?;
            run_request(registry, &adapter, &args.resource, &includes, &params).await?
        }
        (None, Some(endpoint)) => {
            let adapter = RestAdapter::new(&endpoint)
                .with_context(|| format!("invalid endpoint {}", endpoint))?;
            run_request(registry, &adapter, &args.resource, &includes, &params).await?
        }
        (None, None) => {
            anyhow::bail!("No storage backend configured. Use --data or --endpoint")
        }
    };

    let output = if args.pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };
    println!("{}", output);

    Ok(())
}

fn build_registry(args: &Args, config: &mut Config) -> Result<&'static Registry> {
    let schema_path = config
        .effective_schema(args.schema.as_deref())
        .context("No schema file configured. Use --schema")?;

    let mut builder = load_schema(&schema_path)
        .with_context(|| format!("loading schema {}", schema_path.display()))?;

    let mut defaults = config.effective_page_defaults(builder.current_page_defaults());
    if let Some(size) = args.page_size {
        defaults.size = size;
    }
    if args.paginate_sideloads {
        defaults.paginate_sideloads = true;
    }
    builder.page_defaults(defaults);

    let registry = install_registry(builder.build()?)?;
    tracing::info!(
        "Loaded {} resource type(s) from {}",
        registry.resource_names().len(),
        schema_path.display()
    );

    if args.schema.is_some() {
        if let Err(e) = config.set_last_schema(&schema_path) {
            tracing::warn!("Failed to save config: {}", e);
        }
    }

    Ok(registry)
}

fn load_params(path: &Path) -> Result<RequestParams> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading parameters {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("parsing parameters {}", path.display()))
}

async fn run_request<A: StorageAdapter>(
    registry: &Registry,
    adapter: &A,
    resource: &str,
    includes: &IncludeTree,
    params: &RequestParams,
) -> Result<Document> {
    let sideloader = Sideloader::new(registry, adapter);
    sideloader
        .run(resource, includes, params)
        .await
        .with_context(|| format!("sideloading {}", resource))
}
