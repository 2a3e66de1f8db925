use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mordant_cache::CacheStore;
use mordant_config::{AssetRequirement, Settings, WorkflowGraph};
use mordant_engine::{
  ProvisionError, Provisioner, ProvisionerConfig, RemoteLayout, TracingNotifier,
};
use mordant_fetch::{Fetcher, HttpFetcher};
use mordant_registry::{Registry, UrlPolicy};
use mordant_scanner::{HandlerManifest, HandlerTable, Scanner};

/// Mordant - provisions the model assets a workflow graph needs
#[derive(Parser)]
#[command(name = "mordant")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.mordant)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Cache root for assets (default: <data-dir>/models)
  #[arg(long, global = true)]
  cache_dir: Option<PathBuf>,

  /// Registry of sanctioned assets (default: <data-dir>/registry.json)
  #[arg(long, global = true)]
  registry: Option<PathBuf>,

  /// Handler manifest from the node installer (default: <data-dir>/handlers.json)
  #[arg(long, global = true)]
  handlers: Option<PathBuf>,

  /// Settings file (default: <data-dir>/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Number of assets resolved in parallel
  #[arg(long, global = true)]
  concurrency: Option<usize>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// List the assets a workflow needs
  Scan {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Fetch every asset a workflow needs into the cache
  Provision {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Fetch the assets installed node types always need
  Prepare,
}

/// Paths and settings shared by every subcommand.
struct Setup {
  data_dir: PathBuf,
  cache_dir: PathBuf,
  registry_file: PathBuf,
  handlers_file: Option<PathBuf>,
  settings: Settings,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "mordant=info".into()))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let Some(command) = cli.command else {
    println!("mordant - use --help to see available commands");
    return Ok(());
  };

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".mordant"),
  };

  let config_file = cli.config.unwrap_or_else(|| data_dir.join("config.json"));
  let mut settings = Settings::load_or_default(&config_file)
    .with_context(|| format!("failed to load settings: {}", config_file.display()))?;
  if let Some(concurrency) = cli.concurrency {
    settings.concurrency = concurrency;
  }

  let ctx = Setup {
    cache_dir: cli.cache_dir.unwrap_or_else(|| data_dir.join("models")),
    registry_file: cli.registry.unwrap_or_else(|| data_dir.join("registry.json")),
    handlers_file: cli.handlers,
    data_dir,
    settings,
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Scan { workflow_file } => scan(&ctx, &workflow_file).await,
      Commands::Provision { workflow_file } => provision(&ctx, &workflow_file).await,
      Commands::Prepare => prepare(&ctx).await,
    }
  })
}

async fn scan(ctx: &Setup, workflow_file: &Path) -> Result<()> {
  let scanner = load_scanner(ctx).await?;
  let graph = load_workflow(workflow_file).await?;

  scanner.check_supported(&graph)?;
  let requirements = scanner.scan(&graph);
  eprintln!("Found {} asset(s) in {} node(s)", requirements.len(), graph.len());

  println!("{}", serde_json::to_string_pretty(requirements.as_slice())?);
  Ok(())
}

async fn provision(ctx: &Setup, workflow_file: &Path) -> Result<()> {
  let scanner = load_scanner(ctx).await?;
  let graph = load_workflow(workflow_file).await?;

  scanner.check_supported(&graph)?;
  let requirements = scanner.scan(&graph);
  eprintln!("Found {} asset(s) in {} node(s)", requirements.len(), graph.len());

  run_provisioner(ctx, requirements.as_slice()).await
}

async fn prepare(ctx: &Setup) -> Result<()> {
  let scanner = load_scanner(ctx).await?;
  let requirements = scanner.preload_requirements();
  eprintln!(
    "Preparing {} asset(s) for {} node type(s)",
    requirements.len(),
    scanner.handlers().len()
  );

  run_provisioner(ctx, requirements.as_slice()).await
}

async fn run_provisioner(ctx: &Setup, requirements: &[AssetRequirement]) -> Result<()> {
  let settings = &ctx.settings;

  let url_policy = match &settings.allowed_url_hosts {
    Some(hosts) => UrlPolicy::allow_hosts(hosts.iter().cloned()),
    None => UrlPolicy::allow_all(),
  };
  let registry = Registry::load(&ctx.registry_file)
    .await
    .with_context(|| format!("failed to load registry: {}", ctx.registry_file.display()))?
    .with_url_policy(url_policy);

  let cache = CacheStore::open(&ctx.cache_dir)
    .await
    .with_context(|| format!("failed to open cache: {}", ctx.cache_dir.display()))?;

  let fetcher: Arc<dyn Fetcher> = match &settings.auth_token {
    Some(token) => {
      let hosts = settings.token_hosts();
      if hosts.is_empty() {
        tracing::warn!("auth_token is set but no remote_base_url or auth_hosts; it will not be sent");
      }
      Arc::new(HttpFetcher::with_bearer_token(token, hosts)?)
    }
    None => Arc::new(HttpFetcher::new()?),
  };

  let layout = match &settings.remote_base_url {
    Some(base) => RemoteLayout::from_base(base)
      .with_context(|| format!("invalid remote_base_url: {}", base))?,
    None => RemoteLayout::default(),
  };

  let provisioner = Provisioner::new(Arc::new(registry), cache, fetcher, layout)
    .with_config(ProvisionerConfig::from_settings(settings))
    .with_notifier(TracingNotifier);

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      on_interrupt.cancel();
    }
  });

  match provisioner
    .provision(requirements, settings.concurrency, cancel)
    .await
  {
    Ok(resolved) => {
      eprintln!("All {} asset(s) ready", resolved.len());
      println!("{}", serde_json::to_string_pretty(&resolved)?);
      Ok(())
    }
    Err(ProvisionError::Failed(report)) => {
      println!("{}", serde_json::to_string_pretty(&report)?);
      Err(ProvisionError::Failed(report).into())
    }
    Err(e) => Err(e.into()),
  }
}

/// Build the scanner from the handler manifest, if there is one.
async fn load_scanner(ctx: &Setup) -> Result<Scanner> {
  let (path, required) = match &ctx.handlers_file {
    Some(path) => (path.clone(), true),
    None => (ctx.data_dir.join("handlers.json"), false),
  };

  let table = if required || tokio::fs::try_exists(&path).await? {
    HandlerManifest::load(&path)
      .await
      .with_context(|| format!("failed to load handler manifest: {}", path.display()))?
      .into_table()
  } else {
    HandlerTable::new()
  };
  tracing::debug!(handlers = table.len(), "loaded handler table");

  Ok(Scanner::new(Arc::new(table)))
}

async fn load_workflow(workflow_file: &Path) -> Result<WorkflowGraph> {
  let content = tokio::fs::read_to_string(workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  WorkflowGraph::from_json_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))
}
