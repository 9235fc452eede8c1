//! Glossa Server - HTTP API for language identification and named-entity recognition

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod error;
mod state;

use glossa_core::{
    BertNerLoader, GlossaConfig, LanguageDetector, ModelDownloader, ModelId, ModelRegistry,
    NerModelCache,
};
use state::AppState;

/// Glossa - language identification and named-entity recognition server
///
/// Examples:
///   glossa-server                         # Start the server
///   glossa-server pull --langid           # Download the fastText model
///   glossa-server pull en fr              # Download NER models for en and fr
///   glossa-server pull --all              # Download every registered NER model
#[derive(Parser)]
#[command(name = "glossa-server", version = env!("CARGO_PKG_VERSION"), propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(long, global = true, value_name = "PATH", env = "GLOSSA_CONFIG")]
    config: Option<PathBuf>,

    /// Models directory
    #[arg(short, long, global = true, env = "GLOSSA_MODELS_DIR")]
    models_dir: Option<PathBuf>,

    /// Path to the fastText language identification model
    #[arg(long, global = true, env = "GLOSSA_LANGID_MODEL")]
    langid_model: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    #[command(name = "serve", alias = "server")]
    Serve(ServeArgs),

    /// Install model packages into the models directory
    #[command(name = "pull", alias = "download")]
    Pull(PullArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Host to bind to
    #[arg(short = 'H', long, env = "GLOSSA_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "GLOSSA_PORT")]
    port: Option<u16>,

    /// Maximum concurrent requests
    #[arg(long, env = "GLOSSA_MAX_CONCURRENT")]
    max_concurrent: Option<usize>,

    /// Request timeout in seconds
    #[arg(long, env = "GLOSSA_TIMEOUT")]
    timeout: Option<u64>,

    /// Languages to load at startup
    #[arg(long, value_delimiter = ',')]
    preload: Vec<String>,
}

#[derive(Args)]
struct PullArgs {
    /// Language codes or model ids (e.g. `en`, `dslim/bert-base-NER`)
    models: Vec<String>,

    /// Pull every model in the NER registry
    #[arg(long)]
    all: bool,

    /// Pull the fastText language identification model
    #[arg(long)]
    langid: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glossa_server=debug,glossa_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GlossaConfig::from_file(path)?,
        None => GlossaConfig::default(),
    };
    if let Some(models_dir) = cli.models_dir {
        config.models_dir = models_dir;
    }
    if let Some(langid_model) = cli.langid_model {
        config.langid_model_path = Some(langid_model);
    }

    let registry = ModelRegistry::default().with_overrides(&config.ner_models)?;

    match cli.command.unwrap_or_else(|| Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => serve(config, registry, args).await,
        Commands::Pull(args) => pull(config, registry, args).await,
    }
}

async fn serve(
    mut config: GlossaConfig,
    registry: ModelRegistry,
    args: ServeArgs,
) -> anyhow::Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(max_concurrent) = args.max_concurrent {
        config.server.max_concurrent_requests = max_concurrent;
    }
    if let Some(timeout) = args.timeout {
        config.server.request_timeout_secs = timeout;
    }
    config.preload_languages.extend(args.preload);

    info!("Starting Glossa server");
    info!("Models directory: {:?}", config.models_dir);
    info!("NER languages: {}", registry.supported_languages().join(", "));

    let loader = Arc::new(BertNerLoader::new(config.models_dir.clone()));
    let cache = NerModelCache::new(registry, loader);
    cache.preload(&config.preload_languages).await;

    let langid_path = config.langid_model_path();
    let langid = {
        let path = langid_path.clone();
        match tokio::task::spawn_blocking(move || LanguageDetector::load_fasttext(&path)).await? {
            Ok(detector) => Some(detector),
            Err(err) => {
                warn!("Language detection disabled: {}", err);
                None
            }
        }
    };

    let state = AppState::new(cache, langid, langid_path, &config.server);
    let app = api::create_router(state.clone(), config.server.cors_enabled);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.ner.clear().await;
    info!("NER models released");
    Ok(())
}

async fn pull(config: GlossaConfig, registry: ModelRegistry, args: PullArgs) -> anyhow::Result<()> {
    let mut targets = BTreeSet::new();
    if args.all {
        targets.extend(registry.model_ids());
    }
    for name in &args.models {
        let model_id = match registry.resolve(name) {
            Ok(model_id) => model_id.clone(),
            Err(_) => ModelId::new(name.as_str()),
        };
        targets.insert(model_id);
    }

    if targets.is_empty() && !args.langid {
        anyhow::bail!("Nothing to pull: name a language code or model id, or pass --all / --langid");
    }

    let langid_path = args.langid.then(|| config.langid_model_path());
    let models_dir = config.models_dir;

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let downloader = ModelDownloader::new(models_dir)?;
        if let Some(path) = langid_path {
            downloader.pull_langid(&path)?;
        }
        for model_id in &targets {
            let path = downloader.pull_ner(model_id)?;
            info!("{} ready at {:?}", model_id, path);
        }
        Ok(())
    })
    .await?
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}
