//! DraftSync Server - workout draft synchronization service
//!
//! Accepts full-snapshot draft syncs from clients and reconciles them into
//! the authoritative draft store.

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use draftsync_core::{
    DraftReconciler, IdentityProvider, ReconcilerOptions, ServerConfig, SqliteDraftStore, StaticTokenProvider,
    TokenFileProvider, Workout,
};
use draftsync_http::{Config, DraftHandler, json_error};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// DraftSync Server Configuration
#[derive(Parser, Debug)]
#[command(name = "draftsyncd")]
#[command(author = "DraftSync Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Workout draft synchronization server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server
    Start {
        /// Listen address (e.g., 0.0.0.0:8080)
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        addr: String,

        /// Data directory (database and draftsync.json)
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Token file (overrides tokens_file from draftsync.json)
        #[arg(long)]
        tokens: Option<PathBuf>,

        /// Development token in the form TOKEN:USER (repeatable)
        #[arg(long = "dev-token")]
        dev_tokens: Vec<String>,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Initialize a data directory (schema and default config)
    Init {
        /// Data directory
        data_dir: PathBuf,
    },

    /// Load workouts into the read model from a JSON file
    #[command(name = "import-workouts")]
    ImportWorkouts {
        /// Data directory
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// JSON array of {id, ownerId, name, exerciseIds}
        file: PathBuf,
    },
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { addr, data_dir, tokens, dev_tokens, debug } => {
            init_tracing(debug);
            start(&addr, &data_dir, tokens, &dev_tokens).await?;
        }

        Commands::Init { data_dir } => {
            init_tracing(false);
            std::fs::create_dir_all(&data_dir)
                .with_context(|| format!("Failed to create {:?}", data_dir))?;
            let config = ServerConfig::load(&data_dir)?;
            config.save(&data_dir)?;
            SqliteDraftStore::open(&config.database_path(&data_dir))?;
            println!("Initialized data directory at {}", data_dir.display());
            println!("  Database: {}", config.database_path(&data_dir).display());
            println!("  Config:   {}", data_dir.join("draftsync.json").display());
        }

        Commands::ImportWorkouts { data_dir, file } => {
            init_tracing(false);
            let config = ServerConfig::load(&data_dir)?;
            let store = SqliteDraftStore::open(&config.database_path(&data_dir))?;
            let data = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let workouts: Vec<Workout> = serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse workouts from {:?}", file))?;
            for w in &workouts {
                store.put_workout(w)?;
            }
            println!("Imported {} workouts", workouts.len());
        }
    }

    Ok(())
}

fn build_identity(config: &ServerConfig, data_dir: &Path, tokens: Option<PathBuf>, dev_tokens: &[String]) -> Result<Arc<dyn IdentityProvider>> {
    if !dev_tokens.is_empty() {
        warn!("Using {} development tokens; do not use in production", dev_tokens.len());
        let mut provider = StaticTokenProvider::new();
        for entry in dev_tokens {
            let (token, user) = entry
                .split_once(':')
                .ok_or_else(|| anyhow!("Invalid --dev-token {:?}, expected TOKEN:USER", entry))?;
            provider = provider.with_token(token, user);
        }
        return Ok(Arc::new(provider));
    }

    let path = tokens
        .or_else(|| config.tokens_file.clone())
        .ok_or_else(|| anyhow!("No token file configured (use --tokens or tokens_file)"))?;
    let path = if path.is_absolute() { path } else { data_dir.join(path) };
    let provider = TokenFileProvider::from_file(&path).map_err(|e| anyhow!(e))?;
    info!("Loaded tokens from {}", path.display());
    Ok(Arc::new(provider))
}

async fn start(addr: &str, data_dir: &Path, tokens: Option<PathBuf>, dev_tokens: &[String]) -> Result<()> {
    info!("Starting DraftSync server on {}", addr);
    info!("Data directory: {}", data_dir.display());

    std::fs::create_dir_all(data_dir).with_context(|| format!("Failed to create {:?}", data_dir))?;
    let config = ServerConfig::load(data_dir)?;
    let db_path = config.database_path(data_dir);
    let store = Arc::new(
        SqliteDraftStore::open(&db_path).with_context(|| format!("Failed to open draft store at {:?}", db_path))?,
    );
    info!("Draft store opened at {}", db_path.display());

    let identity = build_identity(&config, data_dir, tokens, dev_tokens)?;
    let reconciler = DraftReconciler::with_options(
        store,
        ReconcilerOptions { allow_empty_snapshots: config.allow_empty_snapshots },
    );
    let handler = Arc::new(DraftHandler::with_config(
        Config { max_body_size: config.max_body_size },
        reconciler,
        identity,
    ));

    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };
        let handler = handler.clone();
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(move |req| handle_request(req, handler.clone())))
                .await
            {
                error!("Error serving connection from {}: {:?}", peer, e);
            }
        });
    }

    Ok(())
}

/// Handle incoming HTTP request
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    handler: Arc<DraftHandler<SqliteDraftStore>>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = match handler.handle(req).await {
        Ok(resp) => resp,
        Err(e) => {
            error!("Request error: {}", e);
            json_error(500, "Internal server error", None)
        }
    };

    info!("{} {} -> {}", method, uri, response.status());
    Ok(response)
}
