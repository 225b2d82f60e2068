//! draftsync: command-line client for the workout draft server.
//!
//! # Usage
//!
//! ```bash
//! # Push a snapshot file (array of sets or {"loggedSets": [...]})
//! draftsync --server http://localhost:8080 --token $TOKEN push w1 sets.json
//!
//! # Show the current draft
//! draftsync show w1
//!
//! # Abandon the current draft
//! draftsync abandon w1
//! ```

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use draftsync_client::{ChannelListener, ClientConfig, DraftApi, HttpDraftApi, SyncEvent, SyncTrack, SyncTransport};
use draftsync_core::LoggedSetDraft;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "draftsync")]
#[command(author = "DraftSync Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Workout draft synchronization client")]
struct Cli {
    /// Client config file (JSON)
    #[arg(short, long, default_value = "draftsync-client.json")]
    config: PathBuf,

    /// Server URL (overrides the config file)
    #[arg(long)]
    server: Option<String>,

    /// Bearer token (overrides the config file)
    #[arg(long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replace the server draft with the sets in a JSON file
    Push {
        /// Workout id
        workout: String,
        /// Snapshot file
        file: PathBuf,
    },

    /// Show the current draft of a workout
    Show {
        /// Workout id
        workout: String,
    },

    /// Abandon the current draft of a workout
    Abandon {
        /// Workout id
        workout: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::load(&cli.config)?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(token) = cli.token {
        config.token = Some(token);
    }

    let api = HttpDraftApi::new(&config.server_url, config.token.clone(), config.request_timeout())
        .with_context(|| format!("Failed to create client for {}", config.server_url))?;

    match cli.command {
        Commands::Push { workout, file } => push(&config, api, &workout, &file).await,
        Commands::Show { workout } => show(&api, &workout).await,
        Commands::Abandon { workout } => {
            api.abandon_draft(&workout).await?;
            println!("Abandoned draft for workout {}", workout);
            Ok(())
        }
    }
}

fn read_snapshot(file: &Path) -> Result<Vec<LoggedSetDraft>> {
    let data = std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let value: Value = serde_json::from_str(&data).with_context(|| format!("Failed to parse {:?}", file))?;
    let sets = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => map
            .remove("loggedSets")
            .ok_or_else(|| anyhow!("{:?} has no loggedSets array", file))?,
        _ => return Err(anyhow!("{:?} must hold an array of sets", file)),
    };
    serde_json::from_value(sets).with_context(|| format!("Invalid set in {:?}", file))
}

async fn push(config: &ClientConfig, api: HttpDraftApi, workout: &str, file: &Path) -> Result<()> {
    let sets = read_snapshot(file)?;
    let (listener, mut events) = ChannelListener::new();
    let transport = SyncTransport::new(Arc::new(api), Arc::new(listener), config.transport_config());

    let printer = tokio::spawn(async move {
        let mut synced = false;
        while let Some(event) = events.recv().await {
            match event {
                SyncEvent::Started { count } => println!("Syncing {} sets...", count),
                SyncEvent::RetryStarted => println!("Retrying..."),
                SyncEvent::Failed { message, will_retry: true } => println!("  failed: {} (will retry)", message),
                SyncEvent::Failed { message, will_retry: false } => println!("  failed: {}", message),
                SyncEvent::Succeeded { count } => {
                    println!("Synced {} sets", count);
                    synced = true;
                }
            }
        }
        synced
    });

    let first = transport.sync(workout, sets, SyncTrack::Manual).await;
    transport.settle().await;
    drop(transport);
    let synced = printer.await.unwrap_or(false);

    if let Err(e) = first {
        if !e.invalid_exercise_ids().is_empty() {
            println!("  Exercises not in workout: {}", e.invalid_exercise_ids().join(", "));
        }
        return Err(e.into());
    }
    if !synced {
        return Err(anyhow!("Snapshot for workout {} was not synced", workout));
    }
    Ok(())
}

async fn show(api: &HttpDraftApi, workout: &str) -> Result<()> {
    let Some(draft) = api.fetch_draft(workout).await? else {
        println!("No draft for workout {}", workout);
        return Ok(());
    };

    println!("Draft:        {}", draft.id);
    println!("Status:       {}", draft.status);
    println!("Last updated: {}", draft.last_updated);
    println!("Sets:         {}", draft.sets.len());
    for set in &draft.sets {
        let mut line = format!(
            "  {:<20} #{:<3} {:>3} reps @ {} {}",
            set.exercise_id, set.set_number, set.reps, set.weight, set.weight_unit
        );
        if let Some(rpe) = set.rpe {
            line.push_str(&format!("  RPE {}", rpe));
        }
        if let Some(rir) = set.rir {
            line.push_str(&format!("  RIR {}", rir));
        }
        println!("{}", line);
    }
    Ok(())
}
