use std::net::UdpSocket;
use std::process::ExitCode;
use std::sync::Arc;

use cadence::{StatsdClient, UdpMetricSink};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use hubd::cfg::{self, Config};
use hubd::jobs::{backfill, revoke_messages};
use hubd::storage::db::RocksDB;
use hubd::storage::store::engine::HubEngine;
use hubd::storage::store::stores::StoreLimits;
use hubd::utils::statsd_wrapper::StatsdClientWrapper;
use rand::rngs::OsRng;
use tokio::signal::ctrl_c;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hubd", version, about = "Peer node for the hub network")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the state engine over a database
    Start {
        /// Override the configured database directory
        #[arg(long)]
        db_path: Option<String>,

        /// Wipe the database before starting
        #[arg(long)]
        clear_db: bool,
    },
    /// Node identity management
    Identity {
        #[command(subcommand)]
        command: IdentityCommands,
    },
    /// One-shot maintenance over an existing database
    Migration {
        #[command(subcommand)]
        command: MigrationCommands,
    },
}

#[derive(Subcommand)]
enum IdentityCommands {
    /// Generate a fresh node identity keypair
    Create,
}

#[derive(Subcommand)]
enum MigrationCommands {
    /// Rebuild the sync trie from the stored message set
    BackfillMessages,
    /// Replay the on-chain event log through the derived indices
    BackfillOnchainEvents,
}

fn init_tracing(config: &Config) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format.as_str() {
        "text" => tracing_subscriber::fmt().with_env_filter(env_filter).init(),
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init(),
        other => return Err(format!("Invalid log format: {}", other)),
    }
    Ok(())
}

fn make_statsd_client(config: &Config) -> StatsdClientWrapper {
    if config.statsd.addr.is_empty() {
        return StatsdClientWrapper::noop();
    }
    let socket = match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => socket,
        Err(err) => {
            error!("Unable to bind statsd socket, metrics disabled: {}", err);
            return StatsdClientWrapper::noop();
        }
    };
    match UdpMetricSink::from(config.statsd.addr.as_str(), socket) {
        Ok(sink) => {
            StatsdClientWrapper::new(StatsdClient::from_sink(config.statsd.prefix.as_str(), sink))
        }
        Err(err) => {
            error!("Unable to reach statsd server, metrics disabled: {}", err);
            StatsdClientWrapper::noop()
        }
    }
}

async fn run_start(config: Config, db_path: Option<String>, clear_db: bool) -> Result<(), String> {
    let db_dir = db_path.unwrap_or_else(|| config.rocksdb_dir.clone());

    if clear_db || config.clear_db {
        if std::path::Path::new(&db_dir).exists() {
            std::fs::remove_dir_all(&db_dir)
                .map_err(|e| format!("Failed to clear db at {}: {}", db_dir, e))?;
            info!(db_dir, "Cleared database");
        }
    }

    let network = config.fc_network().map_err(|e| e.to_string())?;
    let statsd = make_statsd_client(&config);

    let db = RocksDB::open_at(&db_dir).map_err(|e| format!("Unable to open db: {}", e))?;

    let engine = HubEngine::new(
        db,
        network,
        StoreLimits::default(),
        statsd,
        config.validation_workers,
    )
    .await
    .map_err(|e| format!("Unable to start engine: {}", e))?;
    let engine = Arc::new(engine);

    info!(
        network = network.as_str_name(),
        db_dir, "Engine started, listening for submissions"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let revoke_loop = tokio::spawn(revoke_messages::revoke_job_loop(
        engine.clone(),
        shutdown_rx,
    ));

    ctrl_c().await.map_err(|e| e.to_string())?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
    let _ = revoke_loop.await;
    Ok(())
}

fn run_identity_create() -> Result<(), String> {
    let signing_key = SigningKey::generate(&mut OsRng);
    let output = serde_json::json!({
        "public_key": hex::encode(signing_key.verifying_key().as_bytes()),
        "secret_key": hex::encode(signing_key.to_bytes()),
    });
    println!("{}", serde_json::to_string_pretty(&output).unwrap());
    Ok(())
}

async fn run_migration(config: Config, command: MigrationCommands) -> Result<(), String> {
    let db = RocksDB::open_at(&config.rocksdb_dir)
        .map_err(|e| format!("Unable to open db: {}", e))?;

    match command {
        MigrationCommands::BackfillMessages => {
            let count = backfill::backfill_messages(db)
                .await
                .map_err(|e| e.to_string())?;
            info!(count, "backfill-messages complete");
        }
        MigrationCommands::BackfillOnchainEvents => {
            let count = backfill::backfill_onchain_events(db)
                .await
                .map_err(|e| e.to_string())?;
            info!(count, "backfill-onchain-events complete");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cfg::load_and_merge_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_tracing(&config) {
        eprintln!("Config error: {}", e);
        return ExitCode::from(2);
    }

    let result = match cli.command {
        Commands::Start { db_path, clear_db } => run_start(config, db_path, clear_db).await,
        Commands::Identity {
            command: IdentityCommands::Create,
        } => run_identity_create(),
        Commands::Migration { command } => run_migration(config, command).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}
