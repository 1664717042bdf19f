//! Command-line interface for search-sync
//!
//! # Usage Examples
//!
//! ```bash
//! # Check a configuration file without connecting anywhere
//! search-sync --config search-sync.toml check-config
//!
//! # Record the binlog position, export the database, load the export
//! search-sync --config search-sync.toml mark-bootstrap
//! search-sync --config search-sync.toml bootstrap --input export.jsonl
//!
//! # Stream changes until SIGINT/SIGTERM
//! SEARCH_SYNC_SOURCE_URI=mysql://repl:secret@db:3306/nyaa \
//!   search-sync --config search-sync.toml --log-format json run
//!
//! # Inspect the stored positions
//! search-sync --config search-sync.toml show-position
//! ```

use anyhow::Context;
use checkpoint::{FilesystemStore, Loaded, SyncManager, SyncPhase};
use clap::{Parser, Subcommand, ValueEnum};
use index_mapping::Translator;
use opensearch_sink::{OpenSearchSink, OpenSearchSinkConfig};
use search_sync::bootstrap::{self, BootstrapOptions};
use search_sync::error::{SyncError, EXIT_OK};
use search_sync::pipeline::applier::Applier;
use search_sync::pipeline::backoff::ExponentialBackoff;
use search_sync::pipeline::metrics::SyncMetrics;
use search_sync::{resolve_start, Pipeline, PipelineSettings, SyncConfig};
use search_sync_mysql_binlog_source::{MySQLBinlogCheckpoint, MySQLBinlogSource, SourceOpts};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "search-sync")]
#[command(about = "Keep a search index in sync with a MySQL binlog")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, env = "SEARCH_SYNC_CONFIG", default_value = "search-sync.toml")]
    config: PathBuf,

    /// MySQL URI, overriding `source.uri`
    #[arg(long, env = "SEARCH_SYNC_SOURCE_URI", hide_env_values = true)]
    source_uri: Option<String>,

    /// Search engine URL, overriding `index.url`
    #[arg(long, env = "SEARCH_SYNC_INDEX_URL")]
    index_url: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream binlog changes into the index until interrupted
    Run,

    /// Record the current binlog position as the bootstrap marker
    MarkBootstrap,

    /// Load a JSONL export into the index and initialize the checkpoint
    Bootstrap {
        /// Export file, one `{"table": ..., "row": {...}}` object per line
        #[arg(long, value_name = "PATH")]
        input: PathBuf,

        /// Key column for mappings that don't name one
        #[arg(long, default_value = "id")]
        primary_key: String,
    },

    /// Print the stored checkpoint and bootstrap marker
    ShowPosition,

    /// Validate the configuration file and exit
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let code = match run(cli).await {
        Ok(()) => EXIT_OK,
        Err(e) => {
            error!(error = %e, "search-sync stopped with an error");
            eprintln!("Error: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<(), SyncError> {
    let config = SyncConfig::load(&cli.config, cli.source_uri, cli.index_url)
        .map_err(SyncError::Configuration)?;
    let checkpoints = SyncManager::new(
        Arc::new(FilesystemStore::new(&config.checkpoint.dir)),
        config.checkpoint.generation.clone(),
    );

    match cli.command {
        Commands::Run => run_sync(&config, checkpoints).await,
        Commands::MarkBootstrap => {
            let source = build_source(&config)?;
            let position = bootstrap::mark_bootstrap(&source, &checkpoints).await?;
            println!("{position}");
            Ok(())
        }
        Commands::Bootstrap { input, primary_key } => {
            let file = File::open(&input)
                .with_context(|| format!("Failed to open export file {}", input.display()))
                .map_err(SyncError::Configuration)?;
            let translator = Translator::new(config.tables.clone())?;
            let mut applier = Applier::new(
                Arc::new(build_sink(&config)?),
                Arc::new(ExponentialBackoff::from_config(&config.pipeline.backoff)),
                Arc::new(SyncMetrics::new()),
            );
            let options = BootstrapOptions {
                primary_key_column: primary_key,
                batch_size: config.pipeline.batch_size,
            };
            let cancel = CancellationToken::new();
            spawn_shutdown_handler(cancel.clone());

            let summary = bootstrap::bootstrap(
                BufReader::new(file),
                &translator,
                &mut applier,
                &checkpoints,
                &options,
                &cancel,
            )
            .await?;
            println!(
                "Loaded {} rows ({} operations, {} skipped, {} rejected)",
                summary.rows, summary.operations, summary.skipped, summary.rejected
            );
            Ok(())
        }
        Commands::ShowPosition => show_position(&checkpoints).await,
        Commands::CheckConfig => {
            Translator::new(config.tables.clone())?;
            println!(
                "Configuration OK: {} table(s): {}",
                config.tables.len(),
                config.table_names().join(", ")
            );
            Ok(())
        }
    }
}

async fn run_sync(config: &SyncConfig, checkpoints: SyncManager) -> Result<(), SyncError> {
    let translator = Translator::new(config.tables.clone())?;
    let source = Arc::new(build_source(config)?);
    let sink = Arc::new(build_sink(config)?);
    let start = resolve_start(&checkpoints).await?;

    let cancel = CancellationToken::new();
    spawn_shutdown_handler(cancel.clone());

    let pipeline = Pipeline::new(
        source,
        sink,
        translator,
        checkpoints,
        PipelineSettings::from(&config.pipeline),
        Arc::new(ExponentialBackoff::from_config(&config.pipeline.backoff)),
    );
    let position = pipeline.run(start, cancel).await?;
    info!(position = %position, "Stopped cleanly");
    Ok(())
}

fn build_source(config: &SyncConfig) -> Result<MySQLBinlogSource, SyncError> {
    Ok(MySQLBinlogSource::new(SourceOpts {
        source_uri: config.source.uri.clone(),
        source_database: config.source.database.clone(),
        server_id: config.source.server_id,
        tables: config.table_names(),
        progress_every_events: config.source.progress_every_events,
    })?)
}

fn build_sink(config: &SyncConfig) -> Result<OpenSearchSink, SyncError> {
    OpenSearchSink::new(&OpenSearchSinkConfig {
        url: config.index.url.clone(),
        username: config.index.username.clone(),
        password: config.index.password.clone(),
        timeout: config.index.timeout,
    })
    .map_err(|e| SyncError::Configuration(e.into()))
}

async fn show_position(checkpoints: &SyncManager) -> Result<(), SyncError> {
    println!("generation: {}", checkpoints.generation());
    for (label, phase) in [
        ("incremental", SyncPhase::Incremental),
        ("bootstrap marker", SyncPhase::FullSyncStart),
    ] {
        let loaded = checkpoints
            .load::<MySQLBinlogCheckpoint>(phase)
            .await
            .map_err(SyncError::Checkpoint)?;
        match loaded {
            Loaded::Current(checkpoint) => println!(
                "{label}: {} (saved {})",
                checkpoint.position,
                checkpoint.timestamp.to_rfc3339()
            ),
            Loaded::NotInitialized => println!("{label}: not initialized"),
            Loaded::OtherGeneration { found } => {
                println!("{label}: written for generation '{found}'")
            }
        }
    }
    Ok(())
}

/// Cancel `cancel` on SIGINT or SIGTERM.
fn spawn_shutdown_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal, finishing in-flight work");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            wait_for_ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
}
