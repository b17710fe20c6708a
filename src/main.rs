//! Census Lookup - Command Line Interface
//!
//! Serves identity lookups over HTTP, or runs a single lookup from the shell,
//! against a published Parquet census file that is downloaded on first use.
//!
//! # Commands
//!
//! - **`serve`** - Runs the HTTP API (`GET /buscar?identidad=...`, `GET /health`)
//! - **`lookup`** - Looks up one identity and prints the record as JSON
//! - **`fetch`** - Only ensures the local copy of the census file exists
//!
//! # Usage Examples
//!
//! ```bash
//! # Serve on port 3000, downloading the file on the first request
//! census_lookup serve --origin-url https://example.org/censo.parquet
//!
//! # Same, but start the download immediately
//! CENSUS_ORIGIN_URL=https://example.org/censo.parquet census_lookup serve --warm-on-start
//!
//! # One-shot lookup
//! census_lookup lookup --origin-url https://example.org/censo.parquet 0801-1990-12345
//! ```
//!
//! # Exit Codes
//!
//! - `0` - Success (including "no record found" for `lookup`)
//! - `1` - The dataset could not be fetched or loaded, or the server failed
//! - `2` - The identity was rejected before any lookup (`lookup` only)

use std::process;
use clap::{Parser, Subcommand};
use census_lookup::{http, DatasetFetcher, LookupConfig, LookupError, ServerConfig};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "census_lookup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, env = "CENSUS_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP lookup API.
    Serve(ServerConfig),
    /// Look up one identity number and print the record.
    Lookup {
        #[command(flatten)]
        dataset: LookupConfig,
        /// Identity number; non-digit characters are ignored.
        identity: String,
    },
    /// Download the census file to the local cache path if it is not there yet.
    Fetch {
        #[command(flatten)]
        dataset: LookupConfig,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Serve(config) => handle_serve(config).await,
        Commands::Lookup { dataset, identity } => handle_lookup(dataset, &identity).await,
        Commands::Fetch { dataset } => handle_fetch(dataset).await,
    }
}

/// Handles the `serve` command.
///
/// Binds the listener first so a bad address fails fast, optionally kicks off
/// materialization in the background, then serves until Ctrl-C.
async fn handle_serve(config: ServerConfig) {
    let service = config.dataset.lookup_service();
    let addr = config.socket_addr();

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind listener");
            process::exit(1);
        }
    };

    if config.warm_on_start {
        info!("warming census table at startup");
        service.coordinator().start();
    }

    info!(
        %addr,
        origin = %config.dataset.origin_url,
        local_path = %config.dataset.local_path.display(),
        "census API listening"
    );

    let app = http::router(service);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server stopped with error");
        process::exit(1);
    }
    info!("census API stopped");
}

/// Handles the `lookup` command.
///
/// Prints the record as pretty JSON, or `null` when the identity is absent.
async fn handle_lookup(dataset: LookupConfig, identity: &str) {
    let service = dataset.lookup_service();
    match service.find(identity).await {
        Ok(record) => match serde_json::to_string_pretty(&record) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: could not encode record: {}", e);
                process::exit(1);
            }
        },
        Err(e @ LookupError::Validation(_)) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Handles the `fetch` command.
async fn handle_fetch(dataset: LookupConfig) {
    match dataset.fetcher().ensure_local_copy().await {
        Ok(path) => println!("✓ Census file available at {}", path.display()),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
