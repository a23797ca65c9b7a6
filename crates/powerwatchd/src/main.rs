//! powerwatchd — the powerwatch daemon.
//!
//! Single binary that wires the pieces together:
//! - Shared state store (redb file or Firebase-compatible REST endpoint)
//! - Decision-tree classifier loaded from JSON
//! - Shutoff engine + periodic runner
//! - REST API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! powerwatchd serve --config /etc/powerwatch/powerwatch.toml
//! powerwatchd cycle --config powerwatch.toml --now 2024-03-04T18:02:00Z
//! powerwatchd check-model --config powerwatch.toml
//! ```

mod serve;
mod setup;

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use powerwatch_core::PowerwatchConfig;
use powerwatch_engine::ensure_schema;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,powerwatchd=debug,powerwatch=debug";

#[derive(Parser)]
#[command(name = "powerwatchd", about = "Appliance auto-shutoff daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll on a fixed interval and serve the REST API.
    Serve {
        /// Path to powerwatch.toml.
        #[arg(long, default_value = "powerwatch.toml")]
        config: PathBuf,

        /// Port to listen on (overrides `[api] port`).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a single cycle and print the report as JSON.
    Cycle {
        #[arg(long, default_value = "powerwatch.toml")]
        config: PathBuf,

        /// Evaluate as of this instant instead of now (RFC 3339).
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Load the model and check it against the configured feature schema.
    CheckModel {
        #[arg(long, default_value = "powerwatch.toml")]
        config: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<PowerwatchConfig> {
    PowerwatchConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Serve { config, port } => {
            let settings = load_config(&config)?;
            serve::run_serve(settings, config, port).await
        }
        Command::Cycle { config, now } => {
            let settings = load_config(&config)?;
            let engine = setup::build_engine(&settings, &config)?;
            let report = engine.run_cycle(now.unwrap_or_else(Utc::now)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::CheckModel { config } => {
            let settings = load_config(&config)?;
            let model = setup::load_model(&settings, &config)?;
            ensure_schema(&model, settings.features.schema)?;
            println!(
                "model ok: {} features, depth {}, schema {}",
                settings.features.schema.width(),
                model.depth(),
                settings.features.schema.name()
            );
            Ok(())
        }
    }
}
