//! actionscaled — the actionscale daemon.
//!
//! Single binary that assembles the pipeline:
//! - State backend (memory or Redis)
//! - GitHub data sources
//! - Workflow store + periodic resync from the config file
//! - Query host with warm-up
//! - HTTP API (external metrics, Prometheus, health)
//!
//! # Usage
//!
//! ```text
//! actionscaled serve --config /etc/actionscale/actionscale.toml
//! actionscaled validate --config actionscale.toml
//! ```

mod serve;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use actionscale_core::AdapterConfig;

const DEFAULT_LOG_FILTER: &str = "info,actionscaled=debug,actionscale=debug";

#[derive(Parser)]
#[command(name = "actionscaled", about = "GitHub Actions queue metrics for autoscalers")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the metrics server.
    Serve {
        /// Path to actionscale.toml.
        #[arg(long, short, default_value = "actionscale.toml")]
        config: PathBuf,

        /// Port to listen on (overrides `server.port`).
        #[arg(long)]
        port: Option<u16>,

        /// Start serving without refreshing every workflow first.
        #[arg(long)]
        skip_warm_up: bool,
    },
    /// Check a config file and resolve every workflow.
    Validate {
        #[arg(long, short, default_value = "actionscale.toml")]
        config: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve {
            config,
            port,
            skip_warm_up,
        } => serve::run_serve(config, port, skip_warm_up).await,
        Command::Validate { config } => validate(&config),
    }
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let config = AdapterConfig::from_file(path)?;
    config.validate()?;

    let mut failed = 0;
    for entry in &config.workflows {
        let watched = if config.sources.watches(&entry.namespace) {
            ""
        } else {
            " (namespace not watched)"
        };
        match entry.resolve() {
            Ok(wf) => println!(
                "  ok      {} [{}..{}, factor {}]{watched}",
                wf.title(),
                wf.scaling.min_workers(),
                wf.scaling.max_workers(),
                wf.scaling.scale_factor(),
            ),
            Err(e) => {
                failed += 1;
                println!("  error   {}: {e}", entry.name);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} workflows failed to resolve", config.workflows.len());
    }
    println!("{}: {} workflows OK", path.display(), config.workflows.len());
    Ok(())
}
