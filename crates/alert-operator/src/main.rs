//! alert-operator - declarative alert policy and notification channel operator
//!
//! Reads manifests from a directory and keeps the alerting service in step
//! with them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alert_client::HttpAlertingApi;
use alert_operator::{Operator, OperatorConfig, validate_dir};
use alert_reconciler::{AlertingApi, MemoryAlertingApi, MemoryStore};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "alert-operator")]
#[command(about = "Keeps alert policies and notification channels in sync")]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the operator
    Run {
        /// Path to config file
        #[arg(short, long, default_value = "/etc/alert-operator/config.toml")]
        config: PathBuf,

        /// Admin API key for the alerting service
        #[arg(long, env = "ALERT_OPERATOR_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Reconcile against an in-memory API instead of the real service
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse and validate a manifest directory
    Validate {
        /// Manifest directory
        #[arg(short, long, default_value = "/etc/alert-operator/manifests")]
        manifests: PathBuf,
    },

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "/etc/alert-operator/config.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env()
        .add_directive("alert_operator=info".parse()?)
        .add_directive("alert_reconciler=info".parse()?);
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    match cli.command {
        Commands::Run {
            config,
            api_key,
            dry_run,
        } => run_operator(&config, api_key, dry_run).await,
        Commands::Validate { manifests } => validate_manifests(&manifests),
        Commands::InitConfig { output } => init_config(&output),
    }
}

async fn run_operator(
    config_path: &Path,
    api_key: Option<String>,
    dry_run: bool,
) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "starting alert-operator");

    let mut config = OperatorConfig::from_file(config_path)?;
    config.dry_run |= dry_run;

    let store = match &config.state_file {
        Some(path) if path.exists() => {
            let store = MemoryStore::load(path)
                .with_context(|| format!("failed to load state from '{}'", path.display()))?;
            info!(path = %path.display(), "restored state");
            store
        }
        _ => MemoryStore::new(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            // Dropping the sender would stop the operator.
            std::future::pending::<()>().await;
        }
        info!("received ctrl-c");
        let _ = shutdown_tx.send(true);
    });

    if config.dry_run {
        warn!("dry run: changes are applied to an in-memory alerting API");
        run_with(config, store, MemoryAlertingApi::new(), shutdown_rx).await
    } else {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .context("an API key is required (--api-key or ALERT_OPERATOR_API_KEY)")?;
        let api = HttpAlertingApi::new(&config.api, &api_key)?;
        info!(base_url = %config.api.base_url, "using alerting API");
        run_with(config, store, api, shutdown_rx).await
    }
}

async fn run_with<A: AlertingApi + 'static>(
    config: OperatorConfig,
    store: MemoryStore,
    api: A,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    Operator::new(config, store, Arc::new(api))
        .run(shutdown)
        .await?;
    Ok(())
}

#[allow(clippy::print_stdout)]
fn validate_manifests(dir: &Path) -> anyhow::Result<()> {
    let report = validate_dir(dir)?;

    for (kind, id) in &report.valid {
        println!("  ok       {kind} {id}");
    }
    for problem in &report.invalid {
        println!("  invalid  {problem}");
    }
    println!();
    println!(
        "{} valid, {} invalid",
        report.valid.len(),
        report.invalid.len()
    );

    if !report.is_ok() {
        anyhow::bail!("{} manifest(s) failed validation", report.invalid.len());
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn init_config(output: &Path) -> anyhow::Result<()> {
    let config = OperatorConfig::default();
    config.save(output)?;

    println!("Config written to: {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Put AlertPolicy and NotificationChannel manifests in {}", config.manifests_dir.display());
    println!("  2. Export ALERT_OPERATOR_API_KEY");
    println!("  3. Run: alert-operator run --config {}", output.display());

    Ok(())
}
