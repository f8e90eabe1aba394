use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notification_inbox::config::{
    AppConfig, CliConfig, FileConfig, DEFAULT_ANALYTICS_CATEGORY,
};
use notification_inbox::inbox::{DEFAULT_BACKEND_TIMEOUT, DEFAULT_PAGE_SIZE};
use notification_inbox::{metrics, replay};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the JSON-lines replay script.
    pub script: PathBuf,

    /// Path to a TOML config file. Its values override the CLI ones.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Number of notifications requested per "load older" page.
    #[clap(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Category used for analytics events.
    #[clap(long, default_value = DEFAULT_ANALYTICS_CATEGORY)]
    pub analytics_category: String,

    /// Seconds before a pending backend call is failed.
    #[clap(long, default_value_t = DEFAULT_BACKEND_TIMEOUT.as_secs())]
    pub backend_timeout_secs: u64,

    /// Print the Prometheus metrics after the replay report.
    #[clap(long)]
    pub print_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        page_size: cli_args.page_size,
        analytics_category: cli_args.analytics_category.clone(),
        backend_timeout_secs: cli_args.backend_timeout_secs,
        print_metrics: cli_args.print_metrics,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    metrics::init_metrics();

    info!("Reading replay script at {:?}...", cli_args.script);
    let script = std::fs::read_to_string(&cli_args.script)
        .with_context(|| format!("Failed to read replay script: {:?}", cli_args.script))?;
    let steps = replay::parse_script(&script)?;

    let report = replay::replay(config.inbox.clone(), steps).await?;
    info!(
        "Replay finished: {} notifications, {} unread",
        report.snapshot.notifications.len(),
        report.snapshot.unread_count
    );

    println!("{}", serde_json::to_string_pretty(&report)?);

    if config.print_metrics {
        print!("{}", metrics::gather_metrics_text()?);
    }

    Ok(())
}
