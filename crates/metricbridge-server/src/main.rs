mod process;
mod router;

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use metricbridge_bridge::{BridgeConfig, Publisher};
use metricbridge_common::Labels;
use metricbridge_exporter::registry::Registry as ExporterRegistry;
use metricbridge_source::Registry as SourceRegistry;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    process::ProcessMetrics,
    router::{AppState, metrics_router},
};

const LABELS_ENV: &str = "METRICBRIDGE_LABELS";

#[derive(Parser)]
#[command(
    name = "metricbridge",
    about = "Publishes in-process metrics on a scrapeable endpoint"
)]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value = "9100")]
    port: u16,

    /// JSON file with bridge settings; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    namespace: Option<String>,

    #[arg(long)]
    subsystem: Option<String>,

    #[arg(long)]
    flush_interval_ms: Option<u64>,

    /// Static label added to every series, as `name=value`. Repeatable.
    #[arg(long = "label", value_parser = parse_label)]
    labels: Vec<(String, String)>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env().add_directive("metricbridge=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port);
    let config = build_config(&cli, std::env::var(LABELS_ENV).ok().as_deref())?;

    let source = Arc::new(SourceRegistry::new());
    let exporter = Arc::new(ExporterRegistry::new());
    let process = Arc::new(ProcessMetrics::register(&source)?);

    let publisher = Arc::new(Publisher::new(config, source.clone(), exporter.clone())?);
    let publish_task = Arc::clone(&publisher).spawn();
    info!(
        interval_ms = publisher.config().flush_interval_ms,
        "publish loop enabled"
    );

    let app = metrics_router(Arc::new(AppState { exporter, process }));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("metricbridge listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    publish_task.abort();
    Ok(())
}

/// Config file (or defaults), then CLI flags. Static labels come from the
/// environment first and CLI labels win on conflict.
fn build_config(
    cli: &Cli,
    env_labels: Option<&str>,
) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_json_file(path)?,
        None => BridgeConfig::default(),
    };

    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(subsystem) = &cli.subsystem {
        config.subsystem = subsystem.clone();
    }
    if let Some(interval_ms) = cli.flush_interval_ms {
        config = config.with_flush_interval(Duration::from_millis(interval_ms));
    }

    if let Some(raw) = env_labels {
        config.labels.extend(parse_label_list(raw)?);
    }
    config.labels.extend(cli.labels.iter().cloned());

    config.validate()?;
    Ok(config)
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("label name missing in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_label_list(raw: &str) -> Result<Labels, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_label)
        .collect()
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
