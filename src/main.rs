mod app;
mod commands;
mod event;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use erpq::config::Config;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "erpq")]
#[command(about = "Cached console client for the ERP backend")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/erpq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Do not subscribe to server broadcasts
  #[arg(long)]
  no_push: bool,
}

/// Log to a daily file under the data directory so the console stays readable.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .map(|dir| dir.join("erpq"))
    .ok_or_else(|| eyre!("Cannot determine data directory for logs"))?;
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&log_dir, "erpq.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("ERPQ_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging()?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  tracing::info!(base_url = %config.api.base_url, "Starting erpq");

  let mut app = app::App::new(config, args.no_push)?;
  app.run().await?;

  Ok(())
}
