//! Operations binary: smoke checks and administrative actions against the
//! shared backing store. The API routes live in a separate service; this
//! tool talks to the same database file.

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mangaku::{Config, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "mangaku")]
#[command(about = "Operations tool for the Mangaku retrieval core")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./mangaku.yaml, then
  /// $XDG_CONFIG_HOME/mangaku/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Probe the cache and rate-limiter backing stores.
  Health,
  /// Evict every cached entry in the namespace.
  ClearCache,
  /// Fetch a URL through the retry policy and report the payload size.
  Probe { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let pipeline = Pipeline::from_config(&config)?;

  match args.command {
    Command::Health => {
      let status = pipeline.health.status().await;
      println!("{}", serde_json::to_string_pretty(&status)?);
      if !status.is_healthy() {
        std::process::exit(1);
      }
    }
    Command::ClearCache => {
      pipeline.cache.invalidate_all().await?;
      println!("cache cleared");
    }
    Command::Probe { url } => {
      let url = url::Url::parse(&url)?;
      let payload = pipeline.fetcher.fetch(&url).await?;
      println!("{} bytes", payload.len());
    }
  }

  Ok(())
}
