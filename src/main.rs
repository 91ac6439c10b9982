use std::path::PathBuf;

use clap::Parser;
use dtmgr::config::Config;
use dtmgr::sync::SyncCoordinator;

/// Synchronizes local directories against remote time-bucketed fileset
/// manifests.
#[derive(Parser, Debug)]
#[command(name = "dtmgrd", version, about)]
struct Cli {
  /// Path to the YAML configuration file.
  #[arg(short, long, default_value = "/etc/dtmgr.yaml")]
  config: PathBuf,

  /// Run a single synchronization iteration per fileset, then exit.
  #[arg(long)]
  once: bool,

  /// Increase log verbosity (-v, -vv).
  #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
  verbose: u8,

  /// Suppress all but warning and error output.
  #[arg(short = 'q', long)]
  quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
  let level = if quiet {
    "warn"
  } else {
    match verbose {
      0 => "info",
      1 => "debug",
      _ => "trace",
    }
  };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let cli = Cli::parse();
  init_logging(cli.verbose, cli.quiet);

  let config = Config::load(&cli.config)?;
  let client = reqwest::Client::new();

  let mut coordinators = Vec::new();
  for (name, fileset_config) in &config.filesets {
    let validated = fileset_config.validate(name)?;
    log::info!("starting fileset '{name}' -> {}", validated.destination.display());
    coordinators.push(SyncCoordinator::new(validated, client.clone()));
  }

  if cli.once {
    for mut coordinator in coordinators {
      coordinator.tick().await;
    }
    return Ok(());
  }

  let handles: Vec<_> = coordinators
    .into_iter()
    .map(|coordinator| tokio::spawn(coordinator.run()))
    .collect();

  for handle in handles {
    let _ = handle.await;
  }

  Ok(())
}
