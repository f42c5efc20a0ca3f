//! ignition-rs - first-boot provisioning for immutable-OS hosts
//!
//! One invocation selects one stage and one provider, brings the system
//! into the configured state for that stage, and reports the outcome
//! back to the platform.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use ignition_rs::{engine::Engine, providers, stages};

#[derive(Parser)]
#[command(name = "ignition-rs")]
#[command(version, about = "First-boot provisioning engine", long_about = None)]
struct Cli {
    /// Clear any cached config
    #[arg(long)]
    clear_cache: bool,

    /// Where to cache the config
    #[arg(long, default_value = "/run/ignition.json")]
    config_cache: PathBuf,

    /// Initial duration (in seconds) for which to wait for the config
    #[arg(long, default_value_t = ignition_rs::DEFAULT_FETCH_TIMEOUT.as_secs())]
    fetch_timeout: u64,

    /// Current oem (the provider to fetch the config from)
    #[arg(long)]
    oem: String,

    /// Root of the filesystem
    #[arg(long, default_value = "/")]
    root: PathBuf,

    /// Execution stage
    #[arg(long)]
    stage: String,

    /// Log to stdout instead of the system log
    #[arg(long)]
    log_to_stdout: bool,
}

fn init_logging(to_stdout: bool) {
    let builder = FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .compact();
    if to_stdout {
        tracing::subscriber::set_global_default(builder.finish())
    } else {
        tracing::subscriber::set_global_default(builder.with_writer(std::io::stderr).finish())
    }
    .expect("failed to set tracing subscriber");
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_to_stdout);

    info!("ignition-rs {}", env!("CARGO_PKG_VERSION"));
    info!("stage: {}", cli.stage);

    let providers = providers::registry();
    let stages = stages::registry();

    let Some(provider) = providers.get(cli.oem.as_str()) else {
        eprintln!(
            "invalid oem {:?}, expected one of {:?}",
            cli.oem,
            providers::names(&providers)
        );
        return ExitCode::from(2);
    };
    if !stages.contains_key(cli.stage.as_str()) {
        eprintln!(
            "invalid stage {:?}, expected one of {:?}",
            cli.stage,
            stages::names(&stages)
        );
        return ExitCode::from(2);
    }

    if cli.clear_cache {
        if let Err(e) = tokio::fs::remove_file(&cli.config_cache).await {
            warn!("unable to clear cache: {}", e);
        }
    }

    let fetch_timeout = Duration::from_secs(cli.fetch_timeout);
    let fetcher = match provider.new_fetcher(fetch_timeout).await {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("failed to generate fetcher: {}", e);
            return ExitCode::from(3);
        }
    };

    let mut engine = Engine {
        root: cli.root,
        config_cache: cli.config_cache,
        provider: provider.as_ref(),
        fetcher,
        stages: &stages,
    };

    let result = engine.run(&cli.stage).await;

    // The status hook sees the stage outcome; a status error is logged
    // but never overrides it.
    let status_result = provider
        .post_status(&cli.stage, &engine.fetcher, result.as_ref().map(|_| ()))
        .await;
    if let Err(e) = status_result {
        error!("POST status error: {}", e);
    }

    match result {
        Ok(()) => {
            info!("finished successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("provisioning failed: {}", e);
            ExitCode::from(1)
        }
    }
}
