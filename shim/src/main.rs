mod cli;
mod plugins;

use anyhow::{Context, Result};
use clap::Parser;
use cli::CliArgs;
use shim_rt::Shim;
use std::process::ExitCode;
use tracing::{error, info};

async fn run(args: CliArgs) -> Result<()> {
    let registry = plugins::registry();
    let plugin = shim_config::load_config(&args.config, &registry)
        .with_context(|| format!("Loading plugin from {}", args.config.display()))?;

    let mut shim = Shim::stdio();
    shim.register(plugin).await?;

    match args.interval() {
        Some(interval) => shim.run(interval).await?,
        None => shim.run_on_signal().await?,
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // stdout carries metrics, logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting execd-shim");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start the async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(args));

    // A blocking stdin read may still be pending; do not wait for it
    runtime.shutdown_background();

    match result {
        Ok(()) => {
            info!("execd-shim finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
