use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use mylora_mirror::{start_mirror, Config};

/// Mirror a MyLora catalog as lazily fetched placeholders
#[derive(Parser, Debug)]
#[command(name = "mylora-mirror", version, about)]
struct Args {
    /// Path to the config file (default: ./config.toml if present)
    #[arg(long, short, env = "MYLORA_MIRROR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref())?;

    let mut mirror = start_mirror(&config)
        .await
        .with_context(|| format!("failed to start mirror against {}", config.server_url))?;

    tracing::info!(
        "Listening for accesses in {} (Ctrl+C to stop)",
        config.data_dir.display()
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            tracing::info!("Stopping...");
            mirror.shutdown();
            mirror.finished().await?;
        }
        result = mirror.finished() => {
            result.context("mirror session ended")?;
        }
    }

    Ok(())
}
