mod config;
mod relay;
mod server;
mod telemetry;

use clap::Parser;
use config::Config;
use server::ProxyServer;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

/// MySQL proxy that refuses UPDATE statements.
#[derive(Debug, Parser)]
#[command(name = "updategate", version)]
struct Args {
    /// TOML config file; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.logging.max_level()?)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if config.metrics.enabled {
        telemetry::install(&config.metrics)?;
    }

    let server = ProxyServer::bind(&config).await?;
    tokio::select! {
        _ = server.serve() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested, closing listener");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
