use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use cqrs_host::{EntryPoint, HostBuilder};
use cqrs_testing_example::App;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cqrs-testing-example")]
#[command(about = "Temperature and comments demo host")]
struct Cli {
    /// Extra TOML configuration layered over the built-in defaults
    #[arg(short, long, env = "CQRS_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "SERVER_PORT", default_value_t = 8080)]
    port: u16,

    /// Host environment name
    #[arg(long, env = "CQRS_ENVIRONMENT", default_value = "Production")]
    environment: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Override via RUST_LOG.
                "info,cqrs_host=info,cqrs_testing_example=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut builder = HostBuilder::for_entry_point::<App>()?;
    builder.use_environment(cli.environment);
    if let Some(path) = cli.config {
        info!(path = %path.display(), "layering configuration file");
        builder.configure_app_configuration(move |_, config| {
            config.add_toml_file(path, false);
        });
    }

    let host = builder
        .build(App::router())
        .context("failed to build host")?;
    info!(environment = host.environment(), "host built");

    let address = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    host.serve(listener).await?;
    Ok(())
}
