use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use gatekeeper_policy::Registry;
use gatekeeper_service::{Coordinator, GatekeeperCli, http};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
pub async fn main() -> Result<()> {
    let cli = GatekeeperCli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let coordinator = match cli.load_config() {
        Ok(config) => Coordinator::from_config(&Registry::default(), &config),
        Err(error) => {
            tracing::error!(%error, "Could not load gatekeeper configuration");
            Coordinator::failed(error)
        }
    };

    let app = http::router(Arc::new(coordinator), &cli.path);
    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    tracing::info!(address = %listener.local_addr()?, path = %cli.path, "Gatekeeper listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
    })
    .await?;

    Ok(())
}
