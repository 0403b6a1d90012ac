use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use trackhub::{
    api,
    config::HubConfig,
    enrichment::{DisabledLookup, HttpNameLookup, NameLookup},
    hub::{ChannelRegistry, Hub, HubHandle},
    schedule::ResetScheduler,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackhub=info".into()),
        )
        .init();

    info!("Trackhub starting...");

    let config = HubConfig::from_env()?;
    let channels = Arc::new(
        ChannelRegistry::from_config(&config.channels).context("Invalid channel configuration")?,
    );
    let reset_at = if config.reset.enabled {
        Some(config.reset.fire_time()?)
    } else {
        None
    };

    let (hub_handle, hub_rx) = HubHandle::channel();

    let lookup: Box<dyn NameLookup> = if config.enrichment.enabled {
        info!(endpoint = %config.enrichment.endpoint, "Customer name enrichment enabled");
        Box::new(HttpNameLookup::new(&config.enrichment, hub_handle.clone())?)
    } else {
        info!("Customer name enrichment disabled");
        Box::new(DisabledLookup)
    };

    let hub = Hub::new(Arc::clone(&channels), lookup);
    tokio::spawn(hub.run(hub_rx));

    match reset_at {
        Some(at) => {
            tokio::spawn(ResetScheduler::new(at, hub_handle.clone()).run());
        }
        None => info!("Scheduled reset disabled"),
    }

    let app = api::create_app(hub_handle, channels);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "Listening");

    axum::serve(listener, app)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
