use clap::Parser;
use dhcp_relay::{spawn_relays, Args, Interface, Relay, RelayConfig, RelayError};
use std::error::Error as StdError;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Resolves the interface and binds its sockets.
async fn start_relay(name: String, config: &RelayConfig) -> Result<Relay, RelayError> {
    let interface = Interface::lookup(&name).await?;
    let relay = Relay::bind(&interface, config)?;
    tracing::info!(
        "Listening on {}/{} ({})",
        interface.name,
        interface.mac_string(),
        interface.ipv4
    );
    Ok(relay)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn StdError>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dhcp_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_args(&args)?;
    tracing::info!(
        "Relaying on {:?} to {:?} (max hops {})",
        config.interfaces,
        config.servers,
        config.max_hop_count
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut relays = spawn_relays(&config.interfaces, &shutdown_rx, |name| {
        start_relay(name, &config)
    })
    .await;

    if relays.is_empty() {
        return Err("no relay could be started".into());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, shutting down...");
    shutdown_tx.send(true)?;

    while let Some(joined) = relays.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Relay failed: {}", e),
            Err(e) => tracing::error!("Relay task aborted: {}", e),
        }
    }

    Ok(())
}
