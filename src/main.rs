use std::{net::SocketAddr, sync::Arc};

use chordpool::{
    common::{logger, types::AnyResult},
    configs::Config,
    relay::{self, Hub},
};
use tracing::info;

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(&config);

    let hub = Arc::new(Hub::new(&config.relay));
    let app = relay::router(hub.clone());

    let address: SocketAddr = format!("{}:{}", config.relay.host, config.relay.port).parse()?;
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(
        "Relay hub listening on {} (minimum viewer version {})",
        address, config.relay.min_client_version
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down relay hub");
        })
        .await?;

    info!(
        "Relay hub stopped with {} viewers and {} bots connected",
        hub.viewer_count(),
        hub.bot_count()
    );
    Ok(())
}
