use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use waypoint_api::{build_router, build_state, ServerConfig};
use waypoint_observability::init_tracing;

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("waypoint_api");

    let config = ServerConfig::from_env();
    let state = build_state(&config)?;

    let housekeeping = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            ticker.tick().await;
            housekeeping.agent.purge_idle_sessions();
            housekeeping.limiter.prune();
        }
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(bind = %config.bind, "waypoint api started");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
