use std::time::Duration;

use tracing_subscriber::EnvFilter;
use warp::Filter;

use proctor_signal::api::relay_routes;
use proctor_signal::config::Config;
use proctor_signal::session::{sweeper, SessionStore};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = SessionStore::new();

    if config.signaling.session_ttl_secs > 0 {
        sweeper::spawn(
            store.clone(),
            Duration::from_secs(config.signaling.session_ttl_secs),
            Duration::from_secs(config.signaling.sweep_interval_secs),
        );
        tracing::info!(
            ttl_secs = config.signaling.session_ttl_secs,
            "Idle-session sweeper enabled"
        );
    }

    let routes = relay_routes::signal_routes(store.clone())
        .or(relay_routes::health_check(store))
        .or(relay_routes::config_endpoint());

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "Signal relay listening"
    );

    warp::serve(routes).run(config.bind_address()).await;
}
