use hyper::Client;
use prep_guard::{
    AppState,
    config::GatewayConfig,
    routes::routes,
    services::sweep,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prep_guard=info")),
        )
        .init();

    let config = GatewayConfig::from_env();
    let bind_addr = config.bind_addr;
    let sweep_interval = config.sweep_interval;
    let state = AppState::new(config);

    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let (windows, entries) = sweep(&sweeper);
            debug!(windows, entries, "purged expired state");
        }
    });

    info!(backend = %state.config.backend_base, "gateway running on http://{}", bind_addr);
    warp::serve(routes(state, Client::new())).run(bind_addr).await;
}
