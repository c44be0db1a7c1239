use std::sync::Arc;

use timely_bridge::{
    api::{self, AppState},
    client::HttpClientProvider,
    config::ServerConfig,
    logging, metrics,
};

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env();

    // Initialize logging
    logging::init_logger("timely_bridge", config.log_format);

    // Initialize metrics
    metrics::init_metrics();

    let state = AppState::new(Arc::new(HttpClientProvider::default()));
    if let Err(e) = api::serve(&config, state).await {
        tracing::error!(error = %e, "timely bridge exited");
        std::process::exit(1);
    }
}
