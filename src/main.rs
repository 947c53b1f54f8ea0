/// Socialway server entry point
///
/// Loads configuration from the environment and starts the HTTP server:
/// - REST API at /api/*
/// - Real-time pushes at /ws
/// - Health check at /healthz

use socialway::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Defaults to 0.0.0.0:3004 and data/socialway.db
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
