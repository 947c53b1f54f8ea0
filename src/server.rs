/// Server setup and initialization
///
/// Wires together all components: storage, presence dispatcher, workflow
/// engine, and HTTP routes. Provides the application factory for the Axum app.

use crate::{
    api::{create_api_routes, AppState},
    config::Config,
    dispatch::Dispatcher,
    engine::WorkflowEngine,
    store::Database,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Build the router around an already wired engine
pub fn create_router(engine: WorkflowEngine) -> Router {
    Router::new()
        // Health check endpoint
        .route("/healthz", get(health_check))
        // REST API and push socket
        .merge(create_api_routes())
        .with_state(AppState { engine })
}

/// Open storage and wire the dispatcher and workflow engine on top of it
///
/// Creates the database schema on first start.
pub async fn build_engine(config: &Config) -> Result<WorkflowEngine> {
    tracing::info!("🗄️ Initializing storage");
    let db = Database::open(&config.database.path())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;

    tracing::info!(
        "📡 Initializing push dispatcher (timeout {}ms, buffer {})",
        config.dispatch.push_timeout_ms,
        config.dispatch.connection_buffer
    );
    let dispatcher = Arc::new(Dispatcher::new(&config.dispatch));

    tracing::info!("⚙️ Initializing workflow engine");
    Ok(WorkflowEngine::new(db, dispatcher))
}

/// Create the main Axum application with all routes
pub async fn create_app(config: Config) -> Result<Router> {
    let engine = build_engine(&config).await?;

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = create_router(engine);

    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Start the HTTP server with the given configuration
///
/// Stops on Ctrl+C, then waits for pushes already committed to be offered
/// to their connections.
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting socialway server...");

    let engine = build_engine(&config).await?;
    let app = create_router(engine.clone());
    tracing::info!("✅ Application initialized successfully");

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("🛑 Shutting down...");
    };
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    engine.dispatcher().flush().await;
    tracing::info!("👋 Pending pushes flushed");
    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
