use bookshelf_api::api::{self, AppState};
use bookshelf_api::AppConfig;
use tokio::net::TcpListener;

#[macro_use]
extern crate log;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    let state = AppState::from_config(&config).await?;
    let app = api::router(state);

    let listener = TcpListener::bind(config.server.address).await?;
    info!(
        "bookshelf-api {} listening on http://{} (default API version {})",
        bookshelf_api::VERSION,
        config.server.address,
        config.api.default_version
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
