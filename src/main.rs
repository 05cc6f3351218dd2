use log::{error, info};
use service::{config::Config, logging::Logger};

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config);

    let interface = config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let address = format!("{interface}:{}", config.port);

    let app_state = service::AppState::new(config);
    let router = web::router::define_routes(app_state.clone());

    info!("Starting CommonTable realtime core on http://{address}");

    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {address}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await
    {
        error!("Server exited with an error: {e}");
        std::process::exit(1);
    }

    info!("Realtime core stopped");
}

/// Resolves once the process receives ctrl-c. Draining the stream
/// connections first closes every response body, so the graceful shutdown
/// that follows is not stuck waiting on open streams.
async fn shutdown_signal(app_state: service::AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {e}");
        return;
    }

    info!("Shutdown signal received");
    app_state.sse_manager.shutdown();
}
