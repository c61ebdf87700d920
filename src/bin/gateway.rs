// ABOUTME: Process bootstrap: configure logging, load settings, connect the bus, run the server
// ABOUTME: Mirrors the four-stage startup sequence of the system this gateway was distilled from

use smpp::config::Settings;
use smpp::http::{router, AppState};
use smpp::queue::QueueAdapter;
use smpp::server::Server;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    configure_tracing();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "routes.yaml".to_string());
    let settings = Settings::load(&config_path)?;

    let queue_url = std::env::var("QUEUE_URL").unwrap_or_else(|_| "nats://127.0.0.1:4222".into());
    let cluster_id = std::env::var("QUEUE_CLUSTER_ID").unwrap_or_else(|_| "routep".into());
    let (queue, mut connection_lost) = QueueAdapter::connect(&queue_url, &cluster_id).await?;

    let server = Arc::new(Server::new(&settings, queue.clone())?);

    tokio::spawn({
        let queue = queue.clone();
        async move {
            while connection_lost.changed().await.is_ok() {
                if !*connection_lost.borrow() {
                    queue.mark_disconnected();
                }
            }
        }
    });

    let state = AppState::new(server.clone());
    state.spawn_health_ticker();

    let port: u16 = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(7000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(server))
        .await?;

    Ok(())
}

async fn shutdown_signal(server: Arc<Server>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining sub-routes");
    server.stop().await;
}

fn configure_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
