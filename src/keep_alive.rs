use axum::{routing::get, Router};
use axum_macros::debug_handler;
use std::net::SocketAddr;
use tracing::{error, info};

pub const ALIVE: &str = "Discord Bot is alive!";

#[debug_handler]
async fn home() -> &'static str {
    ALIVE
}

pub fn router() -> Router {
    Router::new().route("/", get(home))
}

/// Serves the liveness endpoint until the process exits.
pub async fn serve(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Keep-alive server could not bind {}: {}", addr, e);
            return;
        }
    };

    info!("Keep-alive listening on {}", addr);
    if let Err(e) = axum::serve(listener, router()).await {
        error!("Keep-alive server stopped: {}", e);
    }
}
