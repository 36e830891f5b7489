//! HTTP server

use axum::{routing::get, Router};
use crossbeam_channel::Sender;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::config::UiConfig;
use crate::error::{Error, Result};
use crate::protocol::EngineCommand;

use super::handlers;

/// Shared handler state
pub struct AppState {
    pub commands: Sender<EngineCommand>,
}

/// Query surface for leaders and tooling
pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: UiConfig, commands: Sender<EngineCommand>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { commands }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/fppjson.php", get(handlers::fpp_json))
            .route("/api/sequence/:name/meta", get(handlers::get_sequence_meta))
            .route("/api/status", get(handlers::get_status))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.bind_address, self.config.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("ui.bind_address: {}", e)))
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.bind_addr()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP server listening on http://{}", addr);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    pub fn start_background(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("HTTP server error: {}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_bind_addr() {
        let (tx, _rx) = bounded(1);
        let server = WebServer::new(UiConfig::default(), tx.clone());
        assert_eq!(server.bind_addr().unwrap(), "0.0.0.0:8080".parse().unwrap());

        let config = UiConfig {
            bind_address: "not an address".to_string(),
            ..Default::default()
        };
        assert!(WebServer::new(config, tx).bind_addr().is_err());
    }
}
