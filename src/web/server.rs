//! Web server for Betafarm.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use super::handlers::AppState;
use super::router::{create_health_router, create_router};
use crate::config::ServerConfig;
use crate::{BetafarmError, Result};

/// HTTP server hosting the API and the hub callback.
pub struct WebServer {
    addr: SocketAddr,
    app_state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &ServerConfig, app_state: Arc<AppState>) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| {
                BetafarmError::Config(format!(
                    "invalid listen address {}:{}: {}",
                    config.host, config.port, e
                ))
            })?;

        Ok(Self { addr, app_state })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Run the web server.
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let router = create_router(self.app_state).merge(create_health_router());

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Web server listening on http://{}", local_addr);

        axum::serve(listener, router).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActivityConfig;
    use crate::db::Database;
    use crate::error::HubError;
    use crate::feeds::{
        FetchedPage, HubAck, HubClient, HubRequest, HubSettings, PageFetcher,
        SubscriptionManager, TaskQueue,
    };
    use async_trait::async_trait;

    struct NoFetch;

    #[async_trait]
    impl PageFetcher for NoFetch {
        async fn fetch(&self, url: &str) -> Result<FetchedPage> {
            Err(BetafarmError::Fetch(url.to_string()))
        }
    }

    struct NoHub;

    #[async_trait]
    impl HubClient for NoHub {
        async fn send(&self, _request: &HubRequest) -> std::result::Result<HubAck, HubError> {
            Ok(HubAck::Accepted)
        }
    }

    async fn state() -> Arc<AppState> {
        let db = Database::open_in_memory().await.unwrap();
        let (queue, _receiver) = TaskQueue::new();
        let settings = HubSettings::from_config(&Default::default(), &ServerConfig::default());
        let manager = SubscriptionManager::new(db.clone(), Arc::new(NoFetch), Arc::new(NoHub), settings);
        Arc::new(AppState::new(db, queue, Arc::new(manager), &ActivityConfig::default()))
    }

    #[tokio::test]
    async fn test_server_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8123,
            ..Default::default()
        };
        let server = WebServer::new(&config, state().await).unwrap();
        assert_eq!(server.addr().to_string(), "127.0.0.1:8123");
    }

    #[tokio::test]
    async fn test_invalid_listen_address() {
        let config = ServerConfig {
            host: "not an address".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            WebServer::new(&config, state().await),
            Err(BetafarmError::Config(_))
        ));
    }
}
