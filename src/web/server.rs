//! Web server for filedepot.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use crate::config::{Config, WebConfig};
use crate::{Database, DepotError, Result};

use super::handlers::AppState;
use super::router::create_router;

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Web configuration.
    web_config: WebConfig,
    /// Interval of the staging garbage collector.
    gc_interval: Duration,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        let addr = format!("{}:{}", config.web.host, config.web.port)
            .parse()
            .map_err(|e| DepotError::Config(format!("invalid web server address: {e}")))?;

        Ok(Self::with_state(
            addr,
            Arc::new(AppState::new(config, db)?),
            config,
        ))
    }

    /// Create a server around an existing state.
    pub fn with_state(addr: SocketAddr, app_state: Arc<AppState>, config: &Config) -> Self {
        Self {
            addr,
            app_state,
            web_config: config.web.clone(),
            gc_interval: Duration::from_secs(config.upload.gc_interval_secs.max(1)),
        }
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the staging garbage collector.
    ///
    /// Every tick aborts expired upload sessions, removes their staging
    /// directories and purges expired cache entries.
    fn start_gc_task(state: Arc<AppState>, every: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;

            loop {
                interval.tick().await;
                sweep(&state).await;
            }
        });
    }

    async fn bind(self) -> std::io::Result<(TcpListener, axum::Router)> {
        let state = Arc::clone(&self.app_state);
        let router = create_router(self.app_state, &self.web_config).layer(CompressionLayer::new());

        let listener = TcpListener::bind(self.addr).await?;

        Self::start_gc_task(state, self.gc_interval);
        tracing::info!(
            interval_secs = self.gc_interval.as_secs(),
            "Upload session cleanup task started"
        );
        Ok((listener, router))
    }

    /// Run the web server.
    pub async fn run(self) -> std::io::Result<()> {
        let (listener, router) = self.bind().await?;
        tracing::info!("Web server listening on http://{}", listener.local_addr()?);
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await
    }

    /// Run the server in the background and return the bound address.
    ///
    /// Binding to port 0 picks a free port.
    pub async fn run_with_addr(self) -> std::io::Result<SocketAddr> {
        let (listener, router) = self.bind().await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

/// One garbage collection pass. Returns `(sessions, cache_entries)` removed.
pub(crate) async fn sweep(state: &AppState) -> (usize, usize) {
    let sessions = match state.uploads().collect_expired(Utc::now()).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to collect expired upload sessions");
            0
        }
    };
    let entries = match state.broker.cache().purge_expired().await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to purge expired cache entries");
            0
        }
    };

    if sessions > 0 || entries > 0 {
        tracing::info!(sessions, entries, "Garbage collection removed stale state");
    } else {
        tracing::debug!("Garbage collection found nothing to remove");
    }
    (sessions, entries)
}
