use crate::config::ServerConfig;
use crate::drivers::{Connector, TableName};
use crate::error::Result;
use crate::handlers;
use axum::Router;
use axum::routing::get;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// State shared by every request.
#[derive(Debug)]
pub struct AppState {
    pub connector: Connector,
    pub table: TableName,
    pub query_timeout: Duration,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/data", get(handlers::get_data))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub struct HttpServer {
    router: Router,
    addr: String,
}

impl HttpServer {
    pub fn new(router: Router, config: &ServerConfig) -> Self {
        Self {
            router,
            addr: config.addr(),
        }
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(&self.addr).await?)
    }

    /// Serve on `listener` until `shutdown` resolves and in-flight requests finish.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
