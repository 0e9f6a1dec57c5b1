use crate::config::{AppConfig, ServerConfig};
use crate::drivers::{Connector, TableName};
use crate::error::Result;
use crate::http::{self, AppState, HttpServer};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Owns the connection pool and serves the table over HTTP.
pub struct Engine {
    server: ServerConfig,
    state: Arc<AppState>,
}

impl Engine {
    /// Connect to the database. Fails if the first connection cannot be made.
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let connector = Connector::connect(&config.database).await?;
        tracing::info!(
            backend = %connector.backend(),
            database = %config.database.database,
            table = %config.database.table,
            max_connections = config.database.max_connections,
            "database connected"
        );
        Ok(Self::new(
            config.server,
            connector,
            config.database.table,
            config.database.query_timeout,
        ))
    }

    fn new(
        server: ServerConfig,
        connector: Connector,
        table: TableName,
        query_timeout: Duration,
    ) -> Self {
        Self {
            server,
            state: Arc::new(AppState {
                connector,
                table,
                query_timeout,
            }),
        }
    }

    pub fn router(&self) -> Router {
        http::router(Arc::clone(&self.state))
    }

    pub fn connector(&self) -> &Connector {
        &self.state.connector
    }

    /// Bind the configured address and serve until Ctrl+C or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let server = HttpServer::new(self.router(), &self.server);
        let listener = server.bind().await?;
        self.serve_on(server, listener, http::shutdown_signal()).await
    }

    /// Serve on an already bound listener, then close the pool.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let server = HttpServer::new(self.router(), &self.server);
        self.serve_on(server, listener, shutdown).await
    }

    async fn serve_on<F>(self, server: HttpServer, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, table = %self.state.table, "listening on http://{addr}/api/data");
        let served = server.serve(listener, shutdown).await;
        self.state.connector.close().await;
        tracing::info!("server stopped");
        served
    }
}
