//! Error type shared by the connector, the data access path and the HTTP layer.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The database could not be reached or a connection could not be checked out.
    #[error("connection: {0}")]
    Connection(#[source] sqlx::Error),

    /// The fixed query was rejected on an established connection.
    #[error("query: {0}")]
    Query(#[source] sqlx::Error),

    /// A column value has no JSON representation.
    #[error("serialization: {message}")]
    Serialization { message: String },

    #[error("timeout: query exceeded {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("config: {message}")]
    Config { message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify a driver error raised while running a query.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Error::Connection(err),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => Error::Serialization {
                message: err.to_string(),
            },
            other => Error::Query(other),
        }
    }

    /// Every failure while opening the pool is a connection failure, including
    /// rejected credentials and unknown databases reported by the server.
    pub fn connect(err: sqlx::Error) -> Self {
        Error::Connection(err)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Error::Serialization {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Short machine-readable name, used in logs and error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Connection(_) => "connection_error",
            Error::Query(_) => "query_error",
            Error::Serialization { .. } => "serialization_error",
            Error::Timeout { .. } => "timeout_error",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
        }
    }
}
