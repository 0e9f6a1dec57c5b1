//! Serve the rows of one database table as JSON over `GET /api/data`.

pub mod config;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod http;
pub mod logging;
pub mod rows;

pub use config::{AppConfig, Backend, DatabaseConfig, Overrides, ServerConfig};
pub use drivers::{Connector, TableName};
pub use engine::Engine;
pub use error::{Error, Result};
pub use rows::{ResultSet, Row, Value};
