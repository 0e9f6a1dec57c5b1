//! Runtime configuration.
//!
//! Values are resolved with the precedence: explicit overrides (CLI flags) >
//! `ROWSERVE_*` environment variables > TOML config file > defaults.

use crate::drivers::TableName;
use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_ENV: &str = "ROWSERVE_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[serde(alias = "mariadb")]
    Mysql,
    Sqlite,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Backend::Mysql),
            "sqlite" => Ok(Backend::Sqlite),
            other => Err(Error::config(format!(
                "unknown backend '{other}' (expected mysql or sqlite)"
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Mysql => "mysql",
            Backend::Sqlite => "sqlite",
        })
    }
}

#[derive(Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Connection target and pool settings.
///
/// For [`Backend::Sqlite`] `database` is a file path and the network and
/// credential fields are unused.
#[derive(Debug)]
pub struct DatabaseConfig {
    pub backend: Backend,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub database: String,
    pub table: TableName,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Mysql,
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: SecretString::from(String::new()),
            database: "tj24".to_string(),
            table: TableName::trusted("tj24_data"),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl DatabaseConfig {
    pub fn sqlite<P: AsRef<Path>>(path: P, table: TableName) -> Self {
        Self {
            backend: Backend::Sqlite,
            database: path.as_ref().display().to_string(),
            table,
            ..Default::default()
        }
    }

    pub fn set_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
}

/// Values given on the command line. `None` leaves the lower layers in charge.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<(String, u16)>,
    pub backend: Option<Backend>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_user: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
}

// --- TOML config file structs ---

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    #[serde(default)]
    server: TomlServer,
    #[serde(default)]
    database: TomlDatabase,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlServer {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlDatabase {
    backend: Option<Backend>,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    password_env: Option<String>,
    database: Option<String>,
    table: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    query_timeout_secs: Option<u64>,
}

fn read_toml(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("cannot read config file {}: {}", path.display(), e))
    })?;
    toml::from_str(&content)
        .map_err(|e| Error::config(format!("invalid config file {}: {}", path.display(), e)))
}

fn env_parse<T: FromStr>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{key}: cannot parse '{raw}'"))),
        None => Ok(None),
    }
}

fn secs(value: Option<u64>, default: Duration, name: &str) -> Result<Duration> {
    match value {
        Some(0) => Err(Error::config(format!("{name} must be greater than zero"))),
        Some(s) => Ok(Duration::from_secs(s)),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Resolve configuration from the process environment.
    ///
    /// `file` wins over `ROWSERVE_CONFIG`; without either no file is read.
    pub fn load(file: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self::resolve(file, overrides, &lookup)
    }

    /// Resolve configuration with an explicit environment lookup.
    pub fn resolve(
        file: Option<&Path>,
        overrides: Overrides,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let path: Option<PathBuf> = file
            .map(Path::to_path_buf)
            .or_else(|| env(CONFIG_ENV).map(PathBuf::from));
        let toml = match path {
            Some(p) => read_toml(&p)?,
            None => TomlConfig::default(),
        };
        Self::merge(toml, overrides, env)
    }

    /// Resolve configuration from TOML text instead of a file.
    pub fn from_toml_str(
        content: &str,
        overrides: Overrides,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let toml: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::config(format!("invalid config: {e}")))?;
        Self::merge(toml, overrides, env)
    }

    fn merge(
        toml: TomlConfig,
        overrides: Overrides,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let server_default = ServerConfig::default();
        let db_default = DatabaseConfig::default();
        let (listen_host, listen_port) = match overrides.listen {
            Some((h, p)) => (Some(h), Some(p)),
            None => (None, None),
        };

        let server = ServerConfig {
            host: listen_host
                .or_else(|| env("ROWSERVE_HOST"))
                .or(toml.server.host)
                .unwrap_or(server_default.host),
            port: match listen_port {
                Some(p) => p,
                None => env_parse(env, "ROWSERVE_PORT")?
                    .or(toml.server.port)
                    .unwrap_or(server_default.port),
            },
        };

        let db = toml.database;
        let backend = match overrides.backend {
            Some(b) => b,
            None => env_parse(env, "ROWSERVE_DB_BACKEND")?
                .or(db.backend)
                .unwrap_or(db_default.backend),
        };
        let port = match overrides.db_port {
            Some(p) => p,
            None => env_parse(env, "ROWSERVE_DB_PORT")?
                .or(db.port)
                .unwrap_or(db_default.port),
        };
        let password = env("ROWSERVE_DB_PASSWORD")
            .or(db.password)
            .or_else(|| db.password_env.as_deref().and_then(env))
            .map(SecretString::from)
            .unwrap_or(db_default.password);
        let database = overrides
            .database
            .or_else(|| env("ROWSERVE_DB_NAME"))
            .or(db.database)
            .unwrap_or(db_default.database);
        if database.trim().is_empty() {
            return Err(Error::config("database must not be empty"));
        }
        let table = match overrides
            .table
            .or_else(|| env("ROWSERVE_DB_TABLE"))
            .or(db.table)
        {
            Some(t) => TableName::new(t)?,
            None => db_default.table,
        };
        let max_connections = db.max_connections.unwrap_or(db_default.max_connections);
        if max_connections == 0 {
            return Err(Error::config("max_connections must be at least 1"));
        }

        let database = DatabaseConfig {
            backend,
            host: overrides
                .db_host
                .or_else(|| env("ROWSERVE_DB_HOST"))
                .or(db.host)
                .unwrap_or(db_default.host),
            port,
            user: overrides
                .db_user
                .or_else(|| env("ROWSERVE_DB_USER"))
                .or(db.user)
                .unwrap_or(db_default.user),
            password,
            database,
            table,
            max_connections,
            acquire_timeout: secs(
                db.acquire_timeout_secs,
                db_default.acquire_timeout,
                "acquire_timeout_secs",
            )?,
            connect_timeout: secs(
                db.connect_timeout_secs,
                db_default.connect_timeout,
                "connect_timeout_secs",
            )?,
            query_timeout: secs(
                db.query_timeout_secs,
                db_default.query_timeout,
                "query_timeout_secs",
            )?,
        };

        Ok(Self { server, database })
    }
}
