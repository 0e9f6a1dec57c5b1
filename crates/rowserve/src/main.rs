use clap::Parser;
use rowserve_engine::logging::{self, LogConfig};
use rowserve_engine::{AppConfig, Backend, Engine, Overrides};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "rowserve",
    version,
    about = "Serve one database table as JSON on GET /api/data",
    disable_help_subcommand = true
)]
struct Cli {
    /// Listen on HOST:PORT
    #[arg(short = 'S', value_name = "HOST:PORT")]
    serve: Option<String>,

    /// TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database backend: mysql or sqlite
    #[arg(long, value_parser = parse_backend)]
    backend: Option<Backend>,

    /// Database host
    #[arg(long = "db-host", value_name = "HOST")]
    db_host: Option<String>,

    /// Database port
    #[arg(long = "db-port", value_name = "PORT")]
    db_port: Option<u16>,

    /// Database user (the password comes from the config file or ROWSERVE_DB_PASSWORD)
    #[arg(long = "db-user", value_name = "USER")]
    db_user: Option<String>,

    /// Database name, or file path for sqlite
    #[arg(long, value_name = "NAME")]
    database: Option<String>,

    /// Table to serve
    #[arg(long, value_name = "TABLE")]
    table: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn parse_backend(s: &str) -> Result<Backend, String> {
    s.parse().map_err(|e: rowserve_engine::Error| e.to_string())
}

fn parse_host_port(s: &str) -> Result<(String, u16), String> {
    if let Some(rest) = s.strip_prefix('[') {
        // bracketed IPv6: [host]:port
        if let Some(end) = rest.find(']') {
            let host = &rest[..end];
            let remain = &rest[end + 1..];
            let port = remain
                .strip_prefix(':')
                .ok_or("missing port after IPv6 host")?;
            let port: u16 = port.parse().map_err(|_| "invalid port".to_string())?;
            return Ok((host.to_string(), port));
        }
        return Err("invalid bracketed IPv6 address".to_string());
    }
    let mut parts = s.rsplitn(2, ':');
    let port_str = parts.next().ok_or("missing port")?;
    let host = parts.next().ok_or("missing host")?;
    let port: u16 = port_str.parse().map_err(|_| "invalid port".to_string())?;
    Ok((host.to_string(), port))
}

impl Cli {
    fn overrides(&self) -> Result<Overrides, String> {
        let listen = match self.serve.as_deref() {
            Some(addr) => Some(parse_host_port(addr)?),
            None => None,
        };
        Ok(Overrides {
            listen,
            backend: self.backend,
            db_host: self.db_host.clone(),
            db_port: self.db_port,
            db_user: self.db_user.clone(),
            database: self.database.clone(),
            table: self.table.clone(),
        })
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init(&LogConfig {
        level: cli.log_level.clone(),
        json: cli.json_logs,
    });

    let overrides = match cli.overrides() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("-S expects HOST:PORT (e.g. 127.0.0.1:5000), error: {}", e);
            std::process::exit(2);
        }
    };

    let config = match AppConfig::load(cli.config.as_deref(), overrides) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    let listen = config.server.addr();
    let engine = match Engine::connect(config).await {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "cannot connect to database");
            std::process::exit(1);
        }
    };

    if let Err(e) = engine.run().await {
        tracing::error!(error = %e, %listen, "server failed");
        std::process::exit(1);
    }
}
