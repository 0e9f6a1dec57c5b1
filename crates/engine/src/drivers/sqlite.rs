use super::{ColumnKind, TableDriver, TableName, bool_or_int, shape, unsupported};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::rows::{ResultSet, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, TypeInfo, ValueRef};
use std::str::FromStr;

pub struct Driver;

impl TableDriver for Driver {
    type Pool = Pool<Sqlite>;

    async fn connect(cfg: &DatabaseConfig) -> Result<Self::Pool> {
        // Accept both `sqlite:` URLs and plain file paths
        let options = if cfg.database.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(&cfg.database).map_err(Error::connect)?
        } else {
            SqliteConnectOptions::new().filename(&cfg.database)
        };
        SqlitePoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(cfg.acquire_timeout)
            .connect_with(options.create_if_missing(false))
            .await
            .map_err(Error::connect)
    }

    async fn select_all(pool: &Self::Pool, table: &TableName) -> Result<ResultSet> {
        let sql = format!("SELECT * FROM {}", table.quoted('"'));
        let rows = sqlx::query(sql.as_str())
            .fetch_all(pool)
            .await
            .map_err(Error::from_sqlx)?;
        shape(&rows, column_kind, decode)
    }
}

/// Map a declared SQLite column type, as normalized by sqlx, to a [`ColumnKind`].
pub fn column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        "BOOLEAN" => ColumnKind::Bool,
        "INTEGER" => ColumnKind::Int,
        "REAL" => ColumnKind::Double,
        "TEXT" => ColumnKind::Text,
        "DATE" => ColumnKind::Date,
        "TIME" => ColumnKind::Time,
        "DATETIME" => ColumnKind::DateTime,
        "BLOB" => ColumnKind::Unsupported,
        _ => ColumnKind::Dynamic,
    }
}

// SQLite does not enforce declared types. Values are decoded by storage
// class and only narrowed to the declared kind when nothing is lost.
fn decode(row: &SqliteRow, idx: usize, kind: ColumnKind) -> sqlx::Result<Value> {
    Ok(match (kind, decode_dynamic(row, idx)?) {
        (ColumnKind::Bool, Value::Int(n)) => bool_or_int(n),
        (ColumnKind::Date, Value::Text(s)) => parse_date(&s).unwrap_or(Value::Text(s)),
        (ColumnKind::Time, Value::Text(s)) => parse_time(&s).unwrap_or(Value::Text(s)),
        (ColumnKind::DateTime, Value::Text(s)) => parse_datetime(&s).unwrap_or(Value::Text(s)),
        (_, value) => value,
    })
}

fn decode_dynamic(row: &SqliteRow, idx: usize) -> sqlx::Result<Value> {
    let raw = row.try_get_raw(idx)?;
    let storage = raw.type_info().name().to_string();
    Ok(match storage.as_str() {
        "NULL" => Value::Null,
        "INTEGER" => row.try_get::<i64, _>(idx)?.into(),
        "REAL" => row.try_get::<f64, _>(idx)?.into(),
        "TEXT" => row.try_get::<String, _>(idx)?.into(),
        other => return Err(unsupported(other)),
    })
}

fn parse_date(s: &str) -> Option<Value> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(Value::from)
}

fn parse_time(s: &str) -> Option<Value> {
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .map(Value::from)
}

/// Text with a UTC offset becomes a UTC timestamp; text without one stays a
/// naive datetime. Anything else is left to the caller.
fn parse_datetime(s: &str) -> Option<Value> {
    const NAIVE: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    const OFFSET: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f%#z",
        "%Y-%m-%dT%H:%M:%S%.f%#z",
        "%Y-%m-%d %H:%M%#z",
        "%Y-%m-%dT%H:%M%#z",
    ];
    if let Some(dt) = NAIVE
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt.into());
    }
    OFFSET
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc).into())
}
