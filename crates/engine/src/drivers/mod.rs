pub mod mysql;
pub mod sqlite;

use crate::config::{Backend, DatabaseConfig};
use crate::error::{Error, Result};
use crate::rows::{ResultSet, Value};
use sqlx::{Column, ColumnIndex, Pool, Row, TypeInfo, ValueRef};
use std::fmt;
use std::future::Future;

/// How a column's values are decoded, derived from the type name the
/// database reports for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Null,
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Decimal,
    Text,
    Json,
    Date,
    Time,
    DateTime,
    Timestamp,
    /// Decode by the storage class of each value.
    Dynamic,
    Unsupported,
}

pub trait TableDriver: Send + Sync + 'static {
    type Pool: Clone + Send + Sync + 'static;

    fn connect(cfg: &DatabaseConfig) -> impl Future<Output = Result<Self::Pool>> + Send;

    /// Run `SELECT *` against `table` and return every row.
    fn select_all(
        pool: &Self::Pool,
        table: &TableName,
    ) -> impl Future<Output = Result<ResultSet>> + Send;
}

/// Name of the single table served. Always emitted quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::config("table name must not be empty"));
        }
        if name.contains('\0') {
            return Err(Error::config("table name must not contain NUL"));
        }
        Ok(Self(name))
    }

    pub(crate) fn trusted(name: &'static str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quote as an identifier, doubling any embedded quote character.
    pub fn quoted(&self, quote: char) -> String {
        let mut out = String::with_capacity(self.0.len() + 2);
        out.push(quote);
        for c in self.0.chars() {
            if c == quote {
                out.push(quote);
            }
            out.push(c);
        }
        out.push(quote);
        out
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pool for one of the supported backends.
#[derive(Debug, Clone)]
pub enum Connector {
    Mysql(Pool<sqlx::MySql>),
    Sqlite(Pool<sqlx::Sqlite>),
}

impl Connector {
    /// Open the pool and establish its first connection.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        let connecting = async {
            match cfg.backend {
                Backend::Mysql => mysql::Driver::connect(cfg).await.map(Connector::Mysql),
                Backend::Sqlite => sqlite::Driver::connect(cfg).await.map(Connector::Sqlite),
            }
        };
        match tokio::time::timeout(cfg.connect_timeout, connecting).await {
            Ok(res) => res,
            Err(_) => Err(Error::connect(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("no connection after {:?}", cfg.connect_timeout),
            )))),
        }
    }

    pub async fn fetch_all(&self, table: &TableName) -> Result<ResultSet> {
        match self {
            Connector::Mysql(pool) => mysql::Driver::select_all(pool, table).await,
            Connector::Sqlite(pool) => sqlite::Driver::select_all(pool, table).await,
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Connector::Mysql(_) => Backend::Mysql,
            Connector::Sqlite(_) => Backend::Sqlite,
        }
    }

    /// Close the pool; later checkouts fail with a connection error.
    pub async fn close(&self) {
        match self {
            Connector::Mysql(pool) => pool.close().await,
            Connector::Sqlite(pool) => pool.close().await,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Connector::Mysql(pool) => pool.is_closed(),
            Connector::Sqlite(pool) => pool.is_closed(),
        }
    }
}

/// Turn driver rows into a [`ResultSet`].
///
/// Column names and kinds are read from the first row; an empty result has no
/// columns. NULLs are mapped before `decode` is called.
pub(crate) fn shape<R>(
    rows: &[R],
    kind_of: fn(&str) -> ColumnKind,
    decode: fn(&R, usize, ColumnKind) -> sqlx::Result<Value>,
) -> Result<ResultSet>
where
    R: Row,
    usize: ColumnIndex<R>,
{
    let Some(first) = rows.first() else {
        return Ok(ResultSet::default());
    };
    let kinds: Vec<ColumnKind> = first
        .columns()
        .iter()
        .map(|c| kind_of(c.type_info().name()))
        .collect();
    let names: Vec<String> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let mut out = ResultSet::with_capacity(names, rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(kinds.len());
        for (idx, kind) in kinds.iter().enumerate() {
            let raw = row.try_get_raw(idx).map_err(Error::from_sqlx)?;
            if raw.is_null() {
                values.push(Value::Null);
                continue;
            }
            let value = decode(row, idx, *kind).map_err(|e| {
                Error::serialization(format!("column '{}': {}", out.columns()[idx], e))
            })?;
            values.push(value);
        }
        out.push(values)?;
    }
    Ok(out)
}

/// Boolean columns are integers underneath; only 0 and 1 read as booleans.
pub(crate) fn bool_or_int(n: i64) -> Value {
    match n {
        0 => Value::Bool(false),
        1 => Value::Bool(true),
        n => Value::Int(n),
    }
}

pub(crate) fn unsupported(type_name: &str) -> sqlx::Error {
    sqlx::Error::Decode(format!("unsupported column type {type_name}").into())
}
