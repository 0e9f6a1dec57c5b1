use super::{ColumnKind, TableDriver, TableName, bool_or_int, shape, unsupported};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::rows::{ResultSet, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use secrecy::ExposeSecret;
use sqlx::error::UnexpectedNullError;
use sqlx::mysql::types::MySqlTime;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{Pool, Row, TypeInfo, ValueRef};

pub struct Driver;

impl TableDriver for Driver {
    type Pool = Pool<MySql>;

    async fn connect(cfg: &DatabaseConfig) -> Result<Self::Pool> {
        let options = MySqlConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.user)
            .password(cfg.password.expose_secret())
            .database(&cfg.database);
        MySqlPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(cfg.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(Error::connect)
    }

    async fn select_all(pool: &Self::Pool, table: &TableName) -> Result<ResultSet> {
        let sql = format!("SELECT * FROM {}", table.quoted('`'));
        let rows = sqlx::query(sql.as_str())
            .fetch_all(pool)
            .await
            .map_err(Error::from_sqlx)?;
        shape(&rows, column_kind, decode)
    }
}

/// Map a MySQL type name as reported by sqlx to a [`ColumnKind`].
pub fn column_kind(type_name: &str) -> ColumnKind {
    if type_name.ends_with(" UNSIGNED") {
        return ColumnKind::UInt;
    }
    match type_name {
        "NULL" => ColumnKind::Null,
        "BOOLEAN" => ColumnKind::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => ColumnKind::Int,
        "FLOAT" => ColumnKind::Float,
        "DOUBLE" => ColumnKind::Double,
        "DECIMAL" => ColumnKind::Decimal,
        "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            ColumnKind::Text
        }
        "JSON" => ColumnKind::Json,
        "DATE" => ColumnKind::Date,
        "TIME" => ColumnKind::Time,
        "DATETIME" => ColumnKind::DateTime,
        "TIMESTAMP" => ColumnKind::Timestamp,
        // BINARY, VARBINARY, BLOB variants, BIT, GEOMETRY
        _ => ColumnKind::Unsupported,
    }
}

// Integer and text kinds decode unchecked: the kind already pins the wire
// format, and sqlx's compatibility table rejects YEAR, SET and DECIMAL.
fn decode(row: &MySqlRow, idx: usize, kind: ColumnKind) -> sqlx::Result<Value> {
    Ok(match kind {
        ColumnKind::Null => Value::Null,
        // BOOLEAN is TINYINT(1) and may hold any value in -128..=127
        ColumnKind::Bool => bool_or_int(row.try_get_unchecked::<i64, _>(idx)?),
        ColumnKind::Int => row.try_get_unchecked::<i64, _>(idx)?.into(),
        ColumnKind::UInt => row.try_get_unchecked::<u64, _>(idx)?.into(),
        ColumnKind::Float => row.try_get::<f32, _>(idx)?.into(),
        ColumnKind::Double => row.try_get::<f64, _>(idx)?.into(),
        ColumnKind::Decimal | ColumnKind::Text => row.try_get_unchecked::<String, _>(idx)?.into(),
        ColumnKind::Json => row.try_get::<serde_json::Value, _>(idx)?.into(),
        ColumnKind::Date => zero_date_as_null(row.try_get::<NaiveDate, _>(idx))?,
        ColumnKind::Time => time_value(row.try_get::<MySqlTime, _>(idx)?),
        ColumnKind::DateTime => zero_date_as_null(row.try_get::<NaiveDateTime, _>(idx))?,
        ColumnKind::Timestamp => zero_date_as_null(row.try_get::<DateTime<Utc>, _>(idx))?,
        ColumnKind::Dynamic | ColumnKind::Unsupported => {
            let raw = row.try_get_raw(idx)?;
            return Err(unsupported(raw.type_info().name()));
        }
    })
}

/// `0000-00-00` and its DATETIME/TIMESTAMP forms carry no date; sqlx reports
/// them as an unexpected NULL.
fn zero_date_as_null<T: Into<Value>>(decoded: sqlx::Result<T>) -> sqlx::Result<Value> {
    match decoded {
        Ok(v) => Ok(v.into()),
        Err(sqlx::Error::ColumnDecode { source, .. }) if source.is::<UnexpectedNullError>() => {
            Ok(Value::Null)
        }
        Err(e) => Err(e),
    }
}

/// TIME is an interval in MySQL; values outside a day are kept as text.
fn time_value(time: MySqlTime) -> Value {
    match NaiveTime::try_from(time) {
        Ok(t) if time.is_valid_time_of_day() => t.into(),
        _ => Value::Text(time.to_string()),
    }
}
