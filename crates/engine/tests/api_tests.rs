use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use rowserve_engine::{AppConfig, DatabaseConfig, Engine, Error, ServerConfig, TableName};
use serde_json::{Value, json};
use sqlx::Connection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

struct Fixture {
    _dir: TempDir,
    path: PathBuf,
}

async fn fixture(statements: &[&str]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");
    let opts = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&opts).await.unwrap();
    for sql in statements {
        sqlx::query(sql).execute(&mut conn).await.unwrap();
    }
    conn.close().await.unwrap();
    Fixture { _dir: dir, path }
}

fn config(path: &Path, table: &str) -> AppConfig {
    AppConfig {
        server: ServerConfig::default(),
        database: DatabaseConfig::sqlite(path, TableName::new(table).unwrap()),
    }
}

async fn engine(fx: &Fixture, table: &str) -> Engine {
    Engine::connect(config(&fx.path, table)).await.unwrap()
}

async fn send(router: Router, method: Method, uri: &str) -> (StatusCode, Option<String>, Bytes) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, body)
}

async fn get_data(router: Router) -> (StatusCode, Option<String>, Bytes) {
    send(router, Method::GET, "/api/data").await
}

#[tokio::test]
async fn empty_table_returns_empty_array() {
    let fx = fixture(&["CREATE TABLE items (id INTEGER, name TEXT)"]).await;
    let engine = engine(&fx, "items").await;

    let (status, content_type, body) = get_data(engine.router()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert_eq!(&body[..], b"[]");
}

#[tokio::test]
async fn rows_are_objects_keyed_by_column() {
    let fx = fixture(&[
        "CREATE TABLE items (id INTEGER, name TEXT)",
        "INSERT INTO items (id, name) VALUES (1, 'a'), (2, 'b')",
    ])
    .await;
    let engine = engine(&fx, "items").await;

    let (status, content_type, body) = get_data(engine.router()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert_eq!(
        std::str::from_utf8(&body).unwrap(),
        r#"[{"id":1,"name":"a"},{"id":2,"name":"b"}]"#
    );
}

#[tokio::test]
async fn array_length_and_keys_match_table_shape() {
    let fx = fixture(&[
        "CREATE TABLE readings (id INTEGER, sensor TEXT, value REAL, note TEXT)",
        "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 25) \
         INSERT INTO readings SELECT x, 's' || x, x * 0.5, NULL FROM n",
    ])
    .await;
    let engine = engine(&fx, "readings").await;

    let (status, _, body) = get_data(engine.router()).await;
    assert_eq!(status, StatusCode::OK);
    let rows: Vec<serde_json::Map<String, Value>> = serde_json::from_slice(&body).unwrap();
    assert_eq!(rows.len(), 25);
    assert!(rows.iter().all(|r| r.len() == 4));
    assert_eq!(rows[24]["sensor"], "s25");
    assert_eq!(rows[24]["value"], 12.5);
    assert!(rows[0]["note"].is_null());
}

#[tokio::test]
async fn repeated_reads_are_identical() {
    let fx = fixture(&[
        "CREATE TABLE items (id INTEGER, name TEXT)",
        "INSERT INTO items VALUES (3, 'c'), (1, 'a'), (2, 'b')",
    ])
    .await;
    let engine = engine(&fx, "items").await;

    let (_, _, first) = get_data(engine.router()).await;
    let (_, _, second) = get_data(engine.router()).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn column_types_map_to_json_values() {
    let fx = fixture(&[
        "CREATE TABLE typed (i INTEGER, r REAL, t TEXT, n TEXT, b BOOLEAN, d DATE, dt DATETIME, v VARCHAR(10), x)",
        "INSERT INTO typed VALUES (-7, 2.5, 'héllo', NULL, 1, '2024-01-02', '2024-01-02 10:30:00', 'short', 42)",
    ])
    .await;
    let engine = engine(&fx, "typed").await;

    let (status, _, body) = get_data(engine.router()).await;
    assert_eq!(status, StatusCode::OK);
    let rows: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        rows,
        json!([{
            "i": -7,
            "r": 2.5,
            "t": "héllo",
            "n": null,
            "b": true,
            "d": "2024-01-02",
            "dt": "2024-01-02T10:30:00",
            "v": "short",
            "x": 42,
        }])
    );
}

#[tokio::test]
async fn values_that_do_not_fit_their_column_fall_back_to_storage_class() {
    let fx = fixture(&[
        "CREATE TABLE loose (id INTEGER, d DATE)",
        "INSERT INTO loose VALUES ('seven', 'someday')",
    ])
    .await;
    let engine = engine(&fx, "loose").await;

    let (status, _, body) = get_data(engine.router()).await;
    assert_eq!(status, StatusCode::OK);
    let rows: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(rows, json!([{"id": "seven", "d": "someday"}]));
}

#[tokio::test]
async fn datetime_with_offset_keeps_the_instant() {
    let fx = fixture(&[
        "CREATE TABLE events (dt DATETIME)",
        "INSERT INTO events VALUES ('2024-01-02 10:30:00+02:00'), ('2024-01-02 10:30:00'), \
         ('2024-01-02T10:30:00Z'), (1704191400)",
    ])
    .await;
    let engine = engine(&fx, "events").await;

    let (status, _, body) = get_data(engine.router()).await;
    assert_eq!(status, StatusCode::OK);
    let rows: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        rows,
        json!([
            {"dt": "2024-01-02T08:30:00Z"},
            {"dt": "2024-01-02T10:30:00"},
            {"dt": "2024-01-02T10:30:00Z"},
            {"dt": 1704191400},
        ])
    );
}

#[tokio::test]
async fn boolean_column_maps_only_zero_and_one() {
    let fx = fixture(&[
        "CREATE TABLE flags (b BOOLEAN)",
        "INSERT INTO flags VALUES (0), (1), (2), ('yes')",
    ])
    .await;
    let engine = engine(&fx, "flags").await;

    let (status, _, body) = get_data(engine.router()).await;
    assert_eq!(status, StatusCode::OK);
    let rows: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        rows,
        json!([{"b": false}, {"b": true}, {"b": 2}, {"b": "yes"}])
    );
}

#[tokio::test]
async fn binary_values_are_a_serialization_error() {
    let fx = fixture(&[
        "CREATE TABLE files (id INTEGER, data BLOB)",
        "INSERT INTO files VALUES (1, x'00ff')",
    ])
    .await;
    let engine = engine(&fx, "files").await;

    let (status, content_type, body) = get_data(engine.router()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    let err: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(err["error"]["type"], "serialization_error");
}

#[tokio::test]
async fn null_blob_is_still_null() {
    let fx = fixture(&[
        "CREATE TABLE files (id INTEGER, data BLOB)",
        "INSERT INTO files VALUES (1, NULL)",
    ])
    .await;
    let engine = engine(&fx, "files").await;

    let (status, _, body) = get_data(engine.router()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(std::str::from_utf8(&body).unwrap(), r#"[{"id":1,"data":null}]"#);
}

#[tokio::test]
async fn missing_table_is_500() {
    let fx = fixture(&["CREATE TABLE items (id INTEGER)"]).await;
    let engine = engine(&fx, "nope").await;

    let (status, _, body) = get_data(engine.router()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let err: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(err["error"]["type"], "query_error");
    assert_eq!(err["error"]["message"], "query failed");
}

#[tokio::test]
async fn table_names_are_quoted() {
    let fx = fixture(&[
        r#"CREATE TABLE "odd ""name""" (id INTEGER)"#,
        r#"INSERT INTO "odd ""name""" VALUES (9)"#,
    ])
    .await;
    let engine = engine(&fx, "odd \"name\"").await;

    let (status, _, body) = get_data(engine.router()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], br#"[{"id":9}]"#);
}

#[tokio::test]
async fn unreachable_database_is_500_and_keeps_serving() {
    let fx = fixture(&["CREATE TABLE items (id INTEGER)"]).await;
    let engine = engine(&fx, "items").await;
    engine.connector().close().await;

    for _ in 0..2 {
        let (status, _, body) = get_data(engine.router()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let err: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(err["error"]["type"], "connection_error");
    }
}

#[tokio::test]
async fn slow_query_times_out() {
    let fx = fixture(&[
        "CREATE VIEW slow AS WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 5000000) \
         SELECT count(*) AS c FROM n",
    ])
    .await;
    let mut cfg = config(&fx.path, "slow");
    cfg.database = cfg.database.set_query_timeout(Duration::from_millis(20));
    let engine = Engine::connect(cfg).await.unwrap();

    let (status, _, body) = get_data(engine.router()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let err: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(err["error"]["type"], "timeout_error");
}

#[tokio::test]
async fn only_get_api_data_is_routed() {
    let fx = fixture(&["CREATE TABLE items (id INTEGER)"]).await;
    let engine = engine(&fx, "items").await;

    let (status, _, _) = send(engine.router(), Method::POST, "/api/data").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let (status, _, _) = send(engine.router(), Method::GET, "/api/other").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_database_file_fails_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let err = Engine::connect(config(&dir.path().join("absent.db"), "items"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Connection(_)), "{err}");
}

#[tokio::test]
async fn unreachable_mysql_fails_at_startup() {
    let mut database = DatabaseConfig::default();
    database.host = "127.0.0.1".to_string();
    database.port = 1;
    database.connect_timeout = Duration::from_secs(2);
    database.acquire_timeout = Duration::from_secs(1);
    let cfg = AppConfig {
        server: ServerConfig::default(),
        database,
    };

    let err = Engine::connect(cfg).await.err().unwrap();
    assert_eq!(err.kind(), "connection_error");
}

#[tokio::test]
async fn serves_over_tcp_and_closes_pool_on_shutdown() {
    let fx = fixture(&[
        "CREATE TABLE items (id INTEGER, name TEXT)",
        "INSERT INTO items VALUES (1, 'a')",
    ])
    .await;
    let engine = engine(&fx, "items").await;
    let connector = engine.connector().clone();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(engine.serve(listener, async move {
        let _ = stop_rx.await;
    }));

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /api/data HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8(raw).unwrap();
    assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
    assert!(raw.to_ascii_lowercase().contains("content-type: application/json"));
    assert!(raw.ends_with(r#"[{"id":1,"name":"a"}]"#), "{raw}");

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    assert!(connector.is_closed());
}
