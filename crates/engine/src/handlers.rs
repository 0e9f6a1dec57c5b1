use crate::error::{Error, Result};
use crate::http::AppState;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// `GET /api/data`: every row of the configured table as a JSON array.
pub async fn get_data(State(state): State<Arc<AppState>>) -> Response {
    match read_table(&state).await {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(err) => {
            tracing::error!(
                table = %state.table,
                kind = err.kind(),
                error = %err,
                "failed to read table"
            );
            err.into_response()
        }
    }
}

async fn read_table(state: &AppState) -> Result<Vec<u8>> {
    let started = Instant::now();
    let rows = tokio::time::timeout(state.query_timeout, state.connector.fetch_all(&state.table))
        .await
        .map_err(|_| Error::Timeout {
            timeout: state.query_timeout,
        })??;
    let body = rows.to_json_vec()?;
    tracing::debug!(
        table = %state.table,
        rows = rows.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "table read"
    );
    Ok(body)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: &'static str,
    #[serde(rename = "type")]
    error_type: &'static str,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // driver messages stay in the log
        let message = match &self {
            Error::Connection(_) => "database unavailable",
            Error::Query(_) => "query failed",
            Error::Serialization { .. } => "result could not be serialized",
            Error::Timeout { .. } => "query timed out",
            Error::Config { .. } | Error::Io(_) => "internal error",
        };
        let body = ErrorResponse {
            error: ErrorDetail {
                message,
                error_type: self.kind(),
            },
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
