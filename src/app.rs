//! HTTP surface of the dashboard.
//!
//! One axum router serves the single-page UI, takes file uploads, and
//! answers preview, chart and export requests against the table held in
//! shared state. State is a single slot: each successful upload
//! replaces the table, each failed upload clears it.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::downloader::{self, EXPORT_FILENAME};
use crate::graph::{self, ChartRequest};
use crate::loader;
use crate::table::Table;

pub struct AppState {
    table: Mutex<Option<Table>>,
}

#[derive(Serialize)]
struct ApiMessage {
    status: &'static str,
    message: String,
}

fn api_message(code: StatusCode, status: &'static str, message: String) -> Response {
    (code, Json(ApiMessage { status, message })).into_response()
}

fn no_table() -> Response {
    api_message(
        StatusCode::NOT_FOUND,
        "info",
        "Please upload a data file to get started.".to_string(),
    )
}

/// Build the application router with a fresh, empty state.
pub fn router() -> Router {
    let state = Arc::new(AppState {
        table: Mutex::new(None),
    });

    Router::new()
        .route("/", get(serve_dashboard))
        .route("/api/upload", post(upload_file))
        .route("/api/table", get(table_preview))
        .route("/api/chart", get(chart_png))
        .route("/api/export", get(export_csv))
        .nest_service("/static", ServeDir::new("static"))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn run(addr: &str) -> std::io::Result<()> {
    let app = router();
    let listener = TcpListener::bind(addr).await?;
    log::info!("listening on http://{addr}");
    axum::serve(listener, app).await
}

async fn serve_dashboard() -> Html<&'static str> {
    Html(include_str!("./static/dashboard.html"))
}

async fn upload_file(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let mut filename = String::new();
    let mut data: Option<Bytes> = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    filename = field.file_name().unwrap_or_default().to_string();
                    match field.bytes().await {
                        Ok(bytes) => data = Some(bytes),
                        Err(err) => {
                            return api_message(
                                StatusCode::BAD_REQUEST,
                                "error",
                                format!("Error loading file: {err}"),
                            );
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                return api_message(
                    StatusCode::BAD_REQUEST,
                    "error",
                    format!("Error loading file: {err}"),
                );
            }
        }
    }

    let Some(data) = data else {
        return api_message(
            StatusCode::UNPROCESSABLE_ENTITY,
            "error",
            "No file data received".to_string(),
        );
    };

    match loader::load_table(&filename, &data) {
        Ok(table) => {
            log::info!(
                "loaded '{filename}': {} columns, {} rows",
                table.column_count(),
                table.row_count()
            );
            let preview = table.preview();
            *state.table.lock().unwrap() = Some(table);
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "ok",
                    "message": "File uploaded successfully!",
                    "table": preview,
                })),
            )
                .into_response()
        }
        Err(err) => {
            log::error!("failed to load '{filename}': {err}");
            // a broken upload leaves no stale table behind
            *state.table.lock().unwrap() = None;
            api_message(
                StatusCode::UNPROCESSABLE_ENTITY,
                "error",
                format!("Error loading file: {err}"),
            )
        }
    }
}

async fn table_preview(State(state): State<Arc<AppState>>) -> Response {
    let guard = state.table.lock().unwrap();
    match guard.as_ref() {
        Some(table) => Json(table.preview()).into_response(),
        None => no_table(),
    }
}

async fn chart_png(
    State(state): State<Arc<AppState>>,
    Query(req): Query<ChartRequest>,
) -> Response {
    let guard = state.table.lock().unwrap();
    let Some(table) = guard.as_ref() else {
        return no_table();
    };

    match graph::render_chart(table, &req) {
        Ok(png) => {
            log::info!("rendered {} ({} bytes)", req.kind.label(), png.len());
            ([(header::CONTENT_TYPE, "image/png")], png).into_response()
        }
        Err(err) => {
            let status = if err.is_warning() { "warning" } else { "error" };
            log::warn!("{} not rendered: {err}", req.kind.label());
            api_message(StatusCode::UNPROCESSABLE_ENTITY, status, err.to_string())
        }
    }
}

async fn export_csv(State(state): State<Arc<AppState>>) -> Response {
    let guard = state.table.lock().unwrap();
    let Some(table) = guard.as_ref() else {
        return no_table();
    };

    match downloader::to_csv(table) {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{EXPORT_FILENAME}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => {
            log::error!("export failed: {err}");
            api_message(StatusCode::INTERNAL_SERVER_ERROR, "error", err.to_string())
        }
    }
}
