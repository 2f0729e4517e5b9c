//! Web server module for netpulse.
//!
//! Serves the dashboard page and the read-only JSON API over the sample store.
//! Data problems never turn into 5xx responses: a missing or corrupt partition
//! reads as an empty series and zeroed statistics.

use std::sync::Arc;

use askama::Template;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::query::{QueryService, Stats};
use crate::storage::Sample;

/// Values passed through to the dashboard page.
#[derive(Debug, Clone)]
pub struct PageInfo {
    pub timezone: String,
    pub cleanup_days: u32,
    pub target: String,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub query: QueryService,
    pub page: PageInfo,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

/// Dashboard template.
#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    timezone: String,
    cleanup_days: u32,
    target: String,
}

/// Wrapper to render Askama templates as Axum responses.
struct HtmlTemplate<T>(T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(rendered) => Html(rendered).into_response(),
            Err(err) => {
                tracing::error!(error = %err, "Template render failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(healthz_handler))
        .route("/api/data", get(data_handler))
        .route("/api/stats", get(stats_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Dashboard homepage handler.
async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let page = &state.page;
    HtmlTemplate(IndexTemplate {
        timezone: page.timezone.clone(),
        cleanup_days: page.cleanup_days,
        target: page.target.clone(),
    })
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Today's samples as a JSON array in append order.
async fn data_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Sample>> {
    let query = state.query.clone();
    match tokio::task::spawn_blocking(move || query.today_series()).await {
        Ok(series) => Json(series),
        Err(e) => {
            tracing::error!(error = %e, "Series read task failed");
            Json(Vec::new())
        }
    }
}

/// Today's summary statistics.
async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<Stats> {
    let query = state.query.clone();
    match tokio::task::spawn_blocking(move || query.today_stats()).await {
        Ok(stats) => Json(stats),
        Err(e) => {
            tracing::error!(error = %e, "Stats read task failed");
            Json(Stats::default())
        }
    }
}
