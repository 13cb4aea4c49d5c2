//! Read-only HTTP API over the forecasts table.
//!
//! Routes:
//! - `GET /health`: `{"status":"ok"}`, no database access
//! - `GET /forecasts/latest`: one [`LatestForecast`] per location
//!
//! The `postgres` client is blocking, so each request opens its own
//! connection on the blocking pool.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::config::Config;
use crate::db;
use crate::error::{ForecastError, Result};
use crate::logging::{self, Component};
use crate::model::{HealthStatus, LatestForecast};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

#[derive(Clone)]
pub struct ApiState {
    config: Arc<Config>,
}

impl ApiState {
    pub fn new(config: Config) -> Self {
        ApiState {
            config: Arc::new(config),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/forecasts/latest", get(latest_forecasts))
        .with_state(state)
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus::ok())
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn load_latest(config: &Config) -> Result<Vec<LatestForecast>> {
    let mut client = db::connect(config)?;
    db::latest_forecasts(&mut client)
}

pub async fn latest_forecasts(State(state): State<ApiState>) -> Response {
    let config = Arc::clone(&state.config);
    match tokio::task::spawn_blocking(move || load_latest(&config)).await {
        Ok(Ok(rows)) => Json(rows).into_response(),
        Ok(Err(e)) => {
            logging::error(
                Component::Api,
                None,
                &format!("GET /forecasts/latest failed: {}", e),
            );
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("query task failed: {}", e),
        ),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        logging::warn(
            Component::Api,
            None,
            &format!("Cannot listen for Ctrl+C ({}); stop the process to shut down", e),
        );
        std::future::pending::<()>().await;
    }
}

/// Serves the API on `bind_addr` until Ctrl+C.
pub fn serve(config: Config, bind_addr: &str) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        logging::info(
            Component::Api,
            None,
            &format!("Listening on http://{}", listener.local_addr()?),
        );
        println!("Endpoints:");
        println!("  GET  /health            - Health check");
        println!("  GET  /forecasts/latest  - Latest forecast per location");

        axum::serve(listener, router(ApiState::new(config)))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        logging::info(Component::Api, None, "Server stopped");
        Ok::<_, ForecastError>(())
    })
}
