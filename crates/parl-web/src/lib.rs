//! Read-only JSON API over the bills and MPs tables.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use parl_storage::{RecordStore, StoreError};
use parl_sync::config::{parse_var, ConfigError};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub const CRATE_NAME: &str = "parl-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl WebConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Ok(Self {
            host: get("PARL_WEB_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var(&get, "PARL_WEB_PORT", 1500)?,
        })
    }
}

/// Routes are served at the root and again under `/api`, where the browser
/// client expects them.
pub fn app(state: AppState) -> Router {
    let routes = Router::new()
        .route("/bills", get(list_bills_handler))
        .route("/bills/{id}", get(bill_detail_handler))
        .route("/mps", get(list_mps_handler))
        .route("/mps/{name}", get(mp_detail_handler));

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "read api listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn list_bills_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list_bills().await {
        Ok(bills) => Json(json!({ "bills": bills })).into_response(),
        Err(err) => server_error(err),
    }
}

async fn bill_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(legisinfo_id) = id.parse::<i64>() else {
        return error_response(StatusCode::BAD_REQUEST, "invalid legisinfo_id");
    };
    match state.store.bill_by_legisinfo_id(legisinfo_id).await {
        Ok(Some(bill)) => Json(json!({ "bill": bill })).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Bill not found"),
        Err(err) => server_error(err),
    }
}

async fn list_mps_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list_mps().await {
        Ok(mps) => Json(json!({ "MPs": mps })).into_response(),
        Err(err) => server_error(err),
    }
}

// `Path` has already percent-decoded the segment.
async fn mp_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.store.mp_by_name(&name).await {
        Ok(Some(mp)) => Json(json!({ "MP": mp })).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "MP not found"),
        Err(err) => server_error(err),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn server_error(err: StoreError) -> Response {
    error!(error = %err, "read query failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
}
