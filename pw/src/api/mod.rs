//! HTTP control surface
//!
//! Translates REST requests into [`WorkerHandle`] calls. All worker logic
//! lives behind the handle; handlers only map shapes and status codes.

mod error;
mod handlers;
mod models;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::middleware;
use axum::response::Response;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

use crate::catalog::Catalog;
use crate::worker::WorkerHandle;

pub use error::ApiError;
pub use handlers::COMPLETION_EVENT;
pub use models::{DeviceResponse, PlanResponse, StateChangeRequest, TaskResponse, WorkerTask};

/// Version reported in every response's `X-API-Version` header
pub const API_VERSION: &str = "0.0.3";

/// Header carrying [`API_VERSION`]
pub const API_VERSION_HEADER: &str = "x-api-version";

/// Shared state injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub worker: WorkerHandle,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    pub fn new(worker: WorkerHandle, catalog: Catalog) -> Self {
        Self {
            worker,
            catalog: Arc::new(catalog),
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/plans", get(handlers::get_plans))
        .route("/plans/{name}", get(handlers::get_plan))
        .route("/devices", get(handlers::get_devices))
        .route("/devices/{name}", get(handlers::get_device))
        .route("/tasks", axum::routing::post(handlers::submit_task))
        .route("/tasks/{task_id}", get(handlers::get_task))
        .route("/tasks/{task_id}/completion", get(handlers::task_completion))
        .route(
            "/worker/task",
            get(handlers::get_active_task).put(handlers::set_active_task),
        )
        .route("/worker/state", get(handlers::get_state).put(handlers::set_state))
        .layer(middleware::map_response(add_api_version))
        .with_state(state)
}

async fn add_api_version(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));
    response
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "API listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
