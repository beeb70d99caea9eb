use crate::bundle_store::{BundleStore, StoreError};
use crate::relay::{RelayError, RelayGateway, SUBMIT_PATH};
use crate::rpc::{
    BundleRpcRequest, BundleSubmission, RelayResult, RpcResponse, SimulateRequest,
    SimulateResponse, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, UPSTREAM_ERROR,
};
use crate::simulator::{SimulationClient, SimulationError, SIMULATE_PATH};
use axum::{
    extract::{rejection::JsonRejection, Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, IntoMakeService},
    Router,
};
use hyper::server::conn::AddrIncoming;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const RELAY_PATH: &str = "/relay/v1/bundle";
pub const STATS_PATH: &str = "/builder/v1/stats";
pub const HEALTH_PATH: &str = "/health";

/// Type alias for a bound axum server
pub type ServiceServer = axum::Server<AddrIncoming, IntoMakeService<Router>>;

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let code = match self {
            StoreError::InvalidBundle(..) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_body(code, self.to_string())
    }
}

impl IntoResponse for SimulationError {
    fn into_response(self) -> Response {
        error_body(StatusCode::BAD_GATEWAY, self.to_string())
    }
}

fn error_body(code: StatusCode, message: String) -> Response {
    (code, Json(json!({ "code": code.as_u16(), "message": message }))).into_response()
}

async fn handle_status_check() -> impl IntoResponse {
    tracing::debug!("status check");
    StatusCode::OK
}

// --- Relay ---

async fn handle_relay_bundle(
    Extension(gateway): Extension<Arc<RelayGateway>>,
    payload: Result<Json<BundleRpcRequest>, JsonRejection>,
) -> (StatusCode, Json<RpcResponse<RelayResult>>) {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            tracing::warn!("rejecting malformed bundle request: {rejection}");
            return (
                StatusCode::BAD_REQUEST,
                Json(RpcResponse::failure(Value::Null, INVALID_REQUEST, "invalid JSON")),
            );
        }
    };

    let id = request.id.clone();
    tracing::debug!("relay request {} ({})", id, request.method);

    let Some(params) = request.params.into_iter().next() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(RpcResponse::failure(id, INVALID_PARAMS, "missing params")),
        );
    };

    match gateway.handle(params).await {
        Ok(result) => (StatusCode::OK, Json(RpcResponse::success(id, result))),
        Err(err) => {
            tracing::warn!("bundle request {} failed: {}", id, err);
            let (status, code) = match err {
                RelayError::InvalidRequest(..) => (StatusCode::BAD_REQUEST, INVALID_PARAMS),
                RelayError::UpstreamUnavailable(..) => (StatusCode::BAD_GATEWAY, UPSTREAM_ERROR),
                RelayError::Build(..) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR),
            };
            (status, Json(RpcResponse::failure(id, code, err.to_string())))
        }
    }
}

pub fn relay_router(gateway: Arc<RelayGateway>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(handle_status_check))
        .route(RELAY_PATH, post(handle_relay_bundle))
        .layer(Extension(gateway))
}

// --- Simulator ---

async fn handle_simulate(
    Extension(simulator): Extension<Arc<dyn SimulationClient>>,
    Json(request): Json<SimulateRequest>,
) -> Result<Json<SimulateResponse>, SimulationError> {
    let bundle = request.into_bundle();
    let outcome = simulator.simulate(&bundle).await?;
    Ok(Json(outcome.into()))
}

pub fn simulator_router(simulator: Arc<dyn SimulationClient>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(handle_status_check))
        .route(SIMULATE_PATH, post(handle_simulate))
        .layer(Extension(simulator))
}

// --- Builder ---

async fn handle_submit_bundle(
    Extension(store): Extension<Arc<BundleStore>>,
    Json(submission): Json<BundleSubmission>,
) -> Result<impl IntoResponse, StoreError> {
    let result = store.submit(submission.into_bundle()).await?;
    Ok(Json(result))
}

async fn handle_stats(Extension(store): Extension<Arc<BundleStore>>) -> impl IntoResponse {
    Json(store.stats())
}

pub fn builder_router(store: Arc<BundleStore>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(handle_status_check))
        .route(SUBMIT_PATH, post(handle_submit_bundle))
        .route(STATS_PATH, get(handle_stats))
        .layer(Extension(store))
}

/// Binds `addr`; fails when the port is taken.
pub fn bind(addr: SocketAddr, router: Router) -> Result<ServiceServer, hyper::Error> {
    Ok(axum::Server::try_bind(&addr)?.serve(router.into_make_service()))
}

/// Spawns the server on a new task returning its address and the handle for it
pub fn spawn(server: ServiceServer) -> (SocketAddr, JoinHandle<()>) {
    let address = server.local_addr();
    let handle = tokio::spawn(async move {
        tracing::info!("listening at {address}...");
        if let Err(err) = server.await {
            tracing::error!("error while listening for incoming: {err}")
        }
    });
    (address, handle)
}
