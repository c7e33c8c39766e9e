//! REST API.
//!
//! Every per-rover route takes `{id}` as either a session id (`rover-3`) or
//! the literal `active` for the currently selected session.

use axum::{
    debug_handler,
    extract::{Path, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::{net::TcpListener, sync::broadcast};
use tokio_graceful_shutdown::SubsystemHandle;

use roverlink_core::{
    NavPatch, RemoteId, RemoteRecord, RoverSession, SdrPatch, SessionId, SessionPatch, Toggled,
};

use crate::manager::{ManagerError, RoverManager};

const ROVERS_URI: &str = "/v1/api/rovers";
const SELECTION_URI: &str = "/v1/api/selection";
const ROVER_URI: &str = "/v1/api/rovers/{id}";
const NAV_URI: &str = "/v1/api/rovers/{id}/nav";
const SDR_URI: &str = "/v1/api/rovers/{id}/sdr";
const CONNECT_URI: &str = "/v1/api/rovers/{id}/connect";
const DISCONNECT_URI: &str = "/v1/api/rovers/{id}/disconnect";
const TEST_URI: &str = "/v1/api/rovers/{id}/test";
const STOP_URI: &str = "/v1/api/rovers/{id}/stop";
const GRID_URI: &str = "/v1/api/rovers/{id}/waypoints/grid";
const MISSION_URI: &str = "/v1/api/rovers/{id}/waypoints/mission";
const SAVE_URI: &str = "/v1/api/rovers/{id}/save";
const SDR_APPLY_URI: &str = "/v1/api/rovers/{id}/sdr/apply";
const SDR_VERIFY_URI: &str = "/v1/api/rovers/{id}/sdr/verify";
const SDR_TXGPS_URI: &str = "/v1/api/rovers/{id}/sdr/txgps";

const SAVED_URI: &str = "/v1/api/saved";
const SAVED_LOAD_URI: &str = "/v1/api/saved/{remote_id}/load";

const ACTIVE: &str = "active";

#[derive(Error, Debug)]
pub enum WebError {
    #[error("Socket operation failed")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct Web {
    manager: RoverManager,
    port: u16,
    shutdown_tx: broadcast::Sender<()>,
}

impl Web {
    pub fn new(manager: RoverManager, port: u16) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Web {
            manager,
            port,
            shutdown_tx,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(ROVERS_URI, get(get_rovers).post(add_rover))
            .route(SELECTION_URI, put(select_rover))
            .route(ROVER_URI, get(get_rover).patch(update_rover).delete(delete_rover))
            .route(NAV_URI, put(update_nav))
            .route(SDR_URI, put(update_sdr))
            .route(CONNECT_URI, post(connect))
            .route(DISCONNECT_URI, post(disconnect))
            .route(TEST_URI, post(movement_test))
            .route(STOP_URI, post(force_stop))
            .route(GRID_URI, post(toggle_grid_waypoint))
            .route(MISSION_URI, put(import_mission).delete(clear_mission))
            .route(SAVE_URI, post(save))
            .route(SDR_APPLY_URI, post(apply_sdr))
            .route(SDR_VERIFY_URI, post(verify_sdr))
            .route(SDR_TXGPS_URI, post(transmit_gps))
            .route(SAVED_URI, get(get_saved))
            .route(SAVED_LOAD_URI, post(load_saved))
            .layer(middleware::from_fn(no_cache_middleware))
            .with_state(self.clone())
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), WebError> {
        let listener = TcpListener::bind(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            self.port,
        ))
        .await?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let shutdown_tx = self.shutdown_tx.clone();
        let app = self.router();

        log::info!("Starting HTTP web server on port {}", self.port);

        tokio::select! { biased;
            _ = subsys.on_shutdown_requested() => {
                let _ = shutdown_tx.send(());
            },
            r = axum::serve(listener, app)
                    .with_graceful_shutdown(
                        async move {
                            _ = shutdown_rx.recv().await;
                        }
                    ) => {
                return r.map_err(WebError::Io);
            }
        }
        Ok(())
    }
}

/// Middleware to add no-cache headers to API responses
async fn no_cache_middleware(request: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    response
}

/// `active` or a session id
fn target(id: &str) -> Result<Option<SessionId>, ManagerError> {
    if id == ACTIVE {
        return Ok(None);
    }
    id.parse()
        .map(Some)
        .map_err(|_| ManagerError::BadSessionId(id.to_string()))
}

type ApiResult<T> = Result<T, ManagerError>;

// =============================================================================
// Sessions
// =============================================================================

#[debug_handler]
async fn get_rovers(State(state): State<Web>) -> Response {
    Json(state.manager.snapshot()).into_response()
}

#[debug_handler]
async fn add_rover(State(state): State<Web>) -> Response {
    let session = state.manager.add_session();
    debug!("Added {}", session.id);
    (StatusCode::CREATED, Json(session)).into_response()
}

#[derive(Deserialize)]
struct Selection {
    id: SessionId,
}

#[debug_handler]
async fn select_rover(State(state): State<Web>, Json(selection): Json<Selection>) -> ApiResult<Response> {
    state.manager.select_session(selection.id)?;
    Ok(Json(state.manager.snapshot()).into_response())
}

#[debug_handler]
async fn get_rover(State(state): State<Web>, Path(id): Path<String>) -> ApiResult<Json<Arc<RoverSession>>> {
    Ok(Json(state.manager.session(target(&id)?)?))
}

#[debug_handler]
async fn update_rover(
    State(state): State<Web>,
    Path(id): Path<String>,
    Json(patch): Json<SessionPatch>,
) -> ApiResult<Json<Arc<RoverSession>>> {
    Ok(Json(state.manager.update_session(target(&id)?, &patch)?))
}

#[debug_handler]
async fn delete_rover(State(state): State<Web>, Path(id): Path<String>) -> ApiResult<Response> {
    let snapshot = state.manager.delete_session(target(&id)?).await?;
    Ok(Json(snapshot).into_response())
}

#[debug_handler]
async fn update_nav(
    State(state): State<Web>,
    Path(id): Path<String>,
    Json(patch): Json<NavPatch>,
) -> ApiResult<Json<Arc<RoverSession>>> {
    Ok(Json(state.manager.update_nav(target(&id)?, &patch)?))
}

#[debug_handler]
async fn update_sdr(
    State(state): State<Web>,
    Path(id): Path<String>,
    Json(patch): Json<SdrPatch>,
) -> ApiResult<Json<Arc<RoverSession>>> {
    Ok(Json(state.manager.update_sdr(target(&id)?, &patch)?))
}

// =============================================================================
// Connection and movement
// =============================================================================

#[debug_handler]
async fn connect(State(state): State<Web>, Path(id): Path<String>) -> ApiResult<Json<Arc<RoverSession>>> {
    Ok(Json(state.manager.connect(target(&id)?).await?))
}

#[debug_handler]
async fn disconnect(State(state): State<Web>, Path(id): Path<String>) -> ApiResult<Json<Arc<RoverSession>>> {
    Ok(Json(state.manager.disconnect(target(&id)?)?))
}

/// Starts the test and answers right away; poll the session for the result
#[debug_handler]
async fn movement_test(State(state): State<Web>, Path(id): Path<String>) -> ApiResult<Response> {
    let (session, _handle) = state.manager.start_movement_test(target(&id)?)?;
    Ok((StatusCode::ACCEPTED, Json(session)).into_response())
}

#[debug_handler]
async fn force_stop(State(state): State<Web>, Path(id): Path<String>) -> ApiResult<Json<Arc<RoverSession>>> {
    Ok(Json(state.manager.force_stop(target(&id)?)?))
}

// =============================================================================
// Waypoints
// =============================================================================

#[derive(Deserialize)]
struct GridToggle {
    row: u8,
    col: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GridToggleResult {
    toggled: Toggled,
    /// 1-based position of the cell in the route, when it was added
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<usize>,
    session: Arc<RoverSession>,
}

#[debug_handler]
async fn toggle_grid_waypoint(
    State(state): State<Web>,
    Path(id): Path<String>,
    Json(cell): Json<GridToggle>,
) -> ApiResult<Json<GridToggleResult>> {
    let (session, toggled) = state
        .manager
        .toggle_grid_waypoint(target(&id)?, cell.row, cell.col)?;
    let position = session
        .grid_waypoints
        .position(roverlink_core::GridCell::new(cell.row, cell.col));
    Ok(Json(GridToggleResult {
        toggled,
        position,
        session,
    }))
}

/// Body is the raw CSV text
#[debug_handler]
async fn import_mission(
    State(state): State<Web>,
    Path(id): Path<String>,
    body: String,
) -> ApiResult<Json<Arc<RoverSession>>> {
    Ok(Json(state.manager.import_mission_csv(target(&id)?, &body)?))
}

#[debug_handler]
async fn clear_mission(State(state): State<Web>, Path(id): Path<String>) -> ApiResult<Json<Arc<RoverSession>>> {
    Ok(Json(state.manager.clear_mission(target(&id)?)?))
}

// =============================================================================
// Persistence
// =============================================================================

#[debug_handler]
async fn save(State(state): State<Web>, Path(id): Path<String>) -> ApiResult<Json<Arc<RoverSession>>> {
    Ok(Json(state.manager.save(target(&id)?).await?))
}

/// Saved rovers, refreshed from the store; falls back to the last list if the store is down
#[debug_handler]
async fn get_saved(State(state): State<Web>) -> Json<Vec<RemoteRecord>> {
    match state.manager.refresh_saved().await {
        Ok(records) => Json(records),
        Err(e) => {
            warn!("Serving cached saved rovers: {}", e);
            Json(state.manager.saved())
        }
    }
}

#[debug_handler]
async fn load_saved(State(state): State<Web>, Path(remote_id): Path<String>) -> ApiResult<Response> {
    let session = state.manager.load_saved(&RemoteId(remote_id)).await?;
    Ok((StatusCode::CREATED, Json(session)).into_response())
}

// =============================================================================
// Radio
// =============================================================================

#[derive(Deserialize, Default)]
struct SdrCommand {
    /// Device URI of the radio
    #[serde(default)]
    uri: String,
}

#[debug_handler]
async fn apply_sdr(
    State(state): State<Web>,
    Path(id): Path<String>,
    Json(command): Json<SdrCommand>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(state.manager.apply_sdr(target(&id)?, &command.uri).await?))
}

#[debug_handler]
async fn verify_sdr(
    State(state): State<Web>,
    Path(id): Path<String>,
    Json(command): Json<SdrCommand>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(state.manager.verify_sdr(target(&id)?, &command.uri).await?))
}

#[debug_handler]
async fn transmit_gps(State(state): State<Web>, Path(id): Path<String>) -> ApiResult<Json<Arc<RoverSession>>> {
    Ok(Json(state.manager.transmit_gps(target(&id)?).await?))
}
