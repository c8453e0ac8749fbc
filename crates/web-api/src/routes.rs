use std::path::Path;

use application::{CreateRoomOutcome, RoomCredentials};
use axum::{
    extract::{rejection::JsonRejection, ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{error::ApiError, state::AppState, ws_connection::serve_socket};

pub fn router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/ws", get(websocket_upgrade))
        .route("/create-room", post(create_room))
        .route("/join-room", post(join_room))
        .route("/health", get(health))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_room(
    State(state): State<AppState>,
    payload: Result<Json<RoomCredentials>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(credentials) = payload?;
    let status = match state.room_service.create_room(credentials).await? {
        CreateRoomOutcome::Created => StatusCode::CREATED,
        CreateRoomOutcome::AlreadyExists => StatusCode::OK,
    };
    Ok(status)
}

async fn join_room(
    State(state): State<AppState>,
    payload: Result<Json<RoomCredentials>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(credentials) = payload?;
    state.room_service.join_room(credentials).await?;
    Ok(StatusCode::OK)
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}
