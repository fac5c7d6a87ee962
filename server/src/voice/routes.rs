//! Voice room endpoints: room lifecycle over REST, joining over
//! WebSocket. Authentication happens upstream; handlers trust the
//! supplied user id.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::state::AppState;
use crate::transport::Transport;
use crate::voice::signaling;
use crate::voice::state::{Room, RoomKind};

#[derive(Debug, Deserialize)]
pub struct PrivateCallQuery {
    #[serde(rename = "callerId")]
    pub caller_id: String,
    #[serde(rename = "targetId")]
    pub target_id: String,
    #[serde(rename = "teamId", default)]
    pub team_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Room snapshot returned by the REST endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub id: String,
    pub team_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RoomKind,
    pub created_by: String,
    pub created_at: i64,
    pub user_count: usize,
}

impl RoomResponse {
    fn from_room(room: &Arc<Room>) -> Self {
        Self {
            id: room.id.clone(),
            team_id: room.team_id.clone(),
            name: room.name.clone(),
            kind: room.kind,
            created_by: room.created_by.clone(),
            created_at: room.created_at,
            user_count: room.user_count(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/voice/private/call", post(start_private_call))
        .route("/voice/joinable", get(joinable_rooms))
        .route("/voice/rooms/{team_id}", post(create_room).get(team_rooms))
        .route("/voice/join/{room_id}", get(join_room))
}

/// POST /voice/private/call?callerId=&targetId=&teamId=
async fn start_private_call(
    State(state): State<AppState>,
    Query(query): Query<PrivateCallQuery>,
) -> Response {
    if query.caller_id.is_empty() || query.target_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Both callerId and targetId are required"})),
        )
            .into_response();
    }

    let room = state
        .rooms
        .start_private_call(&query.caller_id, &query.target_id, &query.team_id);
    (StatusCode::CREATED, Json(RoomResponse::from_room(&room))).into_response()
}

/// GET /voice/joinable?userId=
async fn joinable_rooms(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Json<Vec<RoomResponse>> {
    let rooms = state
        .rooms
        .list_joinable(&query.user_id)
        .iter()
        .map(RoomResponse::from_room)
        .collect();
    Json(rooms)
}

/// POST /voice/rooms/{teamId}?userId=&name=
async fn create_room(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Query(query): Query<CreateRoomQuery>,
) -> Response {
    match state
        .rooms
        .create_group_room(&team_id, &query.user_id, query.name.as_deref())
    {
        Ok(room) => (StatusCode::CREATED, Json(RoomResponse::from_room(&room))).into_response(),
        Err(err) => {
            (StatusCode::CONFLICT, Json(json!({"error": err.to_string()}))).into_response()
        }
    }
}

/// GET /voice/rooms/{teamId}
async fn team_rooms(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> Json<Vec<RoomResponse>> {
    let rooms = state
        .rooms
        .list_for_team(&team_id)
        .iter()
        .map(RoomResponse::from_room)
        .collect();
    Json(rooms)
}

/// GET /voice/join/{roomId}?userId=
/// Upgrade, then hand the transport to the signaling engine. Join
/// validation happens inside the engine so rejections arrive as
/// `error` messages on the socket, not HTTP statuses.
async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<UserQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| {
        signaling::run_connection(
            state,
            room_id,
            query.user_id,
            Transport::from_websocket(socket),
        )
    })
}
