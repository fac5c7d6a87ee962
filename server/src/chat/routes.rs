//! Chat endpoints.
//!
//! Persistence and request validation belong to the main backend; these
//! handlers only perform the realtime fan-out. Authentication happens
//! upstream, so the verified user id arrives as a query parameter.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::hub::message::ChatMessage;
use crate::hub::Session;
use crate::state::AppState;
use crate::transport::Transport;

const BAD_MESSAGE_TYPE: &str = "message type must be direct or team";
const MISSING_PARAMETER: &str = "missing parameter(s)";

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendQuery {
    #[serde(rename = "type")]
    pub kind: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages/connect", get(connect))
        .route("/messages", post(send_message))
}

/// GET /messages/connect?userId=
/// Upgrade and register the user's chat session with the hub.
async fn connect(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        state
            .hub
            .register(Session::new(query.user_id, Transport::from_websocket(socket)));
    })
}

/// POST /messages?type=direct|team
/// Fan the (already validated) message body out to its recipients.
/// Offline recipients are skipped: delivery is best-effort.
async fn send_message(
    State(state): State<AppState>,
    Query(query): Query<SendQuery>,
    Json(body): Json<Value>,
) -> Response {
    match query.kind.as_str() {
        "direct" => {
            let Some(receiver_id) = body.get("receiverId").and_then(Value::as_str) else {
                return bad_request(MISSING_PARAMETER);
            };
            state.hub.send(receiver_id, ChatMessage::direct(body.clone()));
            (StatusCode::CREATED, Json(body)).into_response()
        }
        "team" => {
            let Some(team_id) = body.get("teamId").and_then(Value::as_str) else {
                return bad_request(MISSING_PARAMETER);
            };
            let members = state.teams.member_ids(team_id);
            state.hub.send_many(&members, ChatMessage::team(body.clone()));
            (StatusCode::CREATED, Json(body)).into_response()
        }
        _ => bad_request(BAD_MESSAGE_TYPE),
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
