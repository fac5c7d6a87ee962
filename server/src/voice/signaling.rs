//! Per-connection signaling engine.
//!
//! Each joined room connection runs one reader loop (this module's
//! `run_connection`) and one writer task draining a bounded member
//! mailbox onto the transport. The engine owns the transport for the
//! connection's whole lifetime: join checks, presence broadcast,
//! message relay, screen-share exclusivity, and the disconnect cascade.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::state::AppState;
use crate::transport::{Frame, FrameSink, Transport};
use crate::voice::protocol::{self, ClientFrame, RoomUser, ServerEvent};
use crate::voice::state::{ConnId, Room, MEMBER_MAILBOX_CAPACITY};

/// Deadline for one outbound socket write. A write exceeding it is a
/// failed delivery for that member, not a stall of the whole relay.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive one member connection: `Connecting -> Joined -> Left`.
///
/// Join rejections send a single `error` message and close the
/// transport. After a successful join the loop relays inbound frames
/// until the transport errs/closes or this member's writer gives up.
pub async fn run_connection(
    state: AppState,
    room_id: String,
    user_id: String,
    transport: Transport,
) {
    let (mut sink, mut stream) = transport.split();

    let (tx, mailbox) = mpsc::channel::<String>(MEMBER_MAILBOX_CAPACITY);

    let (room, conn_id) = match state.rooms.join(&room_id, &user_id, tx.clone()) {
        Ok(joined) => joined,
        Err(err) => {
            tracing::debug!(room_id = %room_id, user_id = %user_id, error = %err, "join rejected");
            let frame = Frame::Text(ServerEvent::error(&err).to_json());
            let _ = timeout(WRITE_TIMEOUT, sink.send(frame)).await;
            let _ = sink.send(Frame::Close).await;
            return;
        }
    };

    tracing::info!(room_id = %room.id, user_id = %user_id, conn_id, "member joined voice room");

    let writer = tokio::spawn(write_loop(sink, mailbox));

    // Private snapshot for the joiner, then the join notification for
    // everyone already in the room.
    send_room_info(&state, &room, &tx);
    let joined_event = ServerEvent::UserJoined {
        user_id: user_id.clone(),
        username: state.users.username(&user_id).unwrap_or_default(),
    }
    .to_json();
    deliver(&room.recipients_except(conn_id), &joined_event);

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Frame::Text(text))) => {
                    handle_frame(&state, &room, conn_id, &user_id, &tx, &text);
                }
                Some(Ok(Frame::Close)) | Some(Err(_)) | None => break,
            },
            // The writer dropped the mailbox: a write failed or timed
            // out, so this member's delivery path is gone.
            () = tx.closed() => break,
        }
    }

    disconnect(&state, &room, conn_id);
    drop(tx);
    let _ = writer.await;
}

/// Writer task: member mailbox -> transport, one bounded write at a
/// time. Exits cleanly (Close frame) when every sender is gone, or
/// abruptly on a failed/expired write, which the reader observes via
/// the closed mailbox.
async fn write_loop(mut sink: FrameSink, mut mailbox: mpsc::Receiver<String>) {
    while let Some(text) = mailbox.recv().await {
        match timeout(WRITE_TIMEOUT, sink.send(Frame::Text(text))).await {
            Ok(Ok(())) => {}
            _ => return,
        }
    }
    let _ = sink.send(Frame::Close).await;
}

fn handle_frame(
    state: &AppState,
    room: &Room,
    conn_id: ConnId,
    user_id: &str,
    tx: &mpsc::Sender<String>,
    text: &str,
) {
    let Some(frame) = ClientFrame::parse(text) else {
        tracing::debug!(room_id = %room.id, user_id = %user_id, "malformed signaling frame dropped");
        return;
    };

    match frame {
        ClientFrame::RoomInfo => send_room_info(state, room, tx),

        ClientFrame::ScreenShareStart => match room.start_screen_share(user_id) {
            Ok(recipients) => {
                let event = ServerEvent::ScreenState {
                    presenter_id: user_id.to_string(),
                    active: true,
                }
                .to_json();
                deliver(&recipients, &event);
            }
            Err(err) => {
                // Mid-session rejection: the request is refused, the
                // connection stays up.
                let _ = tx.try_send(ServerEvent::error(&err).to_json());
            }
        },

        ClientFrame::ScreenShareStop => {
            if let Some(recipients) = room.stop_screen_share(user_id) {
                let event = ServerEvent::ScreenState {
                    presenter_id: String::new(),
                    active: false,
                }
                .to_json();
                deliver(&recipients, &event);
            }
        }

        ClientFrame::Signal(signal) => {
            let to = signal
                .get("to")
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(plan) = room.route(conn_id, to.as_deref()) {
                let text = protocol::stamp_from(signal, &plan.from);
                deliver(&plan.targets, &text);
            }
        }
    }
}

/// Reply privately with a fresh room snapshot.
fn send_room_info(state: &AppState, room: &Room, tx: &mpsc::Sender<String>) {
    let users = room
        .member_user_ids()
        .into_iter()
        .map(|user_id| {
            let username = state.users.username(&user_id).unwrap_or_default();
            RoomUser { user_id, username }
        })
        .collect::<Vec<_>>();

    let event = ServerEvent::RoomInfo {
        user_count: users.len(),
        users,
        can_join: room.can_join(),
        presenter_id: room.presenter().unwrap_or_default(),
    };
    let _ = tx.try_send(event.to_json());
}

/// Leave handling shared by read errors, write failures, and normal
/// close: membership removal, presenter cleanup, departure broadcast.
fn disconnect(state: &AppState, room: &std::sync::Arc<Room>, conn_id: ConnId) {
    let Some(outcome) = state.rooms.leave(room, conn_id) else {
        return;
    };

    if outcome.presenter_cleared {
        let event = ServerEvent::ScreenState {
            presenter_id: String::new(),
            active: false,
        }
        .to_json();
        deliver(&outcome.recipients, &event);
    }

    let event = ServerEvent::UserLeft {
        user_id: outcome.user_id.clone(),
    }
    .to_json();
    deliver(&outcome.recipients, &event);

    tracing::info!(room_id = %room.id, user_id = %outcome.user_id, conn_id, "member left voice room");
}

/// Best-effort fan-out into member mailboxes. A full or closed mailbox
/// drops the message for that member only; the member's own writer
/// deadline handles a genuinely stuck transport.
fn deliver(recipients: &[mpsc::Sender<String>], text: &str) {
    for tx in recipients {
        let _ = tx.try_send(text.to_string());
    }
}
