//! Voice-room signaling: transient group/private rooms, membership,
//! screen-share presenter state, message relay, and timed teardown.

pub mod protocol;
pub mod routes;
pub mod signaling;
pub mod state;

/// Terminal errors for a requested room operation. The requester is
/// told via a single `error`-typed message; join-time errors also close
/// the transport, mid-session errors (`PresenterActive`) do not.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Voice room not found")]
    RoomNotFound,
    #[error("You are not invited to this call")]
    Unauthorized,
    #[error("Room is full (max {0} users)")]
    RoomFull(usize),
    #[error("Voice room already exists for this team")]
    Conflict,
    #[error("Another user is already sharing their screen")]
    PresenterActive,
}
