//! Shared application state passed to all handlers.

use std::sync::Arc;

use crate::directory::{TeamDirectory, UserDirectory};
use crate::hub::message::ChatMessage;
use crate::hub::Hub;
use crate::voice::state::RoomRegistry;

/// Explicit, constructor-injected state: no package-level singletons,
/// so tests can run isolated instances side by side.
#[derive(Clone)]
pub struct AppState {
    /// Chat delivery hub, keyed by user id.
    pub hub: Arc<Hub<ChatMessage>>,
    /// Voice room registry.
    pub rooms: Arc<RoomRegistry>,
    /// Display-name collaborator.
    pub users: Arc<dyn UserDirectory>,
    /// Team-membership collaborator.
    pub teams: Arc<dyn TeamDirectory>,
}

impl AppState {
    pub fn new(
        rooms: RoomRegistry,
        users: Arc<dyn UserDirectory>,
        teams: Arc<dyn TeamDirectory>,
    ) -> Self {
        Self {
            hub: Arc::new(Hub::new()),
            rooms: Arc::new(rooms),
            users,
            teams,
        }
    }
}
