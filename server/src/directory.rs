//! Collaborator seams for identity data the realtime core does not own.
//!
//! User profiles and team membership live in the main backend; the core
//! only needs display names (to decorate presence payloads) and team
//! member lists (to fan out team broadcasts).

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Display-name lookup. A missing user degrades to an empty display
/// name, never an error.
pub trait UserDirectory: Send + Sync {
    fn username(&self, user_id: &str) -> Option<String>;
}

/// Team membership lookup, used to address `send_many` fan-outs.
pub trait TeamDirectory: Send + Sync {
    fn member_ids(&self, team_id: &str) -> Vec<String>;
}

/// Map-backed directory for the standalone binary and tests. Deployed
/// alongside the main backend this is replaced by its user/team store.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<String, String>>,
    teams: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: impl Into<String>, username: impl Into<String>) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.into(), username.into());
    }

    pub fn add_team(&self, team_id: impl Into<String>, member_ids: Vec<String>) {
        self.teams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(team_id.into(), member_ids);
    }
}

impl UserDirectory for InMemoryDirectory {
    fn username(&self, user_id: &str) -> Option<String> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }
}

impl TeamDirectory for InMemoryDirectory {
    fn member_ids(&self, team_id: &str) -> Vec<String> {
        self.teams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(team_id)
            .cloned()
            .unwrap_or_default()
    }
}
