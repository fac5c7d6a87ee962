//! In-memory room registry and per-room membership state.
//!
//! Two-level locking: the registry's concurrent maps guard the
//! `room id -> Room` table and the pending-deletion set; each `Room`
//! guards its own mutable membership/presenter fields with an `RwLock`.
//! Unrelated rooms never serialize through one lock, and no lock is
//! held across a socket write: mutators collect recipient snapshots
//! under the lock and deliver after release.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use rand::RngCore;
use serde::Serialize;
use tokio::sync::mpsc;

use super::RoomError;

/// Default concurrent-member bound per room (1:1 calls).
pub const DEFAULT_ROOM_CAPACITY: usize = 2;

/// How long an empty room survives before deletion. Tolerates rapid
/// reconnects (page refresh) without destroying room identity.
pub const DELETE_GRACE: Duration = Duration::from_secs(5);

/// Outbound mailbox depth per room member.
pub(crate) const MEMBER_MAILBOX_CAPACITY: usize = 32;

pub const DEFAULT_GROUP_ROOM_NAME: &str = "Voice Call";
const PRIVATE_ROOM_NAME: &str = "Private Call";

/// Unique id of one member connection within the registry.
pub type ConnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Group,
    Private,
}

/// One joined connection: the user behind it and the sender side of
/// its outbound mailbox.
#[derive(Debug)]
pub(crate) struct Member {
    pub user_id: String,
    pub tx: mpsc::Sender<String>,
}

#[derive(Debug, Default)]
struct RoomState {
    members: HashMap<ConnId, Member>,
    presenter: Option<String>,
}

/// Delivery plan for a relayed signaling message.
pub(crate) struct RoutePlan {
    /// Stamped onto the forwarded message as `from`.
    pub from: String,
    pub targets: Vec<mpsc::Sender<String>>,
}

/// What remains to broadcast after a member left, collected under the
/// room lock.
pub struct LeaveOutcome {
    pub user_id: String,
    /// The leaver was the active presenter; a cleared screen-state
    /// event must precede the user-left broadcast.
    pub presenter_cleared: bool,
    pub(crate) recipients: Vec<mpsc::Sender<String>>,
}

/// One transient voice/screen-share session.
#[derive(Debug)]
pub struct Room {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub kind: RoomKind,
    pub created_by: String,
    /// Unix millis.
    pub created_at: i64,
    pub capacity: usize,
    /// Whitelist of invited users; populated only for private rooms.
    allowed_users: HashSet<String>,
    state: RwLock<RoomState>,
}

impl Room {
    fn read_state(&self) -> RwLockReadGuard<'_, RoomState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RoomState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_count(&self) -> usize {
        self.read_state().members.len()
    }

    pub fn can_join(&self) -> bool {
        self.user_count() < self.capacity
    }

    pub fn presenter(&self) -> Option<String> {
        self.read_state().presenter.clone()
    }

    /// Group rooms admit anyone; private rooms only whitelisted users.
    pub fn is_allowed(&self, user_id: &str) -> bool {
        match self.kind {
            RoomKind::Group => true,
            RoomKind::Private => self.allowed_users.contains(user_id),
        }
    }

    /// Snapshot of member user ids, for presence payloads.
    pub fn member_user_ids(&self) -> Vec<String> {
        self.read_state()
            .members
            .values()
            .map(|m| m.user_id.clone())
            .collect()
    }

    pub(crate) fn recipients_except(&self, except: ConnId) -> Vec<mpsc::Sender<String>> {
        self.read_state()
            .members
            .iter()
            .filter(|(id, _)| **id != except)
            .map(|(_, m)| m.tx.clone())
            .collect()
    }

    /// Claim the exclusive presenter slot. Re-claiming by the current
    /// presenter is allowed; anyone else is rejected while the slot is
    /// taken. Returns the whole room as recipients of the screen-state
    /// broadcast.
    pub(crate) fn start_screen_share(
        &self,
        user_id: &str,
    ) -> Result<Vec<mpsc::Sender<String>>, RoomError> {
        let mut st = self.write_state();
        if let Some(presenter) = &st.presenter {
            if presenter != user_id {
                return Err(RoomError::PresenterActive);
            }
        }
        st.presenter = Some(user_id.to_string());
        Ok(st.members.values().map(|m| m.tx.clone()).collect())
    }

    /// Release the presenter slot. Only the current presenter may stop
    /// the share; anyone else is a no-op (`None`).
    pub(crate) fn stop_screen_share(&self, user_id: &str) -> Option<Vec<mpsc::Sender<String>>> {
        let mut st = self.write_state();
        if st.presenter.as_deref() != Some(user_id) {
            return None;
        }
        st.presenter = None;
        Some(st.members.values().map(|m| m.tx.clone()).collect())
    }

    /// Routing for a generic signaling payload: a `to` hint matching a
    /// member's user id means unicast, anything else is a broadcast to
    /// every member but the sender. `None` if the sender is no longer
    /// a member.
    pub(crate) fn route(&self, sender: ConnId, to: Option<&str>) -> Option<RoutePlan> {
        let st = self.read_state();
        let from = st.members.get(&sender)?.user_id.clone();

        let unicast_target = to.filter(|to_id| st.members.values().any(|m| m.user_id == *to_id));

        let targets = st
            .members
            .iter()
            .filter(|(id, member)| {
                **id != sender && unicast_target.is_none_or(|to_id| member.user_id == to_id)
            })
            .map(|(_, member)| member.tx.clone())
            .collect();

        Some(RoutePlan { from, targets })
    }
}

/// Registry of live rooms plus the set of room ids scheduled for
/// grace-period teardown.
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
    pending_deletion: DashSet<String>,
    capacity: usize,
    conn_ids: AtomicU64,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ROOM_CAPACITY)
    }

    /// Registry whose rooms all share the given member capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            pending_deletion: DashSet::new(),
            capacity,
            conn_ids: AtomicU64::new(1),
        }
    }

    fn new_room(
        &self,
        id: String,
        team_id: String,
        name: String,
        kind: RoomKind,
        created_by: &str,
        allowed_users: HashSet<String>,
    ) -> Arc<Room> {
        Arc::new(Room {
            id,
            team_id,
            name,
            kind,
            created_by: created_by.to_string(),
            created_at: Utc::now().timestamp_millis(),
            capacity: self.capacity,
            allowed_users,
            state: RwLock::new(RoomState::default()),
        })
    }

    /// Group rooms are keyed one-per-team: the team id is the room id,
    /// and a second creation for the same team is a conflict.
    pub fn create_group_room(
        &self,
        team_id: &str,
        creator: &str,
        name: Option<&str>,
    ) -> Result<Arc<Room>, RoomError> {
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_GROUP_ROOM_NAME);
        let room = self.new_room(
            team_id.to_string(),
            team_id.to_string(),
            name.to_string(),
            RoomKind::Group,
            creator,
            HashSet::new(),
        );

        use dashmap::mapref::entry::Entry;
        match self.rooms.entry(team_id.to_string()) {
            Entry::Occupied(_) => Err(RoomError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&room));
                tracing::info!(room_id = %room.id, creator = %creator, "group room created");
                Ok(room)
            }
        }
    }

    /// A private call always succeeds: fresh random room id, whitelist
    /// of exactly the two invited parties.
    pub fn start_private_call(&self, caller: &str, target: &str, team_id: &str) -> Arc<Room> {
        let id = random_room_id();
        let allowed = HashSet::from([caller.to_string(), target.to_string()]);
        let room = self.new_room(
            id.clone(),
            team_id.to_string(),
            PRIVATE_ROOM_NAME.to_string(),
            RoomKind::Private,
            caller,
            allowed,
        );
        self.rooms.insert(id, Arc::clone(&room));
        tracing::info!(room_id = %room.id, caller = %caller, target = %target, "private call started");
        room
    }

    /// Exact-match lookup. There is deliberately no fallback search by
    /// team id: callers wanting a team's rooms use `list_for_team`.
    pub fn lookup(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|entry| Arc::clone(&entry))
    }

    /// Snapshot of rooms the user could join right now: spare capacity
    /// and (group, or whitelisted).
    pub fn list_joinable(&self, user_id: &str) -> Vec<Arc<Room>> {
        self.rooms
            .iter()
            .filter(|entry| entry.can_join() && entry.is_allowed(user_id))
            .map(|entry| Arc::clone(&entry))
            .collect()
    }

    /// Group rooms belonging to a team.
    pub fn list_for_team(&self, team_id: &str) -> Vec<Arc<Room>> {
        self.rooms
            .iter()
            .filter(|entry| entry.kind == RoomKind::Group && entry.team_id == team_id)
            .map(|entry| Arc::clone(&entry))
            .collect()
    }

    /// Admit one connection into a room. Check order: existence, then
    /// whitelist, then capacity. A successful join cancels any pending
    /// deletion for the room.
    pub fn join(
        &self,
        room_id: &str,
        user_id: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<(Arc<Room>, ConnId), RoomError> {
        let room = self.lookup(room_id).ok_or(RoomError::RoomNotFound)?;

        if !room.is_allowed(user_id) {
            return Err(RoomError::Unauthorized);
        }

        // Rejoin within the grace window keeps the room alive.
        self.pending_deletion.remove(room_id);

        let conn_id = self.conn_ids.fetch_add(1, Ordering::Relaxed);
        {
            let mut st = room.write_state();
            if st.members.len() >= room.capacity {
                return Err(RoomError::RoomFull(room.capacity));
            }
            st.members.insert(
                conn_id,
                Member {
                    user_id: user_id.to_string(),
                    tx,
                },
            );
        }

        // The grace timer may have torn the room down between lookup
        // and insert; its removal checks emptiness under the map entry
        // lock, so this re-check is decisive.
        if !self.rooms.contains_key(room_id) {
            room.write_state().members.remove(&conn_id);
            return Err(RoomError::RoomNotFound);
        }

        Ok((room, conn_id))
    }

    /// Remove a connection from its room. Returns the broadcasts owed
    /// to the remaining members, or `None` if the connection was not a
    /// member (repeated leave). An emptied room is scheduled for
    /// deletion after the grace period.
    pub fn leave(self: &Arc<Self>, room: &Arc<Room>, conn_id: ConnId) -> Option<LeaveOutcome> {
        let outcome = {
            let mut st = room.write_state();
            let member = st.members.remove(&conn_id)?;

            let presenter_cleared = st.presenter.as_deref() == Some(member.user_id.as_str());
            if presenter_cleared {
                st.presenter = None;
            }

            LeaveOutcome {
                user_id: member.user_id,
                presenter_cleared,
                recipients: st.members.values().map(|m| m.tx.clone()).collect(),
            }
        };

        if outcome.recipients.is_empty() {
            self.schedule_delete(&room.id);
        }
        Some(outcome)
    }

    fn schedule_delete(self: &Arc<Self>, room_id: &str) {
        if !self.pending_deletion.insert(room_id.to_string()) {
            // Already scheduled.
            return;
        }
        tracing::debug!(room_id = %room_id, "empty room scheduled for deletion");

        let registry = Arc::clone(self);
        let room_id = room_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(DELETE_GRACE).await;
            registry.finish_delete(&room_id);
        });
    }

    fn finish_delete(&self, room_id: &str) {
        if self.pending_deletion.remove(room_id).is_none() {
            // A rejoin cancelled the teardown.
            return;
        }
        // Lock order matches the listing paths: map shard first, then
        // the room lock inside the predicate. A join that already
        // re-inserted a member keeps the room; one landing after the
        // removal rolls back on its map re-check.
        let removed = self
            .rooms
            .remove_if(room_id, |_, room| room.read_state().members.is_empty());
        if removed.is_some() {
            tracing::info!(room_id = %room_id, "empty room deleted after grace period");
        }
    }
}

fn random_room_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
