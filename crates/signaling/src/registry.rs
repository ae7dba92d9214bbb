//! Two-slot role registry
//!
//! Holds at most one connection per role. Pure state: the registry never
//! sends messages itself; callers decide what to communicate based on the
//! returned outcome. A slot counts as occupied only while its connection's
//! transport is open — closed occupants are evicted as part of every lookup,
//! so a vacated slot is reusable the moment its connection goes away.

use crate::connection::ConnectionHandle;
use crate::protocol::Role;
use std::sync::Arc;
use uuid::Uuid;

/// Result of a registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Slot assigned to the connection
    Registered,
    /// Slot held by another open connection; the incumbent is untouched
    RoleTaken,
    /// The connection already holds a slot (a connection occupies at most one)
    AlreadyAssigned,
}

/// Read-only view of slot occupancy, for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub initiator: bool,
    pub responder: bool,
}

/// Exactly two slots, keyed by role
#[derive(Debug, Default)]
pub struct Registry {
    initiator: Option<Arc<ConnectionHandle>>,
    responder: Option<Arc<ConnectionHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<Arc<ConnectionHandle>> {
        match role {
            Role::Initiator => &mut self.initiator,
            Role::Responder => &mut self.responder,
        }
    }

    /// Drop the occupant of `role` if its transport has closed
    fn evict_if_closed(&mut self, role: Role) {
        let slot = self.slot_mut(role);
        if let Some(conn) = slot {
            if !conn.is_open() {
                *slot = None;
            }
        }
    }

    /// Attempt to assign `role` to `conn`.
    ///
    /// Succeeds iff the slot is empty (or holds a closed connection) and
    /// `conn` does not already occupy a slot. Registration under a taken,
    /// still-open slot is rejected, never overwritten.
    pub fn try_register(&mut self, conn: &Arc<ConnectionHandle>, role: Role) -> RegisterOutcome {
        self.evict_if_closed(Role::Initiator);
        self.evict_if_closed(Role::Responder);

        let already_assigned = [&self.initiator, &self.responder]
            .into_iter()
            .flatten()
            .any(|held| held.id() == conn.id());
        if already_assigned {
            return RegisterOutcome::AlreadyAssigned;
        }

        let slot = self.slot_mut(role);
        if slot.is_some() {
            return RegisterOutcome::RoleTaken;
        }

        *slot = Some(Arc::clone(conn));
        RegisterOutcome::Registered
    }

    /// Occupant of `role`, only if its transport is still open
    pub fn get(&mut self, role: Role) -> Option<Arc<ConnectionHandle>> {
        self.evict_if_closed(role);
        self.slot_mut(role).clone()
    }

    /// Clear whichever slot `conn_id` occupies, reporting the vacated role.
    /// No-op if the connection holds no slot.
    pub fn release(&mut self, conn_id: Uuid) -> Option<Role> {
        for role in [Role::Initiator, Role::Responder] {
            let slot = self.slot_mut(role);
            if slot.as_ref().is_some_and(|held| held.id() == conn_id) {
                *slot = None;
                return Some(role);
            }
        }
        None
    }

    /// Occupancy snapshot for the status endpoint
    pub fn snapshot(&mut self) -> RegistrySnapshot {
        RegistrySnapshot {
            initiator: self.get(Role::Initiator).is_some(),
            responder: self.get(Role::Responder).is_some(),
        }
    }
}
