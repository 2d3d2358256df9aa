//! In-progress construction sessions.
//!
//! Loading a prefab creates many objects across several passes (including
//! nested sub-prefab loads). Until the outermost load finishes linking, none
//! of those objects may be treated as ready. The [`ConstructionRegistry`]
//! records which session every such object belongs to; collaborators that
//! gate "ready to run" logic consult it or subscribe as a
//! [`LifecycleListener`].
//!
//! The registry lives inside its [`World`](crate::World). There is no global
//! state: two worlds never observe each other's sessions.

use std::collections::HashMap;

use crate::object::ObjectId;

/// Identifies one top-level construction session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session({})", self.0)
    }
}

/// Receives session and membership notifications from a [`ConstructionRegistry`].
///
/// All methods default to doing nothing.
pub trait LifecycleListener {
    fn session_began(&mut self, _session: SessionId) {}
    fn object_added(&mut self, _object: ObjectId, _session: SessionId) {}
    fn object_removed(&mut self, _object: ObjectId, _session: SessionId) {}
    fn session_ended(&mut self, _session: SessionId, _objects: &[ObjectId]) {}
}

/// Tracks objects that are still being constructed, keyed by session.
#[derive(Default)]
pub struct ConstructionRegistry {
    next_session: u64,
    open: Vec<SessionId>,
    in_progress: HashMap<ObjectId, SessionId>,
    /// Insertion order per session, so `end_session` reports deterministically.
    members: HashMap<SessionId, Vec<ObjectId>>,
    listeners: Vec<Box<dyn LifecycleListener>>,
}

impl ConstructionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a listener for all future notifications.
    pub fn add_listener(&mut self, listener: Box<dyn LifecycleListener>) {
        self.listeners.push(listener);
    }

    /// Opens a new session.
    pub fn begin_session(&mut self) -> SessionId {
        self.next_session += 1;
        let session = SessionId(self.next_session);
        self.open.push(session);
        self.members.insert(session, Vec::new());
        for listener in &mut self.listeners {
            listener.session_began(session);
        }
        session
    }

    /// Returns `true` while `session` has been begun and not yet ended.
    pub fn is_open(&self, session: SessionId) -> bool {
        self.open.contains(&session)
    }

    /// Records `object` as under construction in `session`.
    ///
    /// Returns `false` (and records nothing) if the session is not open.
    pub fn add(&mut self, object: ObjectId, session: SessionId) -> bool {
        if !self.is_open(session) {
            log::warn!("cannot add {object} to closed {session}");
            return false;
        }
        if self.in_progress.insert(object, session).is_none()
            && let Some(members) = self.members.get_mut(&session)
        {
            members.push(object);
        }
        for listener in &mut self.listeners {
            listener.object_added(object, session);
        }
        true
    }

    /// Drops `object` from whatever session it belongs to.
    pub fn remove(&mut self, object: ObjectId) -> bool {
        let Some(session) = self.in_progress.remove(&object) else {
            return false;
        };
        if let Some(members) = self.members.get_mut(&session) {
            members.retain(|&o| o != object);
        }
        for listener in &mut self.listeners {
            listener.object_removed(object, session);
        }
        true
    }

    /// Closes `session`, clearing every object registered under it.
    ///
    /// Returns the cleared objects in registration order.
    pub fn end_session(&mut self, session: SessionId) -> Vec<ObjectId> {
        self.open.retain(|&s| s != session);
        let objects = self.members.remove(&session).unwrap_or_default();
        for object in &objects {
            self.in_progress.remove(object);
        }
        for listener in &mut self.listeners {
            listener.session_ended(session, &objects);
        }
        objects
    }

    pub fn is_under_construction(&self, object: ObjectId) -> bool {
        self.in_progress.contains_key(&object)
    }

    pub fn session_of(&self, object: ObjectId) -> Option<SessionId> {
        self.in_progress.get(&object).copied()
    }

    /// Number of objects currently under construction across all sessions.
    pub fn len(&self) -> usize {
        self.in_progress.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_progress.is_empty()
    }
}
