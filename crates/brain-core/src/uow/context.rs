//! Per-operation registry of backend transaction handles.
//!
//! A [`TxContext`] is created for one logical operation, passed by `&mut`
//! through every controller and repository call, and cleared when the
//! operation ends. Handles are opaque to the context; each controller knows
//! the concrete type it stored under its own key.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Opaque backend handle (a transaction, a session, ...).
pub type Handle = Box<dyn Any + Send>;

/// Transaction context for one logical operation.
#[derive(Default)]
pub struct TxContext {
    handles: HashMap<String, Handle>,
    started: HashSet<String>,
    committed: bool,
    rolled_back: bool,
}

impl TxContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle` under `key`, replacing any previous handle.
    pub fn set_handle<T: Any + Send>(&mut self, key: &str, handle: T) {
        self.handles.insert(key.to_string(), Box::new(handle));
    }

    /// Borrow the handle under `key` if present and of type `T`.
    pub fn handle<T: Any + Send>(&self, key: &str) -> Option<&T> {
        self.handles.get(key)?.downcast_ref::<T>()
    }

    /// Mutably borrow the handle under `key` if present and of type `T`.
    pub fn handle_mut<T: Any + Send>(&mut self, key: &str) -> Option<&mut T> {
        self.handles.get_mut(key)?.downcast_mut::<T>()
    }

    /// Remove and return the handle under `key` if it is of type `T`.
    ///
    /// A handle of another type is left in place.
    pub fn take_handle<T: Any + Send>(&mut self, key: &str) -> Option<T> {
        if !self.handles.get(key)?.is::<T>() {
            return None;
        }
        let handle = self.handles.remove(key)?;
        handle.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn has_handle(&self, key: &str) -> bool {
        self.handles.contains_key(key)
    }

    /// Drop the handle under `key`, if any.
    pub fn remove_handle(&mut self, key: &str) {
        self.handles.remove(key);
    }

    pub fn mark_started(&mut self, key: &str) {
        self.started.insert(key.to_string());
    }

    pub fn is_started(&self, key: &str) -> bool {
        self.started.contains(key)
    }

    pub fn started_backends(&self) -> HashSet<String> {
        self.started.clone()
    }

    pub fn mark_committed(&mut self) {
        self.committed = true;
    }

    pub fn mark_rolled_back(&mut self) {
        self.rolled_back = true;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back
    }

    /// Reset handles, started backends and both terminal flags.
    ///
    /// Dropping a handle releases it; for sqlx transactions that means an
    /// implicit rollback if it was never committed.
    pub fn clear(&mut self) {
        self.handles.clear();
        self.started.clear();
        self.committed = false;
        self.rolled_back = false;
    }
}

impl fmt::Debug for TxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.handles.keys().collect();
        keys.sort();
        f.debug_struct("TxContext")
            .field("handles", &keys)
            .field("started", &self.started)
            .field("committed", &self.committed)
            .field("rolled_back", &self.rolled_back)
            .finish()
    }
}
