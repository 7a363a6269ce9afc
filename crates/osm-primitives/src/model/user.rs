//! Shared user objects and the registry capability.
//!
//! A primitive stores who last modified it as a shared reference into a user
//! registry; it never owns the user. The registry hands out one `Arc<User>`
//! per id so that equal ids resolve to the same allocation.

use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;

/// A user as reported by the server. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: i64,
    name: String,
}

impl User {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        User { id, name: name.into() }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Resolves a stored numeric user id back to a shared user object.
pub trait UserRegistry: Send + Sync {
    fn lookup_by_id(&self, id: i64) -> Option<Arc<User>>;
}

/// In-process user registry.
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<FxHashMap<i64, Arc<User>>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user for `id`, creating it with `name` on first sight.
    ///
    /// The name of an existing entry is not updated; the server-reported name
    /// at first sight wins.
    pub fn get_or_create(&self, id: i64, name: &str) -> Arc<User> {
        if let Some(user) = self.lookup_by_id(id) {
            return user;
        }
        let mut users = self.users.write().expect("user registry lock poisoned");
        Arc::clone(users.entry(id).or_insert_with(|| Arc::new(User::new(id, name))))
    }
}

impl UserRegistry for UserStore {
    fn lookup_by_id(&self, id: i64) -> Option<Arc<User>> {
        self.users
            .read()
            .expect("user registry lock poisoned")
            .get(&id)
            .cloned()
    }
}
