//! Actor identities.
//!
//! Accounts live in an external identity provider. The core only asks two
//! questions of it, whether an actor exists and what its profile looks like,
//! through the [`IdentityDirectory`] trait. [`InMemoryDirectory`] is a
//! thread-safe implementation for embedding and tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::warn;
use serde::{Deserialize, Serialize};

/// Opaque, stable identifier of an actor.
///
/// Identifiers are totally ordered so that an unordered pair of actors can be
/// stored under a canonical `(low, high)` key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Creates an identifier from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ActorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ActorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Profile of an actor as known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identifier.
    pub id: ActorId,
    /// Unique login name.
    pub username: String,
    /// Optional human-friendly name.
    pub display_name: Option<String>,
}

impl Actor {
    /// Creates an actor without a display name.
    #[must_use]
    pub fn new(id: impl Into<ActorId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            display_name: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Returns the display name, falling back to the username.
    #[must_use]
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Read-only view of the external identity provider.
pub trait IdentityDirectory: Send + Sync {
    /// Returns true if the actor is known.
    fn exists(&self, id: &ActorId) -> bool;

    /// Looks up an actor's profile.
    fn get(&self, id: &ActorId) -> Option<Actor>;
}

/// Identity directory backed by a hash map.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    actors: RwLock<HashMap<ActorId, Actor>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory pre-populated with the given actors.
    #[must_use]
    pub fn with_actors(actors: impl IntoIterator<Item = Actor>) -> Self {
        let map = actors.into_iter().map(|a| (a.id.clone(), a)).collect();
        Self {
            actors: RwLock::new(map),
        }
    }

    /// Adds or replaces an actor, returning the previous profile.
    pub fn insert(&self, actor: Actor) -> Option<Actor> {
        self.write().insert(actor.id.clone(), actor)
    }

    /// Removes an actor, returning its profile if it was present.
    pub fn remove(&self, id: &ActorId) -> Option<Actor> {
        self.write().remove(id)
    }

    /// Returns the number of known actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if no actors are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // No operation here leaves the map half-updated, so poison is recovered.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ActorId, Actor>> {
        self.actors.read().unwrap_or_else(|poisoned| {
            warn!("Identity directory lock was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ActorId, Actor>> {
        self.actors.write().unwrap_or_else(|poisoned| {
            warn!("Identity directory lock was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }
}

impl IdentityDirectory for InMemoryDirectory {
    fn exists(&self, id: &ActorId) -> bool {
        self.read().contains_key(id)
    }

    fn get(&self, id: &ActorId) -> Option<Actor> {
        self.read().get(id).cloned()
    }
}
