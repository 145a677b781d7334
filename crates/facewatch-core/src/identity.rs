//! Refreshable id → display-name cache.
//!
//! Recognition runs per frame; hitting the person registry per frame is
//! not acceptable. The cache is a full snapshot of the roster, rebuilt on
//! stream start and every [`CACHE_REFRESH_FRAMES`] processed frames, so a
//! result is stale by at most one refresh interval.

use crate::types::PersonIdentity;
use std::collections::HashMap;
use thiserror::Error;

/// Label rendered for any id missing from the last snapshot.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Frame-count refresh interval for the cache.
pub const CACHE_REFRESH_FRAMES: u64 = 100;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),
    #[error("person {0} already exists")]
    AlreadyExists(i32),
}

/// External person registry. Persistence is someone else's job; the
/// engine only snapshots the roster and requests creation at enrollment.
pub trait PersonRegistry: Send + Sync {
    fn get_all(&self) -> Result<Vec<PersonIdentity>, RegistryError>;
    fn create(&self, person: PersonIdentity) -> Result<(), RegistryError>;
}

/// In-memory id → name snapshot.
#[derive(Debug, Default)]
pub struct IdentityCache {
    names: HashMap<i32, String>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the snapshot from the registry.
    ///
    /// On registry failure the previous snapshot is retained — a stale
    /// roster beats an empty one mid-stream.
    pub fn refresh(&mut self, registry: &dyn PersonRegistry) {
        match registry.get_all() {
            Ok(persons) => {
                self.names = persons
                    .into_iter()
                    .map(|p| (p.person_id, p.name))
                    .collect();
                tracing::debug!(persons = self.names.len(), "identity cache refreshed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "identity cache refresh failed; keeping previous snapshot");
            }
        }
    }

    /// Display name for `person_id`, or the unknown sentinel. Never fails.
    pub fn name_of(&self, person_id: i32) -> &str {
        self.names
            .get(&person_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRegistry(Vec<PersonIdentity>);

    impl PersonRegistry for FixedRegistry {
        fn get_all(&self) -> Result<Vec<PersonIdentity>, RegistryError> {
            Ok(self.0.clone())
        }
        fn create(&self, _person: PersonIdentity) -> Result<(), RegistryError> {
            Ok(())
        }
    }

    struct BrokenRegistry;

    impl PersonRegistry for BrokenRegistry {
        fn get_all(&self) -> Result<Vec<PersonIdentity>, RegistryError> {
            Err(RegistryError::Unavailable("connection refused".into()))
        }
        fn create(&self, _person: PersonIdentity) -> Result<(), RegistryError> {
            Err(RegistryError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn test_missing_id_renders_unknown() {
        let cache = IdentityCache::new();
        assert_eq!(cache.name_of(42), UNKNOWN_LABEL);
    }

    #[test]
    fn test_refresh_populates_names() {
        let registry = FixedRegistry(vec![
            PersonIdentity { person_id: 1, name: "Alice".into() },
            PersonIdentity { person_id: 2, name: "Bob".into() },
        ]);
        let mut cache = IdentityCache::new();
        cache.refresh(&registry);
        assert_eq!(cache.name_of(1), "Alice");
        assert_eq!(cache.name_of(2), "Bob");
        assert_eq!(cache.name_of(3), UNKNOWN_LABEL);
    }

    #[test]
    fn test_failed_refresh_retains_previous_snapshot() {
        let registry = FixedRegistry(vec![PersonIdentity {
            person_id: 7,
            name: "Alice".into(),
        }]);
        let mut cache = IdentityCache::new();
        cache.refresh(&registry);
        assert_eq!(cache.name_of(7), "Alice");

        cache.refresh(&BrokenRegistry);
        assert_eq!(cache.name_of(7), "Alice");
        assert_eq!(cache.len(), 1);
    }
}
