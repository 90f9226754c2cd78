//! The tracked-container registry: the only container identifiers the
//! broker will admit lifecycle operations against.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
}

/// Containers created through the broker, keyed by id and (when known) name.
/// Lookups accept the id, the name, or a prefix of the id.
#[derive(Default)]
pub struct ContainerRegistry {
    known: Mutex<HashMap<String, ContainerRecord>>,
}

impl ContainerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: &str, name: &str) {
        let mut known = self.lock();
        let record = ContainerRecord {
            id: id.to_string(),
            name: name.to_string(),
        };
        known.insert(id.to_string(), record.clone());
        if !name.is_empty() {
            known.insert(name.to_string(), record);
        }
    }

    pub fn remove(&self, identifier: &str) {
        let mut known = self.lock();
        known.retain(|_, rec| rec.id != identifier && rec.name != identifier);
    }

    /// Match by id, name, or id prefix. O(n) scan — the broker tracks a
    /// handful of sidecars, not a fleet.
    #[must_use]
    pub fn matches(&self, identifier: &str) -> Option<ContainerRecord> {
        let known = self.lock();
        known
            .values()
            .find(|rec| {
                rec.id == identifier || rec.name == identifier || rec.id.starts_with(identifier)
            })
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ContainerRecord>> {
        self.known
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_match_by_id_name_and_prefix() {
        let reg = ContainerRegistry::new();
        reg.add("abcdef123456", "pg");
        assert!(reg.matches("abcdef123456").is_some());
        assert!(reg.matches("pg").is_some());
        assert!(reg.matches("abcdef").is_some());
        assert!(reg.matches("other").is_none());
    }

    #[test]
    fn remove_clears_both_keys() {
        let reg = ContainerRegistry::new();
        reg.add("abc", "pg");
        reg.remove("pg");
        assert!(reg.matches("abc").is_none());
        assert!(reg.matches("pg").is_none());
    }

    #[test]
    fn unnamed_containers_match_by_id_only() {
        let reg = ContainerRegistry::new();
        reg.add("deadbeef", "");
        assert!(reg.matches("deadbeef").is_some());
        assert!(reg.matches("dead").is_some());
    }
}
