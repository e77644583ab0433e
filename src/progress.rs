//! Upload progress registry.
//!
//! An ordered list of `{name, percentage}` entries shared by everything that
//! uploads. Entries are keyed by name: the first update creates the entry,
//! later updates change it in place, and completion or failure removes it.

use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub name: String,
    pub percentage: f64,
}

impl Progress {
    /// Percentage from a transferred/total byte pair (0-100).
    pub fn percent_of(transferred: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            ((transferred as f64 / total as f64) * 100.0).min(100.0)
        }
    }
}

/// Cloneable handle to the process-wide progress list.
#[derive(Debug, Clone, Default)]
pub struct ProgressRegistry {
    entries: Arc<Mutex<Vec<Progress>>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Progress>> {
        // A panic while holding the lock cannot leave the list half-updated.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Upsert the entry for `name`.
    pub fn update(&self, name: &str, percentage: f64) {
        let percentage = percentage.clamp(0.0, 100.0);
        let mut entries = self.lock();
        match entries.iter_mut().find(|p| p.name == name) {
            Some(entry) => entry.percentage = percentage,
            None => entries.push(Progress {
                name: name.to_string(),
                percentage,
            }),
        }
    }

    /// Remove the first entry for `name`; no-op when absent.
    pub fn remove(&self, name: &str) {
        let mut entries = self.lock();
        if let Some(index) = entries.iter().position(|p| p.name == name) {
            entries.remove(index);
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.lock()
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.percentage)
    }

    pub fn snapshot(&self) -> Vec<Progress> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_upserts_by_name() {
        let registry = ProgressRegistry::new();
        registry.update("a.jpg", 10.0);
        registry.update("b.jpg", 5.0);
        registry.update("a.jpg", 60.0);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "a.jpg");
        assert_eq!(snapshot[0].percentage, 60.0);
        assert_eq!(snapshot[1].name, "b.jpg");
    }

    #[test]
    fn test_remove() {
        let registry = ProgressRegistry::new();
        registry.update("a.jpg", 10.0);
        registry.remove("missing.jpg");
        assert_eq!(registry.snapshot().len(), 1);

        registry.remove("a.jpg");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let registry = ProgressRegistry::new();
        let other = registry.clone();
        other.update("a.jpg", 150.0);
        assert_eq!(registry.get("a.jpg"), Some(100.0));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(Progress::percent_of(0, 0), 0.0);
        assert_eq!(Progress::percent_of(50, 200), 25.0);
        assert_eq!(Progress::percent_of(300, 200), 100.0);
    }
}
