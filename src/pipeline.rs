//! Pipeline slot registry
//!
//! Each slot holds the settings one vision pipeline runs with. Slots are
//! addressed by index, created on demand and never overwritten by a later
//! insert at the same index.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-slot settings.
///
/// `vision` is owned by the vision algorithm; this crate stores it but never
/// inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub nickname: String,
    pub brightness: i32,
    pub exposure: i32,
    #[serde(default)]
    pub vision: serde_json::Value,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            nickname: "New Pipeline".to_string(),
            brightness: 50,
            exposure: 50,
            vision: serde_json::Value::Null,
        }
    }
}

/// Indexed pipeline slots plus the current-slot pointer
#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
    slots: BTreeMap<usize, PipelineSettings>,
    current_index: usize,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: BTreeMap<usize, PipelineSettings>) -> Self {
        Self {
            slots,
            current_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index an append without an explicit index targets
    pub fn next_index(&self) -> usize {
        self.slots.len()
    }

    /// Insert a default slot at `index` unless one already exists.
    ///
    /// Returns `true` when a slot was inserted.
    pub fn insert_default(&mut self, index: usize) -> bool {
        if self.slots.contains_key(&index) {
            return false;
        }
        self.slots.insert(index, PipelineSettings::default());
        true
    }

    pub fn get(&self, index: usize) -> Option<&PipelineSettings> {
        self.slots.get(&index)
    }

    pub fn current(&self) -> Option<&PipelineSettings> {
        self.slots.get(&self.current_index)
    }

    pub fn current_mut(&mut self) -> Option<&mut PipelineSettings> {
        self.slots.get_mut(&self.current_index)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Move the current pointer.
    ///
    /// Accepted only up to one past the highest populated index, so the
    /// pointer can name the next slot a caller is about to add. Rejected
    /// requests leave the pointer unchanged and return `false`.
    pub fn set_current_index(&mut self, index: usize) -> bool {
        let limit = match self.slots.keys().next_back() {
            Some(highest) => highest + 1,
            None => 0,
        };
        if index > limit {
            return false;
        }
        self.current_index = index;
        true
    }

    pub fn slots(&self) -> &BTreeMap<usize, PipelineSettings> {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_default_never_overwrites() {
        let mut registry = PipelineRegistry::new();
        assert!(registry.insert_default(2));
        registry.set_current_index(2);
        registry.current_mut().unwrap().brightness = 7;

        assert!(!registry.insert_default(2));
        assert_eq!(registry.get(2).unwrap().brightness, 7);
    }

    #[test]
    fn test_next_index_follows_count() {
        let mut registry = PipelineRegistry::new();
        assert_eq!(registry.next_index(), 0);
        registry.insert_default(0);
        registry.insert_default(5);
        assert_eq!(registry.next_index(), 2);
    }

    #[test]
    fn test_set_current_index_bound() {
        let mut registry = PipelineRegistry::new();
        assert!(!registry.set_current_index(1));
        assert!(registry.set_current_index(0));

        registry.insert_default(0);
        registry.insert_default(1);
        assert!(registry.set_current_index(2));
        assert_eq!(registry.current_index(), 2);
        assert!(registry.current().is_none());

        assert!(!registry.set_current_index(3));
        assert_eq!(registry.current_index(), 2);
    }

    #[test]
    fn test_default_settings() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.brightness, 50);
        assert_eq!(settings.exposure, 50);
        assert!(settings.vision.is_null());
    }
}
