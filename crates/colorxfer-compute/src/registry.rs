//! Named resource registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{ComputeError, ComputeResult};

/// Map from a lookup name to a shared resource handle.
///
/// Keys are unique: inserting an existing name fails instead of replacing
/// the resource, so a handle held elsewhere never silently goes stale.
#[derive(Debug)]
pub struct Registry<T> {
    kind: &'static str,
    items: BTreeMap<String, Arc<T>>,
}

impl<T> Registry<T> {
    /// Empty registry; `kind` names the resource type in errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: BTreeMap::new(),
        }
    }

    /// Resource type name.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Register `value` under `name` and return the shared handle.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> ComputeResult<Arc<T>> {
        let name = name.into();
        if self.items.contains_key(&name) {
            return Err(ComputeError::DuplicateName { kind: self.kind, name });
        }
        let handle = Arc::new(value);
        self.items.insert(name, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.items.get(name).cloned()
    }

    /// Look up `name`, failing with [`ComputeError::NotFound`].
    pub fn require(&self, name: &str) -> ComputeResult<Arc<T>> {
        self.get(name).ok_or_else(|| ComputeError::NotFound {
            kind: self.kind,
            name: name.to_string(),
        })
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<T>> {
        self.items.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    /// Iterate over `(name, handle)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<T>)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every registered handle; returns how many were released.
    pub fn clear(&mut self) -> usize {
        let n = self.items.len();
        self.items.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut reg = Registry::new("widget");
        let a = reg.insert("a", 1u32).unwrap();
        assert_eq!(*a, 1);
        assert_eq!(reg.get("a").as_deref(), Some(&1));
        assert!(reg.get("b").is_none());
        assert!(reg.contains("a"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut reg = Registry::new("widget");
        reg.insert("a", 1u32).unwrap();
        let err = reg.insert("a", 2u32).unwrap_err();
        assert!(matches!(err, ComputeError::DuplicateName { kind: "widget", ref name } if name == "a"));
        assert_eq!(*reg.get("a").unwrap(), 1);
    }

    #[test]
    fn handles_survive_removal() {
        let mut reg = Registry::new("widget");
        let held = reg.insert("a", 7u32).unwrap();
        assert!(reg.remove("a").is_some());
        assert!(reg.require("a").is_err());
        assert_eq!(*held, 7);
    }

    #[test]
    fn names_are_sorted_and_clear_counts() {
        let mut reg = Registry::new("widget");
        reg.insert("zeta", 0u8).unwrap();
        reg.insert("alpha", 0u8).unwrap();
        assert_eq!(reg.names(), vec!["alpha".to_string(), "zeta".to_string()]);
        assert_eq!(reg.clear(), 2);
        assert!(reg.is_empty());
    }
}
