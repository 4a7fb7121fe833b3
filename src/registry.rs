//! Resident-asset registry: values, reference counts, dependency edges
//!
//! The registry is plain owner-thread data behind the manager's state
//! lock; it knows nothing about the queue, the task stack or the worker
//! pool. Dependency edges live in a separate adjacency map rather than
//! inside the records, so the recursive bump/release walks stay free of
//! ownership cycles.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::asset::Asset;
use crate::descriptor::AssetType;

pub(crate) struct AssetRecord {
    pub(crate) asset_type: AssetType,
    pub(crate) value: Arc<dyn Asset>,
    pub(crate) ref_count: u32,
}

/// Cache of resident assets keyed by name.
///
/// One record per name; the (name, type) pairing is enforced upstream at
/// request time, so the name alone identifies a record here.
#[derive(Default)]
pub(crate) struct Registry {
    records: HashMap<String, AssetRecord>,
    edges: HashMap<String, Vec<String>>,
}

impl Registry {
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn value(&self, name: &str) -> Option<Arc<dyn Asset>> {
        self.records.get(name).map(|r| r.value.clone())
    }

    pub(crate) fn asset_type(&self, name: &str) -> Option<AssetType> {
        self.records.get(name).map(|r| r.asset_type)
    }

    pub(crate) fn ref_count(&self, name: &str) -> u32 {
        self.records.get(name).map_or(0, |r| r.ref_count)
    }

    pub(crate) fn set_ref_count(&mut self, name: &str, count: u32) -> bool {
        match self.records.get_mut(name) {
            Some(record) => {
                record.ref_count = count;
                true
            }
            None => false,
        }
    }

    pub(crate) fn dependencies(&self, name: &str) -> Vec<String> {
        self.edges.get(name).cloned().unwrap_or_default()
    }

    /// Iterate over `(name, type, value)` of every resident asset.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, AssetType, &Arc<dyn Asset>)> {
        self.records
            .iter()
            .map(|(name, r)| (name.as_str(), r.asset_type, &r.value))
    }

    /// Insert a freshly loaded asset with a reference count of one.
    pub(crate) fn add(&mut self, name: &str, asset_type: AssetType, value: Arc<dyn Asset>) {
        debug_assert!(!self.records.contains_key(name), "duplicate record for {name}");
        self.records.insert(
            name.to_string(),
            AssetRecord {
                asset_type,
                value,
                ref_count: 1,
            },
        );
    }

    /// Record the edge `parent -> child`.
    pub(crate) fn add_edge(&mut self, parent: &str, child: &str) {
        self.edges
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
    }

    /// Drop all edges recorded for `parent`.
    pub(crate) fn remove_edges(&mut self, parent: &str) {
        self.edges.remove(parent);
    }

    /// Increment the reference count of `name` and, recursively, of every
    /// asset it depends on.
    pub(crate) fn bump(&mut self, name: &str) {
        if let Some(record) = self.records.get_mut(name) {
            record.ref_count += 1;
        }
        for child in self.dependencies(name) {
            self.bump(&child);
        }
    }

    /// Decrement the reference count of `name`; at zero the value is
    /// disposed and the record removed. Every decrement releases each
    /// dependency once, mirroring [`bump`](Self::bump), so the counts a
    /// resident re-request added come back out on every unload, not only
    /// on the one that removes the parent. Returns whether the record was
    /// removed.
    ///
    /// A no-op for names that are not resident, which lets rollback paths
    /// release descriptors whose loads never completed.
    pub(crate) fn release(&mut self, name: &str) -> bool {
        let Some(record) = self.records.get_mut(name) else {
            return false;
        };
        if record.ref_count > 0 {
            record.ref_count -= 1;
        }
        let removed = record.ref_count == 0;
        if removed {
            if let Some(record) = self.records.remove(name) {
                record.value.dispose();
            }
        }
        for child in self.dependencies(name) {
            self.release(&child);
        }
        if removed {
            self.edges.remove(name);
        }
        removed
    }

    /// Names that no other resident asset depends on.
    pub(crate) fn roots(&self) -> Vec<String> {
        let mut dependent_count: HashMap<&str, usize> =
            self.records.keys().map(|name| (name.as_str(), 0)).collect();
        for (parent, children) in &self.edges {
            if !self.records.contains_key(parent) {
                continue;
            }
            for child in children {
                if let Some(count) = dependent_count.get_mut(child.as_str()) {
                    *count += 1;
                }
            }
        }
        dependent_count
            .into_iter()
            .filter(|(_, count)| *count == 0)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Dispose and drop every record unconditionally.
    pub(crate) fn drain_dispose(&mut self) {
        for (_, record) in self.records.drain() {
            record.value.dispose();
        }
        self.edges.clear();
    }

    /// Render a debug dump of resident assets, counts and edges.
    pub(crate) fn diagnostics(&self) -> String {
        let mut names: Vec<&String> = self.records.keys().collect();
        names.sort();
        let mut out = String::new();
        for name in names {
            let record = &self.records[name];
            let _ = write!(out, "{name} ({}), refs: {}", record.asset_type.name(), record.ref_count);
            if let Some(deps) = self.edges.get(name) {
                let _ = write!(out, ", deps: {deps:?}");
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Texture;
    impl Asset for Texture {}

    struct Tracked(Arc<AtomicBool>);
    impl Asset for Tracked {
        fn dispose(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn texture() -> Arc<dyn Asset> {
        Arc::new(Texture)
    }

    #[test]
    fn test_add_and_ref_count() {
        let mut registry = Registry::default();
        registry.add("a.png", AssetType::of::<Texture>(), texture());
        assert_eq!(registry.ref_count("a.png"), 1);
        assert_eq!(registry.ref_count("missing"), 0);

        registry.bump("a.png");
        assert_eq!(registry.ref_count("a.png"), 2);
    }

    #[test]
    fn test_bump_cascades_through_edges() {
        let mut registry = Registry::default();
        registry.add("atlas", AssetType::of::<Texture>(), texture());
        registry.add("tex", AssetType::of::<Texture>(), texture());
        registry.add_edge("atlas", "tex");

        registry.bump("atlas");
        assert_eq!(registry.ref_count("atlas"), 2);
        assert_eq!(registry.ref_count("tex"), 2);
    }

    #[test]
    fn test_release_disposes_at_zero() {
        let disposed = Arc::new(AtomicBool::new(false));
        let mut registry = Registry::default();
        registry.add("a", AssetType::of::<Tracked>(), Arc::new(Tracked(disposed.clone())));

        registry.bump("a");
        assert!(!registry.release("a"));
        assert!(!disposed.load(Ordering::SeqCst));

        assert!(registry.release("a"));
        assert!(disposed.load(Ordering::SeqCst));
        assert!(!registry.contains("a"));
    }

    #[test]
    fn test_release_cascades() {
        let mut registry = Registry::default();
        registry.add("parent", AssetType::of::<Texture>(), texture());
        registry.add("child", AssetType::of::<Texture>(), texture());
        registry.add_edge("parent", "child");

        // Independent request keeps the child alive past the cascade.
        registry.bump("child");
        assert_eq!(registry.ref_count("child"), 2);

        assert!(registry.release("parent"));
        assert!(!registry.contains("parent"));
        assert_eq!(registry.ref_count("child"), 1);

        assert!(registry.release("child"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_decrements_children_on_every_call() {
        let mut registry = Registry::default();
        registry.add("parent", AssetType::of::<Texture>(), texture());
        registry.add("child", AssetType::of::<Texture>(), texture());
        registry.add_edge("parent", "child");
        registry.bump("parent");
        assert_eq!(registry.ref_count("child"), 2);

        // Each decrement of the parent gives back one count on the child.
        assert!(!registry.release("parent"));
        assert_eq!(registry.ref_count("parent"), 1);
        assert_eq!(registry.ref_count("child"), 1);

        assert!(registry.release("parent"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_roots_ignore_non_resident_parents() {
        let mut registry = Registry::default();
        registry.add("a", AssetType::of::<Texture>(), texture());
        registry.add("b", AssetType::of::<Texture>(), texture());
        registry.add_edge("a", "b");
        registry.add_edge("ghost", "a");

        let mut roots = registry.roots();
        roots.sort();
        assert_eq!(roots, vec!["a".to_string()]);
    }

    #[test]
    fn test_diagnostics_lists_assets() {
        let mut registry = Registry::default();
        registry.add("a.png", AssetType::of::<Texture>(), texture());
        let dump = registry.diagnostics();
        assert!(dump.contains("a.png"));
        assert!(dump.contains("refs: 1"));
    }
}
