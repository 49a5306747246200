//! Named element snapshots with self-healing lookups.
//!
//! A snapshot remembers how each element was found. When a cached element
//! stops reporting itself visible, the next lookup re-runs that search with a
//! short budget and swaps the fresh element in. Entries added by hand carry no
//! recipe and are dropped from lookups once stale.

use crate::element::UIElement;
use crate::resolver::{Resolver, Timing};
use crate::spec::Specification;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound for a single heal.
pub const MAX_HEAL_TIMEOUT: Duration = Duration::from_secs(2);
const HEAL_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// How an element was originally found.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub parent: UIElement,
    pub spec: Specification,
    pub creation_timeout: Duration,
}

impl Recipe {
    pub fn new(parent: UIElement, spec: Specification, creation_timeout: Duration) -> Self {
        Self {
            parent,
            spec,
            creation_timeout,
        }
    }

    pub fn heal_budget(&self) -> Duration {
        self.creation_timeout.min(MAX_HEAL_TIMEOUT)
    }
}

/// Re-runs a recipe. Failures are logged and reported as `None`.
pub fn heal(resolver: &Resolver, recipe: &Recipe) -> Option<UIElement> {
    if !recipe.parent.is_visible() {
        warn!(
            "Self-heal skipped for {}: parent {} is gone",
            recipe.spec,
            recipe.parent.display_text()
        );
        return None;
    }
    let timing = Timing::new(recipe.heal_budget(), HEAL_RETRY_INTERVAL);
    match resolver.find_element(&recipe.parent, &recipe.spec, timing) {
        Ok(element) => Some(element),
        Err(e) => {
            warn!("Self-heal failed for {}: {}", recipe.spec, e);
            None
        }
    }
}

#[derive(Debug, Clone)]
struct SnapshotEntry {
    element: UIElement,
    recipe: Option<Recipe>,
}

#[derive(Clone)]
pub struct UISnapshot {
    name: String,
    resolver: Resolver,
    entries: HashMap<String, SnapshotEntry>,
}

impl std::fmt::Debug for UISnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UISnapshot")
            .field("name", &self.name)
            .field("entries", &self.keys())
            .finish()
    }
}

impl UISnapshot {
    pub fn new(name: impl Into<String>, resolver: Resolver) -> Self {
        Self {
            name: name.into(),
            resolver,
            entries: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Stores an element together with the recipe used to find it.
    pub fn insert(&mut self, key: impl Into<String>, element: UIElement, recipe: Recipe) {
        self.entries.insert(
            key.into(),
            SnapshotEntry {
                element,
                recipe: Some(recipe),
            },
        );
    }

    /// Stores an element without a recipe; it will never self-heal.
    pub fn add(&mut self, key: impl Into<String>, element: UIElement) {
        self.entries
            .insert(key.into(), SnapshotEntry { element, recipe: None });
    }

    pub fn remove(&mut self, key: &str) -> Option<UIElement> {
        self.entries.remove(key).map(|e| e.element)
    }

    /// The cached element if still visible, else a healed replacement.
    pub fn get(&mut self, key: &str) -> Option<UIElement> {
        let entry = match self.entries.get_mut(key) {
            Some(entry) => entry,
            None => {
                debug!("'{}' is not in snapshot '{}'", key, self.name);
                return None;
            }
        };
        if entry.element.is_visible() {
            return Some(entry.element.clone());
        }
        let recipe = match &entry.recipe {
            Some(recipe) => recipe,
            None => {
                warn!("'{}' in snapshot '{}' is stale and has no recipe", key, self.name);
                return None;
            }
        };
        info!("'{}' in snapshot '{}' is stale, healing", key, self.name);
        let healed = heal(&self.resolver, recipe)?;
        entry.element = healed.clone();
        Some(healed)
    }
}

/// Named snapshots plus the owning application's cached window.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    snapshots: HashMap<String, UISnapshot>,
    window: Option<UIElement>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any snapshot with the same name.
    pub fn insert(&mut self, snapshot: UISnapshot) {
        self.snapshots.insert(snapshot.name().to_string(), snapshot);
    }

    pub fn snapshot(&self, name: &str) -> Option<&UISnapshot> {
        self.snapshots.get(name)
    }

    pub fn snapshot_mut(&mut self, name: &str) -> Option<&mut UISnapshot> {
        self.snapshots.get_mut(name)
    }

    pub fn get(&mut self, name: &str, key: &str) -> Option<UIElement> {
        match self.snapshots.get_mut(name) {
            Some(snapshot) => snapshot.get(key),
            None => {
                debug!("No snapshot named '{}'", name);
                None
            }
        }
    }

    /// Adds a recipe-less element to an existing snapshot.
    pub fn add(&mut self, name: &str, key: impl Into<String>, element: UIElement) -> bool {
        match self.snapshots.get_mut(name) {
            Some(snapshot) => {
                snapshot.add(key, element);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshots.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drops one snapshot, or every snapshot when `name` is `None`.
    pub fn clear(&mut self, name: Option<&str>) {
        match name {
            Some(name) => {
                self.snapshots.remove(name);
            }
            None => self.snapshots.clear(),
        }
    }

    pub fn set_window(&mut self, window: UIElement) {
        self.window = Some(window);
    }

    /// The cached window while it stays visible.
    pub fn window(&self) -> Option<UIElement> {
        self.window.as_ref().filter(|w| w.is_visible()).cloned()
    }

    pub fn clear_window(&mut self) {
        self.window = None;
    }

    pub fn clear_all(&mut self) {
        self.snapshots.clear();
        self.window = None;
        debug!("All snapshot caches cleared");
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.window.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::ElementFinder;
    use crate::platforms::memory::{MemoryEngine, MemoryNode, MemoryTree};
    use crate::platforms::AccessibilityEngine;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (MemoryTree, Resolver, UIElement) {
        let tree = MemoryTree::with_windows(vec![MemoryNode::new("Window", "Editor").with_children(vec![
            MemoryNode::new("Button", "Save").with_auto_id("save"),
            MemoryNode::new("Button", "Open").with_auto_id("open"),
        ])]);
        let engine: Arc<dyn AccessibilityEngine> = Arc::new(MemoryEngine::new(tree.clone()));
        let resolver = Resolver::new(ElementFinder::new(engine));
        let window = tree.element(tree.id_by_title("Editor").unwrap());
        (tree, resolver, window)
    }

    #[test]
    fn stale_entries_heal_from_their_recipe() {
        let (tree, resolver, window) = setup();
        let spec = Specification::from_value(&json!({"pwa_auto_id": "save"})).unwrap();
        let save = resolver
            .find_element(&window, &spec, Timing::new(Duration::from_millis(500), Duration::from_millis(100)))
            .unwrap();
        let mut snapshot = UISnapshot::new("main", resolver.clone());
        snapshot.insert("save", save.clone(), Recipe::new(window, spec, Duration::from_millis(500)));

        assert_eq!(snapshot.get("save").unwrap(), save);

        let old = tree.id_by_auto_id("save").unwrap();
        tree.recreate(old).unwrap();
        let healed = snapshot.get("save").unwrap();
        assert_ne!(healed, save);
        assert_eq!(healed.name().unwrap(), "Save");
        assert_eq!(snapshot.get("save").unwrap(), healed);
    }

    #[test]
    fn manual_entries_never_heal() {
        let (tree, resolver, _) = setup();
        let open_id = tree.id_by_auto_id("open").unwrap();
        let mut snapshot = UISnapshot::new("manual", resolver);
        snapshot.add("open", tree.element(open_id));
        assert!(snapshot.get("open").is_some());
        tree.recreate(open_id).unwrap();
        assert!(snapshot.get("open").is_none());
        assert!(snapshot.get("open").is_none());
        assert!(snapshot.get("missing").is_none());
    }

    #[test]
    fn heal_budget_is_capped() {
        let (_, _, window) = setup();
        let spec = Specification::new();
        assert_eq!(
            Recipe::new(window.clone(), spec.clone(), Duration::from_secs(30)).heal_budget(),
            MAX_HEAL_TIMEOUT
        );
        assert_eq!(
            Recipe::new(window, spec, Duration::from_millis(500)).heal_budget(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn closed_parent_fails_heal_without_waiting() {
        let (tree, resolver, window) = setup();
        let spec = Specification::from_value(&json!({"pwa_auto_id": "save"})).unwrap();
        let save = tree.element(tree.id_by_auto_id("save").unwrap());
        let mut snapshot = UISnapshot::new("main", resolver.clone());
        snapshot.insert("save", save, Recipe::new(window.clone(), spec.clone(), Duration::from_secs(30)));

        tree.remove(tree.id_by_title("Editor").unwrap()).unwrap();
        let started = std::time::Instant::now();
        assert!(heal(&resolver, &Recipe::new(window, spec, Duration::from_secs(30))).is_none());
        assert!(snapshot.get("save").is_none());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn clear_all_drops_snapshots_and_window() {
        let (_, resolver, window) = setup();
        let mut cache = SnapshotCache::new();
        let mut snapshot = UISnapshot::new("main", resolver);
        snapshot.add("window", window.clone());
        cache.insert(snapshot);
        cache.set_window(window);
        assert!(cache.get("main", "window").is_some());
        assert!(cache.window().is_some());

        cache.clear_all();
        assert!(cache.is_empty());
        assert!(cache.get("main", "window").is_none());
        assert!(cache.window().is_none());
    }
}
