use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::lock;
use crate::target::Target;

/// Sole owner of target nodes: at most one node per name for the lifetime of
/// the cache. Also records every declared dependency edge so a declaration
/// that would close a cycle can be refused.
#[derive(Default)]
pub struct TargetCache {
    inner: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    targets: HashMap<String, Arc<Target>>,
    edges: HashMap<String, Vec<String>>,
}

impl TargetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, name: &str) -> Arc<Target> {
        let mut state = lock(&self.inner);
        Arc::clone(
            state
                .targets
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Target::new(name))),
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<Target>> {
        lock(&self.inner).targets.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).targets.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).targets.is_empty()
    }

    pub fn targets(&self) -> Vec<Arc<Target>> {
        let mut targets: Vec<_> = lock(&self.inner).targets.values().cloned().collect();
        targets.sort_by(|a, b| a.name().cmp(b.name()));
        targets
    }

    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        lock(&self.inner)
            .edges
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Records `from -> to`. If `from` is already reachable from `to`, the edge
    /// is not recorded and the closing path `from -> to -> ... -> from` is
    /// returned instead.
    ///
    /// Each call walks the recorded edges under the cache lock, so declaring a
    /// graph of E edges costs O(E^2) and stalls `get_or_create` meanwhile.
    pub fn declare_edge(&self, from: &str, to: &str) -> Result<(), Vec<String>> {
        let mut state = lock(&self.inner);

        if let Some(mut path) = find_path(&state.edges, to, from) {
            path.insert(0, from.to_string());
            return Err(path);
        }

        let deps = state.edges.entry(from.to_string()).or_default();
        if !deps.iter().any(|d| d == to) {
            deps.push(to.to_string());
        }
        Ok(())
    }
}

/// Depth-first search for a path `start -> ... -> goal` over recorded edges.
fn find_path(edges: &HashMap<String, Vec<String>>, start: &str, goal: &str) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut stack: Vec<(String, usize)> = vec![(start.to_string(), 0)];
    visited.insert(start.to_string());

    while let Some((node, next_child)) = stack.last().cloned() {
        if node == goal {
            return Some(stack.into_iter().map(|(name, _)| name).collect());
        }

        let children = edges.get(&node).map(Vec::as_slice).unwrap_or(&[]);
        if let Some(child) = children.get(next_child) {
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            if visited.insert(child.clone()) {
                stack.push((child.clone(), 0));
            }
        } else {
            stack.pop();
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_identity() {
        let cache = TargetCache::new();
        let a = cache.get_or_create("main.o");
        let b = cache.get_or_create("main.o");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_declare_edge_accepts_dag() {
        let cache = TargetCache::new();
        cache.declare_edge("app", "main.o").unwrap();
        cache.declare_edge("app", "util.o").unwrap();
        cache.declare_edge("main.o", "common.h").unwrap();
        cache.declare_edge("util.o", "common.h").unwrap();
        cache.declare_edge("app", "main.o").unwrap();

        assert_eq!(cache.dependencies_of("app"), vec!["main.o", "util.o"]);
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let cache = TargetCache::new();
        let path = cache.declare_edge("a", "a").unwrap_err();
        assert_eq!(path, vec!["a", "a"]);
    }

    #[test]
    fn test_circular_dependency() {
        let cache = TargetCache::new();
        cache.declare_edge("a", "b").unwrap();
        cache.declare_edge("b", "c").unwrap();

        let path = cache.declare_edge("c", "a").unwrap_err();
        assert_eq!(path, vec!["c", "a", "b", "c"]);
        assert!(cache.dependencies_of("c").is_empty());
    }
}
