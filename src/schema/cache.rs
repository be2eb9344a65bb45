//! # Class Cache
//!
//! The cache hands out `Arc<ScmoClass>` by (namespace, class name). It is an
//! explicitly passed handle, never a global: cloning the cache clones the
//! handle, not the contents, so the broker core and every provider can share
//! one cache without a singleton.
//!
//! A lookup miss is a normal condition, not an error. Construction paths
//! treat it as "no class for this instance" and fall back to the schema-less
//! overflow representation.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use super::ScmoClass;

/// Thread-safe, reference-counted class lookup keyed by case-folded
/// (namespace, class name).
#[derive(Debug, Clone, Default)]
pub struct ClassCache {
    inner: Arc<RwLock<HashMap<(String, String), Arc<ScmoClass>>>>,
}

impl ClassCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a class, replacing any previous entry for the same
    /// (namespace, class name) pair, and returns the shared handle.
    pub fn insert(&self, class: ScmoClass) -> Arc<ScmoClass> {
        let key = fold_key(class.namespace(), class.name());
        let class = Arc::new(class);
        self.inner.write().insert(key, Arc::clone(&class));
        class
    }

    /// Looks up a class. A miss returns None, never an error.
    pub fn lookup(&self, namespace: &str, class_name: &str) -> Option<Arc<ScmoClass>> {
        self.inner
            .read()
            .get(&fold_key(namespace, class_name))
            .cloned()
    }

    pub fn remove(&self, namespace: &str, class_name: &str) -> Option<Arc<ScmoClass>> {
        self.inner.write().remove(&fold_key(namespace, class_name))
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

fn fold_key(namespace: &str, class_name: &str) -> (String, String) {
    (
        namespace.to_ascii_lowercase(),
        class_name.to_ascii_lowercase(),
    )
}
