//! Shared registry of VM names in use by connection controllers.
//!
//! Two live controllers driving the same VM would fight over its lifecycle,
//! so every controller registers its VM name here for its lifetime. The
//! registry is reference-counted and injected explicitly - construct one per
//! application (or per test) and pass clones to each controller.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Reference-counted registry of in-use VM names.
///
/// Cheaply cloneable; all clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct VmRegistry {
    inner: Arc<Mutex<HashMap<String, usize>>>,
}

impl VmRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one use of `name`. Returns `true` if this is the first use.
    ///
    /// A `false` return means another controller already drives this VM;
    /// callers log a warning but are not prevented from proceeding.
    pub fn register(&self, name: &str) -> bool {
        let mut names = self.inner.lock();
        let count = names.entry(name.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Release one use of `name` previously registered.
    pub fn release(&self, name: &str) {
        let mut names = self.inner.lock();
        if let Some(count) = names.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                names.remove(name);
            }
        }
    }

    /// Whether `name` is currently registered by any controller.
    pub fn is_used(&self, name: &str) -> bool {
        self.inner.lock().contains_key(name)
    }

    /// All currently registered VM names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_release_refcounts() {
        let registry = VmRegistry::new();

        assert!(registry.register("engine"));
        assert!(!registry.register("engine"));
        assert!(registry.is_used("engine"));

        registry.release("engine");
        assert!(registry.is_used("engine"));
        registry.release("engine");
        assert!(!registry.is_used("engine"));
    }

    #[test]
    fn names_lists_registered() {
        let registry = VmRegistry::new();
        registry.register("emulator");
        registry.register("engine");

        assert_eq!(registry.names(), vec!["emulator", "engine"]);

        registry.release("emulator");
        assert_eq!(registry.names(), vec!["engine"]);
    }

    #[test]
    fn release_of_unknown_name_is_harmless() {
        let registry = VmRegistry::new();
        registry.release("ghost");
        assert!(registry.names().is_empty());
    }
}
