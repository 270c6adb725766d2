//! Echo suppression between the writeback engine and the reverse listener.
//!
//! Before writing into the tree the engine registers the names it is about
//! to touch and raises the suppress flag. A listener observing the tree
//! consults the registry and drops events the engine caused. Registrations
//! and the flag are released by guards, so every exit path clears them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// Shared registry of in-flight engine writes.
///
/// Known names form a multiset: nested registrations of the same name stay
/// visible until the last guard is dropped. Suppression is reentrant.
#[derive(Debug, Default)]
pub struct EchoRegistry {
    known: Mutex<HashMap<String, usize>>,
    suppress_depth: AtomicUsize,
}

impl EchoRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one name until the guard is dropped.
    pub fn register(&self, name: &str) -> KnownChangeGuard<'_> {
        self.register_all([name])
    }

    /// Registers several names until the guard is dropped.
    pub fn register_all<I, S>(&self, names: I) -> KnownChangeGuard<'_>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        {
            let mut known = self.known.lock();
            for name in &names {
                *known.entry(name.clone()).or_insert(0) += 1;
            }
        }
        trace!(?names, "registered known changes");
        KnownChangeGuard {
            registry: self,
            names,
        }
    }

    /// Raises the suppress flag until the guard is dropped.
    pub fn suppress(&self) -> SuppressGuard<'_> {
        self.suppress_depth.fetch_add(1, Ordering::AcqRel);
        SuppressGuard { registry: self }
    }

    /// Returns true if the engine is currently writing `name`.
    pub fn is_known_change(&self, name: &str) -> bool {
        self.known.lock().contains_key(name)
    }

    /// Returns true while any suppress guard is alive.
    pub fn is_suppressed(&self) -> bool {
        self.suppress_depth.load(Ordering::Acquire) > 0
    }

    /// Returns the registered names, sorted.
    pub fn known_changes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.known.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn release(&self, names: &[String]) {
        let mut known = self.known.lock();
        for name in names {
            if let Some(count) = known.get_mut(name) {
                *count -= 1;
                if *count == 0 {
                    known.remove(name);
                }
            }
        }
    }
}

/// Keeps names registered as known changes.
#[must_use = "names are unregistered when the guard is dropped"]
#[derive(Debug)]
pub struct KnownChangeGuard<'a> {
    registry: &'a EchoRegistry,
    names: Vec<String>,
}

impl KnownChangeGuard<'_> {
    /// Returns the names held by this guard.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Drop for KnownChangeGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.names);
    }
}

/// Keeps reverse propagation suppressed.
#[must_use = "suppression ends when the guard is dropped"]
#[derive(Debug)]
pub struct SuppressGuard<'a> {
    registry: &'a EchoRegistry,
}

impl Drop for SuppressGuard<'_> {
    fn drop(&mut self) {
        self.registry.suppress_depth.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn registration_is_scoped() {
        let echo = EchoRegistry::new();
        {
            let guard = echo.register_all(["server", "*"]);
            assert_eq!(guard.names(), ["server", "*"]);
            assert!(echo.is_known_change("server"));
            assert!(echo.is_known_change("*"));
        }
        assert!(!echo.is_known_change("server"));
        assert!(echo.known_changes().is_empty());
    }

    #[test]
    fn nested_registrations_count() {
        let echo = EchoRegistry::new();
        let outer = echo.register("port");
        let inner = echo.register("port");
        drop(inner);
        assert!(echo.is_known_change("port"));
        drop(outer);
        assert!(!echo.is_known_change("port"));
    }

    #[test]
    fn suppression_is_reentrant() {
        let echo = EchoRegistry::new();
        assert!(!echo.is_suppressed());
        let outer = echo.suppress();
        {
            let _inner = echo.suppress();
            assert!(echo.is_suppressed());
        }
        assert!(echo.is_suppressed());
        drop(outer);
        assert!(!echo.is_suppressed());
    }

    #[test]
    fn released_on_early_return() {
        fn failing(echo: &EchoRegistry) -> Result<(), String> {
            let _known = echo.register("value");
            let _quiet = echo.suppress();
            Err("apply failed".to_string())
        }

        let echo = EchoRegistry::new();
        assert!(failing(&echo).is_err());
        assert!(!echo.is_known_change("value"));
        assert!(!echo.is_suppressed());
    }

    #[test]
    fn visible_across_threads() {
        let echo = Arc::new(EchoRegistry::new());
        let guard = echo.register("server");
        let _quiet = echo.suppress();

        let seen = {
            let echo = Arc::clone(&echo);
            thread::spawn(move || (echo.is_known_change("server"), echo.is_suppressed()))
                .join()
                .unwrap()
        };
        assert_eq!(seen, (true, true));
        drop(guard);
    }
}
