//! Observer registries for session events.
//!
//! The application owns its callbacks (as `Arc`s); a registry only keeps
//! `Weak` references, so a callback whose last `Arc` is dropped silently
//! stops being invoked. Identity is the allocation: registering the same
//! `Arc` twice is rejected, and removal matches by pointer.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// A shareable observer for events of type `E`.
pub type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// An ordered set of observers for one event category.
pub struct CallbackRegistry<E> {
    entries: Vec<Weak<dyn Fn(&E) + Send + Sync>>,
}

impl<E> CallbackRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds `callback` at the end of the dispatch order.
    ///
    /// Returns `false` if this exact callback is already registered.
    pub fn register(&mut self, callback: &Callback<E>) -> bool {
        self.prune();
        let weak = Arc::downgrade(callback);
        if self.entries.iter().any(|e| Weak::ptr_eq(e, &weak)) {
            return false;
        }
        self.entries.push(weak);
        true
    }

    /// Removes `callback`. Returns whether it was registered.
    pub fn remove(&mut self, callback: &Callback<E>) -> bool {
        let weak = Arc::downgrade(callback);
        match self.entries.iter().position(|e| Weak::ptr_eq(e, &weak)) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Invokes every live callback in registration order.
    ///
    /// Iterates over a snapshot taken before the first call. A panicking
    /// callback is logged and does not stop the remaining ones. Returns the
    /// number of callbacks that completed normally.
    pub fn dispatch(&self, event: &E) -> usize {
        let snapshot: Vec<Callback<E>> =
            self.entries.iter().filter_map(Weak::upgrade).collect();

        let mut completed = 0;
        for callback in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => completed += 1,
                Err(payload) => {
                    tracing::error!(
                        panic = panic_message(payload.as_ref()),
                        "session callback panicked"
                    );
                }
            }
        }
        completed
    }

    /// Number of registered callbacks that are still alive.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.strong_count() > 0).count()
    }

    /// Returns `true` if no live callback is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&mut self) {
        self.entries.retain(|e| e.strong_count() > 0);
    }
}

impl<E> Default for CallbackRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Returns a callback that appends `tag` to `log` on every call.
    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> Callback<u32> {
        let log = Arc::clone(log);
        let tag = tag.to_owned();
        Arc::new(move |n: &u32| log.lock().unwrap().push(format!("{tag}{n}")))
    }

    #[test]
    fn test_register_same_callback_twice_returns_false() {
        let mut registry = CallbackRegistry::new();
        let cb: Callback<u32> = Arc::new(|_: &u32| {});

        assert!(registry.register(&cb));
        assert!(!registry.register(&cb));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_equal_closures_are_distinct() {
        // Identity is the allocation, not the code.
        let mut registry = CallbackRegistry::new();
        let a: Callback<u32> = Arc::new(|_: &u32| {});
        let b: Callback<u32> = Arc::new(|_: &u32| {});

        assert!(registry.register(&a));
        assert!(registry.register(&b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_dispatch_runs_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        let first = recorder(&log, "a");
        let second = recorder(&log, "b");
        registry.register(&first);
        registry.register(&second);

        assert_eq!(registry.dispatch(&1), 2);
        assert_eq!(*log.lock().unwrap(), vec!["a1", "b1"]);
    }

    #[test]
    fn test_remove_registered_callback_stops_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        let cb = recorder(&log, "x");
        registry.register(&cb);

        assert!(registry.remove(&cb));
        assert_eq!(registry.dispatch(&5), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_remove_unregistered_callback_returns_false() {
        let mut registry = CallbackRegistry::<u32>::new();
        let cb: Callback<u32> = Arc::new(|_: &u32| {});
        assert!(!registry.remove(&cb));
    }

    #[test]
    fn test_dispatch_skips_dropped_callback() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        let kept = recorder(&log, "kept");
        let dropped = recorder(&log, "dropped");
        registry.register(&kept);
        registry.register(&dropped);

        drop(dropped);

        assert_eq!(registry.dispatch(&2), 1);
        assert_eq!(*log.lock().unwrap(), vec!["kept2"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_dispatch_isolates_panicking_callback() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        let boom: Callback<u32> = Arc::new(|_: &u32| panic!("boom"));
        let after = recorder(&log, "after");
        registry.register(&boom);
        registry.register(&after);

        assert_eq!(registry.dispatch(&3), 1);
        assert_eq!(*log.lock().unwrap(), vec!["after3"]);
    }

    #[test]
    fn test_reregister_after_remove_moves_to_end() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        let a = recorder(&log, "a");
        let b = recorder(&log, "b");
        registry.register(&a);
        registry.register(&b);

        registry.remove(&a);
        registry.register(&a);
        registry.dispatch(&0);

        assert_eq!(*log.lock().unwrap(), vec!["b0", "a0"]);
    }
}
