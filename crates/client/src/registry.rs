//! Listener registry: maps an event key to an ordered list of callbacks.
//!
//! Dispatch iterates a snapshot of the list, so listeners may register or
//! deregister (themselves included) while a dispatch is running. A listener
//! that panics is logged and skipped; the rest of the dispatch continues.

use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A registered callback. Identity (for removal) is the `Arc` allocation.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub struct ListenerRegistry<K, E> {
    slots: Mutex<HashMap<K, Vec<Listener<E>>>>,
}

impl<K, E> Default for ListenerRegistry<K, E> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, E> ListenerRegistry<K, E>
where
    K: Eq + Hash + Copy + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<K, Vec<Listener<E>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `listener`. Registering the same `Arc` twice invokes it twice.
    pub fn register(&self, key: K, listener: Listener<E>) {
        self.slots().entry(key).or_default().push(listener);
    }

    /// Remove the first entry that is the same allocation as `listener`.
    pub fn unregister(&self, key: K, listener: &Listener<E>) -> bool {
        let mut slots = self.slots();
        let Some(list) = slots.get_mut(&key) else {
            return false;
        };
        let Some(pos) = list.iter().position(|l| Arc::ptr_eq(l, listener)) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            slots.remove(&key);
        }
        true
    }

    pub fn clear(&self, key: K) {
        self.slots().remove(&key);
    }

    pub fn clear_all(&self) {
        self.slots().clear();
    }

    pub fn listener_count(&self, key: K) -> usize {
        self.slots().get(&key).map_or(0, Vec::len)
    }

    /// Invoke every listener registered for `key` at the time of the call,
    /// in registration order. Returns how many returned normally.
    pub fn dispatch(&self, key: K, event: &E) -> usize {
        let snapshot: Vec<Listener<E>> = match self.slots().get(&key) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut completed = 0;
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => completed += 1,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic".to_string());
                    crate::log_error!("listener for {:?} panicked: {}", key, reason);
                }
            }
        }
        completed
    }
}
