//! Link activation callbacks.
//!
//! A rendered wiki-link, when activated, reports its raw text to whichever
//! handler the caller registered. The registry is an ordinary value owned by
//! the caller; there is no ambient hook.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Handler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
pub struct LinkClickRegistry {
    next_id: AtomicU64,
    current: Mutex<Option<(HandlerId, Handler)>>,
}

impl LinkClickRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler`, replacing any previous one.
    pub fn register<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        *self.current.lock() = Some((id, Arc::new(handler)));
        id
    }

    /// Remove the handler if `id` is still the registered one. A stale id
    /// leaves a newer registration alone.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut guard = self.current.lock();
        if matches!(guard.as_ref(), Some((current, _)) if *current == id) {
            *guard = None;
            true
        } else {
            false
        }
    }

    pub fn is_registered(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Deliver `link_text` to the handler. No-op without one; returns whether
    /// a handler ran.
    pub fn activate(&self, link_text: &str) -> bool {
        let handler = self.current.lock().as_ref().map(|(_, h)| h.clone());
        match handler {
            Some(handler) => {
                handler(link_text);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for LinkClickRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkClickRegistry")
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_without_handler_is_noop() {
        let registry = LinkClickRegistry::new();
        assert!(!registry.activate("Budget"));
    }

    #[test]
    fn handler_receives_raw_text_until_unregistered() {
        let registry = LinkClickRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = registry.register(move |text| sink.lock().push(text.to_string()));

        assert!(registry.activate("Budget"));
        assert!(registry.activate("Q3 Plan"));
        assert!(registry.unregister(id));
        assert!(!registry.activate("ignored"));
        assert_eq!(*seen.lock(), vec!["Budget", "Q3 Plan"]);
    }

    #[test]
    fn stale_unregister_keeps_newer_handler() {
        let registry = LinkClickRegistry::new();
        let first = registry.register(|_| {});
        let second = registry.register(|_| {});
        assert_ne!(first, second);
        assert!(!registry.unregister(first));
        assert!(registry.is_registered());
        assert!(registry.unregister(second));
        assert!(!registry.is_registered());
    }

    #[test]
    fn handler_may_reenter_registry() {
        let registry = Arc::new(LinkClickRegistry::new());
        let inner = registry.clone();
        registry.register(move |_| {
            inner.is_registered();
        });
        assert!(registry.activate("x"));
    }
}
