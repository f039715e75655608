//! Subscription registry: event type to ordered handler list.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use super::lock;

/// A handler for raw inbound frames. Receives the full parsed object.
///
/// Identity for [`crate::ConnectionManager::off`] is the `Arc` allocation, so
/// keep a clone of the exact `Handler` you registered if you intend to remove
/// it that way.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler(f: impl Fn(&Value) + Send + Sync + 'static) -> Handler {
    Arc::new(f)
}

/// Callback fired on connection open or close.
pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;

/// Registration number, unique for the lifetime of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Entry {
    id: HandlerId,
    handler: Handler,
}

#[derive(Default)]
pub(crate) struct Registry {
    // Never reset, so a stale Subscription cannot remove a newer entry.
    next_id: u64,
    handlers: HashMap<String, Vec<Entry>>,
}

impl Registry {
    pub(crate) fn insert(&mut self, event_type: &str, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers
            .entry(event_type.to_string())
            .or_default()
            .push(Entry { id, handler });
        id
    }

    /// Remove the first registration of `handler` (by allocation) for `event_type`.
    pub(crate) fn remove_handler(&mut self, event_type: &str, handler: &Handler) -> bool {
        self.remove_where(event_type, |entry| same_handler(&entry.handler, handler))
    }

    pub(crate) fn remove_id(&mut self, event_type: &str, id: HandlerId) -> bool {
        self.remove_where(event_type, |entry| entry.id == id)
    }

    fn remove_where(&mut self, event_type: &str, matches: impl Fn(&Entry) -> bool) -> bool {
        let Some(entries) = self.handlers.get_mut(event_type) else {
            return false;
        };
        let Some(pos) = entries.iter().position(matches) else {
            return false;
        };
        entries.remove(pos);
        if entries.is_empty() {
            self.handlers.remove(event_type);
        }
        true
    }

    /// Snapshot of the handlers for `event_type`, in registration order.
    pub(crate) fn handlers_for(&self, event_type: &str) -> Vec<Handler> {
        self.handlers
            .get(event_type)
            .map(|entries| entries.iter().map(|e| e.handler.clone()).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.get(event_type).map_or(0, Vec::len)
    }

    pub(crate) fn clear(&mut self) {
        self.handlers.clear();
    }
}

fn same_handler(a: &Handler, b: &Handler) -> bool {
    // Compare data pointers only; vtable pointers are not guaranteed unique.
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Scoped registration returned by [`crate::ConnectionManager::on`].
///
/// Dropping the guard unregisters the handler. Call [`Subscription::detach`]
/// to keep the handler registered until `off()` or `disconnect()`.
#[must_use = "dropping a Subscription unregisters its handler; call `detach()` to keep it"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    event_type: String,
    id: HandlerId,
    armed: bool,
}

impl Subscription {
    pub(crate) fn new(registry: &Arc<Mutex<Registry>>, event_type: &str, id: HandlerId) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            event_type: event_type.to_string(),
            id,
            armed: true,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Unregister now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keep the handler registered after this guard is gone.
    pub fn detach(mut self) {
        self.armed = false;
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.armed) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove_id(&self.event_type, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event_type", &self.event_type)
            .field("id", &self.id)
            .field("armed", &self.armed)
            .finish()
    }
}

/// Run one callback so that a panic inside it is logged instead of
/// unwinding into the caller.
pub(crate) fn invoke_isolated(what: &str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        crate::log_error!("{} panicked: {}", what, panic_message(payload.as_ref()));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Handler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            handler(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            count,
        )
    }

    fn fire(registry: &Registry, event_type: &str) {
        for h in registry.handlers_for(event_type) {
            h(&Value::Null);
        }
    }

    #[test]
    fn handlers_keep_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::default();
        for n in 0..3 {
            let order = order.clone();
            registry.insert("t", handler(move |_| order.lock().unwrap().push(n)));
        }
        fire(&registry, "t");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn duplicate_registration_fires_twice() {
        let (h, count) = counting();
        let mut registry = Registry::default();
        registry.insert("t", h.clone());
        registry.insert("t", h);
        fire(&registry, "t");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_handler_drops_first_match_only() {
        let (h, count) = counting();
        let mut registry = Registry::default();
        registry.insert("t", h.clone());
        registry.insert("t", h.clone());
        assert!(registry.remove_handler("t", &h));
        assert_eq!(registry.handler_count("t"), 1);
        fire(&registry, "t");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_unknown_handler_is_noop() {
        let (h, _) = counting();
        let (other, _) = counting();
        let mut registry = Registry::default();
        registry.insert("t", h);
        assert!(!registry.remove_handler("t", &other));
        assert!(!registry.remove_handler("missing", &other));
        assert_eq!(registry.handler_count("t"), 1);
    }

    #[test]
    fn identical_closures_are_distinct_handlers() {
        let mut registry = Registry::default();
        let a = handler(|_| {});
        let b = handler(|_| {});
        registry.insert("t", a);
        assert!(!registry.remove_handler("t", &b));
    }

    #[test]
    fn ids_survive_clear() {
        let mut registry = Registry::default();
        let first = registry.insert("t", handler(|_| {}));
        registry.clear();
        let second = registry.insert("t", handler(|_| {}));
        assert_ne!(first, second);
        assert!(!registry.remove_id("t", first));
        assert_eq!(registry.handler_count("t"), 1);
    }

    #[test]
    fn subscription_drop_unregisters() {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let id = lock(&registry).insert("t", handler(|_| {}));
        let sub = Subscription::new(&registry, "t", id);
        assert_eq!(lock(&registry).handler_count("t"), 1);
        drop(sub);
        assert_eq!(lock(&registry).handler_count("t"), 0);
    }

    #[test]
    fn detached_subscription_stays_registered() {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let id = lock(&registry).insert("t", handler(|_| {}));
        Subscription::new(&registry, "t", id).detach();
        assert_eq!(lock(&registry).handler_count("t"), 1);
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let id = lock(&registry).insert("t", handler(|_| {}));
        let sub = Subscription::new(&registry, "t", id);
        drop(registry);
        sub.unsubscribe();
    }

    #[test]
    fn invoke_isolated_contains_panics() {
        let (h, count) = counting();
        invoke_isolated("boom", || panic!("boom"));
        invoke_isolated("ok", || h(&Value::Null));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
