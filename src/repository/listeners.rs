//! Unit open/close notification fan-out.
//!
//! Listeners live in an immutable snapshot that registration replaces
//! wholesale, so a fan-out in progress never sees a half-updated list and
//! never blocks a concurrent (un)registration.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::types::UnitId;

/// Party interested in units opening and closing.
pub trait RepositoryListener: Send + Sync {
    /// Listener name for logging.
    fn name(&self) -> &str;

    /// Called after a unit was opened. Returning `false` vetoes the open.
    fn unit_opened(&self, unit: UnitId) -> bool;

    /// Called after a unit was closed.
    fn unit_closed(&self, unit: UnitId);
}

type ListenerList = Vec<Arc<dyn RepositoryListener>>;

pub struct RepositoryListenersManager {
    listeners: ArcSwap<ListenerList>,
}

impl Default for RepositoryListenersManager {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RepositoryListenersManager {
    pub fn new(initial: impl IntoIterator<Item = Arc<dyn RepositoryListener>>) -> Self {
        Self {
            listeners: ArcSwap::from_pointee(initial.into_iter().collect()),
        }
    }

    /// Append `listener`. The same instance may be registered more than once.
    pub fn register_listener(&self, listener: Arc<dyn RepositoryListener>) {
        self.listeners.rcu(|current| {
            let mut next = ListenerList::clone(current);
            next.push(listener.clone());
            next
        });
    }

    /// Remove one registration of `listener`, matched by identity.
    ///
    /// Returns `false` if it was not registered.
    pub fn unregister_listener(&self, listener: &Arc<dyn RepositoryListener>) -> bool {
        let previous = self.listeners.rcu(|current| {
            let mut next = ListenerList::clone(current);
            if let Some(pos) = next.iter().position(|l| same_listener(l, listener)) {
                next.remove(pos);
            }
            next
        });
        previous.iter().any(|l| same_listener(l, listener))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.load().len()
    }

    /// Notify every listener, in registration order, that `unit` opened.
    ///
    /// All listeners run even after a veto. Returns `true` only if none of
    /// them vetoed.
    pub fn fire_unit_opened_event(&self, unit: UnitId) -> bool {
        let snapshot = self.listeners.load();
        let mut accepted = true;
        for listener in snapshot.iter() {
            if !listener.unit_opened(unit) {
                crate::debug_event!("listeners", "vetoed", "{unit} by {}", listener.name());
                accepted = false;
            }
        }
        accepted
    }

    /// Notify every listener, in registration order, that `unit` closed.
    pub fn fire_unit_closed_event(&self, unit: UnitId) {
        let snapshot = self.listeners.load();
        for listener in snapshot.iter() {
            listener.unit_closed(unit);
        }
    }
}

// Compare data pointers only; vtable pointers of the same type may differ
// between codegen units.
fn same_listener(a: &Arc<dyn RepositoryListener>, b: &Arc<dyn RepositoryListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Logs unit open/close events, never vetoes.
#[derive(Debug, Default)]
pub struct TracingListener;

impl RepositoryListener for TracingListener {
    fn name(&self) -> &str {
        "tracing"
    }

    fn unit_opened(&self, unit: UnitId) -> bool {
        crate::log_event!("units", "opened", "{unit}");
        true
    }

    fn unit_closed(&self, unit: UnitId) {
        crate::log_event!("units", "closed", "{unit}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        name: &'static str,
        accept: bool,
        opened: AtomicUsize,
        closed: AtomicUsize,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Recorder {
        fn new(name: &'static str, accept: bool, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                accept,
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                log: log.clone(),
            })
        }
    }

    impl RepositoryListener for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn unit_opened(&self, _unit: UnitId) -> bool {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push(self.name);
            self.accept
        }

        fn unit_closed(&self, _unit: UnitId) {
            self.closed.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push(self.name);
        }
    }

    #[test]
    fn test_veto_still_calls_every_listener() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Recorder::new("first", true, &log);
        let veto = Recorder::new("veto", false, &log);
        let last = Recorder::new("last", true, &log);

        let manager = RepositoryListenersManager::new([
            first.clone() as Arc<dyn RepositoryListener>,
            veto.clone(),
            last.clone(),
        ]);

        assert!(!manager.fire_unit_opened_event(UnitId::new(1)));
        assert_eq!(first.opened.load(Ordering::SeqCst), 1);
        assert_eq!(veto.opened.load(Ordering::SeqCst), 1);
        assert_eq!(last.opened.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock(), vec!["first", "veto", "last"]);
    }

    #[test]
    fn test_open_without_listeners_is_accepted() {
        let manager = RepositoryListenersManager::default();
        assert!(manager.fire_unit_opened_event(UnitId::new(0)));
    }

    #[test]
    fn test_closed_event_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = RepositoryListenersManager::default();
        manager.register_listener(Recorder::new("a", false, &log));
        manager.register_listener(Recorder::new("b", true, &log));

        manager.fire_unit_closed_event(UnitId::new(2));
        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let recorder = Recorder::new("dup", true, &log);
        let listener: Arc<dyn RepositoryListener> = recorder.clone();
        let manager = RepositoryListenersManager::default();

        manager.register_listener(listener.clone());
        manager.register_listener(listener.clone());
        assert_eq!(manager.listener_count(), 2);

        assert!(manager.unregister_listener(&listener));
        assert_eq!(manager.listener_count(), 1);

        manager.fire_unit_opened_event(UnitId::new(0));
        assert_eq!(recorder.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_unknown_listener() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registered: Arc<dyn RepositoryListener> = Recorder::new("a", true, &log);
        let stranger: Arc<dyn RepositoryListener> = Recorder::new("a", true, &log);
        let manager = RepositoryListenersManager::new([registered]);

        assert!(!manager.unregister_listener(&stranger));
        assert_eq!(manager.listener_count(), 1);
    }

    #[test]
    fn test_registration_during_fan_out() {
        struct Registrar {
            manager: Arc<RepositoryListenersManager>,
        }

        impl RepositoryListener for Registrar {
            fn name(&self) -> &str {
                "registrar"
            }

            fn unit_opened(&self, _unit: UnitId) -> bool {
                self.manager.register_listener(Arc::new(TracingListener));
                true
            }

            fn unit_closed(&self, _unit: UnitId) {}
        }

        let manager = Arc::new(RepositoryListenersManager::default());
        manager.register_listener(Arc::new(Registrar {
            manager: manager.clone(),
        }));

        // the running fan-out works on its snapshot
        assert!(manager.fire_unit_opened_event(UnitId::new(0)));
        assert_eq!(manager.listener_count(), 2);
    }
}
