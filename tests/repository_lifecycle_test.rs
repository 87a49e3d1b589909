use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use serde_json::json;
use unitstore::storage::{MemoryBackendFactory, RepositoryBackend, StorageResult};
use unitstore::{
    BackendFactory, BackendState, Key, Persistent, Repository, RepositoryListener, UnitDescriptor,
    UnitId,
};

#[derive(Default)]
struct CountingListener {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl RepositoryListener for CountingListener {
    fn name(&self) -> &str {
        "counting"
    }

    fn unit_opened(&self, _unit: UnitId) -> bool {
        self.opened.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn unit_closed(&self, _unit: UnitId) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct Veto;

impl RepositoryListener for Veto {
    fn name(&self) -> &str {
        "veto"
    }

    fn unit_opened(&self, _unit: UnitId) -> bool {
        false
    }

    fn unit_closed(&self, _unit: UnitId) {}
}

#[test]
fn test_round_trip_keeps_listeners() {
    let listener = Arc::new(CountingListener::default());
    let repository = Repository::builder()
        .factory(MemoryBackendFactory)
        .listener(listener.clone())
        .build();

    repository.startup(1).unwrap();
    let unit = repository.unit_id(&UnitDescriptor::local("app")).unwrap();
    repository.open_unit(unit).unwrap();
    repository.close_unit(unit, false, &HashSet::new()).unwrap();
    repository.shutdown().unwrap();

    assert!(!repository.is_active());
    assert_eq!(repository.version(), None);
    assert_eq!(listener.opened.load(Ordering::SeqCst), 1);
    assert_eq!(listener.closed.load(Ordering::SeqCst), 1);
    assert_eq!(repository.listeners().listener_count(), 1);
}

#[test]
fn test_listeners_notified_before_return() {
    let listener = Arc::new(CountingListener::default());
    let repository = Repository::builder().build();
    repository.listeners().register_listener(listener.clone());

    repository.startup(0).unwrap();
    let unit = repository.unit_id(&UnitDescriptor::local("app")).unwrap();

    repository.open_unit(unit).unwrap();
    assert_eq!(listener.opened.load(Ordering::SeqCst), 1);

    // remove_unit is not an event
    repository.remove_unit(unit).unwrap();
    assert_eq!(listener.closed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_veto_does_not_roll_back_open() {
    let counting = Arc::new(CountingListener::default());
    let repository = Repository::builder()
        .listener(Arc::new(Veto))
        .listener(counting.clone())
        .build();
    repository.startup(1).unwrap();
    let unit = repository.unit_id(&UnitDescriptor::local("app")).unwrap();

    repository.open_unit(unit).unwrap();
    assert_eq!(counting.opened.load(Ordering::SeqCst), 1);

    // the unit is usable even though a listener vetoed
    let key = Key::new(unit, "decl");
    repository.put(key.clone(), Persistent::new(json!(1))).unwrap();
    assert!(repository.get(&key).unwrap().is_some());
}

#[test]
fn test_memory_store_does_not_survive_restart() {
    let repository = Repository::builder().build();

    repository.startup(1).unwrap();
    let unit = repository.unit_id(&UnitDescriptor::local("app")).unwrap();
    let key = Key::new(unit, "K1");
    repository.put(key.clone(), Persistent::new(json!("V1"))).unwrap();
    assert_eq!(repository.get(&key).unwrap(), Some(Persistent::new(json!("V1"))));

    repository.shutdown().unwrap();
    repository.startup(1).unwrap();
    assert_eq!(repository.get(&key).unwrap(), None);
}

struct SlowFactory {
    created: AtomicUsize,
}

impl BackendFactory for SlowFactory {
    fn create_repository(&self, version: u32) -> StorageResult<Arc<dyn RepositoryBackend>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        thread::sleep(std::time::Duration::from_millis(20));
        MemoryBackendFactory.create_repository(version)
    }
}

#[test]
fn test_concurrent_startup_builds_one_backend() {
    let factory = Arc::new(SlowFactory {
        created: AtomicUsize::new(0),
    });
    let repository = Arc::new(Repository::new(factory.clone(), Arc::default()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repository = repository.clone();
            thread::spawn(move || {
                repository.startup(5).unwrap();
                // returning from startup means the backend is usable
                assert!(repository.is_active());
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    assert!(matches!(&*repository.state(), BackendState::Active { version: 5, .. }));
}

#[test]
fn test_concurrent_writers() {
    let repository = Arc::new(Repository::builder().build());
    repository.startup(1).unwrap();
    let unit = repository.unit_id(&UnitDescriptor::local("app")).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let repository = repository.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    let key = Key::new(unit, &format!("w{worker}:{i}"));
                    repository.put(key, Persistent::new(json!(i))).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for worker in 0..4 {
        let key = Key::new(unit, &format!("w{worker}:49"));
        assert_eq!(repository.get(&key).unwrap(), Some(Persistent::new(json!(49))));
    }
}
