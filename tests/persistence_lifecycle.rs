// Keep-alive persistence across restarts and storage failures

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use region_keepalive::persistence::{PersistenceResult, FORMAT_VERSION};
use region_keepalive::{
    ChannelTransport, DurableStore, FileStore, FlushPolicy, KeepaliveConfig, KeepaliveManager,
    LedgerProvider, LoaderPos, MemoryStore, PersistenceError, RegionCoord, RegionSerializer, WorldId,
};
use tempfile::TempDir;

const KEY: &str = "region_keepalive";

fn world(name: &str) -> WorldId {
    WorldId::parse(name).expect("valid world id")
}

fn manager_over(store: Arc<dyn DurableStore>, config: KeepaliveConfig) -> (KeepaliveManager, Arc<LedgerProvider>) {
    let provider = Arc::new(LedgerProvider::new());
    let manager = KeepaliveManager::new(config, store, provider.clone(), Arc::new(ChannelTransport::new()));
    (manager, provider)
}

/// Store whose writes can be made to fail
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl DurableStore for FlakyStore {
    fn load(&self, world: &WorldId, key: &str) -> PersistenceResult<Option<Vec<u8>>> {
        self.inner.load(world, key)
    }

    fn save(&self, world: &WorldId, key: &str, data: &[u8]) -> PersistenceResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.save(world, key, data)
    }

    fn set_aside(&self, world: &WorldId, key: &str) -> PersistenceResult<Option<String>> {
        self.inner.set_aside(world, key)
    }
}

#[test]
fn test_restart_restores_records_and_residency() {
    let temp_dir = TempDir::new().expect("temp dir");
    let overworld = world("world:overworld");
    let shared = RegionCoord::new(2, -3);
    let alone = RegionCoord::new(7, 7);
    let alice = LoaderPos::new(30, 64, -40);
    let bob = LoaderPos::new(35, 12, -45);

    {
        let store = Arc::new(FileStore::new(temp_dir.path()).expect("store"));
        let (manager, _provider) = manager_over(store, KeepaliveConfig::default());
        manager.register(&overworld, shared, alice, "alice").expect("register");
        manager.register(&overworld, alone, alice, "alice").expect("register");
        manager.register(&overworld, shared, bob, "bob").expect("register");
    }

    let store = Arc::new(FileStore::new(temp_dir.path()).expect("store"));
    assert!(store.path_for(&overworld, KEY).exists());
    let (manager, provider) = manager_over(store, KeepaliveConfig::default());

    assert_eq!(manager.list_for(&overworld, alice).len(), 2);
    assert_eq!(manager.list_for(&overworld, bob).len(), 1);
    assert_eq!(
        manager.find(&overworld, shared).map(|r| r.requested_by().to_string()),
        Some("alice".to_string())
    );

    let ledger = provider.ledger(&overworld);
    assert_eq!(ledger.acquire_count(shared), 1);
    assert_eq!(ledger.acquire_count(alone), 1);
    assert_eq!(ledger.resident_regions(), {
        let mut regions = vec![shared, alone];
        regions.sort();
        regions
    });
    assert!(!manager.registry(&overworld).lock().is_dirty());
}

#[test]
fn test_restore_can_be_disabled() {
    let store = Arc::new(MemoryStore::new());
    let overworld = world("world:overworld");
    {
        let (manager, _provider) = manager_over(store.clone(), KeepaliveConfig::default());
        manager
            .register(&overworld, RegionCoord::new(1, 1), LoaderPos::new(16, 64, 16), "alice")
            .expect("register");
    }

    let config = KeepaliveConfig {
        restore_residency_on_load: false,
        ..KeepaliveConfig::default()
    };
    let (manager, provider) = manager_over(store, config);
    assert!(manager.is_loaded(&overworld, RegionCoord::new(1, 1)));
    assert_eq!(provider.ledger(&overworld).total_acquires(), 0);
}

#[test]
fn test_corrupt_blob_starts_empty() {
    let store = Arc::new(MemoryStore::new());
    let overworld = world("world:overworld");
    store.insert_raw(&overworld, KEY, vec![0x52, 0x4B, 0x41, 0x4C, 0xFF, 0x00, 0x13]);

    let (manager, provider) = manager_over(store.clone(), KeepaliveConfig::default());
    assert!(!manager.is_loaded(&overworld, RegionCoord::new(0, 0)));
    assert_eq!(manager.stats().load_failures, 1);
    assert_eq!(provider.ledger(&overworld).total_acquires(), 0);
    assert_eq!(
        store.load(&overworld, "region_keepalive.corrupt").expect("load"),
        Some(vec![0x52, 0x4B, 0x41, 0x4C, 0xFF, 0x00, 0x13])
    );

    // The world stays usable and the next flush replaces the bad blob
    manager
        .register(&overworld, RegionCoord::new(0, 0), LoaderPos::new(0, 64, 0), "alice")
        .expect("register");
    let (reloaded, _provider) = manager_over(store, KeepaliveConfig::default());
    assert!(reloaded.is_loaded(&overworld, RegionCoord::new(0, 0)));
}

#[test]
fn test_future_format_version_starts_empty() {
    let store = Arc::new(MemoryStore::new());
    let overworld = world("world:overworld");
    let mut bytes = RegionSerializer::new().serialize(&[]).expect("serialize");
    bytes[4] = (FORMAT_VERSION + 1) as u8;
    store.insert_raw(&overworld, KEY, bytes);

    let (manager, _provider) = manager_over(store, KeepaliveConfig::default());
    assert!(manager.registry(&overworld).lock().is_empty());
    assert_eq!(manager.stats().load_failures, 1);
}

#[test]
fn test_flush_failure_keeps_registry_dirty() {
    let store = Arc::new(FlakyStore::default());
    let overworld = world("world:overworld");
    let (manager, provider) = manager_over(store.clone(), KeepaliveConfig::default());

    store.failing.store(true, Ordering::SeqCst);
    manager
        .register(&overworld, RegionCoord::new(4, 4), LoaderPos::new(64, 64, 64), "alice")
        .expect("registration stands despite the failed write");

    assert!(manager.is_loaded(&overworld, RegionCoord::new(4, 4)));
    assert!(provider.ledger(&overworld).is_resident(RegionCoord::new(4, 4)));
    assert!(manager.registry(&overworld).lock().is_dirty());
    assert_eq!(manager.stats().flush_failures, 1);
    assert!(manager.flush(&overworld).is_err());

    // Unloading must not drop unsaved records
    assert!(manager.unload_world(&overworld).is_err());
    assert!(manager.is_world_loaded(&overworld));

    store.failing.store(false, Ordering::SeqCst);
    assert!(manager.flush(&overworld).expect("flush"));
    assert!(!manager.registry(&overworld).lock().is_dirty());
    assert!(store.inner.contains(&overworld, KEY));
}

#[test]
fn test_deferred_flush_on_unload() {
    let store = Arc::new(MemoryStore::new());
    let overworld = world("world:overworld");
    let config = KeepaliveConfig {
        flush_policy: FlushPolicy::Deferred,
        ..KeepaliveConfig::default()
    };
    let (manager, provider) = manager_over(store.clone(), config.clone());

    manager
        .register(&overworld, RegionCoord::new(-1, -1), LoaderPos::new(-5, 64, -5), "alice")
        .expect("register");
    assert!(store.is_empty());

    assert!(manager.unload_world(&overworld).expect("unload"));
    assert!(store.contains(&overworld, KEY));
    let ledger = provider.ledger(&overworld);
    assert_eq!(ledger.total_acquires(), ledger.total_releases());

    let (reloaded, _provider) = manager_over(store, config);
    assert!(reloaded.is_loaded(&overworld, RegionCoord::new(-1, -1)));
}

#[test]
fn test_worlds_persist_independently() {
    let temp_dir = TempDir::new().expect("temp dir");
    let store = Arc::new(FileStore::new(temp_dir.path()).expect("store"));
    let overworld = world("world:overworld");
    let mining = world("mining:dim/deep");
    let (manager, _provider) = manager_over(store.clone(), KeepaliveConfig::default());

    manager
        .register(&overworld, RegionCoord::new(0, 0), LoaderPos::new(0, 64, 0), "alice")
        .expect("register");
    manager
        .register(&mining, RegionCoord::new(0, 0), LoaderPos::new(0, 10, 0), "bob")
        .expect("register");

    assert_eq!(manager.loaded_worlds(), {
        let mut worlds = vec![overworld.clone(), mining.clone()];
        worlds.sort();
        worlds
    });
    assert!(temp_dir.path().join("mining").join("dim").join("deep").join("region_keepalive.dat").exists());

    let records = RegionSerializer::new()
        .deserialize(&store.load(&mining, KEY).expect("load").expect("blob present"))
        .expect("decode");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].requested_by(), "bob");
}

#[test]
fn test_unreadable_file_survives_first_flush() {
    let temp_dir = TempDir::new().expect("temp dir");
    let store = Arc::new(FileStore::new(temp_dir.path()).expect("store"));
    let overworld = world("world:overworld");
    store.save(&overworld, KEY, b"not a registry").expect("seed garbage");

    let (manager, _provider) = manager_over(store.clone(), KeepaliveConfig::default());
    manager
        .register(&overworld, RegionCoord::new(2, 2), LoaderPos::new(32, 64, 32), "alice")
        .expect("register");

    let aside = temp_dir
        .path()
        .join("world")
        .join("overworld")
        .join("region_keepalive.dat.corrupt");
    assert_eq!(std::fs::read(&aside).expect("unreadable blob kept"), b"not a registry");

    let (reloaded, _provider) = manager_over(store, KeepaliveConfig::default());
    assert!(reloaded.is_loaded(&overworld, RegionCoord::new(2, 2)));
    assert_eq!(reloaded.stats().load_failures, 0);
}

#[test]
fn test_register_racing_unload_is_kept() {
    let store = Arc::new(MemoryStore::new());
    let overworld = world("world:overworld");
    let region = RegionCoord::new(8, -8);
    let loader = LoaderPos::new(128, 64, -128);
    let config = KeepaliveConfig {
        flush_policy: FlushPolicy::Deferred,
        ..KeepaliveConfig::default()
    };
    let (manager, provider) = manager_over(store.clone(), config.clone());
    let manager = Arc::new(manager);

    // Hold the registry so both threads queue up behind it
    let handle = manager.registry(&overworld);
    let guard = handle.lock();

    let registering = {
        let manager = Arc::clone(&manager);
        let overworld = overworld.clone();
        thread::spawn(move || manager.register(&overworld, region, loader, "alice"))
    };
    let unloading = {
        let manager = Arc::clone(&manager);
        let overworld = overworld.clone();
        thread::spawn(move || manager.unload_world(&overworld))
    };
    thread::sleep(Duration::from_millis(50));
    drop(guard);

    registering
        .join()
        .expect("register thread")
        .expect("registration acknowledged");
    unloading.join().expect("unload thread").expect("unload");

    // Whichever ran first, the acknowledged record is live and held once
    assert!(manager.is_loaded(&overworld, region));
    assert_eq!(provider.ledger(&overworld).ticket_count(region), 1);

    manager.flush_all().expect("flush");
    let (reloaded, _provider) = manager_over(store, config);
    assert!(reloaded.is_loaded(&overworld, region));
}
