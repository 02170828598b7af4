// Snapshot delivery from the manager to observer views

use std::collections::HashSet;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use region_keepalive::network::LoadedRegionData;
use region_keepalive::{
    ChannelTransport, FlushPolicy, KeepaliveConfig, KeepaliveManager, LedgerProvider, LoaderPos, MemoryStore,
    ObserverId, RegionCoord, RegionView, WorldId,
};

fn world(name: &str) -> WorldId {
    WorldId::parse(name).expect("valid world id")
}

fn setup() -> (KeepaliveManager, Arc<ChannelTransport>) {
    let transport = Arc::new(ChannelTransport::new());
    let manager = KeepaliveManager::new(
        KeepaliveConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(LedgerProvider::new()),
        transport.clone(),
    );
    (manager, transport)
}

fn drain(receiver: &Receiver<Vec<u8>>, view: &mut RegionView) {
    while let Ok(bytes) = receiver.try_recv() {
        view.apply_bytes(&bytes).expect("valid snapshot");
    }
}

fn as_set(records: &[LoadedRegionData]) -> HashSet<LoadedRegionData> {
    records.iter().cloned().collect()
}

#[test]
fn test_clear_then_full_sync_matches_registry() {
    let (manager, transport) = setup();
    let overworld = world("world:overworld");
    let observer = ObserverId(1);
    let receiver = transport.connect(observer);
    let mut view = RegionView::new();

    manager
        .register(&overworld, RegionCoord::new(0, 0), LoaderPos::new(1, 64, 1), "alice")
        .expect("register");
    manager
        .register(&overworld, RegionCoord::new(0, 1), LoaderPos::new(1, 64, 1), "alice")
        .expect("register");
    manager
        .register(&overworld, RegionCoord::new(0, 0), LoaderPos::new(9, 64, 9), "bob")
        .expect("register");

    assert!(manager.sync_loader_to_observer(&overworld, observer, LoaderPos::new(9, 64, 9)));
    drain(&receiver, &mut view);
    assert_eq!(view.len(), 1);

    assert!(manager.clear_observer(observer));
    assert!(manager.sync_all_to_observer(&overworld, observer));
    drain(&receiver, &mut view);

    let handle = manager.registry(&overworld);
    let registry = handle.lock();
    let expected: Vec<LoadedRegionData> = registry.records().iter().map(LoadedRegionData::from).collect();
    assert_eq!(as_set(view.records()), as_set(&expected));
    assert_eq!(view.snapshots_applied(), 3);
}

#[test]
fn test_repeated_full_sync_is_idempotent() {
    let (manager, transport) = setup();
    let overworld = world("world:overworld");
    let observer = ObserverId(2);
    let receiver = transport.connect(observer);
    let mut view = RegionView::new();

    manager
        .register(&overworld, RegionCoord::new(3, 3), LoaderPos::new(48, 64, 48), "alice")
        .expect("register");

    manager.sync_all_to_observer(&overworld, observer);
    drain(&receiver, &mut view);
    let first = view.records().to_vec();

    manager.sync_all_to_observer(&overworld, observer);
    manager.sync_all_to_observer(&overworld, observer);
    drain(&receiver, &mut view);
    assert_eq!(view.records(), first.as_slice());

    // A later snapshot drops what was unregistered in between
    manager
        .unregister(&overworld, RegionCoord::new(3, 3), LoaderPos::new(48, 64, 48))
        .expect("unregister");
    manager.sync_all_to_observer(&overworld, observer);
    drain(&receiver, &mut view);
    assert!(view.is_empty());
    assert!(!view.is_loaded("world:overworld", RegionCoord::new(3, 3)));
}

#[test]
fn test_lost_observer_does_not_touch_registry() {
    let (manager, transport) = setup();
    let overworld = world("world:overworld");
    let observer = ObserverId(3);
    drop(transport.connect(observer));

    manager
        .register(&overworld, RegionCoord::new(1, 2), LoaderPos::new(20, 64, 40), "alice")
        .expect("register");

    assert!(!manager.sync_all_to_observer(&overworld, observer));
    assert!(!manager.sync_all_to_observer(&overworld, ObserverId(99)));
    assert_eq!(manager.broadcaster().stats().snapshots_dropped, 2);
    assert!(manager.is_loaded(&overworld, RegionCoord::new(1, 2)));
}

#[test]
fn test_large_registry_snapshot_delivered() {
    let transport = Arc::new(ChannelTransport::new());
    let config = KeepaliveConfig {
        flush_policy: FlushPolicy::Deferred,
        ..KeepaliveConfig::default()
    };
    let manager = KeepaliveManager::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(LedgerProvider::new()),
        transport.clone(),
    );
    let overworld = world("world:overworld");
    let observer = ObserverId(5);
    let receiver = transport.connect(observer);
    let mut view = RegionView::new();

    for i in 0..1500 {
        let loader = LoaderPos::new((i % 10) * 16, 64, 0);
        manager
            .register(&overworld, RegionCoord::new(i / 10, i % 10), loader, "alice")
            .expect("register");
    }

    assert!(manager.clear_observer(observer));
    assert!(manager.sync_all_to_observer(&overworld, observer));
    drain(&receiver, &mut view);

    assert_eq!(view.len(), 1500);
    assert!(view.is_loaded("world:overworld", RegionCoord::new(149, 9)));
    let stats = manager.broadcaster().stats();
    assert_eq!(stats.encoding_failures, 0);
    assert_eq!(stats.snapshots_dropped, 0);
}
