//! Per-world ownership of keep-alive registries
//!
//! A world's registry is created the first time anything asks for it, filled
//! from durable storage at that moment, and written back whenever it is dirty
//! and a flush happens. Each registry sits behind its own mutex; every check
//! and residency call of a register or unregister runs under that lock.
//!
//! Unloading a world retires its registry under that same lock. Operations
//! that find a retired registry resolve the world again, so they land on the
//! registry that replaced it.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::config::{FlushPolicy, KeepaliveConfig};
use crate::error::{KeepaliveError, KeepaliveResult};
use crate::keepalive::{LoadedRegion, RegionRegistry};
use crate::network::{ObserverId, SyncBroadcaster, Transport};
use crate::persistence::{DurableStore, PersistenceResult, RegionSerializer};
use crate::world::{LoaderPos, RegionCoord, ResidencyProvider, WorldId};

/// Shared handle to one world's registry
pub type RegistryHandle = Arc<Mutex<RegionRegistry>>;

/// Counters for world lifecycle and persistence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepaliveStats {
    pub worlds_loaded: u64,
    pub load_failures: u64,
    pub flushes: u64,
    pub flush_failures: u64,
}

/// Owns every world's registry, its persistence and its client sync
pub struct KeepaliveManager {
    config: KeepaliveConfig,
    store: Arc<dyn DurableStore>,
    residency: Arc<dyn ResidencyProvider>,
    broadcaster: SyncBroadcaster,
    serializer: RegionSerializer,
    worlds: RwLock<FxHashMap<WorldId, RegistryHandle>>,
    stats: Mutex<KeepaliveStats>,
}

impl KeepaliveManager {
    pub fn new(
        config: KeepaliveConfig,
        store: Arc<dyn DurableStore>,
        residency: Arc<dyn ResidencyProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            store,
            residency,
            broadcaster: SyncBroadcaster::new(transport),
            serializer: RegionSerializer::new(),
            worlds: RwLock::new(FxHashMap::default()),
            stats: Mutex::new(KeepaliveStats::default()),
        }
    }

    pub fn config(&self) -> &KeepaliveConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &SyncBroadcaster {
        &self.broadcaster
    }

    pub fn stats(&self) -> KeepaliveStats {
        *self.stats.lock()
    }

    /// The world's registry, loading it from storage on first access.
    ///
    /// A handle kept past [`KeepaliveManager::unload_world`] refers to a
    /// retired registry that rejects mutations with
    /// [`KeepaliveError::WorldUnloaded`].
    pub fn registry(&self, world: &WorldId) -> RegistryHandle {
        if let Some(handle) = self.worlds.read().get(world) {
            return Arc::clone(handle);
        }

        let mut worlds = self.worlds.write();
        // Another caller may have loaded it between the two locks
        if let Some(handle) = worlds.get(world) {
            return Arc::clone(handle);
        }
        let handle = Arc::new(Mutex::new(self.load_world(world)));
        worlds.insert(world.clone(), Arc::clone(&handle));
        handle
    }

    /// Worlds whose registry is currently in memory, sorted
    pub fn loaded_worlds(&self) -> Vec<WorldId> {
        let mut worlds: Vec<WorldId> = self.worlds.read().keys().cloned().collect();
        worlds.sort();
        worlds
    }

    pub fn is_world_loaded(&self, world: &WorldId) -> bool {
        self.worlds.read().contains_key(world)
    }

    fn load_world(&self, world: &WorldId) -> RegionRegistry {
        let mut registry = RegionRegistry::new(
            self.residency.residency_for(world),
            self.config.ticket_level,
            self.config.acquire_policy,
        );

        match self.read_records(world) {
            Ok(Some(records)) => {
                let total = records.len();
                let (own, foreign): (Vec<LoadedRegion>, Vec<LoadedRegion>) =
                    records.into_iter().partition(|record| record.world() == world);

                match registry.replace_records(own) {
                    Ok(()) => {
                        if !foreign.is_empty() {
                            log::warn!(
                                "[KeepaliveManager::load_world] dropped {} records stored under {} for other worlds",
                                foreign.len(),
                                world
                            );
                            registry.mark_dirty();
                        }
                        log::info!(
                            "[KeepaliveManager::load_world] {} loaded with {} of {} stored records",
                            world,
                            registry.len(),
                            total
                        );
                    }
                    Err(e) => {
                        self.stats.lock().load_failures += 1;
                        log::error!(
                            "[KeepaliveManager::load_world] stored registry for {} is inconsistent, starting empty: {}",
                            world,
                            e
                        );
                        self.set_aside(world);
                    }
                }
            }
            Ok(None) => {
                log::debug!("[KeepaliveManager::load_world] no stored registry for {}", world);
            }
            Err(e) => {
                self.stats.lock().load_failures += 1;
                log::error!(
                    "[KeepaliveManager::load_world] failed to load registry for {}, starting empty: {}",
                    world,
                    e
                );
                self.set_aside(world);
            }
        }

        if self.config.restore_residency_on_load && !registry.is_empty() {
            let acquired = registry.restore_residency();
            log::debug!(
                "[KeepaliveManager::load_world] restored {} tickets in {}",
                acquired,
                world
            );
        }

        self.stats.lock().worlds_loaded += 1;
        registry
    }

    /// Keep an unreadable blob from being overwritten by the next flush
    fn set_aside(&self, world: &WorldId) {
        match self.store.set_aside(world, &self.config.storage_key) {
            Ok(Some(location)) => log::warn!(
                "[KeepaliveManager::load_world] moved unreadable registry for {} to {}",
                world,
                location
            ),
            Ok(None) => {}
            Err(e) => log::error!(
                "[KeepaliveManager::load_world] could not move unreadable registry for {} aside: {}",
                world,
                e
            ),
        }
    }

    /// Run `f` on the world's live registry, resolving the world again if
    /// the registry found was retired by a concurrent unload
    fn with_live_registry<R>(&self, world: &WorldId, f: impl FnOnce(&mut RegionRegistry) -> R) -> R {
        loop {
            let handle = self.registry(world);
            let mut registry = handle.lock();
            if registry.is_retired() {
                drop(registry);
                std::thread::yield_now();
                continue;
            }
            return f(&mut registry);
        }
    }

    fn read_records(&self, world: &WorldId) -> PersistenceResult<Option<Vec<LoadedRegion>>> {
        match self.store.load(world, &self.config.storage_key)? {
            Some(data) => Ok(Some(self.serializer.deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn is_loaded(&self, world: &WorldId, region: RegionCoord) -> bool {
        self.with_live_registry(world, |registry| registry.is_loaded(world, region))
    }

    pub fn is_loaded_by(&self, world: &WorldId, region: RegionCoord, loader: LoaderPos) -> bool {
        self.with_live_registry(world, |registry| registry.is_loaded_by(world, region, loader))
    }

    pub fn find(&self, world: &WorldId, region: RegionCoord) -> Option<LoadedRegion> {
        self.with_live_registry(world, |registry| registry.find(world, region).cloned())
    }

    pub fn list_for(&self, world: &WorldId, loader: LoaderPos) -> Vec<LoadedRegion> {
        self.with_live_registry(world, |registry| registry.list_for(world, loader))
    }

    /// Keep `region` resident for `loader`; see [`RegionRegistry::register`]
    pub fn register(
        &self,
        world: &WorldId,
        region: RegionCoord,
        loader: LoaderPos,
        requested_by: &str,
    ) -> KeepaliveResult<()> {
        self.with_live_registry(world, |registry| -> KeepaliveResult<()> {
            registry.register(world, region, loader, requested_by)?;
            self.after_mutation(world, registry);
            Ok(())
        })
    }

    /// Drop `loader`'s hold on `region`; see [`RegionRegistry::unregister`]
    pub fn unregister(&self, world: &WorldId, region: RegionCoord, loader: LoaderPos) -> KeepaliveResult<()> {
        self.with_live_registry(world, |registry| -> KeepaliveResult<()> {
            registry.unregister(world, region, loader)?;
            self.after_mutation(world, registry);
            Ok(())
        })
    }

    /// Drop everything a removed loader held
    pub fn unregister_all(&self, world: &WorldId, loader: LoaderPos) -> usize {
        self.with_live_registry(world, |registry| {
            let removed = registry.unregister_all(world, loader);
            if removed > 0 {
                self.after_mutation(world, registry);
            }
            removed
        })
    }

    fn after_mutation(&self, world: &WorldId, registry: &mut RegionRegistry) {
        if self.config.flush_policy == FlushPolicy::Immediate {
            // Failure is logged and counted; the mutation itself stands
            let _ = self.flush_registry(world, registry);
        }
    }

    /// Write the world's registry if it is dirty. Returns whether anything
    /// was written; a world that is not in memory has nothing to write.
    pub fn flush(&self, world: &WorldId) -> KeepaliveResult<bool> {
        let handle = match self.worlds.read().get(world) {
            Some(handle) => Arc::clone(handle),
            None => return Ok(false),
        };
        let mut registry = handle.lock();
        Ok(self.flush_registry(world, &mut registry)?)
    }

    /// Flush every dirty world. All worlds are attempted; the first failure
    /// is returned after the rest have been tried.
    pub fn flush_all(&self) -> KeepaliveResult<usize> {
        let handles: Vec<(WorldId, RegistryHandle)> = self
            .worlds
            .read()
            .iter()
            .map(|(world, handle)| (world.clone(), Arc::clone(handle)))
            .collect();

        let mut written = 0;
        let mut first_error = None;
        for (world, handle) in handles {
            let mut registry = handle.lock();
            match self.flush_registry(&world, &mut registry) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(KeepaliveError::from(e)),
            None => Ok(written),
        }
    }

    fn flush_registry(&self, world: &WorldId, registry: &mut RegionRegistry) -> PersistenceResult<bool> {
        if !registry.is_dirty() {
            return Ok(false);
        }

        let result = self
            .serializer
            .serialize(registry.records())
            .and_then(|data| self.store.save(world, &self.config.storage_key, &data));

        match result {
            Ok(()) => {
                registry.mark_clean();
                self.stats.lock().flushes += 1;
                log::info!(
                    "[KeepaliveManager::flush] wrote {} records for {}",
                    registry.len(),
                    world
                );
                Ok(true)
            }
            Err(e) => {
                self.stats.lock().flush_failures += 1;
                log::error!(
                    "[KeepaliveManager::flush] failed to write registry for {}, keeping it dirty: {}",
                    world,
                    e
                );
                Err(e)
            }
        }
    }

    /// Flush and discard a world's registry. If the flush fails the world
    /// stays in memory so nothing acknowledged is lost.
    pub fn unload_world(&self, world: &WorldId) -> KeepaliveResult<bool> {
        let Some(handle) = self.worlds.read().get(world).cloned() else {
            return Ok(false);
        };

        {
            let mut registry = handle.lock();
            if registry.is_retired() {
                // A concurrent unload got here first
                return Ok(false);
            }
            self.flush_registry(world, &mut registry)?;
            registry.retire();
            if self.config.restore_residency_on_load {
                registry.release_residency();
            }
        }

        let mut worlds = self.worlds.write();
        if worlds
            .get(world)
            .is_some_and(|current| Arc::ptr_eq(current, &handle))
        {
            worlds.remove(world);
        }
        log::info!("[KeepaliveManager::unload_world] unloaded {}", world);
        Ok(true)
    }

    /// Push what one loader holds to an observer
    pub fn sync_loader_to_observer(&self, world: &WorldId, observer: ObserverId, loader: LoaderPos) -> bool {
        self.with_live_registry(world, |registry| {
            self.broadcaster
                .sync_loader_to_observer(registry, world, observer, loader)
        })
    }

    /// Push the world's whole registry to an observer
    pub fn sync_all_to_observer(&self, world: &WorldId, observer: ObserverId) -> bool {
        self.with_live_registry(world, |registry| self.broadcaster.sync_all_to_observer(registry, observer))
    }

    pub fn clear_observer(&self, observer: ObserverId) -> bool {
        self.broadcaster.clear_observer(observer)
    }
}
