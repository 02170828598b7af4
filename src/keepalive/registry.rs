//! In-memory index of loaded regions and the reference counting around it
//!
//! Records are kept in registration order. Three indexes sit beside the list,
//! all per world:
//!
//! - `slots`: `(region, loader)` to position in the record list
//! - `holders`: region to the loaders holding it, oldest first
//! - `loaders`: loader to the regions it holds, oldest first
//!
//! Residency tickets follow the holder lists. A region is released exactly when
//! its holder list becomes empty, no matter how many loaders held it.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::config::AcquirePolicy;
use crate::error::{KeepaliveError, KeepaliveResult, PreconditionViolation};
use crate::keepalive::LoadedRegion;
use crate::world::{LoaderPos, RegionCoord, ResidencyManager, TicketLevel, WorldId};

#[derive(Debug, Default, Clone)]
struct WorldIndex {
    slots: FxHashMap<(RegionCoord, LoaderPos), usize>,
    holders: FxHashMap<RegionCoord, Vec<LoaderPos>>,
    loaders: FxHashMap<LoaderPos, Vec<RegionCoord>>,
}

impl WorldIndex {
    fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Ordered records plus their indexes. Knows nothing about residency.
#[derive(Debug, Default, Clone)]
struct RecordSet {
    records: Vec<LoadedRegion>,
    worlds: FxHashMap<WorldId, WorldIndex>,
}

impl RecordSet {
    fn slot(&self, world: &WorldId, region: RegionCoord, loader: LoaderPos) -> Option<usize> {
        self.worlds.get(world)?.slots.get(&(region, loader)).copied()
    }

    fn holders(&self, world: &WorldId, region: RegionCoord) -> &[LoaderPos] {
        self.worlds
            .get(world)
            .and_then(|index| index.holders.get(&region))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn held_by(&self, world: &WorldId, loader: LoaderPos) -> &[RegionCoord] {
        self.worlds
            .get(world)
            .and_then(|index| index.loaders.get(&loader))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append a record. The caller has checked the key is free.
    fn insert(&mut self, record: LoadedRegion) {
        let slot = self.records.len();
        let (region, loader) = (record.region(), record.loader());
        let index = self.worlds.entry(record.world().clone()).or_default();

        index.slots.insert((region, loader), slot);
        index.holders.entry(region).or_default().push(loader);
        index.loaders.entry(loader).or_default().push(region);
        self.records.push(record);
    }

    fn remove(&mut self, slot: usize) -> LoadedRegion {
        let record = self.records.remove(slot);
        let (region, loader) = (record.region(), record.loader());

        if let Some(index) = self.worlds.get_mut(record.world()) {
            index.slots.remove(&(region, loader));

            if let Some(holders) = index.holders.get_mut(&region) {
                holders.retain(|held| *held != loader);
                if holders.is_empty() {
                    index.holders.remove(&region);
                }
            }
            if let Some(regions) = index.loaders.get_mut(&loader) {
                regions.retain(|held| *held != region);
                if regions.is_empty() {
                    index.loaders.remove(&loader);
                }
            }
            if index.is_empty() {
                self.worlds.remove(record.world());
            }
        }

        // Everything after the removed record moved down by one
        for (offset, moved) in self.records[slot..].iter().enumerate() {
            if let Some(index) = self.worlds.get_mut(moved.world()) {
                index.slots.insert((moved.region(), moved.loader()), slot + offset);
            }
        }

        record
    }
}

/// Registry of regions kept resident by loader devices
pub struct RegionRegistry {
    set: RecordSet,
    residency: Arc<dyn ResidencyManager>,
    level: TicketLevel,
    policy: AcquirePolicy,
    dirty: bool,
    retired: bool,
}

impl std::fmt::Debug for RegionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionRegistry")
            .field("records", &self.set.records.len())
            .field("level", &self.level)
            .field("policy", &self.policy)
            .field("dirty", &self.dirty)
            .field("retired", &self.retired)
            .finish()
    }
}

impl RegionRegistry {
    pub fn new(residency: Arc<dyn ResidencyManager>, level: TicketLevel, policy: AcquirePolicy) -> Self {
        Self {
            set: RecordSet::default(),
            residency,
            level,
            policy,
            dirty: false,
            retired: false,
        }
    }

    /// Whether any loader holds the region
    pub fn is_loaded(&self, world: &WorldId, region: RegionCoord) -> bool {
        !self.set.holders(world, region).is_empty()
    }

    /// Whether this particular loader holds the region
    pub fn is_loaded_by(&self, world: &WorldId, region: RegionCoord, loader: LoaderPos) -> bool {
        self.set.slot(world, region, loader).is_some()
    }

    /// Exact lookup of one loader's record for a region
    pub fn find_by(&self, world: &WorldId, region: RegionCoord, loader: LoaderPos) -> Option<&LoadedRegion> {
        self.set
            .slot(world, region, loader)
            .map(|slot| &self.set.records[slot])
    }

    /// Oldest record holding the region, whichever loader it belongs to
    pub fn find(&self, world: &WorldId, region: RegionCoord) -> Option<&LoadedRegion> {
        let loader = *self.set.holders(world, region).first()?;
        self.find_by(world, region, loader)
    }

    /// Every record owned by one loader, in registration order
    pub fn list_for(&self, world: &WorldId, loader: LoaderPos) -> Vec<LoadedRegion> {
        self.set
            .held_by(world, loader)
            .iter()
            .filter_map(|region| self.find_by(world, *region, loader))
            .cloned()
            .collect()
    }

    /// Number of loaders holding the region
    pub fn holder_count(&self, world: &WorldId, region: RegionCoord) -> usize {
        self.set.holders(world, region).len()
    }

    /// Distinct loaders with at least one record in the world
    pub fn loaders(&self, world: &WorldId) -> Vec<LoaderPos> {
        let mut loaders: Vec<LoaderPos> = self
            .set
            .worlds
            .get(world)
            .map(|index| index.loaders.keys().copied().collect())
            .unwrap_or_default();
        loaders.sort();
        loaders
    }

    /// Regions held in the world by anyone
    pub fn regions(&self, world: &WorldId) -> Vec<RegionCoord> {
        let mut regions: Vec<RegionCoord> = self
            .set
            .worlds
            .get(world)
            .map(|index| index.holders.keys().copied().collect())
            .unwrap_or_default();
        regions.sort();
        regions
    }

    /// All records in registration order
    pub fn records(&self) -> &[LoadedRegion] {
        &self.set.records
    }

    pub fn len(&self) -> usize {
        self.set.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.records.is_empty()
    }

    pub fn ticket_level(&self) -> TicketLevel {
        self.level
    }

    pub fn acquire_policy(&self) -> AcquirePolicy {
        self.policy
    }

    /// Whether the registry changed since it was last loaded or flushed
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Whether the owning world was unloaded. A retired registry rejects
    /// every mutation; its records only remain for inspection.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn retire(&mut self) {
        self.retired = true;
    }

    fn ensure_live(&self, world: &WorldId) -> KeepaliveResult<()> {
        if self.retired {
            log::warn!("[RegionRegistry] mutation of {} through a stale handle", world);
            return Err(KeepaliveError::WorldUnloaded { world: world.clone() });
        }
        Ok(())
    }

    /// Keep `region` resident on behalf of `loader`.
    ///
    /// Fails without touching any state if the loader already holds the
    /// region, if `requested_by` is blank, or if the loader position cannot
    /// be stored.
    pub fn register(
        &mut self,
        world: &WorldId,
        region: RegionCoord,
        loader: LoaderPos,
        requested_by: &str,
    ) -> KeepaliveResult<()> {
        self.ensure_live(world)?;
        if !loader.is_packable() {
            return Err(PreconditionViolation::LoaderOutOfRange { loader }.into());
        }
        if self.is_loaded_by(world, region, loader) {
            log::warn!(
                "[RegionRegistry::register] {} in {} already held by loader {}",
                region,
                world,
                loader
            );
            return Err(PreconditionViolation::AlreadyRegistered {
                world: world.clone(),
                region,
                loader,
            }
            .into());
        }
        let record = LoadedRegion::new(region, world.clone(), requested_by, loader)?;

        let first_holder = !self.is_loaded(world, region);
        self.set.insert(record);

        if first_holder || self.policy == AcquirePolicy::PerRegistration {
            self.residency.acquire(region, self.level);
            log::debug!("[RegionRegistry] acquired {} in {}", region, world);
        }
        self.dirty = true;

        log::debug!(
            "[RegionRegistry::register] {} in {} for loader {} ({})",
            region,
            world,
            loader,
            requested_by
        );
        Ok(())
    }

    /// Drop `loader`'s hold on `region`, releasing it if nobody else holds it
    pub fn unregister(&mut self, world: &WorldId, region: RegionCoord, loader: LoaderPos) -> KeepaliveResult<()> {
        self.ensure_live(world)?;
        let Some(slot) = self.set.slot(world, region, loader) else {
            log::warn!(
                "[RegionRegistry::unregister] {} in {} is not held by loader {}",
                region,
                world,
                loader
            );
            return Err(PreconditionViolation::NotRegistered {
                world: world.clone(),
                region,
                loader,
            }
            .into());
        };

        self.set.remove(slot);

        if !self.is_loaded(world, region) {
            self.residency.release(region, self.level);
            log::debug!("[RegionRegistry] released {} in {}", region, world);
        }
        self.dirty = true;

        log::debug!(
            "[RegionRegistry::unregister] {} in {} for loader {}",
            region,
            world,
            loader
        );
        Ok(())
    }

    /// Drop every hold of a loader that is being removed from the world.
    /// Returns how many records were removed.
    pub fn unregister_all(&mut self, world: &WorldId, loader: LoaderPos) -> usize {
        if self.ensure_live(world).is_err() {
            return 0;
        }
        let regions = self.set.held_by(world, loader).to_vec();
        let mut removed = 0;

        for region in regions {
            match self.unregister(world, region, loader) {
                Ok(()) => removed += 1,
                Err(e) => log::error!("[RegionRegistry::unregister_all] index out of sync: {}", e),
            }
        }

        removed
    }

    /// Swap the whole record set for `records`, as read from storage.
    ///
    /// Residency is not touched; see [`RegionRegistry::restore_residency`].
    /// Duplicate records are rejected and leave the registry unchanged.
    pub fn replace_records(&mut self, records: Vec<LoadedRegion>) -> Result<(), PreconditionViolation> {
        let mut set = RecordSet::default();
        for record in records {
            if set.slot(record.world(), record.region(), record.loader()).is_some() {
                return Err(PreconditionViolation::AlreadyRegistered {
                    world: record.world().clone(),
                    region: record.region(),
                    loader: record.loader(),
                });
            }
            if !record.loader().is_packable() {
                return Err(PreconditionViolation::LoaderOutOfRange { loader: record.loader() });
            }
            set.insert(record);
        }

        self.set = set;
        self.dirty = false;
        Ok(())
    }

    /// Take the tickets the current records call for, as if each had just
    /// been registered in order. Returns the number of acquire calls made.
    pub fn restore_residency(&self) -> usize {
        let mut acquired = 0;
        for record in &self.set.records {
            let first_holder = self.set.holders(record.world(), record.region()).first() == Some(&record.loader());
            if first_holder || self.policy == AcquirePolicy::PerRegistration {
                self.residency.acquire(record.region(), self.level);
                acquired += 1;
            }
        }
        acquired
    }

    /// Release every ticket this registry is responsible for, without
    /// touching the records. Used when a world unloads.
    pub fn release_residency(&self) -> usize {
        let mut released = 0;
        for (world, index) in &self.set.worlds {
            for region in index.holders.keys() {
                self.residency.release(*region, self.level);
                log::trace!("[RegionRegistry] released {} in {} on unload", region, world);
                released += 1;
            }
        }
        released
    }
}
