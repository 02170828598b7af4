//! Boundary to the subsystem that actually streams regions in and out of memory
//!
//! The keep-alive registry never loads anything itself. It only takes and drops
//! tickets on regions through [`ResidencyManager`]; what a ticket means is up to
//! the host. [`TicketLedger`] is a small in-process implementation that counts
//! tickets per region, for hosts without a streaming subsystem.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::world::{RegionCoord, WorldId};

/// Priority level attached to a residency ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketLevel(pub u32);

impl TicketLevel {
    /// Level used by loader devices unless configured otherwise
    pub const KEEPALIVE: TicketLevel = TicketLevel(31);
}

impl Default for TicketLevel {
    fn default() -> Self {
        Self::KEEPALIVE
    }
}

/// Takes and drops residency tickets on regions of one world
pub trait ResidencyManager: Send + Sync {
    fn acquire(&self, region: RegionCoord, level: TicketLevel);
    fn release(&self, region: RegionCoord, level: TicketLevel);
}

/// Resolves the residency manager of a world when its registry is created
pub trait ResidencyProvider: Send + Sync {
    fn residency_for(&self, world: &WorldId) -> Arc<dyn ResidencyManager>;
}

impl<F> ResidencyProvider for F
where
    F: Fn(&WorldId) -> Arc<dyn ResidencyManager> + Send + Sync,
{
    fn residency_for(&self, world: &WorldId) -> Arc<dyn ResidencyManager> {
        self(world)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    tickets: FxHashMap<RegionCoord, u32>,
    acquires: FxHashMap<RegionCoord, u64>,
    releases: FxHashMap<RegionCoord, u64>,
}

/// Reference-counting residency manager that records every call
#[derive(Debug, Default)]
pub struct TicketLedger {
    state: Mutex<LedgerState>,
}

impl TicketLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outstanding tickets on a region
    pub fn ticket_count(&self, region: RegionCoord) -> u32 {
        self.state.lock().tickets.get(&region).copied().unwrap_or(0)
    }

    pub fn is_resident(&self, region: RegionCoord) -> bool {
        self.ticket_count(region) > 0
    }

    /// Number of acquire calls ever seen for a region
    pub fn acquire_count(&self, region: RegionCoord) -> u64 {
        self.state.lock().acquires.get(&region).copied().unwrap_or(0)
    }

    /// Number of release calls ever seen for a region
    pub fn release_count(&self, region: RegionCoord) -> u64 {
        self.state.lock().releases.get(&region).copied().unwrap_or(0)
    }

    pub fn total_acquires(&self) -> u64 {
        self.state.lock().acquires.values().sum()
    }

    pub fn total_releases(&self) -> u64 {
        self.state.lock().releases.values().sum()
    }

    /// Regions holding at least one ticket, sorted
    pub fn resident_regions(&self) -> Vec<RegionCoord> {
        let state = self.state.lock();
        let mut regions: Vec<RegionCoord> = state
            .tickets
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(region, _)| *region)
            .collect();
        regions.sort();
        regions
    }
}

impl ResidencyManager for TicketLedger {
    fn acquire(&self, region: RegionCoord, level: TicketLevel) {
        let mut state = self.state.lock();
        *state.tickets.entry(region).or_insert(0) += 1;
        *state.acquires.entry(region).or_insert(0) += 1;
        log::trace!("[TicketLedger] acquire {} at level {}", region, level.0);
    }

    fn release(&self, region: RegionCoord, level: TicketLevel) {
        let mut state = self.state.lock();
        *state.releases.entry(region).or_insert(0) += 1;
        match state.tickets.get_mut(&region) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    state.tickets.remove(&region);
                }
                log::trace!("[TicketLedger] release {} at level {}", region, level.0);
            }
            _ => log::warn!("[TicketLedger] release of {} without an outstanding ticket", region),
        }
    }
}

/// Hands out one [`TicketLedger`] per world, created on first request
#[derive(Debug, Default)]
pub struct LedgerProvider {
    ledgers: RwLock<FxHashMap<WorldId, Arc<TicketLedger>>>,
}

impl LedgerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger of a world, creating it if needed
    pub fn ledger(&self, world: &WorldId) -> Arc<TicketLedger> {
        if let Some(ledger) = self.ledgers.read().get(world) {
            return Arc::clone(ledger);
        }
        let mut ledgers = self.ledgers.write();
        Arc::clone(ledgers.entry(world.clone()).or_default())
    }
}

impl ResidencyProvider for LedgerProvider {
    fn residency_for(&self, world: &WorldId) -> Arc<dyn ResidencyManager> {
        self.ledger(world)
    }
}
