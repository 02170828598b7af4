//! Pushes loaded-region snapshots to observers
//!
//! Every push replaces whatever the observer showed before. There are no
//! deltas, acknowledgements or retransmits: if a push is lost the next one
//! fixes it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::keepalive::{LoadedRegion, RegionRegistry};
use crate::network::{NetworkError, ObserverId, ServerPacket, Transport};
use crate::world::{LoaderPos, WorldId};

/// Counters for snapshot delivery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub snapshots_sent: u64,
    pub records_sent: u64,
    pub snapshots_dropped: u64,
    /// Snapshots that could not be encoded at all
    pub encoding_failures: u64,
}

/// Sends full-replacement snapshots over a [`Transport`]
pub struct SyncBroadcaster {
    transport: Arc<dyn Transport>,
    stats: Mutex<SyncStats>,
}

impl SyncBroadcaster {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            stats: Mutex::new(SyncStats::default()),
        }
    }

    /// Show the observer only what one loader holds
    pub fn sync_loader_to_observer(
        &self,
        registry: &RegionRegistry,
        world: &WorldId,
        observer: ObserverId,
        loader: LoaderPos,
    ) -> bool {
        self.sync_to_observer(observer, &registry.list_for(world, loader))
    }

    /// Show the observer every record in the registry
    pub fn sync_all_to_observer(&self, registry: &RegionRegistry, observer: ObserverId) -> bool {
        self.sync_to_observer(observer, registry.records())
    }

    /// Make the observer show nothing
    pub fn clear_observer(&self, observer: ObserverId) -> bool {
        self.sync_to_observer(observer, &[])
    }

    /// Push `records` as the observer's complete view. Returns whether the
    /// transport accepted it; failures are logged and dropped. A snapshot too
    /// large to encode is a server-side fault and is logged as an error.
    pub fn sync_to_observer(&self, observer: ObserverId, records: &[LoadedRegion]) -> bool {
        let packet = ServerPacket::sync_loaded_regions(records);

        match self.transport.send(observer, &packet) {
            Ok(()) => {
                let mut stats = self.stats.lock();
                stats.snapshots_sent += 1;
                stats.records_sent += records.len() as u64;
                log::debug!(
                    "[SyncBroadcaster] sent {} records to observer {}",
                    records.len(),
                    observer
                );
                true
            }
            Err(e @ (NetworkError::PacketTooLarge { .. } | NetworkError::Encoding { .. })) => {
                self.stats.lock().encoding_failures += 1;
                log::error!(
                    "[SyncBroadcaster] could not encode {} records for observer {}: {}",
                    records.len(),
                    observer,
                    e
                );
                false
            }
            Err(e) => {
                self.stats.lock().snapshots_dropped += 1;
                log::debug!("[SyncBroadcaster] dropped snapshot for observer {}: {}", observer, e);
                false
            }
        }
    }

    pub fn stats(&self) -> SyncStats {
        *self.stats.lock()
    }
}
