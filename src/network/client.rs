//! Observer-side copy of the loaded-region display

use crate::network::{LoadedRegionData, NetworkResult, ServerPacket};
use crate::world::{LoaderPos, RegionCoord};

/// The last snapshot an observer received
#[derive(Debug, Default, Clone)]
pub struct RegionView {
    records: Vec<LoadedRegionData>,
    snapshots_applied: u64,
}

impl RegionView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a snapshot, discarding the previous one
    pub fn apply(&mut self, packet: &ServerPacket) {
        match packet {
            ServerPacket::SyncLoadedRegions { records } => {
                self.records = records.clone();
                self.snapshots_applied += 1;
            }
        }
    }

    /// Decode and install a snapshot received as bytes
    pub fn apply_bytes(&mut self, bytes: &[u8]) -> NetworkResult<()> {
        let packet = ServerPacket::from_bytes(bytes)?;
        self.apply(&packet);
        Ok(())
    }

    pub fn records(&self) -> &[LoadedRegionData] {
        &self.records
    }

    pub fn is_loaded(&self, world: &str, region: RegionCoord) -> bool {
        let packed = region.to_long();
        self.records
            .iter()
            .any(|record| record.world == world && record.region == packed)
    }

    /// Regions shown for one loader
    pub fn regions_of(&self, world: &str, loader: LoaderPos) -> Vec<RegionCoord> {
        let packed = loader.to_long();
        self.records
            .iter()
            .filter(|record| record.world == world && record.loader == packed)
            .map(LoadedRegionData::region_coord)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshots_applied(&self) -> u64 {
        self.snapshots_applied
    }
}
