use serde::{Deserialize, Serialize};

use crate::error::KeepaliveError;
use crate::keepalive::LoadedRegion;
use crate::network::{encoding_error, NetworkResult, Protocol};
use crate::world::{LoaderPos, RegionCoord, WorldId};

/// Packets sent from server to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerPacket {
    /// Full replacement of the observer's loaded-region display.
    /// An empty list clears it.
    SyncLoadedRegions { records: Vec<LoadedRegionData> },
}

/// Wire form of one loaded region
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadedRegionData {
    pub region: i64,
    pub world: String,
    pub requested_by: String,
    pub loader: i64,
}

impl LoadedRegionData {
    pub fn region_coord(&self) -> RegionCoord {
        RegionCoord::from_long(self.region)
    }

    pub fn loader_pos(&self) -> LoaderPos {
        LoaderPos::from_long(self.loader)
    }

    pub fn world_id(&self) -> Result<WorldId, KeepaliveError> {
        WorldId::parse(&self.world)
    }
}

impl From<&LoadedRegion> for LoadedRegionData {
    fn from(record: &LoadedRegion) -> Self {
        Self {
            region: record.region().to_long(),
            world: record.world().to_string(),
            requested_by: record.requested_by().to_string(),
            loader: record.loader().to_long(),
        }
    }
}

impl ServerPacket {
    /// Snapshot packet carrying exactly `records`
    pub fn sync_loaded_regions(records: &[LoadedRegion]) -> Self {
        ServerPacket::SyncLoadedRegions {
            records: records.iter().map(LoadedRegionData::from).collect(),
        }
    }

    /// Snapshot packet telling the observer to show nothing
    pub fn clear() -> Self {
        ServerPacket::SyncLoadedRegions { records: Vec::new() }
    }

    /// Serialize packet to bytes, enforcing the size limit
    pub fn to_bytes(&self) -> NetworkResult<Vec<u8>> {
        let bytes = bincode::serialize(self).map_err(encoding_error)?;
        Protocol::validate_packet_size(bytes.len())?;
        Ok(bytes)
    }

    /// Deserialize packet from bytes
    pub fn from_bytes(bytes: &[u8]) -> NetworkResult<Self> {
        Protocol::validate_packet_size(bytes.len())?;
        bincode::deserialize(bytes).map_err(encoding_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkError;

    #[test]
    fn test_wire_fields() {
        let record = LoadedRegion::new(
            RegionCoord::new(-2, 5),
            WorldId::parse("world:the_end").expect("valid id"),
            "alice",
            LoaderPos::new(-20, 70, 90),
        )
        .expect("valid record");

        let data = LoadedRegionData::from(&record);
        assert_eq!(data.region, RegionCoord::new(-2, 5).to_long());
        assert_eq!(data.world, "world:the_end");
        assert_eq!(data.requested_by, "alice");
        assert_eq!(data.region_coord(), record.region());
        assert_eq!(data.loader_pos(), record.loader());
        assert_eq!(&data.world_id().expect("valid id"), record.world());
    }

    #[test]
    fn test_packet_bytes() {
        let packet = ServerPacket::SyncLoadedRegions {
            records: vec![LoadedRegionData {
                region: 42,
                world: "world:overworld".to_string(),
                requested_by: "bob".to_string(),
                loader: 7,
            }],
        };

        let bytes = packet.to_bytes().expect("encode");
        assert_eq!(ServerPacket::from_bytes(&bytes).expect("decode"), packet);

        let cleared = ServerPacket::from_bytes(&ServerPacket::clear().to_bytes().expect("encode"))
            .expect("decode");
        assert_eq!(cleared, ServerPacket::SyncLoadedRegions { records: Vec::new() });
    }

    #[test]
    fn test_thousands_of_records_fit() {
        let records = (0..1500)
            .map(|i| LoadedRegionData {
                region: i,
                world: "world:overworld".to_string(),
                requested_by: "alice".to_string(),
                loader: i,
            })
            .collect();
        let packet = ServerPacket::SyncLoadedRegions { records };
        let bytes = packet.to_bytes().expect("fits in one packet");
        assert_eq!(ServerPacket::from_bytes(&bytes).expect("decode"), packet);
    }

    #[test]
    fn test_oversized_snapshot_rejected() {
        let records = (0..6000)
            .map(|i| LoadedRegionData {
                region: i,
                world: "world:overworld".to_string(),
                requested_by: "p".repeat(200),
                loader: i,
            })
            .collect();
        let packet = ServerPacket::SyncLoadedRegions { records };
        assert!(matches!(packet.to_bytes(), Err(NetworkError::PacketTooLarge { .. })));
    }
}
