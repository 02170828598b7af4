use serde::{Deserialize, Serialize};

use crate::keepalive::LoadedRegion;
use crate::persistence::{
    corrupted_data, version_mismatch, CompoundTag, PersistenceError, PersistenceResult, Tag,
};
use crate::world::{LoaderPos, RegionCoord, WorldId};

/// Version of the registry blob format
pub const FORMAT_VERSION: u32 = 1;

/// Magic bytes to identify registry blobs
const BLOB_MAGIC: [u8; 4] = *b"RKAL";

/// Tag names
const LOADED_REGIONS: &str = "loaded_regions";
const REGION: &str = "region";
const WORLD: &str = "world";
const REQUESTED_BY: &str = "requested_by";
const LOADER: &str = "loader";

/// Header for serialized registries
#[derive(Debug, Serialize, Deserialize)]
struct BlobHeader {
    magic: [u8; 4],
    version: u32,
    record_count: u32,
    checksum: u32,
}

/// Converts registry contents to and from the durable format
#[derive(Debug, Default, Clone, Copy)]
pub struct RegionSerializer;

impl RegionSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Tagged form of a single record
    pub fn record_to_tag(&self, record: &LoadedRegion) -> CompoundTag {
        let mut tag = CompoundTag::new();
        tag.put_long(REGION, record.region().to_long());
        tag.put_string(WORLD, record.world().as_str());
        tag.put_string(REQUESTED_BY, record.requested_by());
        tag.put_long(LOADER, record.loader().to_long());
        tag
    }

    /// Read a single record, validating every field
    pub fn record_from_tag(&self, tag: &CompoundTag) -> PersistenceResult<LoadedRegion> {
        let region = RegionCoord::from_long(tag.get_long(REGION)?);
        let world_text = tag.get_string(WORLD)?;
        let world = WorldId::parse(world_text)
            .map_err(|e| corrupted_data(format!("bad world id {:?}: {}", world_text, e)))?;
        let requested_by = tag.get_string(REQUESTED_BY)?;
        let loader = LoaderPos::from_long(tag.get_long(LOADER)?);

        LoadedRegion::new(region, world, requested_by, loader)
            .map_err(|e| corrupted_data(format!("bad record for {}: {}", region, e)))
    }

    /// All records in order, under one top-level compound
    pub fn to_tag(&self, records: &[LoadedRegion]) -> CompoundTag {
        let list = records
            .iter()
            .map(|record| Tag::Compound(self.record_to_tag(record)))
            .collect();

        let mut root = CompoundTag::new();
        root.put_list(LOADED_REGIONS, list);
        root
    }

    pub fn from_tag(&self, root: &CompoundTag) -> PersistenceResult<Vec<LoadedRegion>> {
        root.get_list(LOADED_REGIONS)?
            .iter()
            .enumerate()
            .map(|(i, entry)| match entry {
                Tag::Compound(tag) => self.record_from_tag(tag),
                _ => Err(corrupted_data(format!("entry {} of {} is not a compound", i, LOADED_REGIONS))),
            })
            .collect()
    }

    /// Serialize records to bytes
    pub fn serialize(&self, records: &[LoadedRegion]) -> PersistenceResult<Vec<u8>> {
        let payload = bincode::serialize(&self.to_tag(records))?;
        let record_count = u32::try_from(records.len())
            .map_err(|_| corrupted_data(format!("too many records: {}", records.len())))?;

        let header = BlobHeader {
            magic: BLOB_MAGIC,
            version: FORMAT_VERSION,
            record_count,
            checksum: self.calculate_checksum(&payload),
        };

        let mut buffer = bincode::serialize(&header)?;
        buffer.extend_from_slice(&payload);
        Ok(buffer)
    }

    /// Deserialize records from bytes
    pub fn deserialize(&self, data: &[u8]) -> PersistenceResult<Vec<LoadedRegion>> {
        let header_size = self.header_size()?;
        if data.len() < header_size {
            return Err(corrupted_data("Data too small for header"));
        }

        let header: BlobHeader = bincode::deserialize(&data[..header_size]).map_err(decode_error)?;
        if header.magic != BLOB_MAGIC {
            return Err(corrupted_data("Invalid registry magic"));
        }
        if header.version != FORMAT_VERSION {
            return Err(version_mismatch(FORMAT_VERSION, header.version));
        }

        let payload = &data[header_size..];
        if self.calculate_checksum(payload) != header.checksum {
            return Err(corrupted_data("Checksum mismatch"));
        }

        let root: CompoundTag = bincode::deserialize(payload).map_err(decode_error)?;
        let records = self.from_tag(&root)?;

        if records.len() != header.record_count as usize {
            return Err(corrupted_data(format!(
                "Header announces {} records, payload holds {}",
                header.record_count,
                records.len()
            )));
        }
        Ok(records)
    }

    fn header_size(&self) -> PersistenceResult<usize> {
        Ok(bincode::serialized_size(&BlobHeader {
            magic: [0; 4],
            version: 0,
            record_count: 0,
            checksum: 0,
        })? as usize)
    }

    /// Calculate CRC32 checksum
    fn calculate_checksum(&self, data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }
}

fn decode_error(err: bincode::Error) -> PersistenceError {
    PersistenceError::DeserializationError(err.to_string())
}
