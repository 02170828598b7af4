//! Identity value types shared by every part of the registry

mod position;

pub use position::{LoaderPos, RegionCoord, WorldId, DEFAULT_WORLD_NAMESPACE, REGION_SIZE};
