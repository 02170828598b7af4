//! Registry of regions kept resident by loader devices

mod manager;
mod record;
mod registry;

pub use manager::{KeepaliveManager, KeepaliveStats, RegistryHandle};
pub use record::LoadedRegion;
pub use registry::RegionRegistry;
