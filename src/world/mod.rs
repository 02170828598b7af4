//! World-side types: region and loader identities, and the residency boundary
//!
//! - **Core**: `RegionCoord`, `LoaderPos`, `WorldId` with their packed encodings
//! - **Residency**: the acquire/release interface into the region streaming subsystem

pub mod core;
pub mod residency;

pub use core::{LoaderPos, RegionCoord, WorldId, DEFAULT_WORLD_NAMESPACE, REGION_SIZE};
pub use residency::{
    LedgerProvider, ResidencyManager, ResidencyProvider, TicketLedger, TicketLevel,
};
