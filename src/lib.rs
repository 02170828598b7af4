//! Region keep-alive registry
//!
//! Tracks which regions of which worlds are held resident by placed loader
//! devices, translates holder changes into residency tickets, persists the
//! records per world and pushes snapshots of them to observers.

pub mod config;
pub mod error;
pub mod keepalive;
pub mod network;
pub mod persistence;
pub mod world;

pub use config::{AcquirePolicy, ConfigError, FlushPolicy, KeepaliveConfig};
pub use error::{KeepaliveError, KeepaliveResult, PreconditionViolation};
pub use keepalive::{KeepaliveManager, KeepaliveStats, LoadedRegion, RegionRegistry, RegistryHandle};
pub use network::{ChannelTransport, ObserverId, RegionView, ServerPacket, SyncBroadcaster, Transport};
pub use persistence::{DurableStore, FileStore, MemoryStore, PersistenceError, RegionSerializer};
pub use world::{
    LedgerProvider, LoaderPos, RegionCoord, ResidencyManager, ResidencyProvider, TicketLedger,
    TicketLevel, WorldId,
};
