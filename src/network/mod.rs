//! Client synchronization of loaded regions
//!
//! Server side builds `SyncLoadedRegions` snapshots and hands them to a
//! [`Transport`]; the observer side keeps the last one in a [`RegionView`].

pub mod client;
pub mod error;
pub mod packet;
pub mod protocol;
pub mod sync;
pub mod transport;

pub use client::RegionView;
pub use error::{encoding_error, NetworkError, NetworkResult};
pub use packet::{LoadedRegionData, ServerPacket};
pub use protocol::{Protocol, MAX_PACKET_SIZE};
pub use sync::{SyncBroadcaster, SyncStats};
pub use transport::{ChannelTransport, ObserverId, Transport};
