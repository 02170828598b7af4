use std::fmt;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::network::{NetworkError, NetworkResult, ServerPacket};

/// Handle of a remote observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u32);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Delivers packets to observers
pub trait Transport: Send + Sync {
    fn send(&self, observer: ObserverId, packet: &ServerPacket) -> NetworkResult<()>;
}

/// Transport handing encoded packets to per-observer channels
#[derive(Debug, Default)]
pub struct ChannelTransport {
    channels: RwLock<FxHashMap<ObserverId, Sender<Vec<u8>>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect an observer; packets for it arrive on the returned receiver.
    /// Reconnecting replaces the previous channel.
    pub fn connect(&self, observer: ObserverId) -> Receiver<Vec<u8>> {
        let (sender, receiver) = unbounded();
        self.channels.write().insert(observer, sender);
        receiver
    }

    pub fn disconnect(&self, observer: ObserverId) -> bool {
        self.channels.write().remove(&observer).is_some()
    }

    pub fn is_connected(&self, observer: ObserverId) -> bool {
        self.channels.read().contains_key(&observer)
    }

    pub fn observer_count(&self) -> usize {
        self.channels.read().len()
    }
}

impl Transport for ChannelTransport {
    fn send(&self, observer: ObserverId, packet: &ServerPacket) -> NetworkResult<()> {
        let bytes = packet.to_bytes()?;

        let sent = {
            let channels = self.channels.read();
            let sender = channels
                .get(&observer)
                .ok_or(NetworkError::UnknownObserver { observer })?;
            sender.send(bytes).is_ok()
        };

        if !sent {
            // Receiver is gone; forget the observer
            self.channels.write().remove(&observer);
            return Err(NetworkError::Disconnected { observer });
        }
        Ok(())
    }
}
