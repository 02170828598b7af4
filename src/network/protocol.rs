use crate::network::{NetworkError, NetworkResult};

/// Network limits
pub const MAX_PACKET_SIZE: usize = 1 << 20; // 1MiB max packet size

/// Protocol handler
pub struct Protocol;

impl Protocol {
    /// Validate an encoded packet before it goes on the wire
    pub fn validate_packet_size(size: usize) -> NetworkResult<()> {
        if size > MAX_PACKET_SIZE {
            return Err(NetworkError::PacketTooLarge {
                size,
                max: MAX_PACKET_SIZE,
            });
        }
        Ok(())
    }
}
