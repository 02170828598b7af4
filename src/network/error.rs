//! Network-specific error handling
//!
//! A failed send never reaches registry state: the broadcaster logs it and
//! moves on. These errors exist so the transport can say what went wrong.

use crate::network::ObserverId;

/// Type alias for network-specific results
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors raised while delivering packets to observers
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Observer {observer} is not connected")]
    UnknownObserver { observer: ObserverId },

    #[error("Observer {observer} disconnected")]
    Disconnected { observer: ObserverId },

    #[error("Packet of {size} bytes exceeds the {max} byte limit")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Packet encoding failed: {message}")]
    Encoding { message: String },
}

/// Create an encoding error
pub fn encoding_error(error: impl std::fmt::Display) -> NetworkError {
    NetworkError::Encoding {
        message: error.to_string(),
    }
}
