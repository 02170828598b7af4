//! Crate-wide error types
//!
//! Precondition violations are programming errors in the caller (double
//! registration, unregistering something never registered). They are returned
//! rather than panicking so the caller can decide, but they are never silently
//! ignored: a swallowed violation is a leaked or dropped residency ticket.

use crate::config::ConfigError;
use crate::network::NetworkError;
use crate::persistence::PersistenceError;
use crate::world::{LoaderPos, RegionCoord, WorldId};

/// Result type for keep-alive operations
pub type KeepaliveResult<T> = Result<T, KeepaliveError>;

/// Caller broke a registry precondition; no state was changed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionViolation {
    #[error("region {region} in {world} is already held by loader {loader}")]
    AlreadyRegistered {
        world: WorldId,
        region: RegionCoord,
        loader: LoaderPos,
    },

    #[error("region {region} in {world} is not held by loader {loader}")]
    NotRegistered {
        world: WorldId,
        region: RegionCoord,
        loader: LoaderPos,
    },

    #[error("requesting player name cannot be blank")]
    BlankActor,

    #[error("loader position {loader} is outside the storable range")]
    LoaderOutOfRange { loader: LoaderPos },
}

/// Errors surfaced by the keep-alive registry and its manager
#[derive(Debug, thiserror::Error)]
pub enum KeepaliveError {
    #[error("Precondition violated: {0}")]
    Precondition(#[from] PreconditionViolation),

    #[error("World {world} was unloaded; this registry handle is stale")]
    WorldUnloaded { world: WorldId },

    #[error("Invalid world id {value:?}: {reason}")]
    InvalidWorldId { value: String, reason: String },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Transport failure: {0}")]
    Transport(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl KeepaliveError {
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, KeepaliveError::Precondition(_))
    }

    /// The violated precondition, if that is what this error is
    pub fn precondition(&self) -> Option<&PreconditionViolation> {
        match self {
            KeepaliveError::Precondition(violation) => Some(violation),
            _ => None,
        }
    }
}
