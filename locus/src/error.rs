//! Error types for the registry, the sender and configuration.

use thiserror::Error;

use crate::codec::CodecError;
use crate::transport::{ErrorCode, TransportError};
use crate::types::{Address, LocationKey, LocationType};

/// Errors related to registry operations, local or remote.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The zero key was used where a real key is required.
    #[error("invalid location key: {key}")]
    InvalidKey {
        /// The offending key.
        key: LocationKey,
    },

    /// A lock was requested on a key that is already locked.
    #[error("key {key} is already locked by {holder}")]
    AlreadyLocked {
        /// The contended key.
        key: LocationKey,
        /// Current lock holder.
        holder: Address,
    },

    /// Request or response body could not be (de)serialized.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The registry process could not be reached.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The registry process answered with a failure code.
    #[error("registry {location_type} replied {code}: {message}")]
    Remote {
        /// Location type the request targeted.
        location_type: LocationType,
        /// Code carried by the response.
        code: ErrorCode,
        /// Detail carried by the response.
        message: String,
    },
}

impl RegistryError {
    /// Response code a registry service reports for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            RegistryError::InvalidKey { .. } | RegistryError::AlreadyLocked { .. } => {
                ErrorCode::Rejected
            }
            RegistryError::Codec(_) => ErrorCode::Protocol,
            RegistryError::Transport(TransportError::Timeout) => ErrorCode::Timeout,
            RegistryError::Transport(_) => ErrorCode::Protocol,
            RegistryError::Remote { code, .. } => *code,
        }
    }
}

/// Errors raised by [`LocationSender::call`](crate::LocationSender::call).
///
/// An exhausted `TargetNotFound` budget is *not* an error: it comes back
/// as a failure-carrying response so queued callers can tell "target gone"
/// from a fault.
#[derive(Debug, Error)]
pub enum SenderError {
    /// The sender entry was evicted or recreated while the call was
    /// suspended. The continuation was abandoned.
    #[error("sender entry for key {key} went stale")]
    Stale {
        /// Key whose entry changed underneath the call.
        key: LocationKey,
    },

    /// The target timed out handling the request.
    #[error("request to key {key} timed out")]
    Timeout {
        /// Target key.
        key: LocationKey,
    },

    /// The response was malformed or unexpected.
    #[error("protocol error for key {key}: {reason}")]
    Protocol {
        /// Target key.
        key: LocationKey,
        /// What was wrong.
        reason: String,
    },

    /// The transport failed to deliver the request.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// Resolving the key's address failed.
    #[error("resolve error: {0}")]
    Resolve(#[from] RegistryError),
}

/// Errors from building a [`SenderConfig`](crate::SenderConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The retry budget must allow at least one attempt.
    #[error("retry budget must be at least 1")]
    ZeroRetryBudget,

    /// The reaper would never run.
    #[error("reap interval must be non-zero")]
    ZeroReapInterval,

    /// Entries would be evicted while still in use.
    #[error("idle timeout must be non-zero")]
    ZeroIdleTimeout,
}
