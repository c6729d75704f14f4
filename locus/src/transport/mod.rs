//! Transport contract consumed by the sender and the registry client.
//!
//! The transport is an external collaborator: it serializes and delivers a
//! [`Request`] to an [`Address`] and hands back the matching [`Response`].
//! This module only defines the contract, the error-code vocabulary carried
//! by responses, and the correlation id allocator.
//!
//! # Error layers
//!
//! ```text
//! transport.call(..)
//!   Err(TransportError)        delivery itself failed (no response)
//!   Ok(Response { error, .. }) remote side answered, `error` says how
//! ```

mod correlation;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Address, LocationKey, RpcId};

pub use correlation::CorrelationIds;

/// Well-known response codes.
///
/// `TargetNotFound` drives the sender's retry loop; `Timeout` and
/// `Protocol` are raised to the caller; everything else passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The request was handled.
    Success,
    /// The addressed process does not serve the key (moved or destroyed).
    TargetNotFound,
    /// The remote side timed out handling the request.
    Timeout,
    /// The request or response was malformed.
    Protocol,
    /// The registry refused the operation (invalid key, already locked).
    Rejected,
    /// Application-defined code, passed through untouched.
    Application(u32),
}

impl ErrorCode {
    /// Whether this code reports success.
    pub fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::Success => write!(f, "success"),
            ErrorCode::TargetNotFound => write!(f, "target not found"),
            ErrorCode::Timeout => write!(f, "timeout"),
            ErrorCode::Protocol => write!(f, "protocol error"),
            ErrorCode::Rejected => write!(f, "rejected"),
            ErrorCode::Application(code) => write!(f, "application error {}", code),
        }
    }
}

/// Outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, stamped by the sender right before delivery.
    pub rpc_id: RpcId,
    /// Entity the request is addressed to.
    pub key: LocationKey,
    /// Opaque serialized payload.
    pub body: Vec<u8>,
}

impl Request {
    /// Create a request with an unassigned correlation id.
    pub fn new(key: LocationKey, body: impl Into<Vec<u8>>) -> Self {
        Self {
            rpc_id: RpcId::default(),
            key,
            body: body.into(),
        }
    }
}

/// Response to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id copied from the request.
    pub rpc_id: RpcId,
    /// Outcome code.
    pub error: ErrorCode,
    /// Human-readable detail for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Opaque serialized payload.
    pub body: Vec<u8>,
}

impl Response {
    /// Successful response carrying `body`.
    pub fn ok(rpc_id: RpcId, body: impl Into<Vec<u8>>) -> Self {
        Self {
            rpc_id,
            error: ErrorCode::Success,
            message: None,
            body: body.into(),
        }
    }

    /// Failure response with an empty body.
    pub fn failure(rpc_id: RpcId, error: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            rpc_id,
            error,
            message: Some(message.into()),
            body: Vec::new(),
        }
    }

    /// Whether the response reports success.
    pub fn is_success(&self) -> bool {
        self.error.is_success()
    }
}

/// Delivery failures reported by the transport itself.
///
/// Serializable so a relay can forward them as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TransportError {
    /// The connection failed; the request may or may not have been delivered.
    #[error("connection failed")]
    ConnectionFailed,
    /// No response arrived in time.
    #[error("request timed out")]
    Timeout,
    /// Serialization or deserialization failed.
    #[error("serialization error: {message}")]
    Serialization {
        /// Human-readable error message.
        message: String,
    },
    /// The destination process is not reachable at all.
    #[error("endpoint not found")]
    EndpointNotFound,
}

/// Delivery of requests to resolved addresses.
///
/// Implementations are single-threaded (`?Send`), like the rest of a shard.
#[async_trait(?Send)]
pub trait Transport {
    /// Deliver `request` without waiting for a reply.
    fn send(&self, to: &Address, request: Request);

    /// Deliver `request` and wait for the matching response.
    async fn call(&self, to: &Address, request: Request) -> Result<Response, TransportError>;
}
