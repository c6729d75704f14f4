//! Core types for location routing.
//!
//! - [`LocationKey`]: identity of the routable entity
//! - [`LocationType`]: shard of the key space (players, instances, ...)
//! - [`NetworkAddress`] + [`UID`]: process endpoint and local object identity
//! - [`Address`]: where a key is currently served
//! - [`RpcId`]: correlation id for request/response matching

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Opaque 64-bit identity of a routable entity.
///
/// Keys are assigned once and never change. The zero key is reserved
/// and rejected by the registry's lock operation.
///
/// # Examples
///
/// ```
/// use locus::LocationKey;
///
/// let key = LocationKey::new(42);
/// assert!(key.is_valid());
/// assert!(!LocationKey::new(0).is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey(pub u64);

impl LocationKey {
    /// Create a key from its raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value of the key.
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Check the key is usable (non-zero).
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LocationKey {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Identifies an independent key space.
///
/// Each location type has its own registry and its own sender, so keys of
/// different types never contend on the same mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LocationType(pub u32);

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type-{}", self.0)
    }
}

/// 128-bit identifier of an object inside a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UID {
    /// First 64 bits.
    pub first: u64,
    /// Second 64 bits.
    pub second: u64,
}

impl UID {
    /// Create a new UID with explicit values.
    pub const fn new(first: u64, second: u64) -> Self {
        Self { first, second }
    }

    /// Check if UID is valid (non-zero).
    pub const fn is_valid(&self) -> bool {
        self.first != 0 || self.second != 0
    }
}

impl fmt::Display for UID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.first, self.second)
    }
}

/// Network address of a process (IPv4/IPv6 + port).
///
/// # Examples
///
/// ```
/// use locus::NetworkAddress;
/// use std::net::{IpAddr, Ipv4Addr};
///
/// let addr = NetworkAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4500);
/// assert_eq!(addr.to_string(), "127.0.0.1:4500");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkAddress {
    /// IP address (IPv4 or IPv6).
    pub ip: IpAddr,
    /// Port number.
    pub port: u16,
}

impl NetworkAddress {
    /// Create a new network address.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Parse from string "ip:port" format.
    ///
    /// Supports both IPv4 (`127.0.0.1:4500`) and IPv6 (`[::1]:4500`) notation.
    ///
    /// # Errors
    ///
    /// Returns error if IP or port cannot be parsed.
    pub fn parse(s: &str) -> Result<Self, NetworkAddressParseError> {
        let (ip_str, port_str) = if let Some(rest) = s.strip_prefix('[') {
            let (ip, port) = rest
                .split_once("]:")
                .ok_or(NetworkAddressParseError::MissingPort)?;
            (ip, port)
        } else {
            s.rsplit_once(':')
                .ok_or(NetworkAddressParseError::MissingPort)?
        };
        let ip: IpAddr = ip_str
            .parse()
            .map_err(|_| NetworkAddressParseError::InvalidIp)?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| NetworkAddressParseError::InvalidPort)?;
        Ok(Self::new(ip, port))
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

/// Error parsing a network address from string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkAddressParseError {
    /// The IP address could not be parsed.
    #[error("invalid IP address")]
    InvalidIp,
    /// The port could not be parsed.
    #[error("invalid port")]
    InvalidPort,
    /// No `:port` suffix was found.
    #[error("missing port")]
    MissingPort,
}

/// Routable endpoint: the hosting process plus the object inside it.
///
/// "Unresolved" is expressed as `Option<Address>::None` throughout the
/// crate rather than with a sentinel value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Process hosting the entity.
    pub process: NetworkAddress,
    /// Object identity inside the process.
    pub instance: UID,
}

impl Address {
    /// Create a new address.
    pub fn new(process: NetworkAddress, instance: UID) -> Self {
        Self { process, instance }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.process, self.instance)
    }
}

/// Correlation id carried by a request and echoed by its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RpcId(pub u32);

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc-{}", self.0)
    }
}
