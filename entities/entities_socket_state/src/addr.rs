//! Boundary Address Forms
//!
//! Address types exchanged with the host runtime. Peer and interface
//! addresses cross the boundary as four explicit octets ([`Ip4`]); ports
//! cross as either a number or a symbolic service name ([`PortSpec`]); a
//! bind/connect target combines an optional host with a port ([`Address`]),
//! where an absent host selects the wildcard interface.
//!
//! None of these types talk to the resolver or the OS. Turning an
//! [`Address`] into a concrete endpoint is the adapters layer's job.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// IPv4 address as four explicit octets in network order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ip4([u8; 4]);

impl Ip4 {
    /// Wildcard address (all interfaces)
    pub const ANY: Ip4 = Ip4([0, 0, 0, 0]);

    /// Loopback address
    pub const LOOPBACK: Ip4 = Ip4([127, 0, 0, 1]);

    /// Build an address from four octets in network order
    pub fn new(octets: [u8; 4]) -> Self {
        Self(octets)
    }

    /// Get the four octets in network order
    pub fn octets(&self) -> [u8; 4] {
        self.0
    }

    /// Pack the octets into one host-order integer.
    ///
    /// The first octet becomes the most significant byte, so the round trip
    /// through [`Ip4::from_host_u32`] is exact for every octet value.
    pub fn to_host_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Unpack a host-order integer produced by [`Ip4::to_host_u32`]
    pub fn from_host_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }
}

impl From<Ipv4Addr> for Ip4 {
    fn from(addr: Ipv4Addr) -> Self {
        Self(addr.octets())
    }
}

impl From<Ip4> for Ipv4Addr {
    fn from(addr: Ip4) -> Self {
        let [a, b, c, d] = addr.0;
        Ipv4Addr::new(a, b, c, d)
    }
}

impl fmt::Display for Ip4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

impl FromStr for Ip4 {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>().map(Ip4::from)
    }
}

/// Port selector: a number, or a service name for the services database
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// Numeric TCP port
    Number(u16),
    /// Symbolic service name, resolved through the services database
    Service(String),
}

impl From<u16> for PortSpec {
    fn from(port: u16) -> Self {
        PortSpec::Number(port)
    }
}

impl From<&str> for PortSpec {
    fn from(service: &str) -> Self {
        PortSpec::Service(service.to_string())
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Number(port) => write!(f, "{}", port),
            PortSpec::Service(name) => write!(f, "{}", name),
        }
    }
}

/// Bind or connect target: an optional host plus a port selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Host name or dotted address; `None` selects the wildcard interface
    pub host: Option<String>,
    /// Port number or service name
    pub port: PortSpec,
}

impl Address {
    /// Wildcard-interface target with a numeric port
    pub fn any(port: u16) -> Self {
        Self {
            host: None,
            port: PortSpec::Number(port),
        }
    }

    /// Wildcard-interface target with a service name
    pub fn any_service(service: &str) -> Self {
        Self {
            host: None,
            port: PortSpec::Service(service.to_string()),
        }
    }

    /// Named host with a numeric port
    pub fn host(host: &str, port: u16) -> Self {
        Self {
            host: Some(host.to_string()),
            port: PortSpec::Number(port),
        }
    }

    /// Named host with a service name
    pub fn service(host: &str, service: &str) -> Self {
        Self {
            host: Some(host.to_string()),
            port: PortSpec::Service(service.to_string()),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{}:{}", host, self.port),
            None => write!(f, "*:{}", self.port),
        }
    }
}
