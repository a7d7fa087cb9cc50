//! IPv4/IPv6 endpoint addresses.
//!
//! [`IpAddress`] is a plain value: a tagged address plus a host-order port. It is
//! produced by parsing a literal, resolving a hostname or reading a socket endpoint.

use std::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
    net::{
        IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs,
    },
    str::FromStr,
};

use bytewire_core::error::{ErrorKind, Result};
use tracing::warn;

use crate::protocol::AddressFamily;

/// The address part of an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RawAddress {
    /// No address family chosen.
    #[default]
    Unspecified,
    /// 32-bit IPv4 address.
    V4(Ipv4Addr),
    /// 128-bit IPv6 address with flow info and scope id.
    V6 {
        /// Address bytes.
        addr: Ipv6Addr,
        /// IPv6 flow information.
        flow_info: u32,
        /// Interface scope id.
        scope_id: u32,
    },
}

impl RawAddress {
    /// Family this address belongs to.
    pub fn family(&self) -> AddressFamily {
        match self {
            RawAddress::Unspecified => AddressFamily::Unspec,
            RawAddress::V4(_) => AddressFamily::IPv4,
            RawAddress::V6 { .. } => AddressFamily::IPv6,
        }
    }

    /// True if the address bytes are not all zero.
    pub fn has_address(&self) -> bool {
        match self {
            RawAddress::Unspecified => false,
            RawAddress::V4(ip) => !ip.is_unspecified(),
            RawAddress::V6 { addr, .. } => !addr.is_unspecified(),
        }
    }

    /// The std address, None when unspecified.
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            RawAddress::Unspecified => None,
            RawAddress::V4(ip) => Some(IpAddr::V4(*ip)),
            RawAddress::V6 { addr, .. } => Some(IpAddr::V6(*addr)),
        }
    }

    fn family_rank(&self) -> u8 {
        match self {
            RawAddress::Unspecified => 0,
            RawAddress::V4(_) => 1,
            RawAddress::V6 { .. } => 2,
        }
    }
}

impl From<IpAddr> for RawAddress {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(ip) => RawAddress::V4(ip),
            IpAddr::V6(addr) => RawAddress::V6 { addr, flow_info: 0, scope_id: 0 },
        }
    }
}

impl Ord for RawAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (RawAddress::V4(a), RawAddress::V4(b)) => a.octets().cmp(&b.octets()),
            (
                RawAddress::V6 { addr: a, flow_info: fa, scope_id: sa },
                RawAddress::V6 { addr: b, flow_info: fb, scope_id: sb },
            ) => a.octets().cmp(&b.octets()).then(fa.cmp(fb)).then(sa.cmp(sb)),
            _ => self.family_rank().cmp(&other.family_rank()),
        }
    }
}

impl PartialOrd for RawAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for RawAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RawAddress::Unspecified => Ok(()),
            RawAddress::V4(ip) => write!(f, "{}", ip),
            RawAddress::V6 { addr, .. } => write!(f, "{}", addr),
        }
    }
}

/// An IPv4 or IPv6 endpoint: address plus port in host byte order.
///
/// A zero address with a non-zero port is a valid listener binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct IpAddress {
    address: RawAddress,
    port: u16,
}

impl IpAddress {
    /// Creates an endpoint from its parts.
    pub fn new(address: RawAddress, port: u16) -> Self {
        Self { address, port }
    }

    /// IPv4 endpoint from octets.
    pub fn v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        Self::new(RawAddress::V4(Ipv4Addr::new(a, b, c, d)), port)
    }

    /// Any-address endpoint of the given family, used for listeners.
    pub fn any(family: AddressFamily, port: u16) -> Self {
        let address = match family {
            AddressFamily::IPv6 => RawAddress::from(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
            AddressFamily::IPv4 => RawAddress::V4(Ipv4Addr::UNSPECIFIED),
            _ => RawAddress::Unspecified,
        };
        Self::new(address, port)
    }

    /// IPv4 loopback endpoint.
    pub fn localhost(port: u16) -> Self {
        Self::new(RawAddress::V4(Ipv4Addr::LOCALHOST), port)
    }

    /// Parses `"a.b.c.d:port"`, `"a.b.c.d"`, `":port"`, `"[v6]:port"` or a bare IPv6 address.
    ///
    /// Host parts that are not literals are resolved.
    pub fn parse(text: &str) -> Result<Self> {
        match AddressFamily::of_literal(text) {
            AddressFamily::IPv6 => Self::parse_v6(text),
            _ => Self::parse_v4(text),
        }
    }

    fn parse_v6(text: &str) -> Result<Self> {
        if let Some(rest) = text.strip_prefix('[') {
            let end = rest.find(']').ok_or_else(|| ErrorKind::AddressParse(text.to_string()))?;
            let host = &rest[..end];
            let port = match &rest[end + 1..] {
                "" => 0,
                tail => {
                    let digits = tail
                        .strip_prefix(':')
                        .ok_or_else(|| ErrorKind::AddressParse(text.to_string()))?;
                    parse_port(digits, text)?
                }
            };
            Self::resolve_family(host, port, AddressFamily::IPv6)
        } else if text.contains(']') {
            Err(ErrorKind::AddressParse(text.to_string()))
        } else {
            Self::resolve_family(text, 0, AddressFamily::IPv6)
        }
    }

    fn parse_v4(text: &str) -> Result<Self> {
        match text.split_once(':') {
            Some(("", digits)) => Ok(Self::any(AddressFamily::IPv4, parse_port(digits, text)?)),
            Some((host, digits)) => {
                Self::resolve_family(host, parse_port(digits, text)?, AddressFamily::IPv4)
            }
            None if text.is_empty() => Ok(Self::any(AddressFamily::IPv4, 0)),
            None => Self::resolve_family(text, 0, AddressFamily::IPv4),
        }
    }

    /// Resolves `hostname` and picks the first address, preferring the literal's family.
    pub fn resolve(hostname: &str, port: u16) -> Result<Self> {
        Self::resolve_family(hostname, port, AddressFamily::of_literal(hostname))
    }

    /// Resolves `hostname` restricted to `family`. `Unspec` accepts any family.
    pub fn resolve_family(hostname: &str, port: u16, family: AddressFamily) -> Result<Self> {
        if let Ok(ip) = hostname.parse::<IpAddr>() {
            return Ok(Self::new(RawAddress::from(ip), port));
        }
        let candidates = (hostname, port).to_socket_addrs().map_err(|e| {
            warn!("Failed to resolve {}: {}", hostname, e);
            ErrorKind::UnresolvedHost(hostname.to_string())
        })?;
        candidates
            .map(IpAddress::from)
            .find(|addr| family == AddressFamily::Unspec || addr.family() == family)
            .ok_or_else(|| ErrorKind::UnresolvedHost(hostname.to_string()))
    }

    /// Address family.
    pub fn family(&self) -> AddressFamily {
        self.address.family()
    }

    /// Address part.
    pub fn address(&self) -> RawAddress {
        self.address
    }

    /// Port in host byte order.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Same address with a different port.
    pub fn with_port(&self, port: u16) -> Self {
        Self::new(self.address, port)
    }

    /// True if the address is non-zero.
    pub fn has_address(&self) -> bool {
        self.address.has_address()
    }

    /// True if a family is set and the port is non-zero.
    pub fn is_valid(&self) -> bool {
        self.family() != AddressFamily::Unspec && self.port != 0
    }

    /// Resets to the unspecified endpoint.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The std socket address, None when unspecified.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self.address {
            RawAddress::Unspecified => None,
            RawAddress::V4(ip) => Some(SocketAddr::V4(SocketAddrV4::new(ip, self.port))),
            RawAddress::V6 { addr, flow_info, scope_id } => {
                Some(SocketAddr::V6(SocketAddrV6::new(addr, self.port, flow_info, scope_id)))
            }
        }
    }
}

fn parse_port(digits: &str, text: &str) -> Result<u16> {
    digits.parse::<u16>().map_err(|_| ErrorKind::AddressParse(text.to_string()))
}

impl From<SocketAddr> for IpAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::new(RawAddress::V4(*v4.ip()), v4.port()),
            SocketAddr::V6(v6) => Self::new(
                RawAddress::V6 { addr: *v6.ip(), flow_info: v6.flowinfo(), scope_id: v6.scope_id() },
                v6.port(),
            ),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self> {
        IpAddress::parse(s)
    }
}

impl Ord for IpAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address.cmp(&other.address).then(self.port.cmp(&other.port))
    }
}

impl PartialOrd for IpAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for IpAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match (self.address, self.port) {
            (RawAddress::Unspecified, _) => Ok(()),
            (address, 0) => write!(f, "{}", address),
            (RawAddress::V6 { addr, .. }, port) => write!(f, "[{}]:{}", addr, port),
            (address, port) => write!(f, "{}:{}", address, port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v4_forms() {
        let addr = IpAddress::parse("192.168.1.10:8080").unwrap();
        assert_eq!(addr, IpAddress::v4(192, 168, 1, 10, 8080));
        assert_eq!(addr.family(), AddressFamily::IPv4);

        let addr = IpAddress::parse("10.0.0.1").unwrap();
        assert_eq!(addr.port(), 0);
        assert!(addr.has_address());
        assert!(!addr.is_valid());

        let any = IpAddress::parse(":7777").unwrap();
        assert_eq!(any.port(), 7777);
        assert!(!any.has_address());
        assert!(any.is_valid());
    }

    #[test]
    fn test_parse_v6_forms() {
        let addr = IpAddress::parse("[::1]:9000").unwrap();
        assert_eq!(addr.family(), AddressFamily::IPv6);
        assert_eq!(addr.port(), 9000);
        assert!(addr.has_address());

        let bare = IpAddress::parse("2001:db8::1").unwrap();
        assert_eq!(bare.port(), 0);
        assert_eq!(bare.to_string(), "2001:db8::1");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(IpAddress::parse("[::1:80").is_err());
        assert!(IpAddress::parse("::1]:80").is_err());
        assert!(IpAddress::parse("[::1]80").is_err());
        assert!(IpAddress::parse("127.0.0.1:notaport").is_err());
        assert!(IpAddress::parse("127.0.0.1:70000").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(IpAddress::v4(127, 0, 0, 1, 80).to_string(), "127.0.0.1:80");
        assert_eq!(IpAddress::v4(127, 0, 0, 1, 0).to_string(), "127.0.0.1");
        assert_eq!(IpAddress::parse("[::1]:443").unwrap().to_string(), "[::1]:443");
        assert_eq!(IpAddress::default().to_string(), "");
    }

    #[test]
    fn test_ordering_family_then_address_then_port() {
        let a = IpAddress::v4(10, 0, 0, 1, 500);
        let b = IpAddress::v4(10, 0, 0, 2, 1);
        let c = IpAddress::v4(10, 0, 0, 2, 2);
        let v6 = IpAddress::parse("[::1]:1").unwrap();
        let mut all = vec![v6, c, a, b];
        all.sort();
        assert_eq!(all, vec![a, b, c, v6]);
        assert!(IpAddress::default() < a);
    }

    #[test]
    fn test_socket_addr_conversion() {
        let sa: SocketAddr = "127.0.0.1:1234".parse().unwrap();
        let addr = IpAddress::from(sa);
        assert_eq!(addr.to_socket_addr(), Some(sa));
        assert_eq!(IpAddress::default().to_socket_addr(), None);
    }

    #[test]
    fn test_resolve_localhost() {
        let addr = IpAddress::resolve_family("localhost", 80, AddressFamily::IPv4).unwrap();
        assert_eq!(addr.family(), AddressFamily::IPv4);
        assert_eq!(addr.port(), 80);
        assert!(addr.has_address());
    }

    #[test]
    fn test_clear_and_with_port() {
        let mut addr = IpAddress::localhost(1).with_port(2);
        assert_eq!(addr.port(), 2);
        addr.clear();
        assert_eq!(addr.family(), AddressFamily::Unspec);
    }
}
