//! Address family, socket type and IP protocol descriptors.
//!
//! These are semantic values; conversion to OS integers goes through `socket2` for
//! the families and types it knows, and through IANA protocol numbers otherwise.

use std::fmt::{self, Display, Formatter};

use socket2::{Domain, Protocol, Type};

#[cfg(target_os = "linux")]
const AF_BLUETOOTH: i32 = 31;
#[cfg(windows)]
const AF_BLUETOOTH: i32 = 32;
#[cfg(not(any(target_os = "linux", windows)))]
const AF_BLUETOOTH: i32 = 36;

const SOCK_RDM: i32 = 4;

/// Address family of a socket or address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AddressFamily {
    /// Unspecified, lets the OS decide.
    #[default]
    Unspec,
    /// IPv4 addressing.
    IPv4,
    /// IPv6 addressing.
    IPv6,
    /// Bluetooth addressing.
    Bluetooth,
}

impl AddressFamily {
    /// Converts to the socket2 domain, if this family maps to one.
    pub fn to_domain(self) -> Option<Domain> {
        match self {
            AddressFamily::IPv4 => Some(Domain::IPV4),
            AddressFamily::IPv6 => Some(Domain::IPV6),
            AddressFamily::Bluetooth => Some(Domain::from(AF_BLUETOOTH)),
            AddressFamily::Unspec => None,
        }
    }

    /// Converts a raw OS `AF_*` value.
    pub fn from_raw(raw: i32) -> Self {
        if raw == i32::from(Domain::IPV4) {
            AddressFamily::IPv4
        } else if raw == i32::from(Domain::IPV6) {
            AddressFamily::IPv6
        } else if raw == AF_BLUETOOTH {
            AddressFamily::Bluetooth
        } else {
            AddressFamily::Unspec
        }
    }

    /// Raw OS `AF_*` value, 0 when unspecified.
    pub fn to_raw(self) -> i32 {
        self.to_domain().map(i32::from).unwrap_or(0)
    }

    /// Detects the family of an address literal.
    ///
    /// Text starting with `[` or containing `::` is IPv6, anything else IPv4.
    pub fn of_literal(text: &str) -> Self {
        if text.starts_with('[') || text.contains("::") {
            AddressFamily::IPv6
        } else {
            AddressFamily::IPv4
        }
    }
}

/// Socket semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SocketType {
    /// Unspecified or unknown.
    #[default]
    Unspec,
    /// Reliable ordered byte stream (TCP).
    Stream,
    /// Unreliable datagrams (UDP).
    Datagram,
    /// Raw protocol access.
    Raw,
    /// Reliable datagrams.
    Rdm,
    /// Sequenced packets.
    SeqPacket,
}

impl SocketType {
    /// Converts to the socket2 type, if known.
    pub fn to_type(self) -> Option<Type> {
        match self {
            SocketType::Unspec => None,
            SocketType::Stream => Some(Type::STREAM),
            SocketType::Datagram => Some(Type::DGRAM),
            SocketType::Raw => Some(Type::RAW),
            SocketType::Rdm => Some(Type::from(SOCK_RDM)),
            SocketType::SeqPacket => Some(Type::SEQPACKET),
        }
    }

    /// Converts a raw OS `SOCK_*` value as reported by `SO_TYPE`.
    pub fn from_raw(raw: i32) -> Self {
        if raw == i32::from(Type::STREAM) {
            SocketType::Stream
        } else if raw == i32::from(Type::DGRAM) {
            SocketType::Datagram
        } else if raw == i32::from(Type::RAW) {
            SocketType::Raw
        } else if raw == i32::from(Type::SEQPACKET) {
            SocketType::SeqPacket
        } else if raw == SOCK_RDM {
            SocketType::Rdm
        } else {
            SocketType::Unspec
        }
    }
}

/// IP protocol carried by a socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum IpProtocol {
    /// Unspecified, implied by the socket type.
    #[default]
    Unspec,
    /// Internet Control Message Protocol.
    Icmp,
    /// Internet Group Management Protocol.
    Igmp,
    /// Bluetooth RFCOMM.
    Bth,
    /// Transmission Control Protocol.
    Tcp,
    /// User Datagram Protocol.
    Udp,
    /// ICMP for IPv6.
    Icmpv6,
    /// Pragmatic General Multicast.
    Pgm,
}

impl IpProtocol {
    /// IANA protocol number.
    pub fn to_raw(self) -> i32 {
        match self {
            IpProtocol::Unspec => 0,
            IpProtocol::Icmp => 1,
            IpProtocol::Igmp => 2,
            IpProtocol::Bth => 3,
            IpProtocol::Tcp => 6,
            IpProtocol::Udp => 17,
            IpProtocol::Icmpv6 => 58,
            IpProtocol::Pgm => 113,
        }
    }

    /// Converts an IANA protocol number.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => IpProtocol::Icmp,
            2 => IpProtocol::Igmp,
            3 => IpProtocol::Bth,
            6 => IpProtocol::Tcp,
            17 => IpProtocol::Udp,
            58 => IpProtocol::Icmpv6,
            113 => IpProtocol::Pgm,
            _ => IpProtocol::Unspec,
        }
    }

    /// Converts to the socket2 protocol, None when unspecified.
    pub fn to_protocol(self) -> Option<Protocol> {
        match self {
            IpProtocol::Unspec => None,
            other => Some(Protocol::from(other.to_raw())),
        }
    }

    /// Socket type this protocol runs over.
    pub fn socket_type(self) -> SocketType {
        match self {
            IpProtocol::Unspec => SocketType::Unspec,
            IpProtocol::Tcp | IpProtocol::Bth => SocketType::Stream,
            IpProtocol::Udp => SocketType::Datagram,
            IpProtocol::Pgm => SocketType::Rdm,
            IpProtocol::Icmp | IpProtocol::Igmp | IpProtocol::Icmpv6 => SocketType::Raw,
        }
    }

    /// Protocol implied by a socket type (stream is TCP, datagram is UDP).
    pub fn of_socket_type(sock_type: SocketType) -> Self {
        match sock_type {
            SocketType::Stream => IpProtocol::Tcp,
            SocketType::Datagram => IpProtocol::Udp,
            _ => IpProtocol::Unspec,
        }
    }
}

/// Role a socket plays in a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SocketCategory {
    /// Not yet determined.
    #[default]
    Unknown,
    /// Listening server socket.
    Listen,
    /// Server side of an accepted connection.
    Accept,
    /// Client side of a connection.
    Client,
}

/// Family, type and protocol of a socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct ProtocolInfo {
    /// Address family.
    pub family: AddressFamily,
    /// Socket type.
    pub sock_type: SocketType,
    /// IP protocol.
    pub protocol: IpProtocol,
}

impl Display for AddressFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressFamily::Unspec => "AF_Unspec",
            AddressFamily::IPv4 => "AF_IPv4",
            AddressFamily::IPv6 => "AF_IPv6",
            AddressFamily::Bluetooth => "AF_Bluetooth",
        })
    }
}

impl Display for SocketType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SocketType::Unspec => "ST_Unspec",
            SocketType::Stream => "ST_Stream",
            SocketType::Datagram => "ST_Datagram",
            SocketType::Raw => "ST_Raw",
            SocketType::Rdm => "ST_RDM",
            SocketType::SeqPacket => "ST_SeqPacket",
        })
    }
}

impl Display for IpProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IpProtocol::Unspec => "IPP_Unspec",
            IpProtocol::Icmp => "IPP_ICMP",
            IpProtocol::Igmp => "IPP_IGMP",
            IpProtocol::Bth => "IPP_BTH",
            IpProtocol::Tcp => "IPP_TCP",
            IpProtocol::Udp => "IPP_UDP",
            IpProtocol::Icmpv6 => "IPP_ICMPV6",
            IpProtocol::Pgm => "IPP_PGM",
        })
    }
}

impl Display for ProtocolInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.family, self.sock_type, self.protocol)
    }
}
