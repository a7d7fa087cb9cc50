#![warn(missing_docs)]

//! bytewire-net: cross-platform TCP/UDP sockets with a normalized error model,
//! a UDP send pacer and byte-source adapters for binary streams.

/// Byte sources over sockets (`SocketReader`, `SocketWriter`).
pub mod adapters;
/// IP endpoint parsing, formatting and resolution.
pub mod address;
/// Local network interface enumeration.
pub mod interface;
/// Outgoing byte-rate pacing.
pub mod load_balancer;
/// Address family, socket type and protocol enums.
pub mod protocol;
/// The socket wrapper, its options and readiness waits.
pub mod socket;

pub use adapters::{SocketReader, SocketWriter};
pub use address::{IpAddress, RawAddress};
pub use interface::{get_broadcast_ip, get_interfaces, get_ip_interface, get_system_ip, IpInterface};
pub use load_balancer::LoadBalancer;
pub use protocol::{AddressFamily, IpProtocol, ProtocolInfo, SocketCategory, SocketType};
pub use socket::{
    BufferType, PollFlag, RawHandle, SelectFlag, Socket, SocketOpt, SocketOption,
};
