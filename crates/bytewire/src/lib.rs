#![warn(missing_docs)]

//! Bytewire: a small public API facade for the workspace.
//!
//! This crate re-exports the most commonly used types for buffered binary I/O:
//!
//! - Sockets and addresses (`Socket`, `IpAddress`, `SocketOption`)
//! - UDP send pacing (`LoadBalancer`)
//! - The binary stream and its byte sources (`BinaryStream`, `MemorySource`, ...)
//! - Core configuration and errors (`Config`, `SocketError`)
//!
//! Example
//! ```no_run
//! use bytewire::prelude::*;
//!
//! let server = Socket::listen_to(&IpAddress::localhost(9000), IpProtocol::Tcp, SocketOption::BLOCKING)?;
//! if let Some(conn) = server.accept(1000)? {
//!     let mut reader = SocketReader::new(&conn);
//!     let mut stream = BinaryStream::with_source(&mut reader);
//!     let greeting = stream.read_string()?;
//!     println!("client said {}", greeting);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core config, errors and byte sources
pub use bytewire_core::{
    config::Config,
    error::{ErrorKind, Result, SocketError},
    source::ByteSource,
    time::{Clock, SystemClock},
};
// Sockets, pacing and interfaces
pub use bytewire_net::{
    get_broadcast_ip, get_interfaces, get_ip_interface, get_system_ip, AddressFamily,
    BufferType, IpAddress, IpInterface, IpProtocol, LoadBalancer, PollFlag, ProtocolInfo,
    SelectFlag, Socket, SocketCategory, SocketOpt, SocketOption, SocketReader, SocketType,
    SocketWriter,
};
// Binary stream and adapters
pub use bytewire_stream::{
    BinaryStream, Decode, Encode, FileReader, FileWriter, MemorySource, Primitive,
};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        BinaryStream, ByteSource, Config, Decode, Encode, IpAddress, IpProtocol, LoadBalancer,
        MemorySource, PollFlag, Socket, SocketError, SocketOption, SocketReader, SocketWriter,
    };
}
