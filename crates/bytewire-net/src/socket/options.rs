//! Socket creation flags and the typed option interface.

use std::{
    net::Ipv4Addr,
    ops::{BitOr, BitOrAssign},
    time::Duration,
};

use bytewire_core::{config::Config, error::SocketError};
use tracing::debug;

use super::Socket;
use crate::{
    address::{IpAddress, RawAddress},
    protocol::SocketType,
};

/// Flags applied when a socket is created.
///
/// `NONBLOCK` takes priority over `BLOCKING`; with neither set the socket is non-blocking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct SocketOption(u32);

impl SocketOption {
    /// No options: non-blocking, no-delay, no reuse.
    pub const NONE: SocketOption = SocketOption(0);
    /// Enables address reuse, and port reuse on POSIX.
    pub const REUSE_ADDR: SocketOption = SocketOption(1);
    /// Socket calls block.
    pub const BLOCKING: SocketOption = SocketOption(2);
    /// Socket calls never block. Wins over `BLOCKING`.
    pub const NONBLOCK: SocketOption = SocketOption(4);
    /// Keeps Nagle's algorithm enabled on TCP.
    pub const NAGLE: SocketOption = SocketOption(8);

    /// Raw flag bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// True if every flag in `other` is set.
    pub fn contains(self, other: SocketOption) -> bool {
        self.0 & other.0 == other.0
    }

    /// Removes the flags in `other`.
    pub fn without(self, other: SocketOption) -> SocketOption {
        SocketOption(self.0 & !other.0)
    }

    /// Effective blocking mode.
    pub fn is_blocking(self) -> bool {
        !self.contains(Self::NONBLOCK) && self.contains(Self::BLOCKING)
    }

    /// Derives creation flags from a configuration.
    pub fn from_config(config: &Config) -> SocketOption {
        let mut opt = if config.socket_blocking { Self::BLOCKING } else { Self::NONBLOCK };
        if !config.socket_nodelay {
            opt |= Self::NAGLE;
        }
        if config.socket_reuse_addr {
            opt |= Self::REUSE_ADDR;
        }
        opt
    }
}

impl BitOr for SocketOption {
    type Output = SocketOption;

    fn bitor(self, rhs: SocketOption) -> SocketOption {
        SocketOption(self.0 | rhs.0)
    }
}

impl BitOrAssign for SocketOption {
    fn bitor_assign(&mut self, rhs: SocketOption) {
        self.0 |= rhs.0;
    }
}

/// Readiness conditions for [`Socket::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollFlag {
    /// Data can be read.
    Read,
    /// Data can be written.
    Write,
    /// Either direction.
    ReadWrite,
}

impl PollFlag {
    pub(crate) fn read(self) -> bool {
        matches!(self, PollFlag::Read | PollFlag::ReadWrite)
    }

    pub(crate) fn write(self) -> bool {
        matches!(self, PollFlag::Write | PollFlag::ReadWrite)
    }
}

/// Readiness conditions for [`Socket::select`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SelectFlag(u8);

impl SelectFlag {
    /// Readable.
    pub const READ: SelectFlag = SelectFlag(1);
    /// Writable.
    pub const WRITE: SelectFlag = SelectFlag(2);
    /// Exceptional condition (out-of-band data, failed connect on Windows).
    pub const EXCEPT: SelectFlag = SelectFlag(4);
    /// Readable or writable.
    pub const READ_WRITE: SelectFlag = SelectFlag(3);

    /// True if every flag in `other` is set.
    pub fn contains(self, other: SelectFlag) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SelectFlag {
    type Output = SelectFlag;

    fn bitor(self, rhs: SelectFlag) -> SelectFlag {
        SelectFlag(self.0 | rhs.0)
    }
}

/// Which kernel buffer a size applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferType {
    /// Receive buffer (`SO_RCVBUF`).
    Recv,
    /// Send buffer (`SO_SNDBUF`).
    Send,
}

/// Typed socket option accepted by [`Socket::set_option`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketOpt {
    /// Address (and on POSIX port) reuse.
    ReuseAddr(bool),
    /// Blocking mode.
    Blocking(bool),
    /// Nagle's algorithm on TCP.
    Nagle(bool),
    /// `SO_LINGER` with a timeout in seconds.
    Linger {
        /// Linger enabled.
        on: bool,
        /// Linger timeout.
        seconds: u32,
    },
    /// Kernel buffer size in bytes.
    BufSize(BufferType, usize),
    /// UDP broadcast.
    Broadcast(bool),
    /// Join a multicast group with the given TTL.
    Multicast {
        /// Group address.
        group: IpAddress,
        /// Multicast TTL (hops on IPv6).
        ttl: u32,
    },
}

/// Linux doubles the supplied buffer size internally; halve it so every platform
/// ends up with the requested size.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn os_buffer_request(bytes: usize) -> usize {
    bytes / 2
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn os_buffer_request(bytes: usize) -> usize {
    bytes
}

impl Socket {
    /// Applies a typed option.
    pub fn set_option(&self, opt: SocketOpt) -> Result<(), SocketError> {
        match opt {
            SocketOpt::ReuseAddr(on) => self.set_reuse_addr(on),
            SocketOpt::Blocking(on) => self.set_blocking(on),
            SocketOpt::Nagle(on) => self.set_nagle(on),
            SocketOpt::Linger { on, seconds } => self.set_linger(on, seconds),
            SocketOpt::BufSize(kind, bytes) => self.set_buf_size(kind, bytes),
            SocketOpt::Broadcast(on) => self.enable_broadcast(on),
            SocketOpt::Multicast { group, ttl } => self.enable_multicast(&group, ttl),
        }
    }

    /// Enables or disables blocking mode.
    pub fn set_blocking(&self, blocking: bool) -> Result<(), SocketError> {
        let mut state = self.state.lock();
        let result = state.with_socket(|s| s.set_nonblocking(!blocking));
        if result.is_ok() {
            state.blocking = blocking;
        }
        self.record(result)
    }

    /// Blocking mode. Queried from the OS on POSIX, cached on Windows.
    pub fn is_blocking(&self) -> bool {
        let state = self.state.lock();
        match state.handle().and_then(super::sys::is_nonblocking) {
            Some(nonblocking) => !nonblocking,
            None => state.blocking,
        }
    }

    /// Enables Nagle's algorithm (true) or no-delay mode (false). Ignored on non-TCP sockets.
    pub fn set_nagle(&self, enable: bool) -> Result<(), SocketError> {
        let mut state = self.state.lock();
        if state.sock_type != SocketType::Stream {
            return Ok(());
        }
        let result = state.with_socket(|s| s.set_nodelay(!enable));
        if result.is_ok() {
            state.nodelay = !enable;
        }
        self.record(result)
    }

    /// Sets `TCP_NODELAY`.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<(), SocketError> {
        self.set_nagle(!nodelay)
    }

    /// True if Nagle's algorithm is disabled.
    pub fn is_nodelay(&self) -> bool {
        let state = self.state.lock();
        state.sock.as_ref().and_then(|s| s.nodelay().ok()).unwrap_or(state.nodelay)
    }

    /// Sets `SO_REUSEADDR`, plus `SO_REUSEPORT` on POSIX.
    pub fn set_reuse_addr(&self, on: bool) -> Result<(), SocketError> {
        let state = self.state.lock();
        let result = state.with_socket(|s| {
            s.set_reuse_address(on)?;
            #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
            s.set_reuse_port(on)?;
            Ok(())
        });
        self.record(result)
    }

    /// Sets `SO_LINGER`.
    pub fn set_linger(&self, on: bool, seconds: u32) -> Result<(), SocketError> {
        let linger = if on { Some(Duration::from_secs(seconds as u64)) } else { None };
        let state = self.state.lock();
        let result = state.with_socket(|s| s.set_linger(linger));
        self.record(result)
    }

    /// Current `SO_LINGER` timeout, None when disabled.
    pub fn linger(&self) -> Result<Option<Duration>, SocketError> {
        let state = self.state.lock();
        let result = state.with_socket(|s| s.linger());
        self.record(result)
    }

    /// Sets the send or receive buffer size.
    pub fn set_buf_size(&self, kind: BufferType, bytes: usize) -> Result<(), SocketError> {
        let request = os_buffer_request(bytes);
        debug!("Setting {:?} buffer to {} bytes (requesting {})", kind, bytes, request);
        let state = self.state.lock();
        let result = state.with_socket(|s| match kind {
            BufferType::Recv => s.set_recv_buffer_size(request),
            BufferType::Send => s.set_send_buffer_size(request),
        });
        self.record(result)
    }

    /// Current send or receive buffer size as reported by the OS.
    pub fn get_buf_size(&self, kind: BufferType) -> Result<usize, SocketError> {
        let state = self.state.lock();
        let result = state.with_socket(|s| match kind {
            BufferType::Recv => s.recv_buffer_size(),
            BufferType::Send => s.send_buffer_size(),
        });
        self.record(result)
    }

    /// Enables or disables UDP broadcast.
    pub fn enable_broadcast(&self, on: bool) -> Result<(), SocketError> {
        let state = self.state.lock();
        let result = state.with_socket(|s| s.set_broadcast(on));
        self.record(result)
    }

    /// True if broadcast is enabled.
    pub fn is_broadcast(&self) -> bool {
        let state = self.state.lock();
        state.sock.as_ref().and_then(|s| s.broadcast().ok()).unwrap_or(false)
    }

    /// Joins a multicast group on the default interface and sets the TTL.
    pub fn enable_multicast(&self, group: &IpAddress, ttl: u32) -> Result<(), SocketError> {
        let state = self.state.lock();
        let result = match group.address() {
            RawAddress::V4(ip) => state.with_socket(|s| {
                s.join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)?;
                s.set_multicast_ttl_v4(ttl)
            }),
            RawAddress::V6 { addr, scope_id, .. } => state.with_socket(|s| {
                s.join_multicast_v6(&addr, scope_id)?;
                s.set_multicast_hops_v6(ttl)
            }),
            RawAddress::Unspecified => Err(SocketError::AddrFault),
        };
        self.record(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonblock_wins_over_blocking() {
        assert!(SocketOption::BLOCKING.is_blocking());
        assert!(!(SocketOption::BLOCKING | SocketOption::NONBLOCK).is_blocking());
        assert!(!SocketOption::NONE.is_blocking());
    }

    #[test]
    fn test_from_config() {
        let opt = SocketOption::from_config(&Config::default());
        assert!(opt.is_blocking());
        assert!(!opt.contains(SocketOption::NAGLE));

        let mut config = Config::nonblocking();
        config.socket_nodelay = false;
        config.socket_reuse_addr = true;
        let opt = SocketOption::from_config(&config);
        assert!(!opt.is_blocking());
        assert!(opt.contains(SocketOption::NAGLE | SocketOption::REUSE_ADDR));
    }

    #[test]
    fn test_without() {
        let opt = SocketOption::BLOCKING | SocketOption::REUSE_ADDR;
        assert_eq!(opt.without(SocketOption::BLOCKING), SocketOption::REUSE_ADDR);
    }

    #[test]
    fn test_flags() {
        assert!(PollFlag::ReadWrite.read() && PollFlag::ReadWrite.write());
        assert!(!PollFlag::Read.write());
        assert!(SelectFlag::READ_WRITE.contains(SelectFlag::READ | SelectFlag::WRITE));
        assert!(!SelectFlag::READ.contains(SelectFlag::EXCEPT));
    }
}
