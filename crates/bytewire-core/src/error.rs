//! Error types and results.
//!
//! Two layers of errors exist:
//! - [`SocketError`] is the platform-neutral taxonomy every socket call is normalized to.
//!   It is `Copy` so sockets can keep the last one around for inspection.
//! - [`ErrorKind`] is the crate-level error returned by fallible constructors and helpers.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    io, result,
};

/// Wrapped result type for bytewire operations.
pub type Result<T> = result::Result<T, ErrorKind>;

/// Platform-neutral socket error.
///
/// Every known POSIX errno and WSA error code is translated through a single table in
/// [`SocketError::from_os_error`]. Codes outside the table keep their raw value in
/// [`SocketError::Unknown`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SocketError {
    /// No error.
    #[default]
    None,
    /// Unrecognized OS error, raw code preserved.
    Unknown(i32),
    /// Connection broken by keep-alive failure.
    NetReset,
    /// Message too large for the buffer and was truncated.
    MsgTooLarge,
    /// Operation in progress.
    InProgress,
    /// Operation would block, try again.
    Again,
    /// Socket is not connected.
    NotConnected,
    /// Address is not available on this host.
    AddrNotAvailable,
    /// Address already in use.
    AddrInUse,
    /// Connection reset by peer.
    ConnReset,
    /// Connection refused by remote host.
    ConnRefused,
    /// Connection aborted locally.
    ConnAborted,
    /// Remote end did not respond in time.
    TimedOut,
    /// Remote host is unreachable.
    HostUnreachable,
    /// Remote network is unreachable.
    NetUnreachable,
    /// Descriptor is invalid or not a socket.
    BadSocket,
    /// Socket is already connected.
    AlreadyConnected,
    /// Bad address pointer or length.
    AddrFault,
    /// Call was interrupted.
    Interrupted,
    /// Operation not supported by this socket type.
    SockTypeMismatch,
    /// Address family not supported.
    SockFamilyUnsupported,
    /// Socket was shut down for this direction.
    Shutdown,
}

impl SocketError {
    /// Translates a raw OS error code (errno on POSIX, WSA code on Windows).
    pub fn from_os_error(code: i32) -> Self {
        if code == 0 {
            return SocketError::None;
        }
        let err = sys::translate(code);
        if let SocketError::Unknown(raw) = err {
            tracing::debug!("Unmapped socket error code {}", raw);
        }
        err
    }

    /// Translates an [`io::Error`], falling back to its kind when it carries no OS code.
    pub fn from_io_error(err: &io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            return Self::from_os_error(code);
        }
        match err.kind() {
            io::ErrorKind::WouldBlock => SocketError::Again,
            io::ErrorKind::TimedOut => SocketError::TimedOut,
            io::ErrorKind::Interrupted => SocketError::Interrupted,
            io::ErrorKind::ConnectionReset => SocketError::ConnReset,
            io::ErrorKind::ConnectionRefused => SocketError::ConnRefused,
            io::ErrorKind::ConnectionAborted => SocketError::ConnAborted,
            io::ErrorKind::NotConnected => SocketError::NotConnected,
            io::ErrorKind::AddrInUse => SocketError::AddrInUse,
            io::ErrorKind::AddrNotAvailable => SocketError::AddrNotAvailable,
            io::ErrorKind::BrokenPipe => SocketError::ConnReset,
            io::ErrorKind::InvalidInput => SocketError::AddrFault,
            _ => SocketError::Unknown(-1),
        }
    }

    /// Returns the error of the last failed OS call on this thread.
    pub fn last_os_error() -> Self {
        Self::from_io_error(&io::Error::last_os_error())
    }

    /// Errors after which the socket is unusable.
    ///
    /// Unknown codes are treated as fatal.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            SocketError::Unknown(_)
                | SocketError::ConnReset
                | SocketError::ConnRefused
                | SocketError::ConnAborted
                | SocketError::TimedOut
                | SocketError::HostUnreachable
                | SocketError::NetUnreachable
                | SocketError::BadSocket
                | SocketError::AddrFault
                | SocketError::SockTypeMismatch
                | SocketError::SockFamilyUnsupported
                | SocketError::AddrInUse
        )
    }

    /// Errors that leave the socket untouched; the affected call moves 0 bytes.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            SocketError::NetReset
                | SocketError::MsgTooLarge
                | SocketError::InProgress
                | SocketError::Again
                | SocketError::NotConnected
                | SocketError::AddrNotAvailable
                | SocketError::AlreadyConnected
                | SocketError::Interrupted
                | SocketError::Shutdown
        )
    }

    /// Returns true if this is [`SocketError::None`].
    pub fn is_none(self) -> bool {
        self == SocketError::None
    }

    /// Short stable identifier of the error kind.
    pub fn name(self) -> &'static str {
        match self {
            SocketError::None => "none",
            SocketError::Unknown(_) => "unknown",
            SocketError::NetReset => "net-reset",
            SocketError::MsgTooLarge => "msg-too-large",
            SocketError::InProgress => "in-progress",
            SocketError::Again => "again",
            SocketError::NotConnected => "not-conn",
            SocketError::AddrNotAvailable => "addr-not-avail",
            SocketError::AddrInUse => "addr-in-use",
            SocketError::ConnReset => "conn-reset",
            SocketError::ConnRefused => "conn-refused",
            SocketError::ConnAborted => "conn-aborted",
            SocketError::TimedOut => "timed-out",
            SocketError::HostUnreachable => "host-unreachable",
            SocketError::NetUnreachable => "net-unreachable",
            SocketError::BadSocket => "bad-socket",
            SocketError::AlreadyConnected => "already-conn",
            SocketError::AddrFault => "addr-fault",
            SocketError::Interrupted => "interrupted",
            SocketError::SockTypeMismatch => "sock-type-mismatch",
            SocketError::SockFamilyUnsupported => "sock-family-unsupported",
            SocketError::Shutdown => "shutdown",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            SocketError::None => "no error",
            SocketError::Unknown(_) => "unknown error",
            SocketError::NetReset => "connection broken by keep-alive failure",
            SocketError::MsgTooLarge => "message too large and was truncated",
            SocketError::InProgress => "operation in progress",
            SocketError::Again => "operation would block",
            SocketError::NotConnected => "socket is not connected",
            SocketError::AddrNotAvailable => "address not available",
            SocketError::AddrInUse => "address already in use",
            SocketError::ConnReset => "connection reset by peer",
            SocketError::ConnRefused => "connection refused",
            SocketError::ConnAborted => "connection aborted",
            SocketError::TimedOut => "connection timed out",
            SocketError::HostUnreachable => "host unreachable",
            SocketError::NetUnreachable => "network unreachable",
            SocketError::BadSocket => "invalid socket descriptor",
            SocketError::AlreadyConnected => "socket is already connected",
            SocketError::AddrFault => "invalid address",
            SocketError::Interrupted => "call interrupted",
            SocketError::SockTypeMismatch => "operation not supported by socket type",
            SocketError::SockFamilyUnsupported => "address family not supported",
            SocketError::Shutdown => "socket was shut down",
        }
    }
}

impl Display for SocketError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SocketError::Unknown(code) => write!(
                fmt,
                "unknown error {}: {}",
                code,
                io::Error::from_raw_os_error(*code)
            ),
            other => write!(fmt, "{} ({})", other.describe(), other.name()),
        }
    }
}

impl Error for SocketError {}

#[cfg(unix)]
mod sys {
    use super::SocketError;

    #[allow(unreachable_patterns)]
    pub(super) fn translate(code: i32) -> SocketError {
        match code {
            libc::ENETRESET => SocketError::NetReset,
            libc::EMSGSIZE => SocketError::MsgTooLarge,
            libc::EINPROGRESS | libc::EALREADY => SocketError::InProgress,
            libc::EAGAIN | libc::EWOULDBLOCK => SocketError::Again,
            libc::ENOTCONN => SocketError::NotConnected,
            libc::EADDRNOTAVAIL => SocketError::AddrNotAvailable,
            libc::EADDRINUSE => SocketError::AddrInUse,
            libc::ECONNRESET | libc::EPIPE => SocketError::ConnReset,
            libc::ECONNREFUSED => SocketError::ConnRefused,
            libc::ECONNABORTED => SocketError::ConnAborted,
            libc::ETIMEDOUT => SocketError::TimedOut,
            libc::EHOSTUNREACH => SocketError::HostUnreachable,
            libc::ENETUNREACH | libc::ENETDOWN => SocketError::NetUnreachable,
            libc::EBADF | libc::ENOTSOCK => SocketError::BadSocket,
            libc::EISCONN => SocketError::AlreadyConnected,
            libc::EFAULT | libc::EINVAL | libc::EDESTADDRREQ => SocketError::AddrFault,
            libc::EINTR => SocketError::Interrupted,
            libc::EPROTOTYPE | libc::EOPNOTSUPP | libc::EPROTONOSUPPORT => {
                SocketError::SockTypeMismatch
            }
            libc::EAFNOSUPPORT | libc::EPFNOSUPPORT => SocketError::SockFamilyUnsupported,
            libc::ESHUTDOWN => SocketError::Shutdown,
            other => SocketError::Unknown(other),
        }
    }
}

#[cfg(windows)]
mod sys {
    use windows_sys::Win32::Networking::WinSock::*;

    use super::SocketError;

    pub(super) fn translate(code: i32) -> SocketError {
        match code {
            WSAENETRESET => SocketError::NetReset,
            WSAEMSGSIZE => SocketError::MsgTooLarge,
            WSAEINPROGRESS | WSAEALREADY => SocketError::InProgress,
            WSAEWOULDBLOCK => SocketError::Again,
            WSAENOTCONN => SocketError::NotConnected,
            WSAEADDRNOTAVAIL => SocketError::AddrNotAvailable,
            WSAEADDRINUSE => SocketError::AddrInUse,
            WSAECONNRESET => SocketError::ConnReset,
            WSAECONNREFUSED => SocketError::ConnRefused,
            WSAECONNABORTED => SocketError::ConnAborted,
            WSAETIMEDOUT => SocketError::TimedOut,
            WSAEHOSTUNREACH => SocketError::HostUnreachable,
            WSAENETUNREACH | WSAENETDOWN => SocketError::NetUnreachable,
            WSAEBADF | WSAENOTSOCK => SocketError::BadSocket,
            WSAEISCONN => SocketError::AlreadyConnected,
            WSAEFAULT | WSAEINVAL | WSAEDESTADDRREQ => SocketError::AddrFault,
            WSAEINTR => SocketError::Interrupted,
            WSAEPROTOTYPE | WSAEOPNOTSUPP | WSAEPROTONOSUPPORT => SocketError::SockTypeMismatch,
            WSAEAFNOSUPPORT | WSAEPFNOSUPPORT => SocketError::SockFamilyUnsupported,
            WSAESHUTDOWN => SocketError::Shutdown,
            other => SocketError::Unknown(other),
        }
    }
}

#[cfg(not(any(unix, windows)))]
mod sys {
    use super::SocketError;

    pub(super) fn translate(code: i32) -> SocketError {
        SocketError::Unknown(code)
    }
}

/// Enum with all possible bytewire errors.
#[derive(Debug)]
pub enum ErrorKind {
    /// Wrapper around a std io::Error.
    IOError(io::Error),
    /// A socket call failed.
    Socket(SocketError),
    /// An address literal could not be parsed.
    AddressParse(String),
    /// A hostname did not resolve to any address.
    UnresolvedHost(String),
    /// An OS handle could not be adopted as a socket.
    InvalidHandle,
}

impl Display for ErrorKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::IOError(e) => write!(fmt, "An IO error occurred: {}", e),
            ErrorKind::Socket(e) => write!(fmt, "Socket error: {}", e),
            ErrorKind::AddressParse(addr) => {
                write!(fmt, "Could not parse address literal '{}'", addr)
            }
            ErrorKind::UnresolvedHost(host) => write!(fmt, "Could not resolve host '{}'", host),
            ErrorKind::InvalidHandle => write!(fmt, "OS handle is not a valid socket"),
        }
    }
}

impl Error for ErrorKind {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ErrorKind::IOError(e) => Some(e),
            ErrorKind::Socket(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ErrorKind {
    fn from(inner: io::Error) -> ErrorKind {
        ErrorKind::IOError(inner)
    }
}

impl From<SocketError> for ErrorKind {
    fn from(inner: SocketError) -> ErrorKind {
        ErrorKind::Socket(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_and_transient_are_disjoint() {
        let all = [
            SocketError::None,
            SocketError::Unknown(12345),
            SocketError::NetReset,
            SocketError::MsgTooLarge,
            SocketError::InProgress,
            SocketError::Again,
            SocketError::NotConnected,
            SocketError::AddrNotAvailable,
            SocketError::AddrInUse,
            SocketError::ConnReset,
            SocketError::ConnRefused,
            SocketError::ConnAborted,
            SocketError::TimedOut,
            SocketError::HostUnreachable,
            SocketError::NetUnreachable,
            SocketError::BadSocket,
            SocketError::AlreadyConnected,
            SocketError::AddrFault,
            SocketError::Interrupted,
            SocketError::SockTypeMismatch,
            SocketError::SockFamilyUnsupported,
            SocketError::Shutdown,
        ];
        for err in all {
            assert!(!(err.is_fatal() && err.is_transient()), "{:?}", err);
        }
        assert!(!SocketError::None.is_fatal());
        assert!(!SocketError::None.is_transient());
    }

    #[test]
    fn test_fatal_and_transient_partition() {
        let fatal = [
            SocketError::Unknown(98765),
            SocketError::ConnReset,
            SocketError::ConnRefused,
            SocketError::ConnAborted,
            SocketError::TimedOut,
            SocketError::HostUnreachable,
            SocketError::NetUnreachable,
            SocketError::BadSocket,
            SocketError::AddrFault,
            SocketError::SockTypeMismatch,
            SocketError::SockFamilyUnsupported,
            SocketError::AddrInUse,
        ];
        let transient = [
            SocketError::NetReset,
            SocketError::MsgTooLarge,
            SocketError::InProgress,
            SocketError::Again,
            SocketError::NotConnected,
            SocketError::AddrNotAvailable,
            SocketError::AlreadyConnected,
            SocketError::Interrupted,
            SocketError::Shutdown,
        ];
        for err in fatal {
            assert!(err.is_fatal() && !err.is_transient(), "{:?}", err);
        }
        for err in transient {
            assert!(err.is_transient() && !err.is_fatal(), "{:?}", err);
        }
    }

    #[test]
    fn test_zero_code_is_none() {
        assert_eq!(SocketError::from_os_error(0), SocketError::None);
        assert!(SocketError::None.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_errno_table() {
        assert_eq!(SocketError::from_os_error(libc::EWOULDBLOCK), SocketError::Again);
        assert_eq!(SocketError::from_os_error(libc::ECONNREFUSED), SocketError::ConnRefused);
        assert_eq!(SocketError::from_os_error(libc::ETIMEDOUT), SocketError::TimedOut);
        assert_eq!(SocketError::from_os_error(libc::EADDRINUSE), SocketError::AddrInUse);
        assert_eq!(SocketError::from_os_error(libc::EMSGSIZE), SocketError::MsgTooLarge);
        assert_eq!(SocketError::from_os_error(libc::EBADF), SocketError::BadSocket);
    }

    #[test]
    fn test_unknown_keeps_raw_code() {
        let err = SocketError::from_os_error(98765);
        assert_eq!(err, SocketError::Unknown(98765));
        assert!(err.to_string().contains("98765"));
    }

    #[test]
    fn test_io_error_without_code() {
        let err = io::Error::new(io::ErrorKind::WouldBlock, "nope");
        assert_eq!(SocketError::from_io_error(&err), SocketError::Again);
        let err = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(SocketError::from_io_error(&err), SocketError::TimedOut);
    }

    #[test]
    fn test_display() {
        assert_eq!(SocketError::TimedOut.to_string(), "connection timed out (timed-out)");
        let kind: ErrorKind = SocketError::ConnReset.into();
        assert!(kind.to_string().contains("conn-reset"));
        let kind = ErrorKind::AddressParse("[::1".to_string());
        assert!(kind.to_string().contains("[::1"));
    }
}
