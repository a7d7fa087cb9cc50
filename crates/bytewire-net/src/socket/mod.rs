//! Cross-platform TCP/UDP socket.
//!
//! [`Socket`] wraps one OS descriptor and normalizes its behavior:
//! - every failed call is translated to a [`SocketError`] and kept as the last error
//! - transient errors (would-block, interrupted, truncation, ...) move 0 bytes and leave
//!   the socket untouched
//! - fatal errors close the descriptor when auto-close is on, otherwise mark the socket
//!   disconnected
//!
//! All state sits behind a per-socket mutex. Calls that can block (`recv`, `recvfrom`,
//! `accept`, `poll`, `select`, the connect wait) copy the descriptor and release the mutex
//! before entering the kernel, so another thread can `close()` the socket to cancel them;
//! the blocked call then returns [`SocketError::BadSocket`].

use std::{
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hasher},
    io,
    net::Shutdown,
};

use bytewire_core::{
    config::Config,
    constants::{MAX_FLUSH_DATAGRAMS, RANDOM_PORT_ATTEMPTS, RANDOM_PORT_MIN, SKIP_BUFFER_SIZE},
    error::SocketError,
    time::Clock,
};
use parking_lot::Mutex;
use socket2::{SockAddr, Socket as Socket2};
use tracing::{debug, trace, warn};

use crate::{
    address::IpAddress,
    load_balancer::LoadBalancer,
    protocol::{AddressFamily, IpProtocol, ProtocolInfo, SocketCategory, SocketType},
};

mod options;
mod poll;
mod sys;

pub use options::{BufferType, PollFlag, SelectFlag, SocketOpt, SocketOption};
pub use sys::RawHandle;

/// Mutable socket state guarded by the socket mutex.
struct SocketState {
    sock: Option<Socket2>,
    addr: IpAddress,
    shared: bool,
    blocking: bool,
    auto_close: bool,
    nodelay: bool,
    connected: bool,
    category: SocketCategory,
    sock_type: SocketType,
}

impl SocketState {
    fn closed(addr: IpAddress) -> Self {
        Self {
            sock: None,
            addr,
            shared: false,
            blocking: true,
            auto_close: false,
            nodelay: true,
            connected: false,
            category: SocketCategory::Unknown,
            sock_type: SocketType::Unspec,
        }
    }

    fn handle(&self) -> Option<RawHandle> {
        self.sock.as_ref().map(sys::raw)
    }

    fn is_handle(&self, handle: RawHandle) -> bool {
        self.handle() == Some(handle)
    }

    fn with_socket<T>(&self, f: impl FnOnce(&Socket2) -> io::Result<T>) -> Result<T, SocketError> {
        match &self.sock {
            Some(sock) => f(sock).map_err(|e| SocketError::from_io_error(&e)),
            None => Err(SocketError::BadSocket),
        }
    }

    fn close(&mut self) {
        if let Some(sock) = self.sock.take() {
            if self.shared {
                // someone else owns the descriptor
                let _ = sys::into_raw(sock);
            } else {
                debug!("Closing socket {:?} ({})", sys::raw(&sock), self.addr);
                // wakes up threads blocked on this descriptor
                let _ = sock.shutdown(Shutdown::Both);
                drop(sock);
            }
        }
        self.connected = false;
        self.category = SocketCategory::Unknown;
        self.sock_type = SocketType::Unspec;
    }
}

/// A TCP or UDP socket with a normalized error model.
///
/// Constructed closed; opened by [`create`](Socket::create), [`listen`](Socket::listen),
/// [`connect`](Socket::connect) or [`accept`](Socket::accept). Dropping a socket closes
/// its descriptor unless it is marked shared.
pub struct Socket {
    state: Mutex<SocketState>,
    last_err: Mutex<SocketError>,
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Socket")
            .field("handle", &state.handle())
            .field("addr", &state.addr)
            .field("category", &state.category)
            .field("sock_type", &state.sock_type)
            .field("last_err", &*self.last_err.lock())
            .finish()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.state.get_mut().close();
    }
}

impl Socket {
    /// Creates a closed socket.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SocketState::closed(IpAddress::default())),
            last_err: Mutex::new(SocketError::None),
        }
    }

    /// Creates an invalid socket carrying a diagnostic error.
    pub fn from_err_code(err: SocketError, addr: IpAddress) -> Self {
        Self {
            state: Mutex::new(SocketState::closed(addr)),
            last_err: Mutex::new(err),
        }
    }

    /// Adopts an existing OS handle.
    ///
    /// The handle is validated by querying `SO_TYPE`. A shared socket never closes it.
    ///
    /// # Safety
    /// `handle` must be an open socket. Unless `shared` is set, ownership passes to the
    /// returned socket.
    pub unsafe fn from_os_handle(
        handle: RawHandle,
        addr: IpAddress,
        shared: bool,
        blocking: bool,
    ) -> Result<Socket, SocketError> {
        Self::from_socket2(sys::from_raw(handle), addr, shared, blocking)
    }

    /// Adopts a `socket2` socket, validating it by querying `SO_TYPE`.
    pub fn from_socket2(
        sock: Socket2,
        addr: IpAddress,
        shared: bool,
        blocking: bool,
    ) -> Result<Socket, SocketError> {
        let sock_type = match sock.r#type() {
            Ok(ty) => SocketType::from_raw(i32::from(ty)),
            Err(e) => {
                let err = SocketError::from_io_error(&e);
                warn!("Rejected invalid socket handle {:?}: {}", sys::raw(&sock), err);
                // never close a handle we could not validate
                let _ = sys::into_raw(sock);
                return Err(err);
            }
        };
        let nodelay = sock_type == SocketType::Stream && sock.nodelay().unwrap_or(false);
        Ok(Self::adopt(sock, addr, SocketCategory::Unknown, sock_type, shared, blocking, nodelay))
    }

    fn adopt(
        sock: Socket2,
        addr: IpAddress,
        category: SocketCategory,
        sock_type: SocketType,
        shared: bool,
        blocking: bool,
        nodelay: bool,
    ) -> Socket {
        let state = SocketState {
            sock: Some(sock),
            addr,
            shared,
            blocking,
            auto_close: category == SocketCategory::Accept,
            nodelay,
            connected: true,
            category,
            sock_type,
        };
        Self { state: Mutex::new(state), last_err: Mutex::new(SocketError::None) }
    }

    fn set_last_err(&self, err: SocketError) {
        *self.last_err.lock() = err;
    }

    /// Stores the outcome of a non-transfer call as the last error.
    fn record<T>(&self, result: Result<T, SocketError>) -> Result<T, SocketError> {
        match &result {
            Ok(_) => self.set_last_err(SocketError::None),
            Err(err) => {
                debug!("Socket call failed: {}", err);
                self.set_last_err(*err);
            }
        }
        result
    }

    fn bad_socket<T>(&self) -> Result<T, SocketError> {
        self.set_last_err(SocketError::BadSocket);
        Err(SocketError::BadSocket)
    }

    fn live_handle(&self) -> Result<RawHandle, SocketError> {
        let handle = self.state.lock().handle();
        match handle {
            Some(handle) => Ok(handle),
            None => self.bad_socket(),
        }
    }

    /// Classifies a failed transfer.
    ///
    /// Transient errors report 0 bytes moved. Fatal errors close the socket if auto-close
    /// is enabled, otherwise clear the connected flag.
    fn handle_error(&self, state: &mut SocketState, err: SocketError) -> Result<usize, SocketError> {
        self.set_last_err(err);
        if err.is_transient() || err.is_none() {
            trace!("Socket {:?} transient error: {}", state.handle(), err);
            return Ok(0);
        }
        warn!("Socket {:?} ({}) failed: {}", state.handle(), state.addr, err);
        if state.auto_close {
            debug!("Auto-closing socket {:?}", state.handle());
            state.close();
        } else {
            state.connected = false;
        }
        Err(err)
    }

    /// Completes a receive performed without the lock.
    fn finish_recv(
        &self,
        handle: RawHandle,
        result: io::Result<usize>,
    ) -> Result<usize, SocketError> {
        let mut state = self.state.lock();
        if !state.is_handle(handle) {
            // closed by another thread while we were in the kernel
            return self.bad_socket();
        }
        match result {
            Ok(0) if state.sock_type == SocketType::Stream => {
                debug!("Socket {:?} closed gracefully by {}", handle, state.addr);
                self.set_last_err(SocketError::None);
                state.close();
                Ok(0)
            }
            Ok(n) => {
                self.set_last_err(SocketError::None);
                Ok(n)
            }
            Err(e) => self.handle_error(&mut state, SocketError::from_io_error(&e)),
        }
    }

    // ------------------------------------------------------------------ lifecycle

    /// Allocates a new descriptor, closing any previous one.
    ///
    /// TCP sockets get no-delay unless `NAGLE` is set. `REUSE_ADDR` also enables port
    /// reuse on POSIX.
    pub fn create(
        &mut self,
        family: AddressFamily,
        proto: IpProtocol,
        options: SocketOption,
    ) -> Result<(), SocketError> {
        self.close();
        let domain = match family.to_domain() {
            Some(domain) => domain,
            None => return self.record(Err(SocketError::SockFamilyUnsupported)),
        };
        let sock_type = proto.socket_type();
        let ty = match sock_type.to_type() {
            Some(ty) => ty,
            None => return self.record(Err(SocketError::SockTypeMismatch)),
        };
        let sock = match Socket2::new(domain, ty, proto.to_protocol()) {
            Ok(sock) => sock,
            Err(e) => return self.record(Err(SocketError::from_io_error(&e))),
        };

        let blocking = options.is_blocking();
        let nodelay = !options.contains(SocketOption::NAGLE);
        let configured = (|| -> io::Result<()> {
            if sock_type == SocketType::Stream {
                sock.set_nodelay(nodelay)?;
            }
            sock.set_nonblocking(!blocking)?;
            if options.contains(SocketOption::REUSE_ADDR) {
                sock.set_reuse_address(true)?;
                #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
                sock.set_reuse_port(true)?;
            }
            Ok(())
        })();
        if let Err(e) = configured {
            return self.record(Err(SocketError::from_io_error(&e)));
        }

        trace!("Created {} {} socket {:?}", family, sock_type, sys::raw(&sock));
        let mut state = self.state.lock();
        *state = SocketState {
            sock: Some(sock),
            addr: IpAddress::default(),
            shared: false,
            blocking,
            auto_close: false,
            nodelay,
            connected: true,
            category: SocketCategory::Unknown,
            sock_type,
        };
        drop(state);
        self.set_last_err(SocketError::None);
        Ok(())
    }

    /// Binds to a local address.
    pub fn bind(&self, addr: &IpAddress) -> Result<(), SocketError> {
        let sa = match addr.to_socket_addr() {
            Some(sa) => SockAddr::from(sa),
            None => return self.record(Err(SocketError::AddrFault)),
        };
        let mut state = self.state.lock();
        let result = state.with_socket(|s| s.bind(&sa));
        if result.is_ok() {
            state.addr = *addr;
        }
        self.record(result)
    }

    /// Creates, binds and, for TCP, starts listening with the system maximum backlog.
    pub fn listen(
        &mut self,
        local: &IpAddress,
        proto: IpProtocol,
        options: SocketOption,
    ) -> Result<(), SocketError> {
        self.create(local.family(), proto, options)?;
        let result = self.bind(local).and_then(|_| {
            if proto.socket_type() != SocketType::Stream {
                return Ok(());
            }
            let mut state = self.state.lock();
            let result = state.with_socket(|s| s.listen(sys::BACKLOG));
            if result.is_ok() {
                state.category = SocketCategory::Listen;
            }
            self.record(result)
        });
        if result.is_err() {
            self.state.lock().close();
        }
        result
    }

    /// Opens a listening (TCP) or bound (UDP) socket.
    pub fn listen_to(
        local: &IpAddress,
        proto: IpProtocol,
        options: SocketOption,
    ) -> Result<Socket, SocketError> {
        let mut sock = Socket::new();
        sock.listen(local, proto, options)?;
        Ok(sock)
    }

    /// Opens a UDP socket bound to `local`.
    pub fn make_udp(local: &IpAddress, options: SocketOption) -> Result<Socket, SocketError> {
        Self::listen_to(local, IpProtocol::Udp, options)
    }

    /// Binds a UDP socket to a random IPv4 port, trying several ports.
    pub fn make_udp_randomport(options: SocketOption) -> Result<Socket, SocketError> {
        Self::randomport(IpProtocol::Udp, options, RANDOM_PORT_ATTEMPTS)
    }

    /// Opens a TCP listener on a random IPv4 port, trying several ports.
    pub fn make_tcp_randomport(options: SocketOption) -> Result<Socket, SocketError> {
        Self::randomport(IpProtocol::Tcp, options, RANDOM_PORT_ATTEMPTS)
    }

    /// Opens a random-port socket with the options and attempt count from `config`.
    pub fn randomport_with(proto: IpProtocol, config: &Config) -> Result<Socket, SocketError> {
        let sock =
            Self::randomport(proto, SocketOption::from_config(config), config.random_port_attempts)?;
        sock.apply_config(config);
        Ok(sock)
    }

    /// Opens a listening (TCP) or bound (UDP) socket configured by `config`.
    pub fn listen_with(
        local: &IpAddress,
        proto: IpProtocol,
        config: &Config,
    ) -> Result<Socket, SocketError> {
        let sock = Self::listen_to(local, proto, SocketOption::from_config(config))?;
        sock.apply_config(config);
        Ok(sock)
    }

    /// Connects a TCP socket, bounded by `config.connect_timeout_ms` when set.
    pub fn connect_with(remote: &IpAddress, config: &Config) -> Result<Socket, SocketError> {
        let options = SocketOption::from_config(config);
        let sock = match config.connect_timeout_ms {
            Some(timeout_ms) => Self::connect_to_timeout(remote, timeout_ms, options)?,
            None => Self::connect_to(remote, options)?,
        };
        sock.set_shared(config.socket_shared);
        Ok(sock)
    }

    fn apply_config(&self, config: &Config) {
        let mut state = self.state.lock();
        state.auto_close = config.socket_auto_close;
        state.shared = config.socket_shared;
    }

    fn randomport(
        proto: IpProtocol,
        options: SocketOption,
        attempts: u32,
    ) -> Result<Socket, SocketError> {
        let mut last = SocketError::AddrInUse;
        for _ in 0..attempts.max(1) {
            let port = random_port();
            match Self::listen_to(&IpAddress::any(AddressFamily::IPv4, port), proto, options) {
                Ok(sock) => return Ok(sock),
                Err(err) => {
                    debug!("Port {} unavailable for {}: {}", port, proto, err);
                    last = err;
                }
            }
        }
        Err(last)
    }

    /// Blocking TCP connect.
    ///
    /// The connect itself always blocks; the blocking mode from `options` is applied
    /// once connected.
    pub fn connect(
        &mut self,
        remote: &IpAddress,
        options: SocketOption,
    ) -> Result<(), SocketError> {
        let sa = match remote.to_socket_addr() {
            Some(sa) => SockAddr::from(sa),
            None => return self.record(Err(SocketError::AddrFault)),
        };
        let create_opts = options.without(SocketOption::NONBLOCK) | SocketOption::BLOCKING;
        self.create(remote.family(), IpProtocol::Tcp, create_opts)?;

        let mut state = self.state.lock();
        if let Err(err) = state.with_socket(|s| s.connect(&sa)) {
            debug!("Connect to {} failed: {}", remote, err);
            self.set_last_err(err);
            state.close();
            return Err(err);
        }
        let blocking = options.is_blocking();
        if let Err(err) = state.with_socket(|s| s.set_nonblocking(!blocking)) {
            self.set_last_err(err);
            state.close();
            return Err(err);
        }
        state.blocking = blocking;
        state.addr = *remote;
        state.category = SocketCategory::Client;
        state.auto_close = true;
        Ok(())
    }

    /// Non-blocking TCP connect that waits up to `timeout_ms` for write readiness.
    ///
    /// On timeout the socket is closed and [`SocketError::TimedOut`] is returned and
    /// kept as the last error.
    pub fn connect_timeout(
        &mut self,
        remote: &IpAddress,
        timeout_ms: i32,
        options: SocketOption,
    ) -> Result<(), SocketError> {
        let sa = match remote.to_socket_addr() {
            Some(sa) => SockAddr::from(sa),
            None => return self.record(Err(SocketError::AddrFault)),
        };
        let create_opts = options.without(SocketOption::BLOCKING) | SocketOption::NONBLOCK;
        self.create(remote.family(), IpProtocol::Tcp, create_opts)?;

        let handle = self.live_handle()?;
        let started = self.state.lock().with_socket(|s| s.connect(&sa));
        let outcome = match started {
            Ok(()) => Ok(()),
            Err(SocketError::InProgress) | Err(SocketError::Again) => {
                self.wait_connected(handle, timeout_ms)
            }
            Err(err) => Err(err),
        };

        let mut state = self.state.lock();
        if let Err(err) = outcome {
            debug!("Connect to {} failed: {}", remote, err);
            self.set_last_err(err);
            state.close();
            return Err(err);
        }
        if options.is_blocking() {
            if let Err(err) = state.with_socket(|s| s.set_nonblocking(false)) {
                self.set_last_err(err);
                state.close();
                return Err(err);
            }
            state.blocking = true;
        }
        state.addr = *remote;
        state.category = SocketCategory::Client;
        state.auto_close = true;
        self.set_last_err(SocketError::None);
        Ok(())
    }

    fn wait_connected(&self, handle: RawHandle, timeout_ms: i32) -> Result<(), SocketError> {
        let mut revents = Vec::with_capacity(1);
        match sys::poll(&[handle], false, true, timeout_ms, &mut revents) {
            Ok(0) => Err(SocketError::TimedOut),
            Ok(_) => {
                let state = self.state.lock();
                if !state.is_handle(handle) {
                    return Err(SocketError::BadSocket);
                }
                match state.with_socket(|s| s.take_error())? {
                    Some(e) => Err(SocketError::from_io_error(&e)),
                    None => Ok(()),
                }
            }
            Err(e) => Err(SocketError::from_io_error(&e)),
        }
    }

    /// Connects a new blocking-connect TCP socket.
    pub fn connect_to(remote: &IpAddress, options: SocketOption) -> Result<Socket, SocketError> {
        let mut sock = Socket::new();
        sock.connect(remote, options)?;
        Ok(sock)
    }

    /// Connects a new TCP socket with a timeout.
    pub fn connect_to_timeout(
        remote: &IpAddress,
        timeout_ms: i32,
        options: SocketOption,
    ) -> Result<Socket, SocketError> {
        let mut sock = Socket::new();
        sock.connect_timeout(remote, timeout_ms, options)?;
        Ok(sock)
    }

    /// Accepts a pending connection, waiting up to `timeout_ms` (negative waits forever).
    ///
    /// Returns `Ok(None)` when no client arrived in time. Accepted sockets have auto-close
    /// on and inherit the listener's blocking and no-delay modes.
    pub fn accept(&self, timeout_ms: i32) -> Result<Option<Socket>, SocketError> {
        let (handle, blocking, nodelay) = {
            let state = self.state.lock();
            if state.sock_type == SocketType::Datagram {
                drop(state);
                return self.record(Err(SocketError::SockTypeMismatch));
            }
            match state.handle() {
                Some(handle) => (handle, state.blocking, state.nodelay),
                None => {
                    drop(state);
                    return self.bad_socket();
                }
            }
        };

        let mut revents = Vec::with_capacity(1);
        let waited = sys::poll(&[handle], true, false, timeout_ms, &mut revents);
        let accepted = match waited {
            Ok(0) => return Ok(None),
            Ok(_) => sys::borrow(handle).accept(),
            Err(e) => Err(e),
        };

        let mut state = self.state.lock();
        if !state.is_handle(handle) {
            drop(state);
            return self.bad_socket();
        }
        match accepted {
            Ok((sock, addr)) => {
                drop(state);
                let addr = addr.as_socket().map(IpAddress::from).unwrap_or_default();
                if let Err(e) = sock.set_nonblocking(!blocking).and_then(|_| sock.set_nodelay(nodelay))
                {
                    return self.record(Err(SocketError::from_io_error(&e)));
                }
                debug!("Accepted {} on {:?}", addr, handle);
                let client = Self::adopt(
                    sock,
                    addr,
                    SocketCategory::Accept,
                    SocketType::Stream,
                    false,
                    blocking,
                    nodelay,
                );
                Ok(Some(client))
            }
            Err(e) => self.handle_error(&mut state, SocketError::from_io_error(&e)).map(|_| None),
        }
    }

    /// Closes the descriptor unless shared. Safe to call from any thread.
    pub fn close(&self) {
        self.state.lock().close();
    }

    /// Shuts down one or both directions of a connection.
    pub fn shutdown(&self, how: Shutdown) -> Result<(), SocketError> {
        let result = self.state.lock().with_socket(|s| s.shutdown(how));
        self.record(result)
    }

    // ------------------------------------------------------------------ transfer

    /// Sends `data` on a connected socket.
    ///
    /// Returns bytes sent; 0 for an empty buffer or a transient error.
    pub fn send(&self, data: &[u8]) -> Result<usize, SocketError> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut state = self.state.lock();
        match state.with_socket(|s| s.send_with_flags(data, sys::SEND_FLAGS)) {
            Ok(n) => {
                self.set_last_err(SocketError::None);
                Ok(n)
            }
            Err(err) => self.handle_error(&mut state, err),
        }
    }

    /// Sends a datagram to `to`. Rejected on stream sockets.
    pub fn sendto(&self, to: &IpAddress, data: &[u8]) -> Result<usize, SocketError> {
        if data.is_empty() {
            return Ok(0);
        }
        let sa = match to.to_socket_addr() {
            Some(sa) => SockAddr::from(sa),
            None => return self.record(Err(SocketError::AddrFault)),
        };
        let mut state = self.state.lock();
        if state.sock_type == SocketType::Stream {
            drop(state);
            return self.record(Err(SocketError::SockTypeMismatch));
        }
        match state.with_socket(|s| s.send_to_with_flags(data, &sa, sys::SEND_FLAGS)) {
            Ok(n) => {
                self.set_last_err(SocketError::None);
                Ok(n)
            }
            Err(err) => self.handle_error(&mut state, err),
        }
    }

    /// Waits for the pacer to allow `data.len()` bytes, then sends the datagram.
    pub fn sendto_balanced<C: Clock>(
        &self,
        balancer: &mut LoadBalancer<C>,
        to: &IpAddress,
        data: &[u8],
    ) -> Result<usize, SocketError> {
        balancer.wait_to_send(data.len());
        self.sendto(to, data)
    }

    /// Receives into `buf`.
    ///
    /// On stream sockets `Ok(0)` with the socket closed means the peer closed gracefully.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, SocketError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let handle = self.live_handle()?;
        let result = sys::borrow(handle).recv(sys::as_uninit(buf));
        self.finish_recv(handle, result)
    }

    /// Receives a datagram into `buf`, returning its size and sender.
    ///
    /// Datagrams larger than `buf` are truncated, or reported as a transient
    /// [`SocketError::MsgTooLarge`] on platforms that refuse them.
    pub fn recvfrom(&self, buf: &mut [u8]) -> Result<(usize, IpAddress), SocketError> {
        if buf.is_empty() {
            return Ok((0, IpAddress::default()));
        }
        let handle = self.live_handle()?;
        let mut from = IpAddress::default();
        let result = sys::borrow(handle).recv_from(sys::as_uninit(buf)).map(|(n, addr)| {
            if let Some(sa) = addr.as_socket() {
                from = IpAddress::from(sa);
            }
            n
        });
        self.finish_recv(handle, result).map(|n| (n, from))
    }

    /// Copies pending bytes without consuming them.
    ///
    /// Never blocks: blocking sockets are polled first and report 0 when nothing is pending.
    pub fn peek(&self, buf: &mut [u8]) -> Result<usize, SocketError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.state.lock();
        let handle = match state.handle() {
            Some(handle) => handle,
            None => {
                drop(state);
                return self.bad_socket();
            }
        };
        if state.blocking && !readable_now(handle) {
            return Ok(0);
        }
        match sys::borrow(handle).peek(sys::as_uninit(buf)) {
            Ok(0) if state.sock_type == SocketType::Stream => {
                debug!("Socket {:?} closed gracefully by {}", handle, state.addr);
                state.close();
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => self.handle_error(&mut state, SocketError::from_io_error(&e)),
        }
    }

    /// Bytes readable without blocking.
    ///
    /// On datagram sockets this is the OS's native answer: the next datagram's size on
    /// Linux, the total of all queued datagrams on Windows. Use
    /// [`peek_datagram_size`](Socket::peek_datagram_size) for a uniform answer.
    pub fn available(&self) -> usize {
        let state = self.state.lock();
        let result = match state.handle() {
            Some(handle) => sys::available(handle).map_err(|e| SocketError::from_io_error(&e)),
            None => Err(SocketError::BadSocket),
        };
        drop(state);
        self.record(result).unwrap_or(0)
    }

    /// Size of the next single datagram, 0 if none is queued.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn peek_datagram_size(&self) -> usize {
        self.available()
    }

    /// Size of the next single datagram, 0 if none is queued.
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub fn peek_datagram_size(&self) -> usize {
        use std::cell::RefCell;

        use bytewire_core::constants::MAX_DATAGRAM_SIZE;

        thread_local! {
            static PEEK_SCRATCH: RefCell<Box<[u8]>> =
                RefCell::new(vec![0u8; MAX_DATAGRAM_SIZE].into_boxed_slice());
        }

        if self.available() == 0 {
            return 0;
        }
        PEEK_SCRATCH.with(|scratch| self.peek(&mut scratch.borrow_mut()).unwrap_or(0))
    }

    /// Discards up to `count` incoming bytes, returning how many were dropped.
    ///
    /// Datagram sockets discard whole datagrams while data is queued.
    pub fn skip(&self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let mut scratch = [0u8; SKIP_BUFFER_SIZE];
        let mut skipped = 0;
        if self.sock_type() == SocketType::Stream {
            while skipped < count {
                let want = (count - skipped).min(scratch.len());
                match self.recv(&mut scratch[..want]) {
                    Ok(n) if n > 0 => skipped += n,
                    _ => break,
                }
            }
        } else {
            while skipped < count {
                let size = self.peek_datagram_size();
                if size == 0 {
                    break;
                }
                if self.recvfrom(&mut scratch).is_err() {
                    break;
                }
                skipped += size.min(count - skipped);
            }
        }
        skipped
    }

    /// Flushes pending output and discards pending input.
    pub fn flush(&self) {
        self.flush_send_buf();
        self.flush_recv_buf();
    }

    /// Pushes out data held back by Nagle's algorithm on TCP.
    pub fn flush_send_buf(&self) {
        if self.sock_type() != SocketType::Stream {
            return;
        }
        let nagle = !self.is_nodelay();
        if nagle {
            let _ = self.set_nagle(false);
        }
        let _ = self.set_nagle(nagle);
    }

    /// Discards everything currently queued for receiving.
    pub fn flush_recv_buf(&self) {
        if self.sock_type() == SocketType::Stream {
            self.skip(self.available());
            return;
        }
        for _ in 0..MAX_FLUSH_DATAGRAMS {
            if self.skip(self.available()) == 0 {
                break;
            }
        }
    }

    /// Receives whatever is pending, sized by [`available`](Socket::available).
    pub fn recv_data(&self) -> Result<Vec<u8>, SocketError> {
        let count = self.available();
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; count];
        let n = self.recv(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Receives one pending datagram and its sender.
    pub fn recvfrom_data(&self) -> Result<(Vec<u8>, IpAddress), SocketError> {
        let count = self.available();
        if count == 0 {
            return Ok((Vec::new(), IpAddress::default()));
        }
        let mut buf = vec![0u8; count];
        let (n, from) = self.recvfrom(&mut buf)?;
        buf.truncate(n);
        Ok((buf, from))
    }

    /// Receives pending data as text, replacing invalid UTF-8.
    pub fn recv_str(&self) -> Result<String, SocketError> {
        self.recv_data().map(|data| String::from_utf8_lossy(&data).into_owned())
    }

    /// Waits up to `timeout_ms` for data, then receives it.
    pub fn recv_timeout(&self, timeout_ms: i32) -> Result<Vec<u8>, SocketError> {
        if !self.wait_available(timeout_ms) {
            return Ok(Vec::new());
        }
        self.recv_data()
    }

    /// Waits up to `timeout_ms` for a datagram, then receives it.
    pub fn recvfrom_timeout(&self, timeout_ms: i32) -> Result<(Vec<u8>, IpAddress), SocketError> {
        if !self.wait_available(timeout_ms) {
            return Ok((Vec::new(), IpAddress::default()));
        }
        self.recvfrom_data()
    }

    /// Bytes sent but still queued in the kernel (Linux only, 0 elsewhere).
    pub fn send_buffer_remaining(&self) -> usize {
        let state = self.state.lock();
        state.handle().and_then(|h| sys::send_queue(h).ok()).unwrap_or(0)
    }

    // ------------------------------------------------------------------ state

    /// True if the descriptor is valid, has no pending fatal error and, for TCP
    /// client and accepted sockets, the peer has not hung up.
    pub fn connected(&self) -> bool {
        let mut state = self.state.lock();
        let handle = match state.handle() {
            Some(handle) if state.connected => handle,
            _ => return false,
        };
        match state.with_socket(|s| s.take_error()) {
            Ok(None) => {}
            Ok(Some(e)) => {
                let err = SocketError::from_io_error(&e);
                return self.handle_error(&mut state, err).is_ok();
            }
            Err(err) => return self.handle_error(&mut state, err).is_ok(),
        }
        let probe_peer = state.sock_type == SocketType::Stream
            && matches!(state.category, SocketCategory::Client | SocketCategory::Accept);
        if !probe_peer || !readable_now(handle) {
            return true;
        }
        let mut probe = [0u8; 1];
        match sys::borrow(handle).peek(sys::as_uninit(&mut probe)) {
            Ok(n) if n > 0 => true,
            Ok(_) => {
                debug!("Socket {:?} peer {} hung up", handle, state.addr);
                state.close();
                false
            }
            Err(e) => self.handle_error(&mut state, SocketError::from_io_error(&e)).is_ok(),
        }
    }

    /// True while the socket holds a descriptor.
    pub fn good(&self) -> bool {
        self.state.lock().sock.is_some()
    }

    /// True once closed.
    pub fn is_closed(&self) -> bool {
        !self.good()
    }

    /// OS handle, None when closed.
    pub fn os_handle(&self) -> Option<RawHandle> {
        self.state.lock().handle()
    }

    /// Remote address for clients and accepted sockets, bound address otherwise.
    pub fn address(&self) -> IpAddress {
        self.state.lock().addr
    }

    /// Local endpoint as reported by the OS.
    pub fn local_addr(&self) -> IpAddress {
        let state = self.state.lock();
        state
            .with_socket(|s| s.local_addr())
            .ok()
            .and_then(|sa| sa.as_socket())
            .map(IpAddress::from)
            .unwrap_or_default()
    }

    /// Remote endpoint as reported by the OS.
    pub fn peer_addr(&self) -> IpAddress {
        let state = self.state.lock();
        state
            .with_socket(|s| s.peer_addr())
            .ok()
            .and_then(|sa| sa.as_socket())
            .map(IpAddress::from)
            .unwrap_or_default()
    }

    /// Role of this socket.
    pub fn category(&self) -> SocketCategory {
        self.state.lock().category
    }

    /// Cached socket type.
    pub fn sock_type(&self) -> SocketType {
        self.state.lock().sock_type
    }

    /// Re-reads `SO_TYPE` and refreshes the cached socket type.
    pub fn update_socket_type(&self) -> SocketType {
        let mut state = self.state.lock();
        let result = state.with_socket(|s| s.r#type());
        state.sock_type = match &result {
            Ok(ty) => SocketType::from_raw(i32::from(*ty)),
            Err(_) => SocketType::Unspec,
        };
        let sock_type = state.sock_type;
        drop(state);
        let _ = self.record(result);
        sock_type
    }

    /// IP protocol implied by the socket type.
    pub fn ipproto(&self) -> IpProtocol {
        IpProtocol::of_socket_type(self.sock_type())
    }

    /// Address family of the local endpoint.
    pub fn family(&self) -> AddressFamily {
        match self.local_addr().family() {
            AddressFamily::Unspec => self.address().family(),
            family => family,
        }
    }

    /// Family, type and protocol.
    pub fn protocol_info(&self) -> ProtocolInfo {
        ProtocolInfo { family: self.family(), sock_type: self.sock_type(), protocol: self.ipproto() }
    }

    /// True if fatal errors close the descriptor.
    pub fn auto_close(&self) -> bool {
        self.state.lock().auto_close
    }

    /// Enables or disables closing on fatal errors.
    pub fn set_auto_close(&self, auto_close: bool) {
        self.state.lock().auto_close = auto_close;
    }

    /// True if dropping the socket leaves the descriptor open.
    pub fn is_shared(&self) -> bool {
        self.state.lock().shared
    }

    /// Marks the descriptor as owned elsewhere.
    pub fn set_shared(&self, shared: bool) {
        self.state.lock().shared = shared;
    }

    /// Last recorded error.
    pub fn last_err_type(&self) -> SocketError {
        *self.last_err.lock()
    }

    /// Last recorded error as text, empty when there is none.
    pub fn last_err(&self) -> String {
        match self.last_err_type() {
            SocketError::None => String::new(),
            err => err.to_string(),
        }
    }
}

/// True if a zero-timeout poll reports pending input or a hangup.
fn readable_now(handle: RawHandle) -> bool {
    let mut revents = Vec::with_capacity(1);
    match sys::poll(&[handle], true, false, 0, &mut revents) {
        Ok(n) if n > 0 => revents.first().map_or(false, |r| r.readable || r.hangup),
        _ => false,
    }
}

fn random_port() -> u16 {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(std::process::id() as u64);
    let span = (u16::MAX - RANDOM_PORT_MIN) as u64 + 1;
    RANDOM_PORT_MIN + (hasher.finish() % span) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_socket_is_closed() {
        let sock = Socket::new();
        assert!(!sock.good());
        assert!(sock.is_closed());
        assert!(!sock.connected());
        assert_eq!(sock.sock_type(), SocketType::Unspec);
        assert_eq!(sock.os_handle(), None);
    }

    #[test]
    fn test_zero_length_transfers_are_ignored() {
        let sock = Socket::new();
        assert_eq!(sock.send(&[]), Ok(0));
        assert_eq!(sock.recv(&mut []), Ok(0));
        assert_eq!(sock.peek(&mut []), Ok(0));
        assert_eq!(sock.skip(0), 0);
        assert_eq!(sock.last_err_type(), SocketError::None);
    }

    #[test]
    fn test_closed_socket_reports_bad_socket() {
        let sock = Socket::new();
        let mut buf = [0u8; 4];
        assert_eq!(sock.recv(&mut buf), Err(SocketError::BadSocket));
        assert_eq!(sock.last_err_type(), SocketError::BadSocket);
        assert_eq!(sock.available(), 0);
    }

    #[test]
    fn test_from_err_code() {
        let addr = IpAddress::localhost(9);
        let sock = Socket::from_err_code(SocketError::ConnRefused, addr);
        assert!(!sock.good());
        assert_eq!(sock.address(), addr);
        assert_eq!(sock.last_err_type(), SocketError::ConnRefused);
        assert!(sock.last_err().contains("refused"));
    }

    #[test]
    fn test_create_udp() {
        let mut sock = Socket::new();
        sock.create(AddressFamily::IPv4, IpProtocol::Udp, SocketOption::NONE).unwrap();
        assert!(sock.good());
        assert_eq!(sock.sock_type(), SocketType::Datagram);
        assert_eq!(sock.ipproto(), IpProtocol::Udp);
        assert!(!sock.is_blocking());
        assert_eq!(sock.update_socket_type(), SocketType::Datagram);
        sock.close();
        assert!(sock.is_closed());
    }

    #[test]
    fn test_create_unsupported_family() {
        let mut sock = Socket::new();
        let err = sock.create(AddressFamily::Unspec, IpProtocol::Tcp, SocketOption::NONE);
        assert_eq!(err, Err(SocketError::SockFamilyUnsupported));
        assert_eq!(sock.last_err_type(), SocketError::SockFamilyUnsupported);
    }

    #[test]
    fn test_tcp_defaults_to_nodelay() {
        let mut sock = Socket::new();
        sock.create(AddressFamily::IPv4, IpProtocol::Tcp, SocketOption::BLOCKING).unwrap();
        assert!(sock.is_nodelay());
        assert!(sock.is_blocking());
        sock.set_nagle(true).unwrap();
        assert!(!sock.is_nodelay());
    }

    #[test]
    fn test_sendto_rejected_on_stream() {
        let mut sock = Socket::new();
        sock.create(AddressFamily::IPv4, IpProtocol::Tcp, SocketOption::NONE).unwrap();
        let err = sock.sendto(&IpAddress::localhost(9), b"x");
        assert_eq!(err, Err(SocketError::SockTypeMismatch));
        // rejected calls do not close the socket
        assert!(sock.good());
    }

    #[test]
    fn test_accept_rejected_on_datagram() {
        let sock = Socket::make_udp(&IpAddress::localhost(0), SocketOption::NONE).unwrap();
        assert!(matches!(sock.accept(0), Err(SocketError::SockTypeMismatch)));
    }

    #[test]
    fn test_random_port_range() {
        for _ in 0..100 {
            assert!(random_port() >= RANDOM_PORT_MIN);
        }
    }

    #[test]
    fn test_shared_socket_survives_drop() {
        let owner = Socket::make_udp(&IpAddress::localhost(0), SocketOption::NONE).unwrap();
        let handle = owner.os_handle().unwrap();
        let addr = owner.local_addr();
        {
            let view = unsafe { Socket::from_os_handle(handle, addr, true, false) }.unwrap();
            assert!(view.is_shared());
            assert_eq!(view.sock_type(), SocketType::Datagram);
        }
        // still open after the shared view was dropped
        assert_eq!(owner.update_socket_type(), SocketType::Datagram);
        assert_eq!(owner.local_addr(), addr);
    }
}
