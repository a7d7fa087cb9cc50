//! Readiness waits.
//!
//! Poll results are re-verified against the pending byte count, since some platforms
//! under-report readability on UDP sockets and over-report it after a hangup.

use bytewire_core::error::SocketError;
use tracing::debug;

use super::{
    options::{PollFlag, SelectFlag},
    sys::{self, RawHandle, Revents},
    Socket, SocketState,
};
use crate::protocol::SocketType;

impl Socket {
    /// Waits up to `timeout_ms` (negative waits forever) for the requested readiness.
    ///
    /// Read readiness means bytes are pending or the peer closed the stream; a hangup
    /// with nothing left to read is not readable.
    pub fn poll(&self, timeout_ms: i32, flags: PollFlag) -> bool {
        let handle = match self.live_handle() {
            Ok(handle) => handle,
            Err(_) => return false,
        };
        let mut revents = Vec::with_capacity(1);
        let result = sys::poll(&[handle], flags.read(), flags.write(), timeout_ms, &mut revents);

        let mut state = self.state.lock();
        if !state.is_handle(handle) {
            drop(state);
            let _ = self.bad_socket::<()>();
            return false;
        }
        match result {
            Ok(_) => {
                let r = revents.first().copied().unwrap_or_default();
                self.interpret(&mut state, handle, r, flags.read(), flags.write())
            }
            Err(e) => {
                let _ = self.handle_error(&mut state, SocketError::from_io_error(&e));
                false
            }
        }
    }

    /// Polls several sockets at once, storing the indices of ready ones in `ready`.
    ///
    /// Closed sockets are skipped. Returns true if any socket is ready.
    pub fn poll_many(
        sockets: &[&Socket],
        ready: &mut Vec<usize>,
        timeout_ms: i32,
        flags: PollFlag,
    ) -> bool {
        ready.clear();
        let live: Vec<(usize, RawHandle)> = sockets
            .iter()
            .enumerate()
            .filter_map(|(index, sock)| sock.os_handle().map(|handle| (index, handle)))
            .collect();
        if live.is_empty() {
            return false;
        }

        let handles: Vec<RawHandle> = live.iter().map(|&(_, handle)| handle).collect();
        let mut revents = Vec::with_capacity(handles.len());
        if let Err(e) = sys::poll(&handles, flags.read(), flags.write(), timeout_ms, &mut revents) {
            debug!("Polling {} sockets failed: {}", handles.len(), e);
            return false;
        }

        for (&(index, handle), r) in live.iter().zip(revents) {
            let sock = sockets[index];
            let mut state = sock.state.lock();
            if !state.is_handle(handle) {
                continue;
            }
            if sock.interpret(&mut state, handle, r, flags.read(), flags.write()) {
                ready.push(index);
            }
        }
        !ready.is_empty()
    }

    /// `select`-based readiness wait on a single socket.
    pub fn select(&self, timeout_ms: i32, flags: SelectFlag) -> bool {
        let handle = match self.live_handle() {
            Ok(handle) => handle,
            Err(_) => return false,
        };
        let read = flags.contains(SelectFlag::READ);
        let write = flags.contains(SelectFlag::WRITE);
        let except = flags.contains(SelectFlag::EXCEPT);
        let result = sys::select(handle, timeout_ms, read, write, except);

        let mut state = self.state.lock();
        if !state.is_handle(handle) {
            drop(state);
            let _ = self.bad_socket::<()>();
            return false;
        }
        match result {
            Ok((readable, writable, exceptional)) => {
                let r = Revents { readable, writable, error: exceptional, ..Revents::default() };
                let pending = self.interpret(&mut state, handle, r, read, write);
                pending || (except && exceptional)
            }
            Err(e) => {
                let _ = self.handle_error(&mut state, SocketError::from_io_error(&e));
                false
            }
        }
    }

    /// True if the socket is connected and data arrives within `timeout_ms`.
    pub fn wait_available(&self, timeout_ms: i32) -> bool {
        self.connected() && self.poll(timeout_ms, PollFlag::Read) && self.available() > 0
    }

    fn interpret(
        &self,
        state: &mut SocketState,
        handle: RawHandle,
        r: Revents,
        read: bool,
        write: bool,
    ) -> bool {
        if r.invalid {
            let _ = self.handle_error(state, SocketError::BadSocket);
            return false;
        }
        if r.error {
            let err = match state.with_socket(|s| s.take_error()) {
                Ok(Some(e)) => SocketError::from_io_error(&e),
                Ok(None) => SocketError::None,
                Err(err) => err,
            };
            if self.handle_error(state, err).is_err() || !state.is_handle(handle) {
                return false;
            }
        }
        if read {
            let pending = sys::available(handle).map_or(false, |n| n > 0);
            if pending || (r.readable && !r.hangup) {
                return true;
            }
            // a stream at EOF is readable so the next recv observes the close
            if r.readable && r.hangup && state.sock_type == SocketType::Stream {
                return true;
            }
        }
        write && r.writable && !r.hangup
    }
}
