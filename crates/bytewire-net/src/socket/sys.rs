//! Raw OS calls that `socket2` does not cover: readiness polling, pending byte
//! counts and borrowing a descriptor without taking ownership of it.

use std::mem::{ManuallyDrop, MaybeUninit};

use socket2::Socket as Socket2;

#[cfg(unix)]
pub use self::unix::*;
#[cfg(windows)]
pub use self::windows::*;

/// Readiness result of polling a single handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Revents {
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
    pub hangup: bool,
    pub invalid: bool,
}

/// Views an initialized buffer as uninitialized memory for socket2's receive calls.
pub fn as_uninit(buf: &mut [u8]) -> &mut [MaybeUninit<u8>] {
    // SAFETY: `MaybeUninit<u8>` has the same layout as `u8`, and the kernel only
    // writes initialized bytes into the slice.
    unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) }
}

/// Borrows `handle` as a socket2 socket that is never closed by this wrapper.
pub fn borrow(handle: RawHandle) -> ManuallyDrop<Socket2> {
    // SAFETY: the caller obtained `handle` from a live socket; ManuallyDrop keeps
    // this wrapper from closing it. A concurrent close makes the OS report a
    // bad descriptor, which is mapped to `SocketError::BadSocket`.
    ManuallyDrop::new(unsafe { from_raw(handle) })
}

#[cfg(unix)]
mod unix {
    use std::{
        io,
        os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd},
    };

    use socket2::Socket as Socket2;

    use super::Revents;

    /// OS socket handle.
    pub type RawHandle = RawFd;

    /// Listen backlog, always the system maximum.
    pub const BACKLOG: i32 = libc::SOMAXCONN;

    /// Flags passed to every `send`; suppresses SIGPIPE where supported.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub const SEND_FLAGS: i32 = libc::MSG_NOSIGNAL;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub const SEND_FLAGS: i32 = 0;

    pub fn raw(sock: &Socket2) -> RawHandle {
        sock.as_raw_fd()
    }

    pub fn into_raw(sock: Socket2) -> RawHandle {
        sock.into_raw_fd()
    }

    /// # Safety
    /// `handle` must be an open socket descriptor.
    pub unsafe fn from_raw(handle: RawHandle) -> Socket2 {
        Socket2::from_raw_fd(handle)
    }

    pub fn available(handle: RawHandle) -> io::Result<usize> {
        let mut count: libc::c_int = 0;
        // SAFETY: FIONREAD writes a single c_int.
        let rc = unsafe { libc::ioctl(handle, libc::FIONREAD as _, &mut count) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(count.max(0) as usize)
    }

    /// Bytes queued in the send buffer and not yet acknowledged.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn send_queue(handle: RawHandle) -> io::Result<usize> {
        let mut count: libc::c_int = 0;
        // SAFETY: SIOCOUTQ (TIOCOUTQ) writes a single c_int.
        let rc = unsafe { libc::ioctl(handle, libc::TIOCOUTQ as _, &mut count) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(count.max(0) as usize)
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub fn send_queue(_handle: RawHandle) -> io::Result<usize> {
        Ok(0)
    }

    /// Queries `O_NONBLOCK`. POSIX can report the real mode.
    pub fn is_nonblocking(handle: RawHandle) -> Option<bool> {
        // SAFETY: F_GETFL takes no argument.
        let flags = unsafe { libc::fcntl(handle, libc::F_GETFL) };
        if flags < 0 {
            None
        } else {
            Some(flags & libc::O_NONBLOCK != 0)
        }
    }

    pub fn poll(
        handles: &[RawHandle],
        read: bool,
        write: bool,
        timeout_ms: i32,
        out: &mut Vec<Revents>,
    ) -> io::Result<usize> {
        let events = (if read { libc::POLLIN } else { 0 }) | (if write { libc::POLLOUT } else { 0 });
        let mut fds: Vec<libc::pollfd> =
            handles.iter().map(|&fd| libc::pollfd { fd, events, revents: 0 }).collect();
        // SAFETY: `fds` is a valid array of `fds.len()` pollfd entries.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        out.clear();
        out.extend(fds.iter().map(|p| Revents {
            readable: p.revents & libc::POLLIN != 0,
            writable: p.revents & libc::POLLOUT != 0,
            error: p.revents & libc::POLLERR != 0,
            hangup: p.revents & libc::POLLHUP != 0,
            invalid: p.revents & libc::POLLNVAL != 0,
        }));
        Ok(rc as usize)
    }

    /// Single-handle `select`. Returns (readable, writable, exceptional).
    pub fn select(
        handle: RawHandle,
        timeout_ms: i32,
        read: bool,
        write: bool,
        except: bool,
    ) -> io::Result<(bool, bool, bool)> {
        if handle < 0 || handle as usize >= libc::FD_SETSIZE {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        // SAFETY: fd_set is plain data; FD_* only touch the sets we own and
        // `handle` was bounds checked against FD_SETSIZE.
        unsafe {
            let mut readfds: libc::fd_set = std::mem::zeroed();
            let mut writefds: libc::fd_set = std::mem::zeroed();
            let mut exceptfds: libc::fd_set = std::mem::zeroed();
            libc::FD_ZERO(&mut readfds);
            libc::FD_ZERO(&mut writefds);
            libc::FD_ZERO(&mut exceptfds);
            if read {
                libc::FD_SET(handle, &mut readfds);
            }
            if write {
                libc::FD_SET(handle, &mut writefds);
            }
            if except {
                libc::FD_SET(handle, &mut exceptfds);
            }
            let mut tv = libc::timeval {
                tv_sec: (timeout_ms.max(0) / 1000) as _,
                tv_usec: ((timeout_ms.max(0) % 1000) * 1000) as _,
            };
            let tvp = if timeout_ms < 0 { std::ptr::null_mut() } else { &mut tv as *mut _ };
            let rc = libc::select(handle + 1, &mut readfds, &mut writefds, &mut exceptfds, tvp);
            if rc < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok((
                read && libc::FD_ISSET(handle, &readfds),
                write && libc::FD_ISSET(handle, &writefds),
                except && libc::FD_ISSET(handle, &exceptfds),
            ))
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{
        io,
        os::windows::io::{AsRawSocket, FromRawSocket, IntoRawSocket, RawSocket},
    };

    use socket2::Socket as Socket2;
    use windows_sys::Win32::Networking::WinSock::{
        ioctlsocket, select as wsa_select, WSAPoll, FD_SET, FIONREAD, POLLERR, POLLHUP,
        POLLNVAL, POLLRDNORM, POLLWRNORM, SOCKET, SOMAXCONN, TIMEVAL, WSAPOLLFD,
    };

    use super::Revents;

    /// OS socket handle.
    pub type RawHandle = RawSocket;

    /// Listen backlog, always the system maximum.
    pub const BACKLOG: i32 = SOMAXCONN as i32;

    /// Windows never raises SIGPIPE.
    pub const SEND_FLAGS: i32 = 0;

    pub fn raw(sock: &Socket2) -> RawHandle {
        sock.as_raw_socket()
    }

    pub fn into_raw(sock: Socket2) -> RawHandle {
        sock.into_raw_socket()
    }

    /// # Safety
    /// `handle` must be an open socket.
    pub unsafe fn from_raw(handle: RawHandle) -> Socket2 {
        Socket2::from_raw_socket(handle)
    }

    pub fn available(handle: RawHandle) -> io::Result<usize> {
        let mut count: u32 = 0;
        // SAFETY: FIONREAD writes a single u32.
        let rc = unsafe { ioctlsocket(handle as SOCKET, FIONREAD, &mut count) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(count as usize)
    }

    pub fn send_queue(_handle: RawHandle) -> io::Result<usize> {
        Ok(0)
    }

    /// Winsock has no way to query FIONBIO; callers use their cached value.
    pub fn is_nonblocking(_handle: RawHandle) -> Option<bool> {
        None
    }

    pub fn poll(
        handles: &[RawHandle],
        read: bool,
        write: bool,
        timeout_ms: i32,
        out: &mut Vec<Revents>,
    ) -> io::Result<usize> {
        let events = (if read { POLLRDNORM as i16 } else { 0 })
            | (if write { POLLWRNORM as i16 } else { 0 });
        let mut fds: Vec<WSAPOLLFD> = handles
            .iter()
            .map(|&fd| WSAPOLLFD { fd: fd as SOCKET, events, revents: 0 })
            .collect();
        // SAFETY: `fds` is a valid array of `fds.len()` WSAPOLLFD entries.
        let rc = unsafe { WSAPoll(fds.as_mut_ptr(), fds.len() as u32, timeout_ms) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        out.clear();
        out.extend(fds.iter().map(|p| Revents {
            readable: p.revents & (POLLRDNORM as i16) != 0,
            writable: p.revents & (POLLWRNORM as i16) != 0,
            error: p.revents & (POLLERR as i16) != 0,
            hangup: p.revents & (POLLHUP as i16) != 0,
            invalid: p.revents & (POLLNVAL as i16) != 0,
        }));
        Ok(rc as usize)
    }

    /// Single-handle `select`. Returns (readable, writable, exceptional).
    pub fn select(
        handle: RawHandle,
        timeout_ms: i32,
        read: bool,
        write: bool,
        except: bool,
    ) -> io::Result<(bool, bool, bool)> {
        let make_set = |on: bool| {
            let mut set = FD_SET { fd_count: 0, fd_array: [0; 64] };
            if on {
                set.fd_count = 1;
                set.fd_array[0] = handle as SOCKET;
            }
            set
        };
        let mut readfds = make_set(read);
        let mut writefds = make_set(write);
        let mut exceptfds = make_set(except);
        let tv = TIMEVAL {
            tv_sec: timeout_ms.max(0) / 1000,
            tv_usec: (timeout_ms.max(0) % 1000) * 1000,
        };
        let tvp = if timeout_ms < 0 { std::ptr::null() } else { &tv as *const TIMEVAL };
        // SAFETY: all sets are owned locals; nfds is ignored by Winsock.
        let rc = unsafe { wsa_select(0, &mut readfds, &mut writefds, &mut exceptfds, tvp) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((
            read && readfds.fd_count > 0,
            write && writefds.fd_count > 0,
            except && exceptfds.fd_count > 0,
        ))
    }
}
