//! Byte sources over a borrowed [`Socket`].
//!
//! Wrap a socket in one of these and hand it to a binary stream to get buffered,
//! typed I/O on the connection.

use bytewire_core::source::ByteSource;
use tracing::trace;

use crate::{address::IpAddress, protocol::SocketType, socket::Socket};

/// Reads from a socket. Datagram sockets record the sender of the last datagram.
#[derive(Debug)]
pub struct SocketReader<'a> {
    sock: &'a Socket,
    from: IpAddress,
}

impl<'a> SocketReader<'a> {
    /// Creates a reader over `sock`.
    pub fn new(sock: &'a Socket) -> Self {
        Self { sock, from: IpAddress::default() }
    }

    /// Sender of the most recently read datagram.
    pub fn last_sender(&self) -> IpAddress {
        self.from
    }

    /// The underlying socket.
    pub fn socket(&self) -> &'a Socket {
        self.sock
    }
}

impl ByteSource for SocketReader<'_> {
    fn good(&self) -> bool {
        self.sock.good()
    }

    fn write(&mut self, _data: &[u8]) -> usize {
        0
    }

    fn read(&mut self, dst: &mut [u8]) -> usize {
        if self.sock.sock_type() == SocketType::Stream {
            return self.sock.recv(dst).unwrap_or(0);
        }
        match self.sock.recvfrom(dst) {
            Ok((n, from)) => {
                if n > 0 {
                    self.from = from;
                }
                n
            }
            Err(_) => 0,
        }
    }

    fn peek(&mut self, dst: &mut [u8]) -> usize {
        self.sock.peek(dst).unwrap_or(0)
    }

    fn skip(&mut self, count: usize) {
        let skipped = self.sock.skip(count);
        trace!("Skipped {} of {} bytes", skipped, count);
    }

    fn available(&self) -> usize {
        self.sock.available()
    }
}

/// Writes to a socket, either on the connection or as datagrams to a fixed target.
///
/// Flushing pushes out TCP data held back by Nagle's algorithm; pending input is left
/// alone. The writer flushes when dropped.
#[derive(Debug)]
pub struct SocketWriter<'a> {
    sock: &'a Socket,
    to: Option<IpAddress>,
}

impl<'a> SocketWriter<'a> {
    /// Creates a writer that sends on the connection.
    pub fn new(sock: &'a Socket) -> Self {
        Self { sock, to: None }
    }

    /// Creates a writer that sends each write as a datagram to `to`.
    pub fn to(sock: &'a Socket, to: IpAddress) -> Self {
        Self { sock, to: Some(to) }
    }

    /// The underlying socket.
    pub fn socket(&self) -> &'a Socket {
        self.sock
    }
}

impl ByteSource for SocketWriter<'_> {
    fn good(&self) -> bool {
        self.sock.good()
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let sent = match &self.to {
            Some(to) => self.sock.sendto(to, data),
            None => self.sock.send(data),
        };
        sent.unwrap_or(0)
    }

    fn read(&mut self, _dst: &mut [u8]) -> usize {
        0
    }

    fn skip(&mut self, _count: usize) {}

    fn flush(&mut self) {
        self.sock.flush_send_buf();
    }

    fn available(&self) -> usize {
        0
    }
}

impl Drop for SocketWriter<'_> {
    fn drop(&mut self) {
        if self.sock.good() {
            self.sock.flush_send_buf();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::SocketOption;

    #[test]
    fn test_datagram_reader_records_sender() {
        let a = Socket::make_udp(&IpAddress::localhost(0), SocketOption::BLOCKING).unwrap();
        let b = Socket::make_udp(&IpAddress::localhost(0), SocketOption::BLOCKING).unwrap();
        {
            let mut writer = SocketWriter::to(&a, b.local_addr());
            assert_eq!(writer.write(b"ping"), 4);
        }
        assert!(b.wait_available(1000));

        let mut reader = SocketReader::new(&b);
        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf), 4);
        assert_eq!(&buf[..4], b"ping");
        assert_eq!(reader.last_sender(), a.local_addr());
        assert_eq!(reader.available(), 0);
    }

    #[test]
    fn test_reader_does_not_write() {
        let sock = Socket::make_udp(&IpAddress::localhost(0), SocketOption::NONE).unwrap();
        let mut reader = SocketReader::new(&sock);
        assert_eq!(reader.write(b"x"), 0);
        let mut writer = SocketWriter::new(&sock);
        assert_eq!(writer.read(&mut [0u8; 4]), 0);
        assert_eq!(writer.available(), 0);
    }
}
