use std::{
    thread,
    time::{Duration, Instant},
};

use bytewire_core::error::SocketError;
use bytewire_net::{
    IpAddress, IpProtocol, PollFlag, SelectFlag, Socket, SocketCategory, SocketOption,
    SocketReader, SocketType, SocketWriter,
};
use bytewire_stream::BinaryStream;
use crossbeam_channel::unbounded;

fn tcp_listener() -> Socket {
    Socket::listen_to(&IpAddress::localhost(0), IpProtocol::Tcp, SocketOption::BLOCKING).unwrap()
}

#[test]
fn test_tcp_echo() {
    let listener = tcp_listener();
    assert_eq!(listener.category(), SocketCategory::Listen);
    let port = listener.local_addr().port();
    assert_ne!(port, 0);

    thread::scope(|s| {
        s.spawn(|| {
            let conn = listener.accept(5000).unwrap().unwrap();
            assert_eq!(conn.category(), SocketCategory::Accept);
            assert!(conn.auto_close());
            let mut buf = [0u8; 6];
            let mut got = 0;
            while got < buf.len() {
                let n = conn.recv(&mut buf[got..]).unwrap();
                assert!(n > 0);
                got += n;
            }
            assert_eq!(conn.send(&buf), Ok(6));
        });

        let client =
            Socket::connect_to(&IpAddress::localhost(port), SocketOption::BLOCKING).unwrap();
        assert_eq!(client.category(), SocketCategory::Client);
        assert_eq!(client.sock_type(), SocketType::Stream);
        assert_eq!(client.address(), IpAddress::localhost(port));
        let hello = [0x68, 0x65, 0x6C, 0x6C, 0x6F, 0x0A];
        assert_eq!(client.send(&hello), Ok(6));

        let mut echo = [0u8; 6];
        let mut got = 0;
        while got < echo.len() {
            let n = client.recv(&mut echo[got..]).unwrap();
            assert!(n > 0);
            got += n;
        }
        assert_eq!(echo, hello);
    });
}

#[test]
fn test_liveness_after_peer_close() {
    let listener = tcp_listener();
    let port = listener.local_addr().port();
    let client = Socket::connect_to(&IpAddress::localhost(port), SocketOption::BLOCKING).unwrap();
    let conn = listener.accept(5000).unwrap().unwrap();

    assert!(conn.connected());
    assert!(client.connected());

    drop(client);
    assert!(conn.poll(2000, PollFlag::Read));

    let mut buf = [0u8; 16];
    assert_eq!(conn.recv(&mut buf), Ok(0));
    assert!(conn.is_closed());
    assert!(!conn.connected());
}

#[test]
fn test_accept_timeout() {
    let listener = tcp_listener();
    let start = Instant::now();
    assert!(matches!(listener.accept(50), Ok(None)));
    assert!(start.elapsed() >= Duration::from_millis(40));
}

#[test]
fn test_connect_timeout_unroutable() {
    let mut sock = Socket::new();
    let start = Instant::now();
    let err = sock
        .connect_timeout(&IpAddress::v4(10, 255, 255, 1, 80), 200, SocketOption::NONE)
        .unwrap_err();
    // sandboxes without a route fail fast instead of timing out
    assert!(
        matches!(
            err,
            SocketError::TimedOut | SocketError::NetUnreachable | SocketError::HostUnreachable
        ),
        "{:?}",
        err
    );
    assert_eq!(sock.last_err_type(), err);
    assert!(!sock.connected());
    assert!(sock.is_closed());
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_connect_refused() {
    let port = {
        let listener = Socket::make_tcp_randomport(SocketOption::BLOCKING).unwrap();
        listener.local_addr().port()
    };
    let err = Socket::connect_to(&IpAddress::localhost(port), SocketOption::BLOCKING).unwrap_err();
    assert_eq!(err, SocketError::ConnRefused);
    assert!(err.is_fatal());
}

#[test]
fn test_connect_timeout_success() {
    let listener = tcp_listener();
    let port = listener.local_addr().port();
    let client =
        Socket::connect_to_timeout(&IpAddress::localhost(port), 1000, SocketOption::BLOCKING)
            .unwrap();
    assert!(client.is_blocking());
    assert!(client.connected());
    assert_eq!(client.peer_addr(), IpAddress::localhost(port));
    assert!(listener.accept(1000).unwrap().is_some());
}

#[test]
fn test_close_cancels_blocking_recv() {
    let listener = tcp_listener();
    let port = listener.local_addr().port();
    let _client = Socket::connect_to(&IpAddress::localhost(port), SocketOption::BLOCKING).unwrap();
    let conn = listener.accept(5000).unwrap().unwrap();
    assert!(conn.is_blocking());

    let (tx, rx) = unbounded();
    thread::scope(|s| {
        s.spawn(|| {
            let mut buf = [0u8; 8];
            tx.send(conn.recv(&mut buf)).unwrap();
        });
        thread::sleep(Duration::from_millis(100));
        conn.close();
    });
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), Err(SocketError::BadSocket));
}

#[test]
fn test_poll_many_and_select() {
    let listener = tcp_listener();
    let port = listener.local_addr().port();
    let client = Socket::connect_to(&IpAddress::localhost(port), SocketOption::BLOCKING).unwrap();
    let conn = listener.accept(5000).unwrap().unwrap();
    let idle = Socket::new();

    let mut ready = Vec::new();
    assert!(!Socket::poll_many(&[&conn, &client, &idle], &mut ready, 0, PollFlag::Read));
    assert!(ready.is_empty());

    client.send(b"ping").unwrap();
    assert!(Socket::poll_many(&[&conn, &client, &idle], &mut ready, 1000, PollFlag::Read));
    assert_eq!(ready, vec![0]);
    assert!(conn.select(0, SelectFlag::READ));
    assert!(client.select(0, SelectFlag::WRITE));
    assert!(conn.wait_available(0));
    assert_eq!(conn.recv_str().unwrap(), "ping");
}

#[test]
fn test_peek_blocking_socket_does_not_block() {
    let listener = tcp_listener();
    let port = listener.local_addr().port();
    let client = Socket::connect_to(&IpAddress::localhost(port), SocketOption::BLOCKING).unwrap();
    let conn = listener.accept(5000).unwrap().unwrap();

    let mut buf = [0u8; 4];
    let start = Instant::now();
    assert_eq!(conn.peek(&mut buf), Ok(0));
    assert!(start.elapsed() < Duration::from_millis(500));

    client.send(b"abcd").unwrap();
    assert!(conn.wait_available(1000));
    assert_eq!(conn.peek(&mut buf), Ok(4));
    assert_eq!(conn.recv_data().unwrap(), b"abcd");
}

#[test]
fn test_flush_discards_input() {
    let listener = tcp_listener();
    let port = listener.local_addr().port();
    let client = Socket::connect_to(&IpAddress::localhost(port), SocketOption::BLOCKING).unwrap();
    let conn = listener.accept(5000).unwrap().unwrap();

    client.send(&[1u8; 100]).unwrap();
    assert!(conn.wait_available(1000));
    thread::sleep(Duration::from_millis(20));
    conn.flush();
    assert_eq!(conn.available(), 0);
    assert!(conn.connected());
}

#[test]
fn test_stream_over_socket() {
    let listener = tcp_listener();
    let port = listener.local_addr().port();
    let client = Socket::connect_to(&IpAddress::localhost(port), SocketOption::BLOCKING).unwrap();
    let conn = listener.accept(5000).unwrap().unwrap();

    {
        let mut writer = SocketWriter::new(&client);
        let mut out = BinaryStream::with_source(&mut writer);
        out.write_u32(42).write_str("over the wire").write_slice(&[1.5f64, -2.0]);
    }

    let mut reader = SocketReader::new(&conn);
    let mut input = BinaryStream::with_source(&mut reader);
    assert_eq!(input.read_u32().unwrap(), 42);
    assert_eq!(input.read_string().unwrap(), "over the wire");
    assert_eq!(input.read_vec::<f64>().unwrap(), vec![1.5, -2.0]);
}

#[test]
fn test_send_after_close_fails() {
    let listener = tcp_listener();
    let port = listener.local_addr().port();
    let client = Socket::connect_to(&IpAddress::localhost(port), SocketOption::BLOCKING).unwrap();
    client.close();
    assert_eq!(client.send(b"x"), Err(SocketError::BadSocket));
    assert_eq!(client.last_err_type(), SocketError::BadSocket);
}
