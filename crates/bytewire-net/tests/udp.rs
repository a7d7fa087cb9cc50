use std::time::{Duration, Instant};

use bytewire_core::error::SocketError;
use bytewire_net::{
    get_ip_interface, AddressFamily, BufferType, IpAddress, LoadBalancer, PollFlag, Socket,
    SocketOpt, SocketOption, SocketType,
};

fn udp_pair() -> (Socket, Socket) {
    let a = Socket::make_udp(&IpAddress::localhost(0), SocketOption::BLOCKING).unwrap();
    let b = Socket::make_udp(&IpAddress::localhost(0), SocketOption::BLOCKING).unwrap();
    (a, b)
}

#[test]
fn test_poll_then_available() {
    let (a, b) = udp_pair();
    assert!(!b.poll(0, PollFlag::Read));
    assert_eq!(a.sendto(&b.local_addr(), &[7u8; 100]), Ok(100));

    assert!(b.poll(1000, PollFlag::Read));
    assert!(b.poll(0, PollFlag::Read));
    assert!(b.available() >= 100);
    assert_eq!(b.peek_datagram_size(), 100);

    let (data, from) = b.recvfrom_data().unwrap();
    assert_eq!(data.len(), 100);
    assert_eq!(from, a.local_addr());
}

#[test]
fn test_truncation_keeps_next_datagram_intact() {
    let (a, b) = udp_pair();
    let to = b.local_addr();
    a.sendto(&to, &[1u8; 2000]).unwrap();
    a.sendto(&to, &[2u8; 10]).unwrap();
    assert!(b.wait_available(1000));

    let mut small = [0u8; 1000];
    match b.recvfrom(&mut small) {
        Ok((n, _)) if n > 0 => {
            assert_eq!(n, 1000);
            assert!(small.iter().all(|&x| x == 1));
        }
        Ok(_) => assert_eq!(b.last_err_type(), SocketError::MsgTooLarge),
        Err(err) => panic!("truncation must be transient, got {:?}", err),
    }
    assert!(b.good());

    assert!(b.wait_available(1000));
    let mut buf = [0u8; 64];
    let (n, _) = b.recvfrom(&mut buf).unwrap();
    assert_eq!(&buf[..n], &[2u8; 10]);
}

#[test]
fn test_skip_and_flush_datagrams() {
    let (a, b) = udp_pair();
    let to = b.local_addr();
    for size in [10usize, 20, 30] {
        a.sendto(&to, &vec![size as u8; size]).unwrap();
    }
    assert!(b.wait_available(1000));
    std::thread::sleep(Duration::from_millis(20));

    assert_eq!(b.peek_datagram_size(), 10);
    assert_eq!(b.skip(10), 10);
    assert_eq!(b.peek_datagram_size(), 20);

    b.flush_recv_buf();
    assert_eq!(b.available(), 0);
    assert!(!b.poll(0, PollFlag::Read));
}

#[test]
fn test_skip_drains_many_datagrams() {
    let (a, b) = udp_pair();
    b.set_option(SocketOpt::BufSize(BufferType::Recv, 256 * 1024)).unwrap();
    let to = b.local_addr();
    for _ in 0..20 {
        assert_eq!(a.sendto(&to, &[3u8; 4000]), Ok(4000));
    }
    assert!(b.wait_available(1000));
    std::thread::sleep(Duration::from_millis(20));

    for _ in 0..3 {
        assert_eq!(b.peek_datagram_size(), 4000);
    }
    assert_eq!(b.skip(20 * 4000), 20 * 4000);
    assert_eq!(b.peek_datagram_size(), 0);
}

#[test]
fn test_nonblocking_recv_is_transient() {
    let sock = Socket::make_udp(&IpAddress::localhost(0), SocketOption::NONE).unwrap();
    assert!(!sock.is_blocking());
    let mut buf = [0u8; 16];
    assert_eq!(sock.recv(&mut buf), Ok(0));
    assert_eq!(sock.last_err_type(), SocketError::Again);
    assert!(sock.good());
    assert!(sock.recv_timeout(10).unwrap().is_empty());
}

#[test]
fn test_options() {
    let (a, _) = udp_pair();
    a.set_option(SocketOpt::BufSize(BufferType::Recv, 65536)).unwrap();
    assert!(a.get_buf_size(BufferType::Recv).unwrap() >= 65536 / 2);
    a.set_option(SocketOpt::Broadcast(true)).unwrap();
    assert!(a.is_broadcast());
    a.set_blocking(false).unwrap();
    assert!(!a.is_blocking());
    assert_eq!(a.sock_type(), SocketType::Datagram);
    assert_eq!(a.protocol_info().to_string(), "AF_IPv4 ST_Datagram IPP_UDP");
}

#[test]
fn test_random_port() {
    let sock = Socket::make_udp_randomport(SocketOption::NONE).unwrap();
    assert!(sock.local_addr().port() >= 8000);
    assert_eq!(sock.family(), AddressFamily::IPv4);
}

#[test]
fn test_paced_udp() {
    let (a, b) = udp_pair();
    b.set_option(SocketOpt::BufSize(BufferType::Recv, 64 * 1024)).unwrap();
    let to = b.local_addr();
    let mut balancer = LoadBalancer::new(100_000);
    let payload = [0x5Au8; 1000];

    let start = Instant::now();
    for _ in 0..10 {
        assert_eq!(a.sendto_balanced(&mut balancer, &to, &payload), Ok(1000));
    }
    // wait out the delay owed by the last datagram
    balancer.wait_to_send(0);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(99), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(110), "{:?}", elapsed);
}

#[test]
fn test_pacer_rate_accuracy() {
    let mut balancer = LoadBalancer::new(1_000_000);
    let start = Instant::now();
    for _ in 0..100 {
        balancer.wait_to_send(100);
    }
    let elapsed = start.elapsed();
    // 99 waits of 100us each, within 10% of 10ms
    assert!(elapsed >= Duration::from_micros(9_000), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(11), "{:?}", elapsed);
}

#[test]
fn test_pacer_disabled_never_waits() {
    let mut balancer = LoadBalancer::new(0);
    let start = Instant::now();
    for n in 0..1000 {
        balancer.wait_to_send(n * 1000);
    }
    let elapsed = start.elapsed();
    assert!(elapsed < Duration::from_millis(1), "{:?}", elapsed);
}

#[test]
fn test_broadcast() {
    let Some(iface) = get_ip_interface("", AddressFamily::IPv4)
        .filter(|iface| iface.broadcast.has_address())
    else {
        // no broadcast capable interface in this environment
        return;
    };

    let receiver = Socket::make_udp(&IpAddress::any(AddressFamily::IPv4, 0), SocketOption::BLOCKING)
        .unwrap();
    let port = receiver.local_addr().port();
    let sender = Socket::make_udp(&IpAddress::any(AddressFamily::IPv4, 0), SocketOption::BLOCKING)
        .unwrap();
    sender.enable_broadcast(true).unwrap();

    let target = iface.broadcast.with_port(port);
    if sender.sendto(&target, &[0xAA, 0xBB, 0xCC]) != Ok(3) {
        // sandboxed hosts may refuse broadcast traffic
        return;
    }
    assert!(receiver.wait_available(2000));
    let (data, from) = receiver.recvfrom_data().unwrap();
    assert_eq!(data, vec![0xAA, 0xBB, 0xCC]);
    assert_eq!(from.port(), sender.local_addr().port());
}
