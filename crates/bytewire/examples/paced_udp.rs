//! Sends a burst of datagrams to a local receiver through the send pacer.
//!
//! Run:
//! - cargo run -p bytewire --example paced_udp
//! - cargo run -p bytewire --example paced_udp -- 50000 20
//!   (50000 bytes/sec, 20 datagrams)

use std::{env, time::Instant};

use bytewire::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DATAGRAM_SIZE: usize = 1000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    // Args: [bytes_per_sec] [count]
    let mut args = env::args().skip(1);
    let rate: u32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(100_000);
    let count: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(10);

    let config = Config::default().with_send_rate_limit(rate);
    let receiver = Socket::make_udp(&IpAddress::localhost(0), SocketOption::from_config(&config))?;
    let sender = Socket::make_udp(&IpAddress::localhost(0), SocketOption::from_config(&config))?;
    let mut balancer = LoadBalancer::from_config(&config);

    let start = Instant::now();
    for i in 0..count {
        let mut out = BinaryStream::with_capacity(DATAGRAM_SIZE);
        out.write_u32(i as u32).write_bytes(&[0x5A; DATAGRAM_SIZE - 4]);
        sender.sendto_balanced(&mut balancer, &receiver.local_addr(), out.data())?;
    }
    balancer.wait_to_send(0);
    let elapsed = start.elapsed();
    info!(
        "sent {} bytes in {:?} ({:.0} bytes/sec, limit {})",
        count * DATAGRAM_SIZE,
        elapsed,
        (count * DATAGRAM_SIZE) as f64 / elapsed.as_secs_f64(),
        rate
    );

    let mut received = 0;
    while let Ok((data, from)) = receiver.recvfrom_timeout(100) {
        if data.is_empty() {
            break;
        }
        let mut input = BinaryStream::new();
        input.write_bytes(&data);
        info!("datagram #{} ({} bytes) from {}", input.read_u32()?, data.len(), from);
        received += 1;
    }
    println!("received {}/{} datagrams", received, count);
    Ok(())
}
