//! Client that sends strings to the echo server and prints replies.
//!
//! Run the server first:
//! - cargo run -p bytewire --example server -- 127.0.0.1:7777
//!
//! Then run the client:
//! - cargo run -p bytewire --example client -- 127.0.0.1:7777
//! - cargo run -p bytewire --example client -- 127.0.0.1:7777 10 200
//!   (sends 10 messages, 200ms apart)

use std::{env, thread, time::Duration};

use bytewire::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    // Args: <server_addr> [count] [interval_ms]
    let mut args = env::args().skip(1);
    let server_addr = match args.next() {
        Some(text) => IpAddress::parse(&text)?,
        None => IpAddress::localhost(9000),
    };
    let count: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(5);
    let interval_ms: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(300);

    let config = Config { connect_timeout_ms: Some(2000), ..Config::default() };
    let sock = Socket::connect_with(&server_addr, &config)?;
    info!("Bytewire client {} -> {}", sock.local_addr(), sock.peer_addr());

    for i in 0..count {
        {
            let mut writer = SocketWriter::new(&sock);
            let mut output = BinaryStream::with_source(&mut writer);
            output.write_str(&format!("hello {} from {}", i, sock.local_addr()));
        }

        if sock.wait_available(2000) {
            let mut reader = SocketReader::new(&sock);
            let mut input = BinaryStream::with_source(&mut reader);
            println!("[reply] {}", input.read_string()?);
        }
        thread::sleep(Duration::from_millis(interval_ms));
    }

    println!("done");
    Ok(())
}
