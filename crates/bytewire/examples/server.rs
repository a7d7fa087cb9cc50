//! Echo server speaking length-prefixed strings over TCP.
//!
//! Run:
//! - cargo run -p bytewire --example server
//! - cargo run -p bytewire --example server -- 127.0.0.1:7777
//!
//! Set `RUST_LOG=bytewire_net=debug` to watch socket events.

use std::env;

use bytewire::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let bind_addr = match env::args().nth(1) {
        Some(text) => IpAddress::parse(&text)?,
        None => IpAddress::localhost(9000),
    };
    let config = Config::default();
    let server = Socket::listen_with(&bind_addr, IpProtocol::Tcp, &config)?;
    info!("Bytewire echo server listening on {}", server.local_addr());

    loop {
        let conn = match server.accept(500) {
            Ok(Some(conn)) => conn,
            Ok(None) => continue,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        info!("[connect] {}", conn.peer_addr());

        while conn.good() {
            if !conn.wait_available(1000) {
                continue;
            }
            let mut reader = SocketReader::new(&conn);
            let mut input = BinaryStream::with_source(&mut reader);
            let message = match input.read_string() {
                Ok(message) => message,
                Err(_) => break,
            };
            drop(input);
            info!("[message] {:?}", message);

            let mut writer = SocketWriter::new(&conn);
            let mut output = BinaryStream::with_source(&mut writer);
            output.write_str(&message);
        }
        info!("[disconnect] {}", conn.peer_addr());
    }
}
