use std::default::Default;

use crate::constants::{RANDOM_PORT_ATTEMPTS, SBO_SIZE};

#[derive(Clone, Debug, PartialEq, Eq)]
/// Configuration options to tune socket, stream and pacing behavior.
pub struct Config {
    /// Make sockets block when true, otherwise non-blocking.
    pub socket_blocking: bool,
    /// Close the descriptor automatically when a fatal error is observed.
    pub socket_auto_close: bool,
    /// Disable Nagle's algorithm on TCP sockets.
    pub socket_nodelay: bool,
    /// Leave the descriptor open when the owning socket is dropped.
    pub socket_shared: bool,
    /// Enable address (and on POSIX port) reuse when creating sockets.
    pub socket_reuse_addr: bool,
    /// Initial binary stream buffer capacity in bytes (0 = unbuffered).
    pub stream_buffer_size: usize,
    /// Outgoing UDP rate limit in bytes/sec (0 = unlimited).
    pub send_rate_limit: u32,
    /// Timeout applied to TCP connects. None performs a blocking connect.
    pub connect_timeout_ms: Option<i32>,
    /// How many random ports to try before giving up.
    pub random_port_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // blocking is the conventional OS default
            socket_blocking: true,
            socket_auto_close: false,
            // TCP sockets send small writes immediately
            socket_nodelay: true,
            socket_shared: false,
            socket_reuse_addr: false,
            stream_buffer_size: SBO_SIZE,
            // unlimited
            send_rate_limit: 0,
            connect_timeout_ms: None,
            random_port_attempts: RANDOM_PORT_ATTEMPTS,
        }
    }
}

impl Config {
    /// Returns a configuration for non-blocking sockets.
    pub fn nonblocking() -> Self {
        Self { socket_blocking: false, ..Self::default() }
    }

    /// Sets the outgoing rate limit in bytes/sec.
    pub fn with_send_rate_limit(mut self, bytes_per_sec: u32) -> Self {
        self.send_rate_limit = bytes_per_sec;
        self
    }

    /// Sets the initial stream buffer capacity.
    pub fn with_stream_buffer_size(mut self, capacity: usize) -> Self {
        self.stream_buffer_size = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_socket_defaults() {
        let config = Config::default();
        assert!(config.socket_blocking);
        assert!(!config.socket_auto_close);
        assert!(config.socket_nodelay);
        assert!(!config.socket_shared);
        assert_eq!(config.stream_buffer_size, SBO_SIZE);
        assert_eq!(config.send_rate_limit, 0);
        assert_eq!(config.random_port_attempts, 10);
    }

    #[test]
    fn test_builders() {
        let config = Config::nonblocking().with_send_rate_limit(1000).with_stream_buffer_size(0);
        assert!(!config.socket_blocking);
        assert_eq!(config.send_rate_limit, 1000);
        assert_eq!(config.stream_buffer_size, 0);
    }
}
