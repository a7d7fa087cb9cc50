#![warn(missing_docs)]

//! bytewire-core: foundational types shared by every bytewire layer.
//!
//! This crate provides the minimal set of utilities the I/O layers agree on:
//! - Configuration types
//! - Error handling and the cross-platform socket error taxonomy
//! - Wire and buffering constants
//! - Monotonic clock and hybrid sleep
//! - The `ByteSource` interface that binary streams are layered on
//!
//! Concrete sources live in specialized crates:
//! - `bytewire-net`: sockets, the UDP send pacer and socket adapters
//! - `bytewire-stream`: the binary stream codec, memory and file adapters

/// Buffering and wire constants shared across layers.
pub mod constants {
    /// Size of the inline buffer every binary stream starts with.
    pub const SBO_SIZE: usize = 512;
    /// Reads larger than this share of the buffer capacity bypass buffering.
    ///
    /// Expressed as a numerator over [`DIRECT_READ_DENOMINATOR`]: `cap * 2 / 3`.
    pub const DIRECT_READ_NUMERATOR: usize = 2;
    /// Denominator of the direct read threshold.
    pub const DIRECT_READ_DENOMINATOR: usize = 3;
    /// Scratch buffer used when discarding socket data.
    pub const SKIP_BUFFER_SIZE: usize = 4096;
    /// Largest datagram payload a socket can receive.
    pub const MAX_DATAGRAM_SIZE: usize = 65536;
    /// Upper bound on datagrams discarded by a single receive-buffer flush.
    pub const MAX_FLUSH_DATAGRAMS: usize = 1000;
    /// Number of attempts made when binding to a random port.
    pub const RANDOM_PORT_ATTEMPTS: u32 = 10;
    /// Lowest port picked by the random port helpers.
    pub const RANDOM_PORT_MIN: u16 = 8000;
    /// Remaining wait above which the pacer sleeps instead of yielding.
    pub const SLEEP_THRESHOLD_NS: u64 = 150_000;
    /// Remaining wait below which the pacer stops and sends.
    pub const SPIN_THRESHOLD_NS: u64 = 80;
    /// Nanoseconds in one second.
    pub const NANOS_PER_SEC: u64 = 1_000_000_000;
}

/// Configuration options for sockets, streams and pacing.
pub mod config;
/// Error types and results.
pub mod error;
/// Byte source abstraction for pluggable I/O.
pub mod source;
/// Monotonic clock and sleep utilities.
pub mod time;
