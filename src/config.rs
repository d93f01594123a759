//! Dissector configuration.
//!
//! The binary builds a [`DissectorConfig`] from its command line; library
//! users construct one directly or take the defaults.

use std::fmt;

/// Default HTTP/2 frame buffer bound (SETTINGS_MAX_FRAME_SIZE initial value).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

/// Largest frame size HTTP/2 allows (2^24 - 1).
pub const MAX_ALLOWED_FRAME_SIZE: u32 = 16_777_215;

/// Default bound on pending websocket fragments per message.
pub const DEFAULT_MAX_PENDING_FRAGMENTS: usize = 50;

/// Default bound on the output of any single decompression (64 MiB).
pub const DEFAULT_MAX_INFLATED_SIZE: usize = 64 * 1024 * 1024;

/// Which dissector the worker runs. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DissectorKind {
    /// HTTP/1 with response content decoding.
    Http,
    /// HTTP/1 plus HTTP/2 framing and HPACK.
    Http2,
    /// HTTP/2 plus WebSocket (HTTP/1 upgrade and extended CONNECT).
    Websocket,
    /// HTTP/2 plus gRPC message extraction.
    Grpc,
}

impl DissectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DissectorKind::Http => "http",
            DissectorKind::Http2 => "http2",
            DissectorKind::Websocket => "websocket",
            DissectorKind::Grpc => "grpc",
        }
    }
}

impl fmt::Display for DissectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables shared by all dissectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DissectorConfig {
    /// Initial bound of each HTTP/2 frame buffer.
    pub max_frame_size: u32,
    /// Pending websocket fragments at which a message is rejected.
    pub max_pending_fragments: usize,
    /// Largest decompressed body, websocket message or gRPC message.
    pub max_inflated_size: usize,
}

impl DissectorConfig {
    /// Clamp values into their protocol ranges.
    pub fn normalized(mut self) -> Self {
        self.max_frame_size = self
            .max_frame_size
            .clamp(DEFAULT_MAX_FRAME_SIZE, MAX_ALLOWED_FRAME_SIZE);
        self.max_pending_fragments = self.max_pending_fragments.max(1);
        self
    }
}

impl Default for DissectorConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_pending_fragments: DEFAULT_MAX_PENDING_FRAGMENTS,
            max_inflated_size: DEFAULT_MAX_INFLATED_SIZE,
        }
    }
}
