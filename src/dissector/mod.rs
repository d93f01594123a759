//! # Dissectors
//!
//! A dissector turns one captured conversation into its re-rendered form.
//! Layers stack by delegation: each layer owns the next one as a hook
//! object, and falls back to its own default rendering when the hook
//! declines.
//!
//! | Module      | Layer                                   | Hook trait it drives |
//! |-------------|-----------------------------------------|----------------------|
//! | `http1`     | request/response parsing and rendering  | [`http1::Http1Hooks`] |
//! | `http2`     | frame buffers, HPACK, frame rendering   | [`http2::H2Hooks`]    |
//! | `websocket` | handshake, frames, fragments, deflate   | (leaf)               |
//! | `grpc`      | length-prefixed messages, compression   | (leaf)               |
//!
//! All per-conversation state lives in the layer values, which are built
//! fresh inside [`Dissector::transform`] and dropped when it returns.

pub mod grpc;
pub mod http1;
pub mod http2;
pub mod websocket;

use std::sync::Arc;

use crate::config::{DissectorConfig, DissectorKind};
use crate::error::DissectResult;
use crate::inspect::ProtobufInspector;
use crate::model::{Chunk, Stream};

/// A conversation-level transform.
///
/// Implementations must not keep state between calls; the worker may call
/// `transform` for any number of unrelated conversations in sequence.
///
/// # Errors
///
/// Only fatal [`DissectError`](crate::error::DissectError)s escape; anything
/// recoverable is rendered as a diagnostic chunk in the output.
pub trait Dissector: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Dissect one conversation.
    fn transform(&self, stream: &Stream) -> DissectResult<Vec<Chunk>>;
}

/// Build the dissector selected at startup.
pub fn build_dissector(kind: DissectorKind, config: DissectorConfig) -> Box<dyn Dissector> {
    let config = config.normalized();
    match kind {
        DissectorKind::Http => Box::new(http1::HttpDissector::new(config)),
        DissectorKind::Http2 => Box::new(http2::Http2Dissector::new(config)),
        DissectorKind::Websocket => Box::new(websocket::WebSocketDissector::new(config)),
        DissectorKind::Grpc => Box::new(grpc::GrpcDissector::new(
            config,
            Arc::new(ProtobufInspector::new()),
        )),
    }
}
