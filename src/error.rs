//! Error types for flowconv.
//!
//! Two families:
//!
//! - [`FlowconvError`] covers the exchange channel. These are process-level
//!   failures (broken pipe, malformed record framing) and end the worker.
//! - [`DissectError`] covers dissection of one conversation. Recoverable
//!   variants are rendered as diagnostic chunks by the layer that hit them;
//!   fatal variants abort the conversation and are contained by the worker.

use thiserror::Error;

/// Main error type for the exchange channel.
#[derive(Debug, Error)]
pub enum FlowconvError {
    /// I/O error on the exchange channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (invalid record header, oversized payload, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Channel closed in the middle of a record.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias using FlowconvError.
pub type Result<T> = std::result::Result<T, FlowconvError>;

/// Errors raised while dissecting a single conversation.
#[derive(Debug, Error)]
pub enum DissectError {
    /// HTTP/1 request or response could not be parsed.
    #[error("{0}")]
    Http(String),

    /// HTTP/2 frame layer error (bad preamble, overlong or malformed frame).
    #[error("{0}")]
    Frame(String),

    /// HPACK header block could not be decoded.
    #[error("HPACK decoding failed: {0}")]
    Hpack(String),

    /// WebSocket frame could not be parsed or inflated.
    #[error("{0}")]
    WebSocket(String),

    /// gRPC message framing or encoding error.
    #[error("{0}")]
    Grpc(String),

    /// Structure inspector rejected a message.
    #[error("{0}")]
    Inspect(String),

    /// The 101 response carried a `Sec-WebSocket-Accept` that does not
    /// match the key sent by the client.
    #[error("Invalid websocket key: {received} != {expected}")]
    HandshakeMismatch { received: String, expected: String },

    /// A data frame started while a fragmented message was still pending,
    /// or a continuation arrived with nothing to continue.
    #[error("Invalid fragmented message")]
    InvalidFragmentation,

    /// Too many fragments pending for one message.
    #[error("Fragmented message too long ({0} fragments pending)")]
    TooManyFragments(usize),

    /// A dissector panicked.
    #[error("Dissector panicked: {0}")]
    Panic(String),
}

impl DissectError {
    /// Whether this error aborts the whole conversation.
    ///
    /// Recoverable errors are turned into diagnostic chunks close to where
    /// they happen. Fatal ones propagate out of `transform` and are answered
    /// with a failed, unchanged result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DissectError::HandshakeMismatch { .. }
                | DissectError::InvalidFragmentation
                | DissectError::TooManyFragments(_)
                | DissectError::Panic(_)
        )
    }
}

/// Result type alias for dissection.
pub type DissectResult<T> = std::result::Result<T, DissectError>;
