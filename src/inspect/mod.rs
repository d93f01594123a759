//! Schema-less structure inspection of message payloads.
//!
//! The gRPC layer hands each extracted message to a [`StructureInspector`]
//! and embeds the returned text in its output. Failures are reported per
//! message and never abort the conversation.

mod protobuf;

pub use protobuf::ProtobufInspector;

use crate::error::DissectResult;

/// Best-effort textual decomposition of an opaque message.
pub trait StructureInspector: Send + Sync {
    /// Render `data` as text.
    ///
    /// # Errors
    ///
    /// `DissectError::Inspect` when the bytes do not have the expected
    /// structure.
    fn inspect(&self, data: &[u8]) -> DissectResult<String>;
}
