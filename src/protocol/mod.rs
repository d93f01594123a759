//! Protocol module - exchange channel framing.
//!
//! Records are length-framed:
//! - 10-byte header encoding/decoding
//! - Record buffer for accumulating partial reads
//! - Record struct with payload helpers

mod record;
mod record_buffer;
mod wire_format;

pub use record::{build_record, Record};
pub use record_buffer::RecordBuffer;
pub use wire_format::{
    flags, kinds, Header, ABSOLUTE_MAX_PAYLOAD_SIZE, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
};
