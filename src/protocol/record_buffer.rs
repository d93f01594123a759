//! Record buffer for accumulating partial reads from the exchange channel.
//!
//! Uses `bytes::BytesMut` for buffer management and a two-state machine:
//! - `WaitingForHeader`: Need at least 10 bytes
//! - `WaitingForPayload`: Header parsed, need N more payload bytes
//!
//! Records are delimited purely by the length in their header; payload
//! content is never scanned.

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use super::Record;
use crate::error::Result;

/// State machine for record parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 10 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes.
    WaitingForPayload { header: Header, remaining: u32 },
}

/// Buffer for accumulating incoming bytes and extracting complete records.
pub struct RecordBuffer {
    /// Accumulated bytes from channel reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl RecordBuffer {
    /// Create a new record buffer with default settings.
    ///
    /// Default capacity: 64KB, max payload: 256 MiB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new record buffer with custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete records.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns error if a header is invalid (unknown kind, reserved flags,
    /// payload above `max_payload_size`). The channel is unusable after that.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Record>> {
        self.buffer.extend_from_slice(data);

        let mut records = Vec::new();
        while let Some(record) = self.try_extract_one()? {
            records.push(record);
        }

        Ok(records)
    }

    /// Try to extract a single record from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Record>> {
        match &self.state {
            State::WaitingForHeader => {
                let Some(header) = Header::decode(&self.buffer) else {
                    return Ok(None);
                };
                header.validate(self.max_payload_size)?;

                let _ = self.buffer.split_to(HEADER_SIZE);

                if header.payload_length == 0 {
                    return Ok(Some(Record::new(header, Bytes::new())));
                }

                self.state = State::WaitingForPayload {
                    header,
                    remaining: header.payload_length,
                };

                self.try_extract_one()
            }

            State::WaitingForPayload { header, remaining } => {
                let remaining = *remaining as usize;

                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(remaining).freeze();
                let header = *header;

                self.state = State::WaitingForHeader;

                Ok(Some(Record::new(header, payload)))
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no partial record is pending.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && matches!(self.state, State::WaitingForHeader)
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for RecordBuffer {
    fn default() -> Self {
        Self::new()
    }
}
