//! Wire format of the exchange channel.
//!
//! Every record is a 10-byte header followed by a MessagePack payload:
//! ```text
//! ┌───────┬───────┬──────────┬──────────┐
//! │ Kind  │ Flags │ Sequence │ Length   │
//! │ 1 byte│ 1 byte│ 4 bytes  │ 4 bytes  │
//! │       │       │ uint32 BE│ uint32 BE│
//! └───────┴───────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{FlowconvError, Result};

/// Header size in bytes (fixed, exactly 10).
pub const HEADER_SIZE: usize = 10;

/// Default maximum payload size (256 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 256 * 1024 * 1024;

/// Absolute maximum payload size (~2 GB, max i32).
pub const ABSOLUTE_MAX_PAYLOAD_SIZE: u32 = 2_147_483_647;

/// Record kinds.
pub mod kinds {
    /// Conversation sent by the caller to the worker.
    pub const CONVERSATION: u8 = 1;
    /// Result sent by the worker back to the caller.
    pub const RESULT: u8 = 2;

    /// Whether the kind byte is one we know.
    #[inline]
    pub fn is_known(kind: u8) -> bool {
        kind == CONVERSATION || kind == RESULT
    }
}

/// Flag constants for result records.
pub mod flags {
    /// The conversation is unchanged; the payload holds `Conversion::Unchanged`.
    pub const UNCHANGED: u8 = 0b0000_0001;
    /// Dissection failed for this conversation (logged on stderr).
    pub const FAILED: u8 = 0b0000_0010;

    /// Reserved bits mask (bits 2-7).
    pub const RESERVED_MASK: u8 = 0b1111_1100;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    /// Flags of a result answering a failed conversation.
    pub const FAILED_RESULT: u8 = UNCHANGED | FAILED;
}

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Record kind (see `kinds` module).
    pub kind: u8,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Sequence number, echoed from a conversation into its result.
    pub sequence: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(kind: u8, flags: u8, sequence: u32, payload_length: u32) -> Self {
        Self {
            kind,
            flags,
            sequence,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use flowconv::protocol::{kinds, Header};
    ///
    /// let header = Header::new(kinds::RESULT, 0, 42, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 10);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.kind;
        buf[1] = self.flags;
        buf[2..6].copy_from_slice(&self.sequence.to_be_bytes());
        buf[6..10].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use flowconv::protocol::Header;
    ///
    /// let bytes = [1, 0, 0, 0, 0, 42, 0, 0, 0, 100];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.kind, 1);
    /// assert_eq!(header.sequence, 42);
    /// assert_eq!(header.payload_length, 100);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            kind: buf[0],
            flags: buf[1],
            sequence: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            payload_length: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Kind is known
    /// - Payload length doesn't exceed max
    /// - Reserved flag bits are 0
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if !kinds::is_known(self.kind) {
            return Err(FlowconvError::Protocol(format!(
                "Unknown record kind {}",
                self.kind
            )));
        }

        if self.payload_length > max_payload_size {
            return Err(FlowconvError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(FlowconvError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn is_conversation(&self) -> bool {
        self.kind == kinds::CONVERSATION
    }

    #[inline]
    pub fn is_result(&self) -> bool {
        self.kind == kinds::RESULT
    }

    #[inline]
    pub fn is_unchanged(&self) -> bool {
        flags::has_flag(self.flags, flags::UNCHANGED)
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        flags::has_flag(self.flags, flags::FAILED)
    }
}
