//! Record struct: one header plus its MessagePack payload.
//!
//! Uses `bytes::Bytes` so records split off the read buffer share memory
//! with it.

use bytes::Bytes;

use super::wire_format::{flags, kinds, Header, HEADER_SIZE};
use crate::codec::MsgPackCodec;
use crate::error::{FlowconvError, Result};
use crate::model::{Conversion, Stream};

/// A complete exchange record.
#[derive(Debug, Clone)]
pub struct Record {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Record {
    /// Create a new record from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Build a conversation record for the given stream.
    pub fn conversation(sequence: u32, stream: &Stream) -> Result<Self> {
        let payload = MsgPackCodec::encode(stream)?;
        let header = Header::new(kinds::CONVERSATION, 0, sequence, payload_len(payload.len())?);
        Ok(Self::new(header, Bytes::from(payload)))
    }

    /// Build a result record.
    ///
    /// The `UNCHANGED` flag mirrors the payload; `failed` adds `FAILED`.
    pub fn result(sequence: u32, conversion: &Conversion, failed: bool) -> Result<Self> {
        let payload = MsgPackCodec::encode(conversion)?;
        let mut record_flags = 0;
        if conversion.is_unchanged() {
            record_flags |= flags::UNCHANGED;
        }
        if failed {
            record_flags |= flags::FAILED;
        }
        let header = Header::new(kinds::RESULT, record_flags, sequence, payload_len(payload.len())?);
        Ok(Self::new(header, Bytes::from(payload)))
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    /// Decode the payload as a conversation.
    pub fn decode_stream(&self) -> Result<Stream> {
        MsgPackCodec::decode(&self.payload)
    }

    /// Decode the payload as a result.
    pub fn decode_conversion(&self) -> Result<Conversion> {
        MsgPackCodec::decode(&self.payload)
    }

    /// Encode header and payload into one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        build_record(&self.header, &self.payload)
    }
}

/// Payload length as carried in the header.
fn payload_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        FlowconvError::Protocol(format!(
            "Payload of {} bytes does not fit a record header",
            len
        ))
    })
}

/// Build a complete record as a single byte vector.
///
/// # Example
///
/// ```
/// use flowconv::protocol::{build_record, kinds, Header};
///
/// let header = Header::new(kinds::RESULT, 0, 42, 5);
/// let bytes = build_record(&header, b"hello");
/// assert_eq!(bytes.len(), 10 + 5);
/// ```
pub fn build_record(header: &Header, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Chunk, Direction};

    #[test]
    fn test_conversation_record() {
        let stream = Stream {
            chunks: vec![Chunk::new(Direction::ClientToServer, b"hi".to_vec())],
            ..Default::default()
        };
        let record = Record::conversation(5, &stream).unwrap();

        assert!(record.header.is_conversation());
        assert_eq!(record.sequence(), 5);
        assert_eq!(record.header.payload_length as usize, record.payload().len());
        assert_eq!(record.decode_stream().unwrap(), stream);
    }

    #[test]
    fn test_result_record_flags() {
        let unchanged = Record::result(1, &Conversion::Unchanged, false).unwrap();
        assert!(unchanged.header.is_unchanged());
        assert!(!unchanged.header.is_failed());

        let failed = Record::result(2, &Conversion::Unchanged, true).unwrap();
        assert_eq!(failed.header.flags, flags::FAILED_RESULT);

        let empty = Record::result(3, &Conversion::Chunks(Vec::new()), false).unwrap();
        assert_eq!(empty.header.flags, 0);
        assert_eq!(empty.decode_conversion().unwrap(), Conversion::Chunks(Vec::new()));
    }

    #[test]
    fn test_build_record() {
        let header = Header::new(kinds::RESULT, 0, 42, 5);
        let bytes = build_record(&header, b"hello");

        assert_eq!(bytes.len(), HEADER_SIZE + 5);
        assert_eq!(Header::decode(&bytes[..HEADER_SIZE]).unwrap(), header);
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_to_bytes_roundtrip_through_buffer() {
        use super::super::RecordBuffer;

        let record = Record::result(9, &Conversion::Unchanged, false).unwrap();
        let mut buffer = RecordBuffer::new();
        let records = buffer.push(&record.to_bytes()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].header, record.header);
        assert_eq!(records[0].payload, record.payload);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_payload_length_must_fit_header() {
        assert_eq!(payload_len(u32::MAX as usize).unwrap(), u32::MAX);
        let err = payload_len(u32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, FlowconvError::Protocol(_)));
    }
}
