//! Per-direction HTTP/2 frame reassembly.
//!
//! Same shape as the exchange `RecordBuffer`: bytes are appended to a
//! `BytesMut`, and complete frames are split off the front by the length
//! in their header. The client-direction buffer first consumes the
//! connection preface.

use bytes::{Bytes, BytesMut};

use super::frame::{FrameHeader, FRAME_HEADER_SIZE};
use crate::config::{DEFAULT_MAX_FRAME_SIZE, MAX_ALLOWED_FRAME_SIZE};
use crate::error::{DissectError, DissectResult};

/// Client connection preface.
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Reassembles frames from one direction of a connection.
#[derive(Debug)]
pub struct FrameBuffer {
    data: BytesMut,
    awaiting_preface: bool,
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Buffer for server-sent data.
    pub fn new(max_frame_size: u32) -> Self {
        Self {
            data: BytesMut::new(),
            awaiting_preface: false,
            max_frame_size,
        }
    }

    /// Buffer for client-sent data, which starts with the preface.
    pub fn with_preface(max_frame_size: u32) -> Self {
        Self {
            awaiting_preface: true,
            ..Self::new(max_frame_size)
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Change the frame bound. Values outside the protocol range are clamped.
    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size.clamp(DEFAULT_MAX_FRAME_SIZE, MAX_ALLOWED_FRAME_SIZE);
    }

    /// Split the next complete frame off the buffer.
    ///
    /// Returns `Ok(None)` when more data is needed.
    ///
    /// # Errors
    ///
    /// An invalid preface or a frame above the size bound. The buffer is
    /// cleared, since frame boundaries are lost at that point.
    pub fn next_frame(&mut self) -> DissectResult<Option<(FrameHeader, Bytes)>> {
        if self.awaiting_preface {
            let have = self.data.len().min(PREFACE.len());
            if self.data[..have] != PREFACE[..have] {
                self.data.clear();
                return Err(DissectError::Frame("Invalid HTTP/2 preamble".to_string()));
            }
            if have < PREFACE.len() {
                return Ok(None);
            }
            let _ = self.data.split_to(PREFACE.len());
            self.awaiting_preface = false;
        }

        let Some(header) = FrameHeader::decode(&self.data) else {
            return Ok(None);
        };

        if header.length > self.max_frame_size {
            self.data.clear();
            return Err(DissectError::Frame(format!(
                "Received overlong frame: length {}, max {}",
                header.length, self.max_frame_size
            )));
        }

        let total = FRAME_HEADER_SIZE + header.length as usize;
        if self.data.len() < total {
            return Ok(None);
        }

        let mut frame = self.data.split_to(total);
        let payload = frame.split_off(FRAME_HEADER_SIZE).freeze();
        Ok(Some((header, payload)))
    }

    /// Bytes waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.data.len()
    }
}
