//! WebSocket frame parsing.
//!
//! Frames are cut left to right out of a chunk. A masked frame is unmasked
//! and its mask bit cleared, so the rendered header describes the payload
//! that follows it.

use crate::error::{DissectError, DissectResult};

pub const OPCODE_CONTINUATION: u8 = 0x0;

const FIN: u8 = 0x80;
const RSV1: u8 = 0x40;
const MASK: u8 = 0x80;

/// One frame: header without mask key, then the unmasked payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsFrame {
    /// Base header plus extended length, as captured except for the mask bit.
    pub header: Vec<u8>,
    pub payload: Vec<u8>,
}

impl WsFrame {
    #[inline]
    pub fn fin(&self) -> bool {
        self.header[0] & FIN != 0
    }

    #[inline]
    pub fn set_fin(&mut self) {
        self.header[0] |= FIN;
    }

    /// Per-message compressed bit.
    #[inline]
    pub fn rsv1(&self) -> bool {
        self.header[0] & RSV1 != 0
    }

    #[inline]
    pub fn clear_rsv1(&mut self) {
        self.header[0] &= !RSV1;
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        self.header[0] & 0x0f
    }

    /// Close, ping and pong.
    #[inline]
    pub fn is_control(&self) -> bool {
        self.opcode() & 0x08 != 0
    }

    #[inline]
    pub fn is_masked(&self) -> bool {
        self.header[1] & MASK != 0
    }

    /// Header followed by payload.
    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.len() + self.payload.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// XOR `payload` with the 4-byte key, cycling. Applying it twice is a no-op.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Parse one frame from the front of `data`.
///
/// Returns the frame and the number of bytes it occupied.
///
/// # Errors
///
/// `DissectError::WebSocket` when `data` ends inside the frame.
pub fn parse_frame(data: &[u8]) -> DissectResult<(WsFrame, usize)> {
    if data.len() < 2 {
        return Err(truncated(2, data.len()));
    }

    let (header_len, payload_len) = match data[1] & 0x7f {
        126 => {
            if data.len() < 4 {
                return Err(truncated(4, data.len()));
            }
            (4, u16::from_be_bytes([data[2], data[3]]) as u64)
        }
        127 => {
            if data.len() < 10 {
                return Err(truncated(10, data.len()));
            }
            let mut len = [0u8; 8];
            len.copy_from_slice(&data[2..10]);
            (10, u64::from_be_bytes(len))
        }
        len => (2, len as u64),
    };

    let masked = data[1] & MASK != 0;
    let key_len = if masked { 4 } else { 0 };
    let payload_start = header_len + key_len;

    let available = (data.len() - header_len) as u64;
    let needed = (key_len as u64).saturating_add(payload_len);
    if available < needed {
        return Err(truncated(
            (header_len as u64).saturating_add(needed),
            data.len(),
        ));
    }
    let end = payload_start + payload_len as usize;

    let mut header = data[..header_len].to_vec();
    let mut payload = data[payload_start..end].to_vec();
    if masked {
        let key = [
            data[header_len],
            data[header_len + 1],
            data[header_len + 2],
            data[header_len + 3],
        ];
        apply_mask(&mut payload, key);
        header[1] &= !MASK;
    }

    Ok((WsFrame { header, payload }, end))
}

fn truncated(needed: impl std::fmt::Display, have: usize) -> DissectError {
    DissectError::WebSocket(format!(
        "Truncated websocket frame: need {} bytes, have {}",
        needed, have
    ))
}
