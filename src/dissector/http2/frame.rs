//! HTTP/2 frame codec.
//!
//! Frames are parsed from a 9-byte header and an already delimited payload.
//! Padding and priority fields are stripped; the remaining header block or
//! data is kept as `Bytes` sliced out of the frame buffer.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{DissectError, DissectResult};

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 9;

pub const DATA: u8 = 0x0;
pub const HEADERS: u8 = 0x1;
pub const PRIORITY: u8 = 0x2;
pub const RST_STREAM: u8 = 0x3;
pub const SETTINGS: u8 = 0x4;
pub const PUSH_PROMISE: u8 = 0x5;
pub const PING: u8 = 0x6;
pub const GOAWAY: u8 = 0x7;
pub const WINDOW_UPDATE: u8 = 0x8;
pub const CONTINUATION: u8 = 0x9;

/// Frame flag bits.
pub mod flags {
    pub const END_STREAM: u8 = 0x01;
    pub const ACK: u8 = 0x01;
    pub const END_HEADERS: u8 = 0x04;
    pub const PADDED: u8 = 0x08;
    pub const PRIORITY: u8 = 0x20;
}

/// SETTINGS identifiers referenced by the dissectors.
pub mod settings {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const ENABLE_CONNECT_PROTOCOL: u16 = 0x8;
}

/// Stream dependency carried by HEADERS and PRIORITY frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub exclusive: bool,
    pub depends_on: u32,
    pub weight: u8,
}

impl Priority {
    fn parse(data: &[u8]) -> Self {
        let raw = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        Self {
            exclusive: raw & 0x8000_0000 != 0,
            depends_on: raw & 0x7fff_ffff,
            weight: data[4],
        }
    }
}

/// Type-specific frame content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    Data(Bytes),
    Headers {
        block: Bytes,
        priority: Option<Priority>,
    },
    Priority(Priority),
    RstStream {
        error_code: u32,
    },
    Settings(Vec<(u16, u32)>),
    PushPromise {
        promised_stream_id: u32,
        block: Bytes,
    },
    Ping([u8; 8]),
    GoAway {
        last_stream_id: u32,
        error_code: u32,
        debug_data: Bytes,
    },
    WindowUpdate {
        increment: u32,
    },
    Continuation(Bytes),
    /// Extension frame type this codec does not interpret.
    Unknown {
        kind: u8,
        payload: Bytes,
    },
}

/// A parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flags: u8,
    pub stream_id: u32,
    pub body: FrameBody,
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub kind: u8,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    /// Decode from the first 9 bytes of `buf`. `None` if too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: u32::from_be_bytes([0, buf[0], buf[1], buf[2]]),
            kind: buf[3],
            flags: buf[4],
            stream_id: u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff,
        })
    }
}

impl Frame {
    /// Parse a frame payload.
    ///
    /// # Errors
    ///
    /// Returns `DissectError::Frame` for payloads that violate the frame
    /// type's layout (bad padding, wrong fixed size, wrong stream id).
    pub fn parse(header: FrameHeader, payload: Bytes) -> DissectResult<Self> {
        let FrameHeader {
            kind,
            flags: frame_flags,
            stream_id,
            ..
        } = header;

        let body = match kind {
            DATA => {
                require_stream(kind, stream_id)?;
                FrameBody::Data(strip_padding(kind, frame_flags, payload)?)
            }
            HEADERS => {
                require_stream(kind, stream_id)?;
                let mut block = strip_padding(kind, frame_flags, payload)?;
                let priority = if frame_flags & flags::PRIORITY != 0 {
                    if block.len() < 5 {
                        return Err(invalid(kind, "priority fields truncated"));
                    }
                    let priority = Priority::parse(&block);
                    block = block.slice(5..);
                    Some(priority)
                } else {
                    None
                };
                FrameBody::Headers { block, priority }
            }
            PRIORITY => {
                require_stream(kind, stream_id)?;
                require_len(kind, &payload, 5)?;
                FrameBody::Priority(Priority::parse(&payload))
            }
            RST_STREAM => {
                require_stream(kind, stream_id)?;
                require_len(kind, &payload, 4)?;
                FrameBody::RstStream {
                    error_code: be_u32(&payload[..4]),
                }
            }
            SETTINGS => {
                require_connection(kind, stream_id)?;
                if payload.len() % 6 != 0 {
                    return Err(invalid(kind, "length must be a multiple of 6"));
                }
                if frame_flags & flags::ACK != 0 && !payload.is_empty() {
                    return Err(invalid(kind, "ACK must have an empty body"));
                }
                let values = payload
                    .chunks_exact(6)
                    .map(|s| (u16::from_be_bytes([s[0], s[1]]), be_u32(&s[2..6])))
                    .collect();
                FrameBody::Settings(values)
            }
            PUSH_PROMISE => {
                require_stream(kind, stream_id)?;
                let block = strip_padding(kind, frame_flags, payload)?;
                if block.len() < 4 {
                    return Err(invalid(kind, "promised stream id truncated"));
                }
                FrameBody::PushPromise {
                    promised_stream_id: be_u32(&block[..4]) & 0x7fff_ffff,
                    block: block.slice(4..),
                }
            }
            PING => {
                require_connection(kind, stream_id)?;
                require_len(kind, &payload, 8)?;
                let mut opaque = [0u8; 8];
                opaque.copy_from_slice(&payload);
                FrameBody::Ping(opaque)
            }
            GOAWAY => {
                require_connection(kind, stream_id)?;
                if payload.len() < 8 {
                    return Err(invalid(kind, "body shorter than 8 bytes"));
                }
                FrameBody::GoAway {
                    last_stream_id: be_u32(&payload[..4]) & 0x7fff_ffff,
                    error_code: be_u32(&payload[4..8]),
                    debug_data: payload.slice(8..),
                }
            }
            WINDOW_UPDATE => {
                require_len(kind, &payload, 4)?;
                FrameBody::WindowUpdate {
                    increment: be_u32(&payload) & 0x7fff_ffff,
                }
            }
            CONTINUATION => {
                require_stream(kind, stream_id)?;
                FrameBody::Continuation(payload)
            }
            other => FrameBody::Unknown {
                kind: other,
                payload,
            },
        };

        Ok(Frame {
            flags: frame_flags,
            stream_id,
            body,
        })
    }

    /// Frame type byte.
    pub fn kind(&self) -> u8 {
        match &self.body {
            FrameBody::Data(_) => DATA,
            FrameBody::Headers { .. } => HEADERS,
            FrameBody::Priority(_) => PRIORITY,
            FrameBody::RstStream { .. } => RST_STREAM,
            FrameBody::Settings(_) => SETTINGS,
            FrameBody::PushPromise { .. } => PUSH_PROMISE,
            FrameBody::Ping(_) => PING,
            FrameBody::GoAway { .. } => GOAWAY,
            FrameBody::WindowUpdate { .. } => WINDOW_UPDATE,
            FrameBody::Continuation(_) => CONTINUATION,
            FrameBody::Unknown { kind, .. } => *kind,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match &self.body {
            FrameBody::Data(_) => "DataFrame",
            FrameBody::Headers { .. } => "HeadersFrame",
            FrameBody::Priority(_) => "PriorityFrame",
            FrameBody::RstStream { .. } => "RstStreamFrame",
            FrameBody::Settings(_) => "SettingsFrame",
            FrameBody::PushPromise { .. } => "PushPromiseFrame",
            FrameBody::Ping(_) => "PingFrame",
            FrameBody::GoAway { .. } => "GoAwayFrame",
            FrameBody::WindowUpdate { .. } => "WindowUpdateFrame",
            FrameBody::Continuation(_) => "ContinuationFrame",
            FrameBody::Unknown { .. } => "ExtensionFrame",
        }
    }

    #[inline]
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Names of the flags defined for this frame type that are set.
    pub fn flag_names(&self) -> Vec<&'static str> {
        let defined: &[(u8, &'static str)] = match &self.body {
            FrameBody::Data(_) => &[(flags::END_STREAM, "END_STREAM"), (flags::PADDED, "PADDED")],
            FrameBody::Headers { .. } => &[
                (flags::END_STREAM, "END_STREAM"),
                (flags::END_HEADERS, "END_HEADERS"),
                (flags::PADDED, "PADDED"),
                (flags::PRIORITY, "PRIORITY"),
            ],
            FrameBody::Settings(_) | FrameBody::Ping(_) => &[(flags::ACK, "ACK")],
            FrameBody::PushPromise { .. } => {
                &[(flags::END_HEADERS, "END_HEADERS"), (flags::PADDED, "PADDED")]
            }
            FrameBody::Continuation(_) => &[(flags::END_HEADERS, "END_HEADERS")],
            _ => &[],
        };
        defined
            .iter()
            .filter(|(bit, _)| self.flags & bit != 0)
            .map(|(_, name)| *name)
            .collect()
    }

    /// HPACK block of HEADERS, PUSH_PROMISE and CONTINUATION frames.
    pub fn header_block(&self) -> Option<&Bytes> {
        match &self.body {
            FrameBody::Headers { block, .. }
            | FrameBody::PushPromise { block, .. }
            | FrameBody::Continuation(block) => Some(block),
            _ => None,
        }
    }

    /// Payload of a DATA frame, without padding.
    pub fn data(&self) -> Option<&Bytes> {
        match &self.body {
            FrameBody::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Value of a SETTINGS entry, last one wins.
    pub fn setting(&self, id: u16) -> Option<u32> {
        match &self.body {
            FrameBody::Settings(values) => values
                .iter()
                .rev()
                .find(|(k, _)| *k == id)
                .map(|(_, v)| *v),
            _ => None,
        }
    }

    /// Serialize the frame. Padding is never emitted; the PADDED flag is
    /// cleared.
    ///
    /// Dissection never calls this; it builds captures in code, such as
    /// test fixtures.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = BytesMut::new();
        let mut frame_flags = self.flags & !flags::PADDED;
        match &self.body {
            FrameBody::Data(data) | FrameBody::Continuation(data) => payload.put_slice(data),
            FrameBody::Headers { block, priority } => {
                frame_flags &= !flags::PRIORITY;
                if let Some(p) = priority {
                    frame_flags |= flags::PRIORITY;
                    put_priority(&mut payload, p);
                }
                payload.put_slice(block);
            }
            FrameBody::Priority(p) => put_priority(&mut payload, p),
            FrameBody::RstStream { error_code } => payload.put_u32(*error_code),
            FrameBody::Settings(values) => {
                for (id, value) in values {
                    payload.put_u16(*id);
                    payload.put_u32(*value);
                }
            }
            FrameBody::PushPromise {
                promised_stream_id,
                block,
            } => {
                payload.put_u32(*promised_stream_id);
                payload.put_slice(block);
            }
            FrameBody::Ping(opaque) => payload.put_slice(opaque),
            FrameBody::GoAway {
                last_stream_id,
                error_code,
                debug_data,
            } => {
                payload.put_u32(*last_stream_id);
                payload.put_u32(*error_code);
                payload.put_slice(debug_data);
            }
            FrameBody::WindowUpdate { increment } => payload.put_u32(*increment),
            FrameBody::Unknown { payload: raw, .. } => payload.put_slice(raw),
        }

        let len = payload.len() as u32;
        let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        out.extend_from_slice(&len.to_be_bytes()[1..]);
        out.push(self.kind());
        out.push(frame_flags);
        out.extend_from_slice(&(self.stream_id & 0x7fff_ffff).to_be_bytes());
        out.extend_from_slice(&payload);
        out
    }
}

/// One-line summary: `DataFrame(stream_id=1, flags=[END_STREAM]): <hex:6869>`.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let FrameBody::Unknown { kind, .. } = &self.body {
            write!(f, "{}(type={}, ", self.type_name(), kind)?;
        } else {
            write!(f, "{}(", self.type_name())?;
        }
        write!(
            f,
            "stream_id={}, flags=[{}]): ",
            self.stream_id,
            self.flag_names().join(", ")
        )?;

        match &self.body {
            FrameBody::Data(data) | FrameBody::Continuation(data) => {
                write!(f, "<hex:{}>", HexPreview(data))
            }
            FrameBody::Headers { block, priority } => {
                if let Some(p) = priority {
                    write!(
                        f,
                        "exclusive={}, depends_on={}, stream_weight={}, ",
                        p.exclusive, p.depends_on, p.weight
                    )?;
                }
                write!(f, "data=<hex:{}>", HexPreview(block))
            }
            FrameBody::Priority(p) => write!(
                f,
                "exclusive={}, depends_on={}, stream_weight={}",
                p.exclusive, p.depends_on, p.weight
            ),
            FrameBody::RstStream { error_code } => write!(f, "error_code={}", error_code),
            FrameBody::Settings(values) => {
                f.write_str("settings={")?;
                for (i, (id, value)) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", id, value)?;
                }
                f.write_str("}")
            }
            FrameBody::PushPromise {
                promised_stream_id,
                block,
            } => write!(
                f,
                "promised_stream_id={}, data=<hex:{}>",
                promised_stream_id,
                HexPreview(block)
            ),
            FrameBody::Ping(opaque) => write!(f, "opaque_data=<hex:{}>", HexPreview(opaque)),
            FrameBody::GoAway {
                last_stream_id,
                error_code,
                debug_data,
            } => write!(
                f,
                "last_stream_id={}, error_code={}, additional_data=<hex:{}>",
                last_stream_id,
                error_code,
                HexPreview(debug_data)
            ),
            FrameBody::WindowUpdate { increment } => write!(f, "window_increment={}", increment),
            FrameBody::Unknown { payload, .. } => write!(f, "<hex:{}>", HexPreview(payload)),
        }
    }
}

/// Hex of the first 10 bytes, `...` if longer.
struct HexPreview<'a>(&'a [u8]);

impl fmt::Display for HexPreview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().take(10) {
            write!(f, "{:02x}", byte)?;
        }
        if self.0.len() > 10 {
            f.write_str("...")?;
        }
        Ok(())
    }
}

fn put_priority(buf: &mut BytesMut, p: &Priority) {
    let mut raw = p.depends_on & 0x7fff_ffff;
    if p.exclusive {
        raw |= 0x8000_0000;
    }
    buf.put_u32(raw);
    buf.put_u8(p.weight);
}

fn strip_padding(kind: u8, frame_flags: u8, payload: Bytes) -> DissectResult<Bytes> {
    if frame_flags & flags::PADDED == 0 {
        return Ok(payload);
    }
    let Some(&pad) = payload.first() else {
        return Err(invalid(kind, "missing pad length"));
    };
    let pad = pad as usize;
    if pad >= payload.len() {
        return Err(invalid(kind, "padding is too long"));
    }
    Ok(payload.slice(1..payload.len() - pad))
}

fn require_stream(kind: u8, stream_id: u32) -> DissectResult<()> {
    if stream_id == 0 {
        return Err(invalid(kind, "must be associated with a stream"));
    }
    Ok(())
}

fn require_connection(kind: u8, stream_id: u32) -> DissectResult<()> {
    if stream_id != 0 {
        return Err(invalid(kind, "must not be associated with a stream"));
    }
    Ok(())
}

fn require_len(kind: u8, payload: &[u8], len: usize) -> DissectResult<()> {
    if payload.len() != len {
        return Err(invalid(
            kind,
            &format!("body must be {} bytes, got {}", len, payload.len()),
        ));
    }
    Ok(())
}

fn invalid(kind: u8, reason: &str) -> DissectError {
    DissectError::Frame(format!("Invalid frame of type {:#x}: {}", kind, reason))
}

#[inline]
fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: u8, frame_flags: u8, stream_id: u32, payload: &[u8]) -> (FrameHeader, Bytes) {
        let header = FrameHeader {
            length: payload.len() as u32,
            kind,
            flags: frame_flags,
            stream_id,
        };
        (header, Bytes::copy_from_slice(payload))
    }

    fn parse(kind: u8, frame_flags: u8, stream_id: u32, payload: &[u8]) -> DissectResult<Frame> {
        let (header, payload) = raw(kind, frame_flags, stream_id, payload);
        Frame::parse(header, payload)
    }

    #[test]
    fn test_header_decode() {
        let header = FrameHeader::decode(&[0, 0, 5, 0x1, 0x4, 0x80, 0, 0, 3]).unwrap();
        assert_eq!(header.length, 5);
        assert_eq!(header.kind, HEADERS);
        assert_eq!(header.flags, flags::END_HEADERS);
        // reserved bit masked off
        assert_eq!(header.stream_id, 3);
        assert!(FrameHeader::decode(&[0; 8]).is_none());
    }

    #[test]
    fn test_data_with_padding() {
        let frame = parse(DATA, flags::PADDED | flags::END_STREAM, 1, &[2, b'h', b'i', 0, 0]).unwrap();
        assert_eq!(frame.data().unwrap().as_ref(), b"hi");
        assert_eq!(frame.flag_names(), vec!["END_STREAM", "PADDED"]);

        assert!(parse(DATA, flags::PADDED, 1, &[4, 1, 2]).is_err());
        assert!(parse(DATA, 0, 0, b"x").is_err());
    }

    #[test]
    fn test_headers_with_priority() {
        let frame = parse(
            HEADERS,
            flags::PRIORITY | flags::END_HEADERS,
            5,
            &[0x80, 0, 0, 3, 15, 0x82],
        )
        .unwrap();
        match &frame.body {
            FrameBody::Headers { block, priority } => {
                assert_eq!(block.as_ref(), &[0x82]);
                assert_eq!(
                    *priority,
                    Some(Priority {
                        exclusive: true,
                        depends_on: 3,
                        weight: 15
                    })
                );
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_settings() {
        let frame = parse(SETTINGS, 0, 0, &[0, 5, 0, 0, 0x40, 0, 0, 3, 0, 0, 0, 100]).unwrap();
        assert_eq!(frame.setting(settings::MAX_FRAME_SIZE), Some(16_384));
        assert_eq!(frame.setting(3), Some(100));
        assert_eq!(frame.setting(8), None);

        assert!(parse(SETTINGS, 0, 0, &[0, 5, 0]).is_err());
        assert!(parse(SETTINGS, 0, 1, &[]).is_err());
        assert!(parse(SETTINGS, flags::ACK, 0, &[0, 5, 0, 0, 0x40, 0]).is_err());
    }

    #[test]
    fn test_fixed_size_frames() {
        assert!(parse(PING, 0, 0, &[0; 8]).is_ok());
        assert!(parse(PING, 0, 0, &[0; 7]).is_err());
        assert!(parse(RST_STREAM, 0, 1, &[0, 0, 0, 8]).is_ok());
        assert!(parse(WINDOW_UPDATE, 0, 0, &[0, 0, 1, 0]).is_ok());
        assert!(parse(GOAWAY, 0, 0, &[0; 4]).is_err());
    }

    #[test]
    fn test_unknown_type_kept() {
        let frame = parse(0xf0, 0, 0, b"ext").unwrap();
        assert_eq!(frame.kind(), 0xf0);
        assert_eq!(frame.to_string(), "ExtensionFrame(type=240, stream_id=0, flags=[]): <hex:657874>");
    }

    #[test]
    fn test_display() {
        let frame = parse(DATA, flags::END_STREAM, 1, b"hello world!").unwrap();
        assert_eq!(
            frame.to_string(),
            "DataFrame(stream_id=1, flags=[END_STREAM]): <hex:68656c6c6f20776f726c...>"
        );

        let frame = parse(WINDOW_UPDATE, 0, 0, &[0, 0, 0, 10]).unwrap();
        assert_eq!(frame.to_string(), "WindowUpdateFrame(stream_id=0, flags=[]): window_increment=10");
    }

    #[test]
    fn test_encode_parse() {
        let frame = Frame {
            flags: flags::END_HEADERS,
            stream_id: 7,
            body: FrameBody::Headers {
                block: Bytes::from_static(&[0x82, 0x86]),
                priority: None,
            },
        };
        let bytes = frame.encode();
        let header = FrameHeader::decode(&bytes).unwrap();
        assert_eq!(header.length, 2);
        let parsed = Frame::parse(header, Bytes::copy_from_slice(&bytes[FRAME_HEADER_SIZE..])).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_encode_drops_padding_flag() {
        let frame = Frame {
            flags: flags::PADDED | flags::END_STREAM,
            stream_id: 1,
            body: FrameBody::Data(Bytes::from_static(b"ab")),
        };
        let bytes = frame.encode();
        let header = FrameHeader::decode(&bytes).unwrap();
        assert_eq!(header.flags, flags::END_STREAM);
        assert_eq!(&bytes[FRAME_HEADER_SIZE..], b"ab");
    }
}
