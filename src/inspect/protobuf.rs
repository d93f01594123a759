//! Protobuf wire-format dump without a schema.
//!
//! ```text
//! 1 <varint> = 150
//! 2 <chunk> = "testing"
//! 3 <chunk> = message:
//!     1 <varint> = 1
//! ```
//!
//! Length-delimited fields are shown as text when they are printable UTF-8,
//! as a nested message when they parse as one, and as hex otherwise.

use std::fmt::Write;

use super::StructureInspector;
use crate::error::{DissectError, DissectResult};

const MAX_DEPTH: usize = 16;
const INDENT: &str = "    ";
/// Longest byte field shown in full.
const MAX_HEX_BYTES: usize = 64;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_GROUP_START: u8 = 3;
const WIRE_GROUP_END: u8 = 4;
const WIRE_FIXED32: u8 = 5;

/// Schema-less protobuf inspector.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtobufInspector;

impl ProtobufInspector {
    pub fn new() -> Self {
        Self
    }
}

impl StructureInspector for ProtobufInspector {
    fn inspect(&self, data: &[u8]) -> DissectResult<String> {
        let mut out = String::new();
        dump_message(data, 0, &mut out)?;
        Ok(out)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn varint(&mut self) -> DissectResult<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let Some(&byte) = self.data.get(self.pos) else {
                return Err(malformed("truncated varint"));
            };
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(malformed("varint longer than 10 bytes"))
    }

    fn take(&mut self, len: usize) -> DissectResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| malformed("field runs past end of message"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }
}

/// Append the fields of one message at the given nesting depth.
fn dump_message(data: &[u8], depth: usize, out: &mut String) -> DissectResult<()> {
    if depth > MAX_DEPTH {
        return Err(malformed("message nested too deeply"));
    }

    let indent = INDENT.repeat(depth);
    let mut reader = Reader::new(data);

    while !reader.at_end() {
        let key = reader.varint()?;
        let field = key >> 3;
        let wire_type = (key & 0x7) as u8;
        if field == 0 {
            return Err(malformed("field number 0"));
        }

        // Writing to a String cannot fail.
        let _ = write!(out, "{}{} ", indent, field);
        match wire_type {
            WIRE_VARINT => {
                let value = reader.varint()?;
                let _ = writeln!(out, "<varint> = {}", value);
            }
            WIRE_FIXED64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(reader.take(8)?);
                let value = u64::from_le_bytes(raw);
                let _ = writeln!(
                    out,
                    "<64bit> = 0x{:016x} / {} / {:e}",
                    value,
                    value as i64,
                    f64::from_bits(value)
                );
            }
            WIRE_FIXED32 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(reader.take(4)?);
                let value = u32::from_le_bytes(raw);
                let _ = writeln!(
                    out,
                    "<32bit> = 0x{:08x} / {} / {:e}",
                    value,
                    value as i32,
                    f32::from_bits(value)
                );
            }
            WIRE_LEN => {
                let len = usize::try_from(reader.varint()?)
                    .map_err(|_| malformed("length does not fit in memory"))?;
                let bytes = reader.take(len)?;
                dump_chunk(bytes, depth, out);
            }
            WIRE_GROUP_START | WIRE_GROUP_END => {
                return Err(malformed("groups are not supported"));
            }
            other => {
                return Err(malformed(&format!("invalid wire type {}", other)));
            }
        }
    }

    Ok(())
}

fn dump_chunk(bytes: &[u8], depth: usize, out: &mut String) {
    if bytes.is_empty() {
        out.push_str("<chunk> = empty chunk\n");
        return;
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        if text
            .chars()
            .all(|c| !c.is_control() || c == '\n' || c == '\t' || c == '\r')
        {
            let _ = writeln!(out, "<chunk> = {:?}", text);
            return;
        }
    }

    let mut nested = String::new();
    if dump_message(bytes, depth + 1, &mut nested).is_ok() {
        out.push_str("<chunk> = message:\n");
        out.push_str(&nested);
        return;
    }

    let _ = write!(out, "<chunk> = bytes ({}) ", bytes.len());
    for byte in bytes.iter().take(MAX_HEX_BYTES) {
        let _ = write!(out, "{:02x}", byte);
    }
    if bytes.len() > MAX_HEX_BYTES {
        out.push_str("...");
    }
    out.push('\n');
}

fn malformed(reason: &str) -> DissectError {
    DissectError::Inspect(format!("Invalid protobuf message: {}", reason))
}
