//! gRPC layer.
//!
//! Runs as [`H2Hooks`] on top of HTTP/2. HEADERS frames tell us which
//! streams carry gRPC and which `grpc-encoding` each side uses; DATA frames
//! on those streams are split into the 5-byte message prefix and the
//! message, decompressed if flagged, and rendered through a
//! [`StructureInspector`].
//!
//! Some servers only send `content-type` on the first response of a
//! connection, so once a direction has carried gRPC it stays latched for
//! the rest of the conversation.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use flate2::read::{GzDecoder, ZlibDecoder};
use tracing::debug;

use super::http2::{
    base_setting_name, dissect_with, find_header, render_data, Frame, FrameBody, H2Hooks,
    HeaderList,
};
use super::Dissector;
use crate::config::DissectorConfig;
use crate::error::{DissectError, DissectResult};
use crate::inspect::StructureInspector;
use crate::model::{Chunk, Direction, Stream};

/// Length of the compressed flag plus the big-endian message length.
pub const MESSAGE_PREFIX_SIZE: usize = 5;

const GRPC_ALLOW_TRUE_BINARY_METADATA: u16 = 0xfe03;
const GRPC_PREFERRED_RECEIVE_CRYPTO_FRAME_SIZE: u16 = 0xfe04;

/// `application/grpc`, `application/grpc+proto` and other `+` subtypes,
/// parameters ignored.
pub fn is_grpc_content_type(value: &str) -> bool {
    let media = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media == "application/grpc" || media.starts_with("application/grpc+")
}

/// Message encoding announced by `grpc-encoding`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GrpcEncoding {
    #[default]
    Identity,
    Deflate,
    Gzip,
    Other(String),
}

impl GrpcEncoding {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "identity" => GrpcEncoding::Identity,
            "deflate" => GrpcEncoding::Deflate,
            "gzip" => GrpcEncoding::Gzip,
            other => GrpcEncoding::Other(other.to_string()),
        }
    }

    /// Undo the encoding. Corrupt deflate/gzip data is returned as is;
    /// output past `limit` bytes is an error.
    fn decode(&self, data: &[u8], limit: usize) -> DissectResult<Vec<u8>> {
        let mut out = Vec::new();
        let cap = (limit as u64).saturating_add(1);
        let result = match self {
            GrpcEncoding::Identity => return Ok(data.to_vec()),
            GrpcEncoding::Deflate => ZlibDecoder::new(data).take(cap).read_to_end(&mut out),
            GrpcEncoding::Gzip => GzDecoder::new(data).take(cap).read_to_end(&mut out),
            GrpcEncoding::Other(name) => {
                return Err(DissectError::Grpc(format!(
                    "Compressed grpc data is not supported (grpc-encoding: {})",
                    name
                )))
            }
        };
        match result {
            Ok(_) if out.len() > limit => Err(DissectError::Grpc(format!(
                "Decompressed grpc message exceeds {} bytes",
                limit
            ))),
            Ok(_) => Ok(out),
            Err(e) => {
                debug!(encoding = ?self, error = %e, "grpc decompression failed, keeping raw bytes");
                Ok(data.to_vec())
            }
        }
    }
}

/// One length-prefixed message taken from a DATA frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcMessage<'a> {
    pub compressed: u8,
    pub length: u32,
    pub data: &'a [u8],
}

impl<'a> GrpcMessage<'a> {
    /// Split a DATA payload that must hold exactly one message.
    pub fn parse(payload: &'a [u8]) -> DissectResult<Self> {
        if payload.len() < MESSAGE_PREFIX_SIZE {
            return Err(DissectError::Grpc(
                "Data length is less than 5 bytes".to_string(),
            ));
        }
        let compressed = payload[0];
        let length = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
        let data = &payload[MESSAGE_PREFIX_SIZE..];

        let declared = usize::try_from(length).unwrap_or(usize::MAX);
        if data.len() < declared {
            return Err(DissectError::Grpc(
                "Message length does not match the length of the message data".to_string(),
            ));
        }
        if data.len() > declared {
            return Err(DissectError::Grpc(
                "Message data is longer than the message length".to_string(),
            ));
        }

        Ok(Self {
            compressed,
            length,
            data,
        })
    }
}

/// What the headers of one HTTP/2 stream said, per direction.
#[derive(Debug, Default)]
struct GrpcStream {
    confirmed: [bool; 2],
    encoding: [GrpcEncoding; 2],
}

/// gRPC hooks for the HTTP/2 layer.
pub struct GrpcLayer {
    streams: HashMap<u32, GrpcStream>,
    /// Direction has carried a gRPC content-type at least once.
    latched: [bool; 2],
    inspector: Arc<dyn StructureInspector>,
    max_inflated_size: usize,
}

impl GrpcLayer {
    pub fn new(inspector: Arc<dyn StructureInspector>, max_inflated_size: usize) -> Self {
        Self {
            streams: HashMap::new(),
            latched: [false; 2],
            inspector,
            max_inflated_size,
        }
    }

    fn is_grpc(&self, direction: Direction, stream_id: u32) -> bool {
        let index = direction.index();
        self.latched[index]
            || self
                .streams
                .get(&stream_id)
                .is_some_and(|s| s.confirmed[index])
    }

    fn encoding(&self, direction: Direction, stream_id: u32) -> GrpcEncoding {
        self.streams
            .get(&stream_id)
            .map(|s| s.encoding[direction.index()].clone())
            .unwrap_or_default()
    }

    fn render_message(&self, direction: Direction, frame: &Frame, payload: &[u8]) -> Vec<u8> {
        match self.try_render_message(direction, frame, payload) {
            Ok(out) => out,
            Err(e) => {
                debug!(%direction, stream_id = frame.stream_id, error = %e, "grpc message fallback");
                let mut out = format!("{}\n", e).into_bytes();
                out.extend(render_data(frame));
                out
            }
        }
    }

    fn try_render_message(
        &self,
        direction: Direction,
        frame: &Frame,
        payload: &[u8],
    ) -> DissectResult<Vec<u8>> {
        let message = GrpcMessage::parse(payload)?;
        let data = if message.compressed != 0 {
            self.encoding(direction, frame.stream_id)
                .decode(message.data, self.max_inflated_size)?
        } else {
            message.data.to_vec()
        };

        let fields = if data.is_empty() {
            String::new()
        } else {
            self.inspector.inspect(&data)?
        };

        Ok(format!(
            "{}\nGRPC-Compressed: {}\nGRPC-Message-Length: {}\n{}\n",
            frame,
            message.compressed,
            message.length,
            fields.trim_end()
        )
        .into_bytes())
    }
}

impl H2Hooks for GrpcLayer {
    fn setting_name(&self, id: u16) -> Option<&'static str> {
        match id {
            GRPC_ALLOW_TRUE_BINARY_METADATA => Some("GRPC_ALLOW_TRUE_BINARY_METADATA"),
            GRPC_PREFERRED_RECEIVE_CRYPTO_FRAME_SIZE => {
                Some("GRPC_PREFERRED_RECEIVE_CRYPTO_FRAME_SIZE")
            }
            _ => base_setting_name(id),
        }
    }

    fn headers(
        &mut self,
        direction: Direction,
        frame: &Frame,
        headers: &HeaderList,
    ) -> DissectResult<()> {
        let index = direction.index();
        let content_type = find_header(headers, "content-type");
        let encoding = find_header(headers, "grpc-encoding");
        if content_type.is_none() && encoding.is_none() {
            return Ok(());
        }

        let stream = self.streams.entry(frame.stream_id).or_default();
        if let Some(content_type) = content_type {
            stream.confirmed[index] = is_grpc_content_type(content_type);
            if stream.confirmed[index] && !self.latched[index] {
                debug!(%direction, stream_id = frame.stream_id, "grpc detected");
                self.latched[index] = true;
            }
        }
        if let Some(encoding) = encoding {
            stream.encoding[index] = GrpcEncoding::parse(encoding);
        }
        Ok(())
    }

    fn frame(&mut self, direction: Direction, frame: &Frame) -> DissectResult<Option<Vec<u8>>> {
        let FrameBody::Data(payload) = &frame.body else {
            return Ok(None);
        };
        if payload.is_empty() || !self.is_grpc(direction, frame.stream_id) {
            return Ok(None);
        }
        Ok(Some(self.render_message(direction, frame, payload)))
    }
}

/// HTTP/1 + HTTP/2 + gRPC dissector.
pub struct GrpcDissector {
    config: DissectorConfig,
    inspector: Arc<dyn StructureInspector>,
}

impl GrpcDissector {
    pub fn new(config: DissectorConfig, inspector: Arc<dyn StructureInspector>) -> Self {
        Self { config, inspector }
    }
}

impl Dissector for GrpcDissector {
    fn name(&self) -> &'static str {
        "grpc"
    }

    fn transform(&self, stream: &Stream) -> DissectResult<Vec<Chunk>> {
        dissect_with(
            GrpcLayer::new(Arc::clone(&self.inspector), self.config.max_inflated_size),
            &self.config,
            &stream.chunks,
        )
    }
}
