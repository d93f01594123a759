//! HTTP/2 layer.
//!
//! [`Http2Layer`] sits on top of the HTTP/1 layer as its [`Http1Hooks`].
//! It switches a conversation to frame mode when the client sends the
//! connection preface, or after an `Upgrade: h2c` exchange, and from then on
//! renders every frame as its own chunk. Header blocks are decoded with one
//! HPACK decoder per direction that lives as long as the conversation.
//!
//! Layers above (WebSocket, gRPC) plug in through [`H2Hooks`].

pub mod frame;
mod frame_buffer;

use std::borrow::Cow;
use std::panic::{catch_unwind, AssertUnwindSafe};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use tracing::debug;

pub use frame::{Frame, FrameBody, FrameHeader};
pub use frame_buffer::{FrameBuffer, PREFACE};

use super::http1::{render_response, Http1Hooks, Http1Layer, Request, Response};
use super::Dissector;
use crate::config::DissectorConfig;
use crate::error::{DissectError, DissectResult};
use crate::model::{Chunk, Direction, Stream};

/// Decoded header list of one HEADERS-class frame.
pub type HeaderList = [(String, String)];

/// SETTINGS identifiers every HTTP/2 peer understands.
pub fn base_setting_name(id: u16) -> Option<&'static str> {
    match id {
        1 => Some("HEADER_TABLE_SIZE"),
        2 => Some("ENABLE_PUSH"),
        3 => Some("MAX_CONCURRENT_STREAMS"),
        4 => Some("INITIAL_WINDOW_SIZE"),
        5 => Some("MAX_FRAME_SIZE"),
        6 => Some("MAX_HEADER_LIST_SIZE"),
        _ => None,
    }
}

/// First value of a decoded header, by exact (lower-case) name.
pub fn find_header<'a>(headers: &'a HeaderList, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Extension points of the HTTP/2 layer.
///
/// All methods default to "not handled", so the layer's own behavior
/// applies.
pub trait H2Hooks {
    /// Display name of a SETTINGS identifier.
    fn setting_name(&self, id: u16) -> Option<&'static str> {
        base_setting_name(id)
    }

    /// Intercept a chunk before any HTTP/2 or HTTP/1 handling.
    fn raw_chunk(&mut self, chunk: &Chunk) -> DissectResult<Option<Vec<Chunk>>> {
        let _ = chunk;
        Ok(None)
    }

    /// Handle an HTTP/1 request before the h2c upgrade check.
    fn http1_request(
        &mut self,
        chunk: &Chunk,
        request: &Request,
    ) -> DissectResult<Option<Vec<Chunk>>> {
        let _ = (chunk, request);
        Ok(None)
    }

    /// Handle an HTTP/1 response before the h2c upgrade check.
    fn http1_response(
        &mut self,
        chunk: &Chunk,
        response: &Response,
    ) -> DissectResult<Option<Vec<Chunk>>> {
        let _ = (chunk, response);
        Ok(None)
    }

    /// Observe the decoded headers of a HEADERS-class frame.
    fn headers(
        &mut self,
        direction: Direction,
        frame: &Frame,
        headers: &HeaderList,
    ) -> DissectResult<()> {
        let _ = (direction, frame, headers);
        Ok(())
    }

    /// Replace the rendering of one frame. `None` keeps the default.
    fn frame(&mut self, direction: Direction, frame: &Frame) -> DissectResult<Option<Vec<u8>>> {
        let _ = (direction, frame);
        Ok(None)
    }
}

/// No extra behavior on top of HTTP/2.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainH2;

impl H2Hooks for PlainH2 {}

/// Default DATA rendering: summary line, then the payload.
pub fn render_data(frame: &Frame) -> Vec<u8> {
    let mut out = format!("{}\n", frame).into_bytes();
    if let Some(data) = frame.data() {
        out.extend_from_slice(data);
    }
    out.push(b'\n');
    out
}

/// Conversation-scoped HTTP/2 state plus the hooks of the layer above.
pub struct Http2Layer<X> {
    hooks: X,
    active: bool,
    /// Created on preface or h2c upgrade, indexed by `Direction::index`.
    buffers: Option<[FrameBuffer; 2]>,
    decoders: [hpack::Decoder<'static>; 2],
    /// A header block without END_HEADERS is still open.
    open_header_block: [bool; 2],
    max_frame_size: u32,
    max_inflated_size: usize,
}

impl<X: H2Hooks> Http2Layer<X> {
    pub fn new(hooks: X, config: &DissectorConfig) -> Self {
        Self {
            hooks,
            active: false,
            buffers: None,
            decoders: [hpack::Decoder::new(), hpack::Decoder::new()],
            open_header_block: [false; 2],
            max_frame_size: config.max_frame_size,
            max_inflated_size: config.max_inflated_size,
        }
    }

    pub fn hooks(&self) -> &X {
        &self.hooks
    }

    /// Whether the conversation is in frame mode.
    pub fn is_active(&self) -> bool {
        self.active
    }

    fn ensure_buffers(&mut self) {
        if self.buffers.is_none() {
            self.buffers = Some([
                FrameBuffer::with_preface(self.max_frame_size),
                FrameBuffer::new(self.max_frame_size),
            ]);
        }
    }

    /// Feed raw bytes of one direction and render every complete frame.
    fn feed(&mut self, direction: Direction, data: &[u8]) -> DissectResult<Vec<Chunk>> {
        let Some(buffers) = self.buffers.as_mut() else {
            return Ok(vec![Chunk::new(direction, data.to_vec())]);
        };
        buffers[direction.index()].push(data);

        let mut output = Vec::new();
        loop {
            let next = match self.buffers.as_mut() {
                Some(buffers) => buffers[direction.index()].next_frame(),
                None => Ok(None),
            };
            let (header, payload) = match next {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) => {
                    let what = if direction.is_client() { "request" } else { "response" };
                    debug!(%direction, error = %e, "HTTP/2 frame buffer error");
                    output.push(Chunk::diagnostic(
                        direction,
                        format!("Unable to parse HTTP2 {}: {}", what, e),
                    ));
                    break;
                }
            };

            let rendered = Frame::parse(header, payload).and_then(|frame| {
                self.apply_settings(direction, &frame);
                self.render_frame(direction, &frame)
            });
            match rendered {
                Ok(mut content) => {
                    content.push(b'\n');
                    output.push(Chunk::new(direction, content));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => output.push(Chunk::diagnostic(
                    direction,
                    format!("Unable to parse HTTP2 frame: {}", e),
                )),
            }
        }

        Ok(output)
    }

    /// A peer's MAX_FRAME_SIZE bounds what the other side may send.
    fn apply_settings(&mut self, direction: Direction, frame: &Frame) {
        if frame.has_flag(frame::flags::ACK) {
            return;
        }
        let Some(size) = frame.setting(frame::settings::MAX_FRAME_SIZE) else {
            return;
        };
        if let Some(buffers) = self.buffers.as_mut() {
            let peer = &mut buffers[direction.opposite().index()];
            peer.set_max_frame_size(size);
            debug!(%direction, max_frame_size = peer.max_frame_size(), "peer frame bound updated");
        }
    }

    fn render_frame(&mut self, direction: Direction, frame: &Frame) -> DissectResult<Vec<u8>> {
        if let Some(out) = self.hooks.frame(direction, frame)? {
            return Ok(out);
        }

        match &frame.body {
            FrameBody::Headers { .. } | FrameBody::PushPromise { .. } | FrameBody::Continuation(_) => {
                self.render_headers(direction, frame)
            }
            FrameBody::Data(_) => Ok(render_data(frame)),
            FrameBody::Settings(values) => {
                let mut out = format!(
                    "{}(stream_id={}, flags=[{}]):\n",
                    frame.type_name(),
                    frame.stream_id,
                    frame.flag_names().join(", ")
                );
                for (id, value) in values {
                    match self.hooks.setting_name(*id) {
                        Some(name) => out.push_str(&format!("{}: {}\n", name, value)),
                        None => out.push_str(&format!("{}: {}\n", id, value)),
                    }
                }
                Ok(out.into_bytes())
            }
            _ => Ok(format!("{}\n", frame).into_bytes()),
        }
    }

    fn render_headers(&mut self, direction: Direction, frame: &Frame) -> DissectResult<Vec<u8>> {
        let index = direction.index();
        let end_headers = frame.has_flag(frame::flags::END_HEADERS);

        if self.open_header_block[index] || !end_headers {
            self.open_header_block[index] = !end_headers;
            return Err(DissectError::Frame(format!(
                "fragmented header blocks are not supported ({})",
                frame
            )));
        }

        let block = frame.header_block().cloned().unwrap_or_else(Bytes::new);
        let decoded = self.decode_block(index, &block)?;
        let headers: Vec<(String, String)> = decoded
            .into_iter()
            .map(|(name, value)| {
                (
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect();

        self.hooks.headers(direction, frame, &headers)?;

        let mut out = format!("{}\n", frame);
        for (name, value) in &headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    /// Decode one header block with the direction's HPACK state.
    ///
    /// The decoder panics on some malformed dynamic table size updates. The
    /// panic is confined to this block and the direction starts over with a
    /// fresh decoder.
    fn decode_block(
        &mut self,
        index: usize,
        block: &[u8],
    ) -> DissectResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let decoder = &mut self.decoders[index];
        match catch_unwind(AssertUnwindSafe(|| decoder.decode(block))) {
            Ok(Ok(headers)) => Ok(headers),
            Ok(Err(e)) => Err(DissectError::Hpack(format!("{:?}", e))),
            Err(_) => {
                debug!(index, "HPACK decoder panicked, resetting dynamic table");
                self.decoders[index] = hpack::Decoder::new();
                Err(DissectError::Hpack("malformed header block".to_string()))
            }
        }
    }

    /// `HTTP2-Settings` of an h2c upgrade request as a SETTINGS frame.
    fn upgrade_settings(&mut self, encoded: &str) -> DissectResult<Chunk> {
        let payload = URL_SAFE_NO_PAD
            .decode(encoded.trim().trim_end_matches('='))
            .map_err(|e| DissectError::Frame(format!("Invalid HTTP2-Settings header: {}", e)))?;
        let header = FrameHeader {
            length: payload.len() as u32,
            kind: frame::SETTINGS,
            flags: 0,
            stream_id: 0,
        };
        let frame = Frame::parse(header, Bytes::from(payload))?;
        self.apply_settings(Direction::ClientToServer, &frame);
        let mut content = self.render_frame(Direction::ClientToServer, &frame)?;
        content.push(b'\n');
        Ok(Chunk::new(Direction::ClientToServer, content))
    }
}

impl<X: H2Hooks> Http1Hooks for Http2Layer<X> {
    fn raw_chunk(&mut self, chunk: &Chunk) -> DissectResult<Option<Vec<Chunk>>> {
        if let Some(out) = self.hooks.raw_chunk(chunk)? {
            return Ok(Some(out));
        }

        if self.active {
            return self.feed(chunk.direction, &chunk.content).map(Some);
        }

        if chunk.direction.is_client() && chunk.content.starts_with(PREFACE) {
            debug!("HTTP/2 connection preface seen");
            self.ensure_buffers();
            self.active = true;
            return self.feed(chunk.direction, &chunk.content).map(Some);
        }

        Ok(None)
    }

    fn request(&mut self, chunk: &Chunk, request: &Request) -> DissectResult<Vec<Chunk>> {
        if let Some(out) = self.hooks.http1_request(chunk, request)? {
            return Ok(out);
        }

        if request.headers.has_token("connection", "upgrade") && request.headers.is("upgrade", "h2c") {
            debug!("h2c upgrade requested");
            self.ensure_buffers();
            let mut output = vec![chunk.clone()];
            if let Some(settings) = request.headers.get("http2-settings") {
                output.push(self.upgrade_settings(settings)?);
            }
            return Ok(output);
        }

        Ok(vec![chunk.clone()])
    }

    fn response(&mut self, chunk: &Chunk, response: &Response) -> DissectResult<Vec<Chunk>> {
        if let Some(out) = self.hooks.http1_response(chunk, response)? {
            return Ok(out);
        }

        if response.headers.has_token("connection", "upgrade") && response.headers.is("upgrade", "h2c") {
            if self.buffers.is_none() {
                return Err(DissectError::Http("HTTP/2 upgrade request not found".to_string()));
            }
            self.active = true;
            let mut head = response.head.clone();
            head.extend_from_slice(b"\r\n\r\n");
            let mut output = vec![Chunk::new(chunk.direction, head)];
            output.extend(self.feed(chunk.direction, &response.body)?);
            return Ok(output);
        }

        Ok(vec![render_response(
            chunk.direction,
            response,
            self.max_inflated_size,
        )])
    }

    fn max_inflated_size(&self) -> usize {
        self.max_inflated_size
    }
}

/// Put the client first when the capture starts with a server chunk.
///
/// Swaps the first two chunks only. This is a best-effort repair for
/// captures that begin mid-handshake, not a reordering guarantee.
pub fn client_first(chunks: &[Chunk]) -> Cow<'_, [Chunk]> {
    if chunks.len() > 1 && !chunks[0].direction.is_client() {
        let mut reordered = chunks.to_vec();
        reordered.swap(0, 1);
        Cow::Owned(reordered)
    } else {
        Cow::Borrowed(chunks)
    }
}

/// Run a full HTTP/1 + HTTP/2 stack with the given hooks on top.
pub fn dissect_with<X: H2Hooks>(
    hooks: X,
    config: &DissectorConfig,
    chunks: &[Chunk],
) -> DissectResult<Vec<Chunk>> {
    let chunks = client_first(chunks);
    Http1Layer::new(Http2Layer::new(hooks, config)).dissect(&chunks)
}

/// HTTP/1 + HTTP/2 dissector.
#[derive(Debug, Default)]
pub struct Http2Dissector {
    config: DissectorConfig,
}

impl Http2Dissector {
    pub fn new(config: DissectorConfig) -> Self {
        Self { config }
    }
}

impl Dissector for Http2Dissector {
    fn name(&self) -> &'static str {
        "http2"
    }

    fn transform(&self, stream: &Stream) -> DissectResult<Vec<Chunk>> {
        dissect_with(PlainH2, &self.config, &stream.chunks)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn settings_frame(values: &[(u16, u32)]) -> Vec<u8> {
        Frame {
            flags: 0,
            stream_id: 0,
            body: FrameBody::Settings(values.to_vec()),
        }
        .encode()
    }

    pub(crate) fn headers_frame(stream_id: u32, headers: &[(&str, &str)]) -> Vec<u8> {
        let mut encoder = hpack::Encoder::new();
        let block = encoder.encode(headers.iter().map(|(n, v)| (n.as_bytes(), v.as_bytes())));
        Frame {
            flags: frame::flags::END_HEADERS,
            stream_id,
            body: FrameBody::Headers {
                block: Bytes::from(block),
                priority: None,
            },
        }
        .encode()
    }

    pub(crate) fn data_frame(stream_id: u32, end_stream: bool, data: &[u8]) -> Vec<u8> {
        Frame {
            flags: if end_stream { frame::flags::END_STREAM } else { 0 },
            stream_id,
            body: FrameBody::Data(Bytes::copy_from_slice(data)),
        }
        .encode()
    }

    fn client(content: Vec<u8>) -> Chunk {
        Chunk::new(Direction::ClientToServer, content)
    }

    fn server(content: Vec<u8>) -> Chunk {
        Chunk::new(Direction::ServerToClient, content)
    }

    fn run(chunks: Vec<Chunk>) -> Vec<Chunk> {
        Http2Dissector::new(DissectorConfig::default())
            .transform(&Stream {
                chunks,
                ..Default::default()
            })
            .unwrap()
    }

    fn text(chunk: &Chunk) -> String {
        String::from_utf8_lossy(&chunk.content).into_owned()
    }

    #[test]
    fn test_preface_switches_to_frames() {
        let mut first = PREFACE.to_vec();
        first.extend(settings_frame(&[(3, 100), (4, 65_535)]));
        first.extend(headers_frame(1, &[(":method", "GET"), (":path", "/a")]));

        let output = run(vec![
            client(first),
            server(settings_frame(&[(5, 32_768)])),
        ]);

        assert_eq!(output.len(), 3);
        assert_eq!(
            text(&output[0]),
            "SettingsFrame(stream_id=0, flags=[]):\nMAX_CONCURRENT_STREAMS: 100\nINITIAL_WINDOW_SIZE: 65535\n\n"
        );
        assert!(text(&output[1]).starts_with("HeadersFrame(stream_id=1, flags=[END_HEADERS]): "));
        assert!(text(&output[1]).ends_with("\n:method: GET\n:path: /a\n\n"));
        assert_eq!(output[2].direction, Direction::ServerToClient);
        assert!(text(&output[2]).contains("MAX_FRAME_SIZE: 32768"));
    }

    #[test]
    fn test_data_frame_rendering() {
        let mut first = PREFACE.to_vec();
        first.extend(data_frame(1, true, b"body"));

        let output = run(vec![client(first)]);
        assert_eq!(
            text(&output[0]),
            "DataFrame(stream_id=1, flags=[END_STREAM]): <hex:626f6479>\nbody\n\n"
        );
    }

    #[test]
    fn test_plain_http1_still_works() {
        let output = run(vec![
            client(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".to_vec()),
            server(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec()),
        ]);
        assert_eq!(output.len(), 2);
        assert_eq!(output[1].content, b"HTTP/1.1 204 No Content\r\n\r\n");
    }

    #[test]
    fn test_server_first_is_swapped() {
        let output = run(vec![
            server(b"HTTP/1.1 200 OK\r\n\r\n".to_vec()),
            client(b"GET / HTTP/1.1\r\n\r\n".to_vec()),
        ]);
        assert_eq!(output[0].direction, Direction::ClientToServer);
        assert_eq!(output[1].direction, Direction::ServerToClient);
    }

    #[test]
    fn test_h2c_upgrade() {
        let settings = settings_frame(&[(3, 10)]);
        let encoded = URL_SAFE_NO_PAD.encode(&settings[frame::FRAME_HEADER_SIZE..]);
        let request = format!(
            "GET / HTTP/1.1\r\nHost: x\r\nConnection: Upgrade, HTTP2-Settings\r\nUpgrade: h2c\r\nHTTP2-Settings: {}\r\n\r\n",
            encoded
        );
        let mut response =
            b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: h2c\r\n\r\n".to_vec();
        response.extend(settings_frame(&[]));
        let mut preface = PREFACE.to_vec();
        preface.extend(data_frame(3, false, b"x"));

        let output = run(vec![
            client(request.clone().into_bytes()),
            server(response),
            client(preface),
        ]);

        assert_eq!(output[0].content, request.as_bytes());
        assert_eq!(text(&output[1]), "SettingsFrame(stream_id=0, flags=[]):\nMAX_CONCURRENT_STREAMS: 10\n\n");
        assert_eq!(
            text(&output[2]),
            "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: h2c\r\n\r\n"
        );
        assert_eq!(text(&output[3]), "SettingsFrame(stream_id=0, flags=[]):\n\n");
        assert!(text(&output[4]).starts_with("DataFrame(stream_id=3"));
    }

    #[test]
    fn test_h2c_response_without_request() {
        let output = run(vec![
            client(b"GET / HTTP/1.1\r\n\r\n".to_vec()),
            server(b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: h2c\r\n\r\n".to_vec()),
        ]);
        assert_eq!(
            text(&output[1]),
            "Unable to parse HTTP response: HTTP/2 upgrade request not found"
        );
    }

    #[test]
    fn test_fragmented_header_block_is_frame_error() {
        let mut first = PREFACE.to_vec();
        first.extend(
            Frame {
                flags: 0,
                stream_id: 1,
                body: FrameBody::Headers {
                    block: Bytes::from_static(&[0x82]),
                    priority: None,
                },
            }
            .encode(),
        );
        first.extend(
            Frame {
                flags: frame::flags::END_HEADERS,
                stream_id: 1,
                body: FrameBody::Continuation(Bytes::from_static(&[0x84])),
            }
            .encode(),
        );
        first.extend(headers_frame(3, &[(":method", "GET")]));

        let output = run(vec![client(first)]);
        assert_eq!(output.len(), 3);
        assert!(text(&output[0]).starts_with("Unable to parse HTTP2 frame: fragmented header blocks"));
        assert!(text(&output[1]).starts_with("Unable to parse HTTP2 frame: fragmented header blocks"));
        assert!(text(&output[2]).contains(":method: GET"));
    }

    #[test]
    fn test_overlong_frame_after_good_frames() {
        let mut first = PREFACE.to_vec();
        first.extend(data_frame(1, false, b"ok"));
        first.extend([0x00, 0x40, 0x01, frame::DATA, 0, 0, 0, 0, 1]);

        let output = run(vec![client(first)]);
        assert_eq!(output.len(), 2);
        assert!(text(&output[0]).starts_with("DataFrame"));
        assert!(text(&output[1]).starts_with("Unable to parse HTTP2 request: Received overlong frame"));
    }

    #[test]
    fn test_max_frame_size_raises_peer_bound() {
        let big = vec![b'z'; 20_000];
        let mut first = PREFACE.to_vec();
        first.extend(settings_frame(&[(frame::settings::MAX_FRAME_SIZE, 32_768)]));

        let output = run(vec![client(first), server(data_frame(1, true, &big))]);
        assert_eq!(output.len(), 2);
        assert!(text(&output[1]).starts_with("DataFrame(stream_id=1"));
    }

    #[test]
    fn test_hpack_state_persists_across_frames() {
        // literal with incremental indexing, new name
        let mut block = vec![0x40, 0x06];
        block.extend_from_slice(b"x-note");
        block.push(0x05);
        block.extend_from_slice(b"hello");
        let first_frame = Frame {
            flags: frame::flags::END_HEADERS,
            stream_id: 1,
            body: FrameBody::Headers {
                block: Bytes::from(block),
                priority: None,
            },
        }
        .encode();
        // indexed, first dynamic table entry
        let second_frame = Frame {
            flags: frame::flags::END_HEADERS,
            stream_id: 3,
            body: FrameBody::Headers {
                block: Bytes::from_static(&[0xbe]),
                priority: None,
            },
        }
        .encode();

        let mut first = PREFACE.to_vec();
        first.extend(first_frame);
        let output = run(vec![
            client(first),
            server(settings_frame(&[])),
            client(second_frame),
        ]);

        assert!(text(&output[0]).ends_with("x-note: hello\n\n"));
        assert!(text(&output[2]).ends_with("x-note: hello\n\n"));
    }

    fn raw_headers_frame(stream_id: u32, block: &'static [u8]) -> Vec<u8> {
        Frame {
            flags: frame::flags::END_HEADERS,
            stream_id,
            body: FrameBody::Headers {
                block: Bytes::from_static(block),
                priority: None,
            },
        }
        .encode()
    }

    #[test]
    fn test_bad_table_size_update_is_frame_error() {
        // size update whose integer runs off the end of the block
        for block in [
            &[0x3f, 0x82, 0xfe, 0x98][..],
            &[0x3f, 0xff, 0xff, 0xff, 0xff, 0xff, 0x0f],
            &[0x3f, 0xe1, 0xff, 0xff, 0xff, 0x0f],
        ] {
            let mut first = PREFACE.to_vec();
            first.extend(headers_frame(1, &[(":method", "GET"), (":path", "/a")]));
            first.extend(raw_headers_frame(3, block));
            first.extend(headers_frame(5, &[(":method", "GET"), (":path", "/b")]));

            let output = run(vec![client(first)]);
            assert_eq!(output.len(), 3);
            assert!(text(&output[0]).ends_with(":path: /a\n\n"));
            assert!(text(&output[1]).starts_with("Unable to parse HTTP2 frame: HPACK decoding failed"));
            assert!(text(&output[2]).ends_with(":path: /b\n\n"));
        }
    }

    #[test]
    fn test_bad_header_block_only_resets_its_direction() {
        let mut first = PREFACE.to_vec();
        first.extend(raw_headers_frame(1, &[0x3f, 0x82, 0xfe, 0x98]));

        let output = run(vec![
            client(first),
            server(headers_frame(1, &[(":status", "200")])),
        ]);
        assert_eq!(output.len(), 2);
        assert!(text(&output[0]).starts_with("Unable to parse HTTP2 frame"));
        assert!(text(&output[1]).ends_with(":status: 200\n\n"));
    }

    #[test]
    fn test_garbage_after_preface() {
        let output = run(vec![client(b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n".to_vec()), client(b"garbage!!".to_vec())]);
        assert_eq!(output.len(), 1);
        assert!(text(&output[0]).starts_with("Unable to parse HTTP2 request"));
    }
}
