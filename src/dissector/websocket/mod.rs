//! WebSocket layer.
//!
//! Recognizes the HTTP/1 upgrade handshake and HTTP/2 extended CONNECT
//! streams, then renders the frames of those streams unmasked, with
//! fragmented messages joined and permessage-deflate payloads inflated.
//!
//! Stream id `0` stands for the upgraded HTTP/1 connection; other ids are
//! HTTP/2 streams.

mod deflate;
mod extensions;
mod frame;

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

pub use deflate::Inflater;
pub use extensions::{find_deflate, parse_extensions, Extension, PERMESSAGE_DEFLATE};
pub use frame::{apply_mask, parse_frame, WsFrame, OPCODE_CONTINUATION};

use super::http1::{Request, Response};
use super::http2::{
    base_setting_name, dissect_with, find_header, frame::settings, Frame, FrameBody, H2Hooks,
    HeaderList,
};
use super::Dissector;
use crate::config::DissectorConfig;
use crate::error::{DissectError, DissectResult};
use crate::model::{Chunk, Direction, Stream};

/// GUID appended to the client key when computing the accept value.
const HANDSHAKE_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Stream id used for the upgraded HTTP/1 connection.
const HTTP1_STREAM: u32 = 0;

/// `Sec-WebSocket-Accept` for a client key.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(HANDSHAKE_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// State of one websocket stream.
struct WsStream {
    /// One inflater per direction when permessage-deflate is on.
    deflate: Option<[Inflater; 2]>,
    /// Pending fragments per direction.
    fragments: [Vec<WsFrame>; 2],
    /// The server side of an HTTP/2 CONNECT has answered.
    negotiated: bool,
    max_inflated: usize,
}

impl WsStream {
    fn new(extensions: &[Extension], max_inflated: usize) -> Self {
        let mut stream = Self {
            deflate: None,
            fragments: [Vec::new(), Vec::new()],
            negotiated: false,
            max_inflated,
        };
        stream.configure(extensions);
        stream
    }

    fn configure(&mut self, extensions: &[Extension]) {
        self.deflate = find_deflate(extensions).map(|ext| {
            [
                Inflater::new(ext.window_bits("client_max_window_bits"), self.max_inflated),
                Inflater::new(ext.window_bits("server_max_window_bits"), self.max_inflated),
            ]
        });
        if let Some([client, server]) = &self.deflate {
            debug!(
                client_window_bits = client.window_bits(),
                server_window_bits = server.window_bits(),
                "permessage-deflate enabled"
            );
        }
        let others: Vec<&str> = extensions
            .iter()
            .filter(|e| e.name != PERMESSAGE_DEFLATE)
            .map(|e| e.name.as_str())
            .collect();
        if !others.is_empty() {
            info!(extensions = ?others, "unsupported websocket extensions");
        }
    }
}

/// Frames of one chunk, plus what could not be parsed at its end.
struct Rendered {
    content: Vec<u8>,
    truncated: Option<(DissectError, Vec<u8>)>,
}

impl Rendered {
    /// Diagnostic text followed by the raw bytes left over.
    fn truncation_note(&self) -> Option<Vec<u8>> {
        self.truncated.as_ref().map(|(err, rest)| {
            let mut note = err.to_string().into_bytes();
            note.push(b'\n');
            note.extend_from_slice(rest);
            note
        })
    }
}

/// Hooks for the HTTP/2 layer that add websocket handling.
pub struct WebSocketLayer {
    key: Option<String>,
    /// HTTP/1 connection switched to websocket.
    switched: bool,
    /// Server allowed extended CONNECT via SETTINGS.
    connect_protocol: bool,
    streams: HashMap<u32, WsStream>,
    max_pending_fragments: usize,
    max_inflated_size: usize,
}

impl WebSocketLayer {
    pub fn new(config: &DissectorConfig) -> Self {
        Self {
            key: None,
            switched: false,
            connect_protocol: false,
            streams: HashMap::new(),
            max_pending_fragments: config.max_pending_fragments,
            max_inflated_size: config.max_inflated_size,
        }
    }

    /// Render every frame in `data` for the given stream.
    fn render_frames(
        &mut self,
        direction: Direction,
        stream_id: u32,
        data: &[u8],
    ) -> DissectResult<Rendered> {
        let max = self.max_pending_fragments;
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Ok(Rendered {
                content: data.to_vec(),
                truncated: None,
            });
        };

        let mut content = Vec::with_capacity(data.len());
        let mut rest = data;
        while !rest.is_empty() {
            let (frame, used) = match parse_frame(rest) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!(%direction, stream_id, error = %e, "websocket frame cut short");
                    return Ok(Rendered {
                        content,
                        truncated: Some((e, rest.to_vec())),
                    });
                }
            };
            rest = &rest[used..];

            if let Some(frame) = process_frame(stream, direction, frame, max)? {
                content.extend(frame.render());
            }
        }

        Ok(Rendered {
            content,
            truncated: None,
        })
    }

    /// Frames of an upgraded HTTP/1 chunk as output chunks.
    fn http1_frames(
        &mut self,
        chunk: &Chunk,
        prefix: Vec<u8>,
        data: &[u8],
    ) -> DissectResult<Vec<Chunk>> {
        let rendered = self.render_frames(chunk.direction, HTTP1_STREAM, data)?;
        let mut content = prefix;
        content.extend_from_slice(&rendered.content);
        let mut output = vec![Chunk::new(chunk.direction, content)];
        if let Some(note) = rendered.truncation_note() {
            output.push(Chunk::new(chunk.direction, note));
        }
        Ok(output)
    }

    fn is_handshake(headers: &super::http1::Headers) -> bool {
        headers.has_token("connection", "upgrade") && headers.is("upgrade", "websocket")
    }
}

/// Fragment joining and inflation for one frame.
///
/// `None` while a fragmented message is still incomplete.
fn process_frame(
    stream: &mut WsStream,
    direction: Direction,
    mut frame: WsFrame,
    max_pending: usize,
) -> DissectResult<Option<WsFrame>> {
    if frame.is_control() {
        return Ok(Some(frame));
    }

    let pending = &mut stream.fragments[direction.index()];
    let continuation = frame.opcode() == OPCODE_CONTINUATION;

    if !frame.fin() {
        if continuation == pending.is_empty() {
            pending.clear();
            return Err(DissectError::InvalidFragmentation);
        }
        pending.push(frame);
        if pending.len() >= max_pending {
            let count = pending.len();
            pending.clear();
            return Err(DissectError::TooManyFragments(count));
        }
        return Ok(None);
    }

    if !pending.is_empty() {
        if !continuation {
            pending.clear();
            return Err(DissectError::InvalidFragmentation);
        }
        let mut parts = std::mem::take(pending);
        parts.push(frame);
        let mut joined = WsFrame {
            header: parts[0].header.clone(),
            payload: parts.iter().flat_map(|f| f.payload.iter().copied()).collect(),
        };
        // The length field still describes the first fragment.
        joined.set_fin();
        frame = joined;
    } else if continuation {
        return Err(DissectError::InvalidFragmentation);
    }

    if frame.rsv1() {
        if let Some(inflaters) = stream.deflate.as_mut() {
            frame.payload = inflaters[direction.index()].inflate(&frame.payload)?;
            frame.clear_rsv1();
        }
    }

    Ok(Some(frame))
}

impl H2Hooks for WebSocketLayer {
    fn setting_name(&self, id: u16) -> Option<&'static str> {
        match id {
            settings::ENABLE_CONNECT_PROTOCOL => Some("ENABLE_CONNECT_PROTOCOL"),
            other => base_setting_name(other),
        }
    }

    fn raw_chunk(&mut self, chunk: &Chunk) -> DissectResult<Option<Vec<Chunk>>> {
        if !self.switched {
            return Ok(None);
        }
        match self.http1_frames(chunk, Vec::new(), &chunk.content) {
            Ok(output) => Ok(Some(output)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(Some(vec![Chunk::diagnostic(
                chunk.direction,
                format!("Error while handling websocket frame: {}", e),
            )])),
        }
    }

    fn http1_request(
        &mut self,
        chunk: &Chunk,
        request: &Request,
    ) -> DissectResult<Option<Vec<Chunk>>> {
        if !Self::is_handshake(&request.headers) {
            return Ok(None);
        }
        match request.headers.get("sec-websocket-key") {
            Some(key) => {
                debug!("websocket handshake requested");
                self.key = Some(key.trim().to_string());
                Ok(None)
            }
            None => Ok(Some(vec![Chunk::diagnostic(
                chunk.direction,
                "No websocket key found",
            )])),
        }
    }

    fn http1_response(
        &mut self,
        chunk: &Chunk,
        response: &Response,
    ) -> DissectResult<Option<Vec<Chunk>>> {
        if response.status != 101 || !Self::is_handshake(&response.headers) {
            return Ok(None);
        }

        let Some(key) = self.key.as_deref() else {
            return Err(DissectError::WebSocket("No websocket key found".to_string()));
        };
        let expected = accept_key(key);
        let received = response
            .headers
            .get("sec-websocket-accept")
            .unwrap_or_default()
            .trim();
        if received != expected {
            return Err(DissectError::HandshakeMismatch {
                received: received.to_string(),
                expected,
            });
        }

        let extensions = response
            .headers
            .get("sec-websocket-extensions")
            .map(parse_extensions)
            .unwrap_or_default();
        let mut stream = WsStream::new(&extensions, self.max_inflated_size);
        stream.negotiated = true;
        self.streams.insert(HTTP1_STREAM, stream);
        self.switched = true;
        debug!(deflate = find_deflate(&extensions).is_some(), "switched to websocket");

        let mut head = response.head.clone();
        head.extend_from_slice(b"\r\n\r\n");
        self.http1_frames(chunk, head, &response.body).map(Some)
    }

    fn headers(
        &mut self,
        direction: Direction,
        frame: &Frame,
        headers: &HeaderList,
    ) -> DissectResult<()> {
        match direction {
            Direction::ClientToServer => {
                if !self.connect_protocol {
                    return Ok(());
                }
                if find_header(headers, ":protocol") != Some("websocket") {
                    return Ok(());
                }
                if !matches!(find_header(headers, ":scheme"), Some("http") | Some("https")) {
                    return Ok(());
                }
                let extensions = find_header(headers, "sec-websocket-extensions")
                    .map(parse_extensions)
                    .unwrap_or_default();
                debug!(stream_id = frame.stream_id, "websocket over HTTP/2 stream");
                self.streams.insert(frame.stream_id, WsStream::new(&extensions, self.max_inflated_size));
            }
            Direction::ServerToClient => {
                // The server's answer decides what was actually negotiated.
                if let Some(stream) = self.streams.get_mut(&frame.stream_id) {
                    if !stream.negotiated {
                        let extensions = find_header(headers, "sec-websocket-extensions")
                            .map(parse_extensions)
                            .unwrap_or_default();
                        stream.configure(&extensions);
                        stream.negotiated = true;
                    }
                }
            }
        }
        Ok(())
    }

    fn frame(&mut self, direction: Direction, frame: &Frame) -> DissectResult<Option<Vec<u8>>> {
        match &frame.body {
            FrameBody::Settings(_) => {
                if !direction.is_client()
                    && frame.setting(settings::ENABLE_CONNECT_PROTOCOL).unwrap_or(0) != 0
                {
                    self.connect_protocol = true;
                }
                Ok(None)
            }
            FrameBody::Data(data)
                if frame.stream_id != HTTP1_STREAM
                    && self.streams.contains_key(&frame.stream_id) =>
            {
                let rendered = self.render_frames(direction, frame.stream_id, data)?;
                let note = rendered.truncation_note();
                let mut content = rendered.content;
                if let Some(note) = note {
                    if !content.is_empty() {
                        content.push(b'\n');
                    }
                    content.extend(note);
                }
                Ok(Some(content))
            }
            _ => Ok(None),
        }
    }
}

/// HTTP/1 + HTTP/2 + WebSocket dissector.
#[derive(Debug, Default)]
pub struct WebSocketDissector {
    config: DissectorConfig,
}

impl WebSocketDissector {
    pub fn new(config: DissectorConfig) -> Self {
        Self { config }
    }
}

impl Dissector for WebSocketDissector {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn transform(&self, stream: &Stream) -> DissectResult<Vec<Chunk>> {
        dissect_with(
            WebSocketLayer::new(&self.config),
            &self.config,
            &stream.chunks,
        )
    }
}
