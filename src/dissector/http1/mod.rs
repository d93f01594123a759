//! HTTP/1 layer.
//!
//! [`Http1Layer`] walks a conversation chunk by chunk. Client chunks are
//! parsed as requests, server chunks as responses, and both are handed to
//! an [`Http1Hooks`] implementation for rendering. Higher layers (HTTP/2,
//! WebSocket, gRPC) plug in by implementing the hooks; [`PlainHttp`] keeps
//! the defaults.

mod body;
mod message;

pub use body::decode_body;
pub use message::{Headers, Request, Response};

use tracing::debug;

use super::Dissector;
use crate::config::{DissectorConfig, DEFAULT_MAX_INFLATED_SIZE};
use crate::error::DissectResult;
use crate::model::{Chunk, Direction, Stream};

/// Extension points of the HTTP/1 layer.
///
/// Every method has a default, so an implementation only overrides what it
/// changes. Returning a recoverable error from any hook makes the layer emit
/// a single diagnostic chunk in place of the chunk being processed; fatal
/// errors abort the conversation.
pub trait Http1Hooks {
    /// Inspect a chunk before HTTP/1 parsing. `Some` replaces the chunk's
    /// output and skips parsing.
    fn raw_chunk(&mut self, chunk: &Chunk) -> DissectResult<Option<Vec<Chunk>>> {
        let _ = chunk;
        Ok(None)
    }

    /// Render a parsed request.
    fn request(&mut self, chunk: &Chunk, request: &Request) -> DissectResult<Vec<Chunk>> {
        let _ = request;
        Ok(vec![chunk.clone()])
    }

    /// Render a parsed response.
    fn response(&mut self, chunk: &Chunk, response: &Response) -> DissectResult<Vec<Chunk>> {
        Ok(vec![render_response(
            chunk.direction,
            response,
            self.max_inflated_size(),
        )])
    }

    /// Bound on a decoded response body.
    fn max_inflated_size(&self) -> usize {
        DEFAULT_MAX_INFLATED_SIZE
    }
}

/// Response head, blank line, then the decoded body.
pub fn render_response(direction: Direction, response: &Response, max_inflated: usize) -> Chunk {
    let body = decode_body(&response.headers, &response.body, max_inflated);
    let mut content = Vec::with_capacity(response.head.len() + 4 + body.len());
    content.extend_from_slice(&response.head);
    content.extend_from_slice(b"\r\n\r\n");
    content.extend_from_slice(&body);
    Chunk::new(direction, content)
}

/// Default hooks: requests as captured, responses with decoded bodies.
#[derive(Debug, Clone, Copy)]
pub struct PlainHttp {
    max_inflated_size: usize,
}

impl PlainHttp {
    pub fn new(max_inflated_size: usize) -> Self {
        Self { max_inflated_size }
    }
}

impl Default for PlainHttp {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INFLATED_SIZE)
    }
}

impl Http1Hooks for PlainHttp {
    fn max_inflated_size(&self) -> usize {
        self.max_inflated_size
    }
}

/// Drives one conversation through the HTTP/1 parser and a hook object.
pub struct Http1Layer<H> {
    hooks: H,
}

impl<H: Http1Hooks> Http1Layer<H> {
    pub fn new(hooks: H) -> Self {
        Self { hooks }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Dissect all chunks in order.
    ///
    /// # Errors
    ///
    /// Only fatal errors are returned.
    pub fn dissect(&mut self, chunks: &[Chunk]) -> DissectResult<Vec<Chunk>> {
        let mut output = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            output.extend(self.dissect_chunk(chunk)?);
        }
        Ok(output)
    }

    fn dissect_chunk(&mut self, chunk: &Chunk) -> DissectResult<Vec<Chunk>> {
        match self.try_chunk(chunk) {
            Ok(out) => Ok(out),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                let what = match chunk.direction {
                    Direction::ClientToServer => "request",
                    Direction::ServerToClient => "response",
                };
                debug!(direction = %chunk.direction, error = %e, "unparseable chunk");
                Ok(vec![Chunk::diagnostic(
                    chunk.direction,
                    format!("Unable to parse HTTP {}: {}", what, e),
                )])
            }
        }
    }

    fn try_chunk(&mut self, chunk: &Chunk) -> DissectResult<Vec<Chunk>> {
        if let Some(out) = self.hooks.raw_chunk(chunk)? {
            return Ok(out);
        }

        match chunk.direction {
            Direction::ClientToServer => {
                let request = Request::parse(&chunk.content)?;
                self.hooks.request(chunk, &request)
            }
            Direction::ServerToClient => {
                let response = Response::parse(&chunk.content)?;
                self.hooks.response(chunk, &response)
            }
        }
    }
}

/// Plain HTTP/1 dissector.
#[derive(Debug, Default)]
pub struct HttpDissector {
    config: DissectorConfig,
}

impl HttpDissector {
    pub fn new(config: DissectorConfig) -> Self {
        Self { config }
    }
}

impl Dissector for HttpDissector {
    fn name(&self) -> &'static str {
        "http"
    }

    fn transform(&self, stream: &Stream) -> DissectResult<Vec<Chunk>> {
        Http1Layer::new(PlainHttp::new(self.config.max_inflated_size)).dissect(&stream.chunks)
    }
}
