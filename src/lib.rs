//! # flowconv
//!
//! Protocol dissection worker. A caller feeds captured conversations
//! (ordered, directional chunks of one TCP or UDP exchange) over a
//! length-framed channel; the worker re-renders each one through a stack
//! of protocol layers and answers with the converted chunks.
//!
//! ## Architecture
//!
//! - **Exchange** ([`protocol`], [`Worker`]): 10-byte record headers with
//!   MessagePack payloads, one conversation in flight at a time
//! - **Dissectors** ([`dissector`]): HTTP/1 → HTTP/2 → WebSocket or gRPC,
//!   stacked by delegation through hook traits
//! - **Inspection** ([`inspect`]): schema-less dumps of gRPC messages
//!
//! ## Example
//!
//! ```
//! use flowconv::dissector::build_dissector;
//! use flowconv::{Chunk, DissectorConfig, DissectorKind, Direction, Stream};
//!
//! let dissector = build_dissector(DissectorKind::Http, DissectorConfig::default());
//! let stream = Stream {
//!     chunks: vec![Chunk::new(Direction::ClientToServer, b"not http".to_vec())],
//!     ..Default::default()
//! };
//!
//! let output = dissector.transform(&stream).unwrap();
//! assert!(output[0].content.starts_with(b"Unable to parse HTTP request"));
//! ```

pub mod codec;
pub mod config;
pub mod dissector;
pub mod error;
pub mod inspect;
pub mod model;
pub mod protocol;

mod worker;

pub use config::{DissectorConfig, DissectorKind};
pub use dissector::Dissector;
pub use error::{DissectError, FlowconvError};
pub use model::{Chunk, Conversion, Direction, Stream, StreamMetadata, Transport};
pub use worker::{Worker, WorkerBuilder};
