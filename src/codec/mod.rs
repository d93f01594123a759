//! Codec module - serialization of record payloads.
//!
//! Conversation and result records carry MessagePack payloads encoded with
//! [`MsgPackCodec`]. Codecs are marker structs with static methods rather
//! than trait objects, so the call sites stay monomorphic.
//!
//! # Example
//!
//! ```
//! use flowconv::codec::MsgPackCodec;
//! use flowconv::model::{Chunk, Direction};
//!
//! let chunk = Chunk::new(Direction::ClientToServer, b"GET / HTTP/1.1\r\n\r\n".to_vec());
//! let encoded = MsgPackCodec::encode(&chunk).unwrap();
//! let decoded: Chunk = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, chunk);
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
