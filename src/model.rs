//! Conversation model exchanged between the worker and its caller.
//!
//! A [`Stream`] is one full bidirectional conversation, already reassembled
//! into directional [`Chunk`]s. A dissector turns it into a list of output
//! chunks, which the worker wraps in a [`Conversion`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction of a chunk relative to the connection originator.
///
/// Encoded on the wire as a single integer: `0` client→server,
/// `1` server→client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Direction {
    /// Sent by the client (connection originator).
    ClientToServer,
    /// Sent by the server (connection responder).
    ServerToClient,
}

impl Direction {
    /// The other direction.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::ClientToServer => Direction::ServerToClient,
            Direction::ServerToClient => Direction::ClientToServer,
        }
    }

    /// Index for per-direction arrays (`0` client, `1` server).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Direction::ClientToServer => 0,
            Direction::ServerToClient => 1,
        }
    }

    #[inline]
    pub fn is_client(self) -> bool {
        self == Direction::ClientToServer
    }
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> u8 {
        match direction {
            Direction::ClientToServer => 0,
            Direction::ServerToClient => 1,
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::ClientToServer),
            1 => Ok(Direction::ServerToClient),
            other => Err(format!("invalid direction discriminator {}", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToServer => f.write_str("client->server"),
            Direction::ServerToClient => f.write_str("server->client"),
        }
    }
}

/// One directional unit of payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub direction: Direction,
    #[serde(with = "serde_bytes")]
    pub content: Vec<u8>,
}

impl Chunk {
    pub fn new(direction: Direction, content: impl Into<Vec<u8>>) -> Self {
        Self {
            direction,
            content: content.into(),
        }
    }

    /// A chunk carrying human-readable failure text.
    pub fn diagnostic(direction: Direction, message: impl fmt::Display) -> Self {
        Self::new(direction, message.to_string().into_bytes())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Transport kind of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Stream-oriented (TCP).
    #[default]
    Tcp,
    /// Datagram-oriented (UDP).
    Udp,
}

/// Endpoints and transport of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub stream_id: u64,
    pub client_host: String,
    pub client_port: u16,
    pub server_host: String,
    pub server_port: u16,
    pub transport: Transport,
}

/// One full bidirectional conversation, ordered by capture time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stream {
    pub metadata: StreamMetadata,
    pub chunks: Vec<Chunk>,
}

impl Stream {
    pub fn new(metadata: StreamMetadata, chunks: Vec<Chunk>) -> Self {
        Self { metadata, chunks }
    }
}

/// Outcome of dissecting one conversation.
///
/// `Unchanged` tells the caller to keep the input as-is. `Chunks` replaces
/// the input, and an empty list there really means "no output".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conversion {
    Unchanged,
    Chunks(Vec<Chunk>),
}

impl Conversion {
    /// Wrap dissector output, collapsing it to `Unchanged` when it is
    /// identical to the input chunk for chunk.
    pub fn from_output(input: &[Chunk], output: Vec<Chunk>) -> Self {
        if input == output.as_slice() {
            Conversion::Unchanged
        } else {
            Conversion::Chunks(output)
        }
    }

    #[inline]
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Conversion::Unchanged)
    }

    /// Resolve against the original input.
    pub fn into_chunks(self, input: &[Chunk]) -> Vec<Chunk> {
        match self {
            Conversion::Unchanged => input.to_vec(),
            Conversion::Chunks(chunks) => chunks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_discriminator() {
        assert_eq!(u8::from(Direction::ClientToServer), 0);
        assert_eq!(u8::from(Direction::ServerToClient), 1);
        assert_eq!(Direction::try_from(1u8), Ok(Direction::ServerToClient));
        assert!(Direction::try_from(7u8).is_err());
        assert_eq!(Direction::ClientToServer.opposite(), Direction::ServerToClient);
    }

    #[test]
    fn test_unchanged_only_when_identical() {
        let input = vec![
            Chunk::new(Direction::ClientToServer, b"abc".to_vec()),
            Chunk::new(Direction::ServerToClient, b"de".to_vec()),
        ];
        assert!(Conversion::from_output(&input, input.clone()).is_unchanged());

        // same count, directions and lengths, different bytes
        let rewritten = vec![
            Chunk::new(Direction::ClientToServer, b"xyz".to_vec()),
            Chunk::new(Direction::ServerToClient, b"fg".to_vec()),
        ];
        assert_eq!(
            Conversion::from_output(&input, rewritten.clone()),
            Conversion::Chunks(rewritten)
        );
    }

    #[test]
    fn test_changed_when_count_or_length_differs() {
        let input = vec![Chunk::new(Direction::ClientToServer, b"abc".to_vec())];

        let longer = vec![Chunk::new(Direction::ClientToServer, b"abcd".to_vec())];
        assert!(!Conversion::from_output(&input, longer).is_unchanged());

        let split = vec![
            Chunk::new(Direction::ClientToServer, b"a".to_vec()),
            Chunk::new(Direction::ClientToServer, b"bc".to_vec()),
        ];
        assert!(!Conversion::from_output(&input, split).is_unchanged());
    }

    #[test]
    fn test_empty_output_is_not_unchanged() {
        let input = vec![Chunk::new(Direction::ClientToServer, b"abc".to_vec())];
        let conversion = Conversion::from_output(&input, Vec::new());
        assert_eq!(conversion, Conversion::Chunks(Vec::new()));
        assert!(conversion.into_chunks(&input).is_empty());

        // Empty in, empty out: nothing changed.
        assert!(Conversion::from_output(&[], Vec::new()).is_unchanged());
    }
}
