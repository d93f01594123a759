//! Worker builder and exchange loop.
//!
//! The [`WorkerBuilder`] picks a dissector and its limits. The [`Worker`]
//! then serves the exchange channel:
//! 1. Read bytes and cut them into records
//! 2. Decode each conversation record into a [`Stream`]
//! 3. Run the dissector, containing any failure to that conversation
//! 4. Write the result record and flush before touching the next one
//!
//! # Example
//!
//! ```no_run
//! use flowconv::{DissectorKind, Worker};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let worker = Worker::builder(DissectorKind::Grpc)
//!         .max_frame_size(32_768)
//!         .build();
//!
//!     worker.run(tokio::io::stdin(), tokio::io::stdout()).await?;
//!     Ok(())
//! }
//! ```

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::config::{DissectorConfig, DissectorKind};
use crate::dissector::{build_dissector, Dissector};
use crate::error::{DissectError, FlowconvError, Result};
use crate::model::{Conversion, Stream};
use crate::protocol::{Record, RecordBuffer, DEFAULT_MAX_PAYLOAD_SIZE};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Builder for configuring and creating a [`Worker`].
pub struct WorkerBuilder {
    kind: DissectorKind,
    config: DissectorConfig,
    max_record_size: u32,
    dissector: Option<Box<dyn Dissector>>,
}

impl WorkerBuilder {
    /// Create a builder for the given dissector with default limits.
    pub fn new(kind: DissectorKind) -> Self {
        Self {
            kind,
            config: DissectorConfig::default(),
            max_record_size: DEFAULT_MAX_PAYLOAD_SIZE,
            dissector: None,
        }
    }

    /// Replace all dissector tunables at once.
    pub fn config(mut self, config: DissectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Initial HTTP/2 frame buffer bound.
    ///
    /// Default: 16384
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Pending websocket fragments at which a message is rejected.
    ///
    /// Default: 50
    pub fn max_pending_fragments(mut self, limit: usize) -> Self {
        self.config.max_pending_fragments = limit;
        self
    }

    /// Largest output of a single decompression.
    ///
    /// Default: 64 MiB
    pub fn max_inflated_size(mut self, size: usize) -> Self {
        self.config.max_inflated_size = size;
        self
    }

    /// Largest record payload accepted from the channel.
    ///
    /// Default: 256 MiB
    pub fn max_record_size(mut self, size: u32) -> Self {
        self.max_record_size = size;
        self
    }

    /// Use a custom dissector instead of the one named by the kind.
    pub fn dissector(mut self, dissector: Box<dyn Dissector>) -> Self {
        self.dissector = Some(dissector);
        self
    }

    pub fn build(self) -> Worker {
        let dissector = match self.dissector {
            Some(dissector) => dissector,
            None => build_dissector(self.kind, self.config),
        };
        Worker {
            dissector,
            max_record_size: self.max_record_size,
        }
    }
}

/// A configured worker. One dissector, one channel, one record at a time.
pub struct Worker {
    dissector: Box<dyn Dissector>,
    max_record_size: u32,
}

impl Worker {
    /// Create a new worker builder.
    pub fn builder(kind: DissectorKind) -> WorkerBuilder {
        WorkerBuilder::new(kind)
    }

    pub fn dissector_name(&self) -> &'static str {
        self.dissector.name()
    }

    /// Serve the channel until the reader hits EOF between records.
    ///
    /// Returns the number of conversations answered.
    ///
    /// # Errors
    ///
    /// Channel I/O failures, malformed record framing, EOF inside a record,
    /// and result records that cannot be encoded. Failures of a single
    /// conversation are answered on the channel instead.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut records = RecordBuffer::with_max_payload(self.max_record_size);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut answered = 0u64;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                if !records.is_empty() {
                    return Err(FlowconvError::ConnectionClosed);
                }
                debug!(answered, "exchange channel closed");
                return Ok(answered);
            }

            for record in records.push(&buf[..n])? {
                if !record.header.is_conversation() {
                    return Err(FlowconvError::Protocol(format!(
                        "expected conversation record, got kind {}",
                        record.header.kind
                    )));
                }

                let result = self.process(&record)?;
                writer.write_all(&result.to_bytes()).await?;
                writer.flush().await?;
                answered += 1;
            }
        }
    }

    /// Answer one conversation record.
    ///
    /// # Errors
    ///
    /// Only when the result record cannot be encoded. A payload that does
    /// not decode, a fatal dissection error and a panicking dissector all
    /// yield a failed, unchanged result.
    pub fn process(&self, record: &Record) -> Result<Record> {
        let sequence = record.sequence();

        let outcome = match record.decode_stream() {
            Ok(stream) => {
                debug!(
                    sequence,
                    chunks = stream.chunks.len(),
                    transport = ?stream.metadata.transport,
                    "conversation received"
                );
                self.dissect(&stream).map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(conversion) => {
                debug!(sequence, unchanged = conversion.is_unchanged(), "conversation dissected");
                Record::result(sequence, &conversion, false)
            }
            Err(error) => {
                warn!(
                    sequence,
                    dissector = self.dissector.name(),
                    error = %error,
                    "conversation failed, answering unchanged"
                );
                Record::result(sequence, &Conversion::Unchanged, true)
            }
        }
    }

    /// Run the dissector on one stream, containing panics.
    pub fn dissect(&self, stream: &Stream) -> std::result::Result<Conversion, DissectError> {
        let output = catch_unwind(AssertUnwindSafe(|| self.dissector.transform(stream)))
            .map_err(|payload| DissectError::Panic(panic_message(payload.as_ref())))??;
        Ok(Conversion::from_output(&stream.chunks, output))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Chunk, Direction};
    use crate::protocol::{build_record, flags, kinds, Header, HEADER_SIZE};

    struct Exploding;

    impl Dissector for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn transform(&self, _stream: &Stream) -> crate::error::DissectResult<Vec<Chunk>> {
            panic!("boom");
        }
    }

    struct Fatal;

    impl Dissector for Fatal {
        fn name(&self) -> &'static str {
            "fatal"
        }

        fn transform(&self, _stream: &Stream) -> crate::error::DissectResult<Vec<Chunk>> {
            Err(DissectError::InvalidFragmentation)
        }
    }

    fn stream(chunks: Vec<Chunk>) -> Stream {
        Stream {
            chunks,
            ..Default::default()
        }
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Worker::builder(DissectorKind::Websocket)
            .max_frame_size(65_536)
            .max_pending_fragments(10)
            .max_inflated_size(4096)
            .max_record_size(1024);

        assert_eq!(builder.config.max_frame_size, 65_536);
        assert_eq!(builder.config.max_pending_fragments, 10);
        assert_eq!(builder.config.max_inflated_size, 4096);
        assert_eq!(builder.max_record_size, 1024);
        assert_eq!(builder.build().dissector_name(), "websocket");
    }

    #[test]
    fn test_unchanged_conversation() {
        let worker = Worker::builder(DissectorKind::Http).build();
        let input = stream(vec![Chunk::new(
            Direction::ClientToServer,
            b"GET / HTTP/1.1\r\n\r\n".to_vec(),
        )]);

        let result = worker
            .process(&Record::conversation(3, &input).unwrap())
            .unwrap();
        assert!(result.header.is_result());
        assert_eq!(result.sequence(), 3);
        assert_eq!(result.header.flags, flags::UNCHANGED);
        assert_eq!(result.decode_conversion().unwrap(), Conversion::Unchanged);
    }

    #[test]
    fn test_changed_conversation_carries_chunks() {
        let worker = Worker::builder(DissectorKind::Http).build();
        let input = stream(vec![Chunk::new(Direction::ClientToServer, vec![0xff, 0x00])]);

        let result = worker
            .process(&Record::conversation(4, &input).unwrap())
            .unwrap();
        assert_eq!(result.header.flags, 0);
        let Conversion::Chunks(chunks) = result.decode_conversion().unwrap() else {
            panic!("expected chunks");
        };
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.starts_with(b"Unable to parse HTTP request"));
    }

    #[test]
    fn test_panic_is_contained() {
        let worker = Worker::builder(DissectorKind::Http)
            .dissector(Box::new(Exploding))
            .build();

        let result = worker
            .process(&Record::conversation(7, &Stream::default()).unwrap())
            .unwrap();
        assert_eq!(result.header.flags, flags::FAILED_RESULT);
        assert_eq!(result.sequence(), 7);

        let err = worker.dissect(&Stream::default()).unwrap_err();
        assert_eq!(err.to_string(), "Dissector panicked: boom");
    }

    #[test]
    fn test_fatal_error_answers_failed() {
        let worker = Worker::builder(DissectorKind::Http)
            .dissector(Box::new(Fatal))
            .build();
        let result = worker
            .process(&Record::conversation(1, &Stream::default()).unwrap())
            .unwrap();
        assert!(result.header.is_failed());
        assert!(result.header.is_unchanged());
    }

    #[test]
    fn test_undecodable_payload_answers_failed() {
        let worker = Worker::builder(DissectorKind::Http).build();
        let header = Header::new(kinds::CONVERSATION, 0, 9, 2);
        let record = Record::new(header, bytes::Bytes::from_static(b"\xc1\xc1"));

        let result = worker.process(&record).unwrap();
        assert_eq!(result.header.flags, flags::FAILED_RESULT);
        assert_eq!(result.sequence(), 9);
    }

    #[tokio::test]
    async fn test_run_over_duplex() {
        let worker = Worker::builder(DissectorKind::Http).build();
        let (mut client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);

        let mut input = Vec::new();
        for sequence in 1..=3 {
            input.extend(Record::conversation(sequence, &Stream::default()).unwrap().to_bytes());
        }

        let task = tokio::spawn(async move {
            let worker = worker;
            worker.run(server_read, server_write).await
        });

        client.write_all(&input).await.unwrap();

        let mut answers = RecordBuffer::new();
        let mut received = Vec::new();
        let mut buf = [0u8; 256];
        while received.len() < 3 {
            let n = client.read(&mut buf).await.unwrap();
            received.extend(answers.push(&buf[..n]).unwrap());
        }
        drop(client);

        assert_eq!(task.await.unwrap().unwrap(), 3);
        let sequences: Vec<u32> = received.iter().map(|r| r.sequence()).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(received.iter().all(|r| r.header.is_unchanged()));
    }

    #[tokio::test]
    async fn test_eof_inside_record_is_an_error() {
        let worker = Worker::builder(DissectorKind::Http).build();
        let bytes = Record::conversation(1, &Stream::default()).unwrap().to_bytes();
        let truncated = &bytes[..HEADER_SIZE - 2];

        let err = worker.run(truncated, tokio::io::sink()).await.unwrap_err();
        assert!(matches!(err, FlowconvError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_result_record_from_caller_is_rejected() {
        let worker = Worker::builder(DissectorKind::Http).build();
        let bytes = build_record(&Header::new(kinds::RESULT, 0, 1, 0), b"");

        let err = worker.run(&bytes[..], tokio::io::sink()).await.unwrap_err();
        assert!(matches!(err, FlowconvError::Protocol(_)));
    }
}
