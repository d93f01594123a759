//! permessage-deflate decompression.
//!
//! Each direction of a websocket stream has its own raw-deflate context that
//! persists across messages (context takeover). Senders strip the final
//! empty stored block `00 00 FF FF`; it is put back before inflating.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{DissectError, DissectResult};

const TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Raw-deflate context for one direction.
pub struct Inflater {
    inner: Decompress,
    window_bits: u8,
    max_output: usize,
}

impl Inflater {
    /// The context always uses a 32 KiB window, which also inflates data
    /// compressed with any smaller negotiated window.
    ///
    /// A message that inflates past `max_output` bytes is an error.
    pub fn new(window_bits: u8, max_output: usize) -> Self {
        Self {
            inner: Decompress::new(false),
            window_bits,
            max_output,
        }
    }

    pub fn window_bits(&self) -> u8 {
        self.window_bits
    }

    /// Inflate one message payload.
    pub fn inflate(&mut self, payload: &[u8]) -> DissectResult<Vec<u8>> {
        let mut input = Vec::with_capacity(payload.len() + TRAILER.len());
        input.extend_from_slice(payload);
        input.extend_from_slice(&TRAILER);

        let mut out = Vec::with_capacity(input.len() * 4 + 64);
        let mut consumed = 0usize;

        loop {
            if out.capacity() - out.len() < 1024 {
                out.reserve(out.capacity().max(4096));
            }

            let before_in = self.inner.total_in();
            let before_out = self.inner.total_out();
            let status = match self.inner.decompress_vec(
                &input[consumed..],
                &mut out,
                FlushDecompress::Sync,
            ) {
                Ok(status) => status,
                Err(e) => {
                    self.inner.reset(false);
                    return Err(DissectError::WebSocket(format!(
                        "Unable to inflate websocket message: {}",
                        e
                    )));
                }
            };
            let read = (self.inner.total_in() - before_in) as usize;
            let written = self.inner.total_out() - before_out;
            consumed += read;

            if out.len() > self.max_output {
                self.inner.reset(false);
                return Err(DissectError::WebSocket(format!(
                    "Inflated websocket message exceeds {} bytes",
                    self.max_output
                )));
            }

            match status {
                Status::StreamEnd => {
                    // Final block set by the sender; the next message starts fresh.
                    self.inner.reset(false);
                    break;
                }
                Status::BufError => break,
                Status::Ok => {}
            }

            let output_full = out.len() == out.capacity();
            if consumed >= input.len() && !output_full {
                break;
            }
            if read == 0 && written == 0 && !output_full {
                break;
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use flate2::{Compress, Compression, FlushCompress};

    use super::*;
    use crate::config::DEFAULT_MAX_INFLATED_SIZE as LIMIT;

    /// Compress like a permessage-deflate sender: sync flush, trailer removed.
    pub(crate) fn deflate_message(compressor: &mut Compress, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len() + 64);
        let mut input_pos = 0usize;
        loop {
            out.reserve(1024);
            let before_in = compressor.total_in();
            compressor
                .compress_vec(&data[input_pos..], &mut out, FlushCompress::Sync)
                .unwrap();
            input_pos += (compressor.total_in() - before_in) as usize;
            if input_pos >= data.len() && out.len() < out.capacity() {
                break;
            }
        }
        if out.ends_with(&TRAILER) {
            out.truncate(out.len() - TRAILER.len());
        }
        out
    }

    #[test]
    fn test_round_trip_including_empty() {
        for payload in [&b""[..], b"a", b"hello websocket", &[7u8; 10_000][..]] {
            let mut compressor = Compress::new(Compression::default(), false);
            let compressed = deflate_message(&mut compressor, payload);
            let mut inflater = Inflater::new(15, LIMIT);
            assert_eq!(inflater.inflate(&compressed).unwrap(), payload);
        }
    }

    #[test]
    fn test_context_takeover_across_messages() {
        let mut compressor = Compress::new(Compression::default(), false);
        let mut inflater = Inflater::new(15, LIMIT);
        for message in [&b"repeat me please"[..], b"repeat me please", b"and something else"] {
            let compressed = deflate_message(&mut compressor, message);
            assert_eq!(inflater.inflate(&compressed).unwrap(), message);
        }
    }

    #[test]
    fn test_garbage_is_error() {
        let mut inflater = Inflater::new(15, LIMIT);
        assert!(inflater.inflate(&[0xff, 0xff, 0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_output_bound() {
        let mut compressor = Compress::new(Compression::default(), false);
        let compressed = deflate_message(&mut compressor, &vec![0u8; 1 << 20]);
        assert!(compressed.len() < 4096);

        let mut inflater = Inflater::new(15, 64 * 1024);
        let err = inflater.inflate(&compressed).unwrap_err();
        assert_eq!(err.to_string(), "Inflated websocket message exceeds 65536 bytes");

        let mut inflater = Inflater::new(15, 1 << 20);
        assert_eq!(inflater.inflate(&compressed).unwrap().len(), 1 << 20);
    }
}
