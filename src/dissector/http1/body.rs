//! Response body decoding: chunked transfer coding, then content coding.
//!
//! Decoding is best effort. Any failure leaves the body as captured.

use std::io::{ErrorKind, Read};

use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use tracing::debug;

use super::message::{find, Headers};

/// Decode a response body according to its headers.
///
/// A content coding that would expand past `max_inflated` bytes is treated
/// like any other decoding failure.
pub fn decode_body(headers: &Headers, body: &[u8], max_inflated: usize) -> Vec<u8> {
    let mut decoded = body.to_vec();

    if headers.has_token("transfer-encoding", "chunked") {
        match dechunk(&decoded) {
            Some(plain) => decoded = plain,
            None => debug!("malformed chunked body, keeping raw bytes"),
        }
    }

    let Some(encoding) = headers.get("content-encoding") else {
        return decoded;
    };

    // Applied in order, so undo them last to first
    let codings: Vec<String> = encoding
        .split(',')
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect();
    for coding in codings.iter().rev() {
        match decode_content(coding, &decoded, max_inflated) {
            Ok(Some(plain)) => decoded = plain,
            Ok(None) => {
                debug!(coding = %coding, "unsupported content encoding");
                break;
            }
            Err(e) => {
                debug!(coding = %coding, error = %e, "content decoding failed");
                return body_after_dechunk(headers, body);
            }
        }
    }

    decoded
}

fn body_after_dechunk(headers: &Headers, body: &[u8]) -> Vec<u8> {
    if headers.has_token("transfer-encoding", "chunked") {
        dechunk(body).unwrap_or_else(|| body.to_vec())
    } else {
        body.to_vec()
    }
}

/// `Ok(None)` for codings we do not handle.
fn decode_content(coding: &str, data: &[u8], limit: usize) -> std::io::Result<Option<Vec<u8>>> {
    match coding {
        "identity" => Ok(Some(data.to_vec())),
        "gzip" | "x-gzip" => read_bounded(MultiGzDecoder::new(data), limit).map(Some),
        "deflate" => inflate_either(data, limit).map(Some),
        _ => Ok(None),
    }
}

/// `deflate` is zlib-wrapped per RFC, but plenty of servers send raw deflate.
fn inflate_either(data: &[u8], limit: usize) -> std::io::Result<Vec<u8>> {
    read_bounded(ZlibDecoder::new(data), limit)
        .or_else(|_| read_bounded(DeflateDecoder::new(data), limit))
}

/// Read a decoder to the end, failing once it yields more than `limit` bytes.
fn read_bounded<R: Read>(reader: R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut out)?;
    if out.len() > limit {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("decoded data exceeds {} bytes", limit),
        ));
    }
    Ok(out)
}

/// Strip chunked transfer coding. Trailers are dropped.
///
/// Returns `None` on malformed input.
fn dechunk(mut data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());

    loop {
        let line_end = find(data, b"\r\n")?;
        let size_line = std::str::from_utf8(&data[..line_end]).ok()?;
        // chunk extensions
        let size_hex = size_line.split(';').next()?.trim();
        let size = usize::from_str_radix(size_hex, 16).ok()?;
        data = &data[line_end + 2..];

        if size == 0 {
            return Some(out);
        }
        if data.len() < size {
            return None;
        }
        out.extend_from_slice(&data[..size]);
        data = &data[size..];
        data = data.strip_prefix(b"\r\n")?;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;

    use super::*;
    use crate::config::DEFAULT_MAX_INFLATED_SIZE as LIMIT;
    use crate::dissector::http1::message::Response;

    fn headers(raw: &str) -> Headers {
        let response = Response::parse(format!("HTTP/1.1 200 OK\r\n{}\r\n\r\n", raw).as_bytes())
            .unwrap();
        response.headers
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_plain_body_untouched() {
        assert_eq!(decode_body(&headers("Content-Length: 3"), b"abc", LIMIT), b"abc");
    }

    #[test]
    fn test_gzip_body() {
        let body = gzip(b"hello gzip");
        assert_eq!(decode_body(&headers("Content-Encoding: gzip"), &body, LIMIT), b"hello gzip");
    }

    #[test]
    fn test_deflate_zlib_and_raw() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"zlib body").unwrap();
        let zlib = encoder.finish().unwrap();
        assert_eq!(decode_body(&headers("Content-Encoding: deflate"), &zlib, LIMIT), b"zlib body");

        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"raw body").unwrap();
        let raw = encoder.finish().unwrap();
        assert_eq!(decode_body(&headers("Content-Encoding: deflate"), &raw, LIMIT), b"raw body");
    }

    #[test]
    fn test_chunked_then_gzip() {
        let compressed = gzip(b"chunked and zipped");
        let mut body = format!("{:x}\r\n", compressed.len()).into_bytes();
        body.extend_from_slice(&compressed);
        body.extend_from_slice(b"\r\n0\r\n\r\n");

        let h = headers("Transfer-Encoding: chunked\r\nContent-Encoding: gzip");
        assert_eq!(decode_body(&h, &body, LIMIT), b"chunked and zipped");
    }

    #[test]
    fn test_dechunk() {
        assert_eq!(
            dechunk(b"4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\n\r\n").unwrap(),
            b"Wikipedia"
        );
        assert!(dechunk(b"zz\r\n").is_none());
        assert!(dechunk(b"10\r\nshort").is_none());
    }

    #[test]
    fn test_bad_gzip_keeps_raw() {
        let h = headers("Content-Encoding: gzip");
        assert_eq!(decode_body(&h, b"not gzip", LIMIT), b"not gzip");
    }

    #[test]
    fn test_unknown_encoding_keeps_raw() {
        let h = headers("Content-Encoding: br");
        assert_eq!(decode_body(&h, b"\x0b\x02\x80", LIMIT), b"\x0b\x02\x80");
    }

    #[test]
    fn test_oversized_gzip_keeps_raw() {
        let body = gzip(&vec![0u8; 1 << 20]);
        assert!(body.len() < 4096);
        let h = headers("Content-Encoding: gzip");
        assert_eq!(decode_body(&h, &body, 64 * 1024), body);
        assert_eq!(decode_body(&h, &body, 1 << 20).len(), 1 << 20);
    }

    #[test]
    fn test_read_bounded_limit_is_inclusive() {
        assert_eq!(read_bounded(&b"12345"[..], 5).unwrap(), b"12345");
        assert!(read_bounded(&b"123456"[..], 5).is_err());
    }
}
