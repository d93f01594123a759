//! HTTP/1 request and response parsing.
//!
//! Each chunk is expected to hold exactly one complete message. Parsing is
//! lenient about header syntax (lines without a colon are skipped, folded
//! lines are joined) and strict about the start line.

use crate::error::{DissectError, DissectResult};

/// More headers than this is treated as garbage.
const MAX_HEADERS: usize = 100;

/// Start lines longer than this are cut in diagnostics.
const MAX_LINE_PREVIEW: usize = 80;

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Parse header lines (everything after the start line).
    fn parse<'a>(lines: impl Iterator<Item = &'a str>) -> DissectResult<Self> {
        let mut headers: Vec<(String, String)> = Vec::new();

        for line in lines {
            if line.is_empty() {
                break;
            }

            // Obsolete line folding
            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = headers.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some(colon) = line.find(':') {
                let name = line[..colon].trim().to_string();
                let value = line[colon + 1..].trim().to_string();
                headers.push((name, value));
                if headers.len() > MAX_HEADERS {
                    return Err(DissectError::Http(format!(
                        "got more than {} headers",
                        MAX_HEADERS
                    )));
                }
            }
        }

        Ok(Headers(headers))
    }

    /// First value of the named header.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the named header is present with the given value (ignoring case).
    pub fn is(&self, name: &str, value: &str) -> bool {
        self.get(name)
            .map(|v| v.trim().eq_ignore_ascii_case(value))
            .unwrap_or(false)
    }

    /// Whether a comma-separated header lists `token` (ignoring case).
    ///
    /// `Connection: keep-alive, Upgrade` has the token `upgrade`.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get(name)
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A parsed HTTP/1 request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    /// e.g. `HTTP/1.1`; `HTTP/0.9` for two-word request lines.
    pub version: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Request {
    /// Parse a complete request.
    ///
    /// Failure messages carry a `400` status prefix, in the style of an
    /// HTTP server rejecting the request.
    pub fn parse(data: &[u8]) -> DissectResult<Self> {
        let (head, body) = split_head(data);
        let text = String::from_utf8_lossy(head);
        let mut lines = text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

        let request_line = lines.next().unwrap_or_default();
        let words: Vec<&str> = request_line.split_whitespace().collect();

        let (method, path, version) = match words.as_slice() {
            [method, path, version] => {
                if !is_valid_version(version) {
                    return Err(DissectError::Http(format!(
                        "400 Bad request version ('{}')",
                        preview(version)
                    )));
                }
                (*method, *path, *version)
            }
            [method, path] => {
                if *method != "GET" {
                    return Err(DissectError::Http(format!(
                        "400 Bad HTTP/0.9 request type ('{}')",
                        preview(method)
                    )));
                }
                (*method, *path, "HTTP/0.9")
            }
            _ => {
                return Err(DissectError::Http(format!(
                    "400 Bad request syntax ('{}')",
                    preview(request_line)
                )));
            }
        };

        if !is_token(method) {
            return Err(DissectError::Http(format!(
                "400 Bad request method ('{}')",
                preview(method)
            )));
        }

        let headers = Headers::parse(lines)?;

        Ok(Request {
            method: method.to_string(),
            path: path.to_string(),
            version: version.to_string(),
            headers,
            body: body.to_vec(),
        })
    }
}

/// A parsed HTTP/1 response.
#[derive(Debug, Clone)]
pub struct Response {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    /// Raw status line and header lines, without the blank line.
    pub head: Vec<u8>,
    /// Raw body as captured (still transfer/content encoded).
    pub body: Vec<u8>,
}

impl Response {
    /// Parse a complete response. The blank line after the headers is
    /// required.
    pub fn parse(data: &[u8]) -> DissectResult<Self> {
        let split = find(data, b"\r\n\r\n").ok_or_else(|| {
            DissectError::Http("missing end of response headers".to_string())
        })?;
        let head = &data[..split];
        let body = &data[split + 4..];

        let text = String::from_utf8_lossy(head);
        let mut lines = text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

        let status_line = lines.next().unwrap_or_default();
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let status = parts
            .next()
            .and_then(|s| s.trim().parse::<u16>().ok())
            .ok_or_else(|| {
                DissectError::Http(format!(
                    "invalid status line '{}'",
                    preview(status_line)
                ))
            })?;
        if !version.starts_with("HTTP/") {
            return Err(DissectError::Http(format!(
                "invalid status line '{}'",
                preview(status_line)
            )));
        }
        let reason = parts.next().unwrap_or_default().to_string();

        let headers = Headers::parse(lines)?;

        Ok(Response {
            version: version.to_string(),
            status,
            reason,
            headers,
            head: head.to_vec(),
            body: body.to_vec(),
        })
    }
}

/// Split at the first blank line. Without one, the whole input is head.
fn split_head(data: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find(data, b"\r\n\r\n") {
        (&data[..pos], &data[pos + 4..])
    } else if let Some(pos) = find(data, b"\n\n") {
        (&data[..pos], &data[pos + 2..])
    } else {
        (data, &[])
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// `HTTP/<digits>.<digits>`
fn is_valid_version(version: &str) -> bool {
    let Some(number) = version.strip_prefix("HTTP/") else {
        return false;
    };
    let mut parts = number.split('.');
    let (Some(major), Some(minor), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !major.is_empty()
        && !minor.is_empty()
        && major.bytes().all(|b| b.is_ascii_digit())
        && minor.bytes().all(|b| b.is_ascii_digit())
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

fn preview(s: &str) -> String {
    if s.chars().count() > MAX_LINE_PREVIEW {
        let cut: String = s.chars().take(MAX_LINE_PREVIEW).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}
