//! `Sec-WebSocket-Extensions` header parsing.

use std::collections::BTreeMap;

pub const PERMESSAGE_DEFLATE: &str = "permessage-deflate";

const DEFAULT_WINDOW_BITS: u8 = 15;

/// One negotiated extension with its parameters.
///
/// A bare parameter (`client_max_window_bits`) has no value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extension {
    pub name: String,
    pub params: BTreeMap<String, Option<String>>,
}

impl Extension {
    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// `server_max_window_bits` / `client_max_window_bits`, default 15.
    pub fn window_bits(&self, param: &str) -> u8 {
        self.params
            .get(param)
            .and_then(|v| v.as_deref())
            .and_then(|v| v.parse::<u8>().ok())
            .filter(|bits| (8..=15).contains(bits))
            .unwrap_or(DEFAULT_WINDOW_BITS)
    }
}

/// Parse an extensions header.
///
/// `permessage-deflate; client_max_window_bits; server_max_window_bits="10", x-foo`
/// yields two extensions. Names and parameters are lower-cased; quoted
/// values are unquoted.
pub fn parse_extensions(header: &str) -> Vec<Extension> {
    header
        .split(',')
        .map(|raw| raw.trim().to_ascii_lowercase())
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            let mut parts = raw.split(';');
            let name = parts.next().unwrap_or_default().trim().to_string();
            let params = parts
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|param| match param.split_once('=') {
                    None => (param.to_string(), None),
                    Some((key, value)) => {
                        let value = value.trim();
                        let value = value
                            .strip_prefix('"')
                            .and_then(|v| v.strip_suffix('"'))
                            .unwrap_or(value);
                        (key.trim().to_string(), Some(value.to_string()))
                    }
                })
                .collect();
            Extension { name, params }
        })
        .collect()
}

/// The permessage-deflate entry, if negotiated.
pub fn find_deflate(extensions: &[Extension]) -> Option<&Extension> {
    extensions.iter().find(|e| e.name == PERMESSAGE_DEFLATE)
}
