//! `{{ .path.to.value }}` substitution inside argument values.
//!
//! A placeholder resolves against the accumulated argument scope by longest
//! key-prefix match (keys are compared with their leading dot stripped); any
//! remaining path segments are projected into the matched entry's JSON
//! value. Paths that no scope entry covers are projected into the current
//! object data buffer. Scalars are inserted without JSON quoting, objects
//! and arrays as their raw JSON. One pass only: substituted values are not
//! re-scanned.

use bytes::Bytes;
use tracing::warn;

use crate::{arguments::ResolvedArg, projection};

const OPEN: &[u8] = b"{{";
const CLOSE: &[u8] = b"}}";

pub fn interpolate(value: &[u8], scope: &[ResolvedArg], data: Option<&[u8]>) -> Bytes {
    let mut out = Vec::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = find(rest, OPEN) {
        let Some(end) = find(&rest[start + OPEN.len()..], CLOSE) else {
            break;
        };
        out.extend_from_slice(&rest[..start]);
        let placeholder = &rest[start + OPEN.len()..start + OPEN.len() + end];
        match resolve_placeholder(placeholder, scope, data) {
            Some(resolved) => out.extend_from_slice(&resolved),
            None => {
                warn!(
                    placeholder = %String::from_utf8_lossy(placeholder).trim(),
                    "unresolved template placeholder, substituting empty string"
                );
            }
        }
        rest = &rest[start + OPEN.len() + end + CLOSE.len()..];
    }
    out.extend_from_slice(rest);
    Bytes::from(out)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn resolve_placeholder(
    placeholder: &[u8],
    scope: &[ResolvedArg],
    data: Option<&[u8]>,
) -> Option<Bytes> {
    let path = std::str::from_utf8(placeholder).ok()?.trim();
    let path = path.strip_prefix('.').unwrap_or(path);
    if path.is_empty() {
        return None;
    }
    let segments: Vec<&str> = path.split('.').collect();

    for prefix_len in (1..=segments.len()).rev() {
        for entry in scope {
            let Ok(key) = std::str::from_utf8(&entry.key) else {
                continue;
            };
            let key = key.strip_prefix('.').unwrap_or(key);
            if key.is_empty() {
                continue;
            }
            if key.split('.').eq(segments[..prefix_len].iter().copied()) {
                if prefix_len == segments.len() {
                    return Some(entry.value.clone());
                }
                let remaining: Vec<String> =
                    segments[prefix_len..].iter().map(|s| s.to_string()).collect();
                if let Some((raw, _)) = projection::select(&entry.value, &remaining) {
                    return Some(raw);
                }
            }
        }
    }

    if let Some(data) = data {
        let full: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
        if let Some((raw, _)) = projection::select(data, &full) {
            return Some(raw);
        }
    }
    None
}
