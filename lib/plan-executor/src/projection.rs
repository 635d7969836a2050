//! Byte-level JSON projection over upstream response buffers.
//!
//! Selection never parses the full document: `sonic_rs` scans to the target
//! and hands back the raw fragment, so upstream bytes (whitespace included)
//! survive untouched. String values come back with their surrounding quotes
//! stripped but escape sequences intact, which is what both the template
//! engine and the output writer expect.

use bytes::Bytes;

use crate::json_writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    Bool,
    Number,
    String,
    Object,
    Array,
}

fn classify(raw: &[u8]) -> JsonKind {
    match raw.first() {
        Some(b'{') => JsonKind::Object,
        Some(b'[') => JsonKind::Array,
        Some(b'"') => JsonKind::String,
        Some(b't') | Some(b'f') => JsonKind::Bool,
        Some(b'n') => JsonKind::Null,
        Some(b'-') | Some(b'0'..=b'9') => JsonKind::Number,
        // Not valid JSON. Upstreams occasionally return plain text bodies;
        // treat them as string content.
        _ => JsonKind::String,
    }
}

fn trim(raw: &[u8]) -> &[u8] {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &raw[start..end]
}

fn fragment(raw: &[u8]) -> (Bytes, JsonKind) {
    let kind = classify(raw);
    if kind == JsonKind::String && raw.len() >= 2 && raw[0] == b'"' && raw[raw.len() - 1] == b'"' {
        (Bytes::copy_from_slice(&raw[1..raw.len() - 1]), kind)
    } else {
        (Bytes::copy_from_slice(raw), kind)
    }
}

/// Returns the raw JSON fragment at `path`, or `None` when the path is
/// absent or the buffer is malformed. An empty path selects the buffer root
/// without requiring it to be valid JSON.
pub fn select(buffer: &[u8], path: &[String]) -> Option<(Bytes, JsonKind)> {
    let buffer = trim(buffer);
    if buffer.is_empty() {
        return None;
    }
    if path.is_empty() {
        return Some(fragment(buffer));
    }
    let value = sonic_rs::get_from_slice(buffer, path.iter().map(|s| s.as_str())).ok()?;
    Some(fragment(value.as_raw_str().as_bytes()))
}

/// As [`select`], restricted to string values.
pub fn select_string(buffer: &[u8], path: &[String]) -> Option<Bytes> {
    match select(buffer, path) {
        Some((raw, JsonKind::String)) => Some(raw),
        _ => None,
    }
}

/// Collects the raw fragments of the array at `path`, in source order.
/// `None` when the path is absent or does not hold an array.
pub fn array_elements(buffer: &[u8], path: &[String]) -> Option<Vec<Bytes>> {
    let (raw, kind) = select(buffer, path)?;
    if kind != JsonKind::Array {
        return None;
    }
    let text = std::str::from_utf8(&raw).ok()?;
    let mut elements = Vec::new();
    for element in sonic_rs::to_array_iter(text) {
        let element = element.ok()?;
        elements.push(Bytes::copy_from_slice(element.as_raw_str().as_bytes()));
    }
    Some(elements)
}

/// Writes a projected scalar to the output. `quote` wraps the raw bytes in
/// quotes (string fields); otherwise they are emitted verbatim. JSON nulls
/// stay nulls either way.
pub fn emit_scalar(out: &mut Vec<u8>, raw: &[u8], kind: JsonKind, quote: bool) {
    if kind == JsonKind::Null {
        out.extend_from_slice(b"null");
        return;
    }
    if quote {
        json_writer::write_quoted_raw(out, raw);
    } else {
        out.extend_from_slice(raw);
    }
}
