//! Byte-level JSON output helpers for the executor's writer.

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Writes `input` as a JSON string, escaping as little as the grammar allows.
pub fn write_and_escape_string(out: &mut Vec<u8>, input: &str) {
    out.push(b'"');
    for &byte in input.as_bytes() {
        match byte {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0c => out.extend_from_slice(b"\\f"),
            byte if byte < 0x20 => {
                out.extend_from_slice(b"\\u00");
                out.push(HEX[(byte >> 4) as usize]);
                out.push(HEX[(byte & 0xf) as usize]);
            }
            byte => out.push(byte),
        }
    }
    out.push(b'"');
}

/// Wraps raw bytes in quotes without escaping. The bytes must already be
/// valid JSON string content (e.g. a fragment lifted out of upstream JSON).
pub fn write_quoted_raw(out: &mut Vec<u8>, raw: &[u8]) {
    out.push(b'"');
    out.extend_from_slice(raw);
    out.push(b'"');
}
