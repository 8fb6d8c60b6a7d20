//! C-style string escaping for generated unit text.
//!
//! Device paths are interpolated into generated unit files (descriptions,
//! `ExecStart=` arguments). Anything that could contain unit-syntax
//! metacharacters goes through [`cescape`] first, so the escaping rules
//! live in exactly one place for every artifact writer.

/// Escape a string C-style: backslash, double quote and the common control
/// characters get two-character escapes, any other byte outside printable
/// ASCII becomes `\xHH`.
pub fn cescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());

    for b in s.bytes() {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }

    out
}
