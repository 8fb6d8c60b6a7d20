//! Unit name construction and escaping.
//!
//! Arbitrary strings and filesystem paths are encoded into unit names with
//! the rules from `systemd.unit(5)`:
//!
//! - `/` is replaced with `-`
//! - bytes outside `[a-zA-Z0-9:_.]` are replaced with `\xHH`
//! - a leading `.` is escaped as `\x2e`
//! - for paths, leading/trailing slashes are stripped and runs of slashes
//!   collapsed first; the root path `/` becomes `-`
//!
//! The escaping is reversible ([`unescape`], [`path_unescape`]) so a human
//! reading generated output can recover the source path.

/// Bytes that survive escaping unchanged: ASCII alphanumerics, `:`, `_`, `.`
fn is_valid_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b':' || b == b'_' || b == b'.'
}

/// Escape an arbitrary string for use as (part of) a unit name.
pub fn escape(s: &str) -> String {
    if s.is_empty() {
        return "-".to_string();
    }

    let mut out = String::with_capacity(s.len() * 2);
    for (i, b) in s.bytes().enumerate() {
        if b == b'/' {
            out.push('-');
        } else if is_valid_byte(b) && !(i == 0 && b == b'.') {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out
}

/// Escape a filesystem path for use as (part of) a unit name. The path is
/// normalized first: leading/trailing slashes stripped, slash runs
/// collapsed, `/` itself mapping to `-`.
pub fn path_escape(path: &str) -> String {
    let normalized = normalize_path(path);
    if normalized.is_empty() {
        return "-".to_string();
    }
    escape(&normalized)
}

/// Build a unit name from a path and a unit type suffix.
///
/// `from_path("/dev/sda1", ".device")` → `dev-sda1.device`
pub fn from_path(path: &str, suffix: &str) -> String {
    format!("{}{}", path_escape(path), suffix)
}

/// Build an instantiated unit name from a template prefix, an instance
/// path and a unit type suffix.
///
/// `from_path_instance("systemd-fsck", "/dev/sda1", ".service")`
/// → `systemd-fsck@dev-sda1.service`
pub fn from_path_instance(prefix: &str, path: &str, suffix: &str) -> String {
    format!("{}@{}{}", prefix, path_escape(path), suffix)
}

/// Reverse [`escape`]. Returns `None` for invalid escape sequences or
/// non-UTF-8 results.
pub fn unescape(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'-' => {
                out.push(b'/');
                i += 1;
            }
            b'\\' => {
                if i + 3 >= bytes.len() || bytes[i + 1] != b'x' {
                    return None;
                }
                let hi = hex_digit(bytes[i + 2])?;
                let lo = hex_digit(bytes[i + 3])?;
                out.push(hi << 4 | lo);
                i += 4;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out).ok()
}

/// Reverse [`path_escape`]. The result always starts with `/`.
pub fn path_unescape(s: &str) -> Option<String> {
    let unescaped = unescape(s)?;
    if unescaped.starts_with('/') {
        Some(unescaped)
    } else {
        Some(format!("/{unescaped}"))
    }
}

fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for part in path.split('/').filter(|p| !p.is_empty()) {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part);
    }
    out
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
