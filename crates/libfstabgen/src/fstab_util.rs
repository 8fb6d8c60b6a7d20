//! fstab option and device specifier helpers.
//!
//! Mount option strings are comma-separated `name` or `name=value` tokens.
//! [`filter_options`] pulls recognized keys out of such a string; the
//! remainder is handed back so the caller can pass it on to the mount
//! itself. Device specifiers (`UUID=`, `LABEL=`, ...) resolve to the
//! `/dev/disk/by-*` symlink farm udev maintains.

/// Extract the value of the last option matching any of `keys` from a
/// comma-separated option string. Returns the extracted value (if any)
/// together with the option string with all matching entries removed.
///
/// A key matches a token of the form `key=value`; the bare form without
/// `=` is not recognized for the keys this generator cares about.
pub fn filter_options(opts: &str, keys: &[&str]) -> (Option<String>, String) {
    let mut value = None;
    let mut remaining: Vec<&str> = Vec::new();

    for token in opts.split(',') {
        let mut matched = false;
        for key in keys {
            if let Some(v) = token.strip_prefix(key) {
                if let Some(v) = v.strip_prefix('=') {
                    value = Some(v.to_string());
                    matched = true;
                    break;
                }
            }
        }
        if !matched && !token.is_empty() {
            remaining.push(token);
        }
    }

    (value, remaining.join(","))
}

/// Whether a mount source is an actual device node path, as opposed to a
/// network share, bind-mount source or pseudo-filesystem marker.
pub fn is_device_path(path: &str) -> bool {
    path.starts_with("/dev/") || path.starts_with("/sys/")
}

/// Resolve an fstab device specifier to the udev-maintained device node.
///
/// `UUID=`, `LABEL=`, `PARTUUID=` and `PARTLABEL=` specifiers map to the
/// corresponding `/dev/disk/by-*` symlink; everything else is returned
/// unchanged.
pub fn node_to_udev_node(what: &str) -> String {
    const TAGS: &[(&str, &str)] = &[
        ("UUID=", "/dev/disk/by-uuid/"),
        ("LABEL=", "/dev/disk/by-label/"),
        ("PARTUUID=", "/dev/disk/by-partuuid/"),
        ("PARTLABEL=", "/dev/disk/by-partlabel/"),
    ];

    for (tag, dir) in TAGS {
        if let Some(id) = what.strip_prefix(tag) {
            return format!("{}{}", dir, encode_devnode_name(id));
        }
    }

    what.to_string()
}

/// Encode a label for use as a devnode file name, the same way udev does:
/// ASCII alphanumerics and a small set of safe characters pass through,
/// everything else becomes `\xHH`.
fn encode_devnode_name(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'#' | b'+' | b'-' | b'.' | b':' | b'=' | b'@' | b'_') {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out
}
