//! Filesystem check tool probing.
//!
//! Whether a `fsck.<type>` helper exists decides whether generating a check
//! dependency makes sense at all. The probe is a bounded path lookup, not a
//! subprocess: each directory in the search path is statted for an
//! executable `fsck.<type>`.
//!
//! Absence and malfunction are kept apart on purpose: a missing helper for
//! an exotic filesystem type is expected and maps to `Ok(false)`, while a
//! lookup that fails for any other reason (e.g. an unreadable directory
//! entry) is a real error the caller gets to see.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Default search path for check tools, matching where distributions
/// install them.
pub const DEFAULT_SEARCH_PATH: &str = "/sbin:/usr/sbin:/bin:/usr/bin";

/// Probe whether a `fsck.<fstype>` executable exists along `search_path`
/// (a colon-separated directory list).
///
/// Returns `Ok(true)` if found, `Ok(false)` if no candidate exists, and
/// `Err` only when a candidate could not be examined. Idempotent and free
/// of side effects.
pub fn fsck_exists(fstype: &str, search_path: &str) -> io::Result<bool> {
    let name = format!("fsck.{}", fstype);

    for dir in search_path.split(':').filter(|d| !d.is_empty()) {
        let candidate = Path::new(dir).join(&name);
        match std::fs::metadata(&candidate) {
            Ok(meta) => {
                if meta.is_file() && meta.permissions().mode() & 0o111 != 0 {
                    return Ok(true);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(false)
}
