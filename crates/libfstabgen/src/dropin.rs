//! Generated file and drop-in writing.
//!
//! Generation runs once per boot into a clean directory, so artifacts are
//! opened with exclusive-create semantics: an already existing file means
//! stale state from a previous (or concurrent) run and fails loudly rather
//! than being silently overwritten.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::GeneratorError;

/// Exclusively create `path` and write a generated unit file: the
/// "generated by" header followed by `body`. Fully written and flushed
/// before returning; the consumer never sees a partial file as valid.
pub fn write_unit_file(
    path: &Path,
    generator_name: &str,
    body: &str,
) -> Result<(), GeneratorError> {
    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| GeneratorError::io(path, e))?;

    f.write_all(format!("# Automatically generated by {}\n\n", generator_name).as_bytes())
        .and_then(|_| f.write_all(body.as_bytes()))
        .and_then(|_| f.flush())
        .map_err(|e| GeneratorError::io(path, e))
}

/// Write a numbered drop-in fragment for `unit`:
/// `<dir>/<unit>.d/<priority>-<name>.conf`. Parent directories are created
/// as needed; the fragment itself is exclusively created.
pub fn write_drop_in(
    dir: &Path,
    unit: &str,
    priority: u8,
    name: &str,
    generator_name: &str,
    body: &str,
) -> Result<(), GeneratorError> {
    let path = drop_in_path(dir, unit, priority, name);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| GeneratorError::io(parent, e))?;
    }

    write_unit_file(&path, generator_name, body)
}

/// Path of a numbered drop-in fragment for `unit` under `dir`.
pub fn drop_in_path(dir: &Path, unit: &str, priority: u8, name: &str) -> PathBuf {
    dir.join(format!("{}.d", unit))
        .join(format!("{}-{}.conf", priority, name))
}
