//! Error type shared by all artifact writers.
//!
//! Failures are scoped to a single mount entry: the driver logs them and
//! moves on to the next entry rather than aborting the whole generation
//! run. Every I/O failure is tagged with the path involved so the log
//! line names the artifact that could not be written.

use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum GeneratorError {
    /// Creating or writing an artifact failed. `path` is the file or
    /// symlink that could not be produced.
    Io { path: PathBuf, source: io::Error },

    /// The fsck tool probe malfunctioned (as opposed to the tool simply
    /// not existing, which is not an error at all).
    FsckProbe { fstype: String, source: io::Error },
}

impl GeneratorError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        GeneratorError::Io {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorError::Io { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
            GeneratorError::FsckProbe { fstype, source } => {
                write!(f, "fsck.{} cannot be used: {}", fstype, source)
            }
        }
    }
}

impl std::error::Error for GeneratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GeneratorError::Io { source, .. } => Some(source),
            GeneratorError::FsckProbe { source, .. } => Some(source),
        }
    }
}
