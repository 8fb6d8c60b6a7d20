//! `libfstabgen` is the core library for the fstab boot generator.
//!
//! A generator is a small program that runs once, early during boot, and
//! synthesizes unit files, symlinks and drop-in snippets into an output
//! directory that the init engine later folds into its unit search path.
//! This library holds the decision logic for the two artifact kinds the
//! fstab generator produces per mount entry:
//!
//! - filesystem-check dependencies (see [`generator::GeneratorContext::write_fsck_deps`])
//! - device-wait-timeout drop-ins (see [`generator::GeneratorContext::write_timeouts`])
//!
//! plus the supporting pieces: unit name escaping, fstab option filtering,
//! timespan parsing, fsck tool probing and drop-in file writing.

pub mod dropin;
pub mod error;
pub mod escape;
pub mod fsck;
pub mod fstab_util;
pub mod generator;
pub mod logging;
pub mod time_util;
pub mod unit_name;
