//! systemd-fstab-generator — Translate `/etc/fstab` into unit artifacts.
//!
//! Implements the generator protocol: invoked with up to three output
//! directory arguments (`normal_dir early_dir late_dir`), runs once during
//! early boot, and writes mount units, check dependencies and device
//! timeout drop-ins into the normal output directory. A failing fstab
//! entry is logged and skipped; it degrades the exit status but never
//! stops the remaining entries from being processed.

use clap::Parser;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process;

use libfstabgen::generator::{GeneratorContext, LOCAL_FS_TARGET};
use libfstabgen::logging::setup_logging;
use libfstabgen::unit_name;

#[derive(Parser, Debug)]
#[command(
    name = "systemd-fstab-generator",
    about = "Generate mount units and check dependencies from /etc/fstab",
    version
)]
struct Cli {
    /// Output directory for generated units.
    normal_dir: PathBuf,

    /// High-priority output directory (unused, accepted per the
    /// generator protocol).
    early_dir: Option<PathBuf>,

    /// Low-priority output directory (unused, accepted per the
    /// generator protocol).
    late_dir: Option<PathBuf>,

    /// Filesystem table to read.
    #[arg(long, default_value = "/etc/fstab")]
    fstab: PathBuf,

    /// Whether the run is happening inside the initrd, where /sysroot is
    /// the second-stage root. Overrides the /etc/initrd-release probe in
    /// either direction.
    #[arg(long, value_name = "BOOL")]
    in_initrd: Option<bool>,
}

/// One row of the filesystem table.
#[derive(Debug, Clone, PartialEq)]
struct FstabEntry {
    what: String,
    where_: String,
    fstype: String,
    options: String,
    passno: u32,
}

/// Unescape the octal escapes fstab uses for whitespace in fields
/// (`\040` for space, `\011` for tab, ...).
fn unescape_field(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let value = (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Parse fstab text into entries. Comment and blank lines are skipped;
/// short lines are warned about and skipped.
fn parse_fstab(content: &str) -> Vec<FstabEntry> {
    let mut entries = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            warn!("Skipping malformed fstab line {}: {line}", lineno + 1);
            continue;
        }

        entries.push(FstabEntry {
            what: unescape_field(fields[0]),
            where_: unescape_field(fields[1]),
            fstype: fields.get(2).unwrap_or(&"auto").to_string(),
            options: fields.get(3).unwrap_or(&"defaults").to_string(),
            passno: fields.get(5).and_then(|f| f.parse().ok()).unwrap_or(0),
        });
    }

    entries
}

/// Generate the artifacts for a single fstab entry. `source` is the
/// fstab file the entry came from, recorded in the generated unit.
fn add_mount(
    ctx: &GeneratorContext,
    entry: &FstabEntry,
    source: &Path,
) -> Result<(), libfstabgen::error::GeneratorError> {
    let node = libfstabgen::fstab_util::node_to_udev_node(&entry.what);

    // The timeout writer also strips its option keys for us.
    let options = ctx.write_timeouts(&entry.what, &entry.where_, &entry.options)?;

    let mut unit_section = Vec::new();
    if entry.passno != 0 {
        ctx.write_fsck_deps(&mut unit_section, &node, &entry.where_, &entry.fstype)?;
    }

    // The root mount is managed by the initial transition, not by a
    // generated unit.
    if entry.where_ == "/" {
        return Ok(());
    }

    let unit = unit_name::from_path(&entry.where_, ".mount");
    let mut body = String::new();
    body.push_str("[Unit]\n");
    body.push_str("Documentation=man:fstab(5)\n");
    body.push_str(&format!("SourcePath={}\n", source.display()));
    body.push_str(&format!("Before={LOCAL_FS_TARGET}\n"));
    body.push_str(&String::from_utf8_lossy(&unit_section));
    body.push('\n');
    body.push_str("[Mount]\n");
    body.push_str(&format!("What={node}\n"));
    body.push_str(&format!("Where={}\n", entry.where_));
    if !entry.fstype.is_empty() && entry.fstype != "auto" {
        body.push_str(&format!("Type={}\n", entry.fstype));
    }
    if !options.is_empty() && options != "defaults" {
        body.push_str(&format!("Options={options}\n"));
    }

    let unit_path = ctx.output_dir.join(&unit);
    libfstabgen::dropin::write_unit_file(&unit_path, &ctx.generator_name, &body)?;

    // Hook the mount into the local filesystem target unless the entry
    // opted out of automatic activation.
    if !options.split(',').any(|o| o == "noauto") {
        let wants_dir = ctx.output_dir.join(format!("{LOCAL_FS_TARGET}.wants"));
        std::fs::create_dir_all(&wants_dir)
            .map_err(|e| libfstabgen::error::GeneratorError::io(&wants_dir, e))?;
        let lnk = wants_dir.join(&unit);
        match std::os::unix::fs::symlink(Path::new("..").join(&unit), &lnk) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(libfstabgen::error::GeneratorError::io(&lnk, e)),
        }
    }

    Ok(())
}

/// Process every fstab entry, returning how many of them failed.
fn run(ctx: &GeneratorContext, entries: &[FstabEntry], source: &Path) -> usize {
    let mut failures = 0;

    for entry in entries {
        // Swap areas and API filesystems are not this generator's business.
        if !entry.where_.starts_with('/') {
            debug!("Skipping {} without an absolute mount point", entry.what);
            continue;
        }

        if let Err(e) = add_mount(ctx, entry, source) {
            warn!("Failed to generate units for {}: {e}", entry.where_);
            failures += 1;
        }
    }

    failures
}

fn in_initrd() -> bool {
    Path::new("/etc/initrd-release").exists()
}

fn main() {
    let cli = Cli::parse();

    let level = match std::env::var("SYSTEMD_LOG_LEVEL").as_deref() {
        Ok("debug") => log::LevelFilter::Debug,
        Ok("warning") | Ok("warn") => log::LevelFilter::Warn,
        _ => log::LevelFilter::Info,
    };
    if let Err(e) = setup_logging(level) {
        eprintln!("systemd-fstab-generator: {e}");
    }

    let content = match std::fs::read_to_string(&cli.fstab) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} does not exist, nothing to generate", cli.fstab.display());
            return;
        }
        Err(e) => {
            warn!("Failed to read {}: {e}", cli.fstab.display());
            process::exit(1);
        }
    };

    let mut ctx = GeneratorContext::new(&cli.normal_dir, "systemd-fstab-generator");
    ctx.in_initrd = cli.in_initrd.unwrap_or_else(in_initrd);

    let entries = parse_fstab(&content);
    let failures = run(&ctx, &entries, &cli.fstab);

    if failures > 0 {
        process::exit(1);
    }
}
