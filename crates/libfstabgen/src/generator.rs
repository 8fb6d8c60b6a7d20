//! The generator core: per-mount-entry artifact synthesis.
//!
//! Two entry points, both called once per fstab entry by the driver loop:
//!
//! - [`GeneratorContext::write_fsck_deps`] decides whether a
//!   filesystem-check prerequisite is needed and materializes it — a
//!   `.wants` symlink for the root mount, a synthesized one-shot service
//!   for the initrd second-stage root, or `RequiresOverridable=`/`After=`
//!   lines naming an instantiated `systemd-fsck@.service` for everything
//!   else.
//! - [`GeneratorContext::write_timeouts`] extracts the device-wait-timeout
//!   option and materializes it as a drop-in on the backing device unit.
//!
//! Misconfiguration degrades to "no special behavior" plus a log line;
//! only real I/O failures surface as errors, and those are scoped to the
//! one entry being processed.

use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::dropin::{write_drop_in, write_unit_file};
use crate::error::GeneratorError;
use crate::escape::cescape;
use crate::fsck::{self, fsck_exists};
use crate::fstab_util::{filter_options, is_device_path, node_to_udev_node};
use crate::time_util::parse_sec;
use crate::unit_name;

/// Target that pulls in local filesystems at boot.
pub const LOCAL_FS_TARGET: &str = "local-fs.target";

/// Where the system-provided root check service lives.
pub const SYSTEM_DATA_UNIT_DIR: &str = "/usr/lib/systemd/system";

/// Name of the (provided or synthesized) root filesystem check service.
pub const FSCK_ROOT_SERVICE: &str = "systemd-fsck-root.service";

/// Mount option keys carrying the device-wait timeout. The `comment=` form
/// is the legacy spelling kept for compatibility.
const DEVICE_TIMEOUT_KEYS: &[&str] = &["comment=systemd.device-timeout", "x-systemd.device-timeout"];

/// Everything the artifact writers need, passed explicitly rather than
/// pulled from ambient process state.
pub struct GeneratorContext {
    /// Generation output directory all artifact paths are relative to.
    pub output_dir: PathBuf,

    /// Self-identification embedded in generated file headers.
    pub generator_name: String,

    /// The fsck binary invoked by the synthesized root check service.
    /// Build-time configuration, not discovered at runtime.
    pub fsck_path: PathBuf,

    /// Colon-separated directory list searched for `fsck.<type>` tools.
    pub fsck_search_path: String,

    /// Whether we are running inside the early-boot temporary root
    /// environment (where `/sysroot` is the second-stage root).
    pub in_initrd: bool,
}

impl GeneratorContext {
    pub fn new(output_dir: impl Into<PathBuf>, generator_name: impl Into<String>) -> Self {
        GeneratorContext {
            output_dir: output_dir.into(),
            generator_name: generator_name.into(),
            fsck_path: PathBuf::from("/usr/lib/systemd/systemd-fsck"),
            fsck_search_path: fsck::DEFAULT_SEARCH_PATH.to_string(),
            in_initrd: false,
        }
    }
}

/// How the check prerequisite for one mount entry is expressed. Computed
/// once from the mount point identity, then dispatched to exactly one
/// artifact-writing strategy.
enum CheckTarget {
    /// `/` — symlink the system-provided root check service into
    /// `local-fs.target.wants/`; no dependency lines.
    RootSymlink,

    /// Initrd `/sysroot` — synthesize a dedicated one-shot check service
    /// and depend on it.
    SysrootService,

    /// Anything else — depend on the instantiated check template for the
    /// device; the init engine already provides `systemd-fsck@.service`.
    Instance(String),
}

impl GeneratorContext {
    /// Plan and materialize the filesystem-check prerequisite for one
    /// mount entry. `unit_file` is the caller-owned, already-open mount
    /// unit the dependency lines are appended to.
    pub fn write_fsck_deps(
        &self,
        unit_file: &mut impl Write,
        what: &str,
        where_: &str,
        fstype: &str,
    ) -> Result<(), GeneratorError> {
        if !is_device_path(what) {
            warn!("Checking was requested for \"{what}\", but it is not a device.");
            return Ok(());
        }

        if !fstype.is_empty() && fstype != "auto" {
            match fsck_exists(fstype, &self.fsck_search_path) {
                Ok(true) => {}
                Ok(false) => {
                    // Missing check for an exotic filesystem type is
                    // expected, not an error.
                    debug!("Checking was requested for {what}, but fsck.{fstype} does not exist.");
                    return Ok(());
                }
                Err(e) => {
                    warn!("Checking was requested for {what}, but fsck.{fstype} cannot be used: {e}");
                    return Err(GeneratorError::FsckProbe {
                        fstype: fstype.to_string(),
                        source: e,
                    });
                }
            }
        }

        let target = if where_ == "/" {
            CheckTarget::RootSymlink
        } else if self.in_initrd && where_ == "/sysroot" {
            CheckTarget::SysrootService
        } else {
            CheckTarget::Instance(unit_name::from_path_instance(
                "systemd-fsck",
                what,
                ".service",
            ))
        };

        let fsck_unit = match target {
            CheckTarget::RootSymlink => {
                self.symlink_root_fsck()?;
                return Ok(());
            }
            CheckTarget::SysrootService => {
                self.write_fsck_sysroot_service(what)?;
                FSCK_ROOT_SERVICE.to_string()
            }
            CheckTarget::Instance(unit) => unit,
        };

        // The writer is caller-owned and may live anywhere; tag a write
        // failure with the mount unit name rather than guessing a path.
        let mount_unit = unit_name::from_path(where_, ".mount");
        write!(unit_file, "RequiresOverridable={fsck_unit}\nAfter={fsck_unit}\n")
            .map_err(|e| GeneratorError::io(mount_unit, e))
    }

    /// Extract the device-wait timeout from `opts` and attach it as a
    /// drop-in to the backing device unit. Returns the option string with
    /// the timeout keys stripped.
    ///
    /// Supports endless device timeouts for devices that only show up
    /// after user input, like crypto devices.
    pub fn write_timeouts(
        &self,
        what: &str,
        where_: &str,
        opts: &str,
    ) -> Result<String, GeneratorError> {
        let (timeout, filtered) = filter_options(opts, DEVICE_TIMEOUT_KEYS);

        let timeout = match timeout {
            Some(t) => t,
            None => return Ok(filtered),
        };

        let duration = match parse_sec(&timeout) {
            Some(d) => d,
            None => {
                warn!("Failed to parse timeout for {where_}, ignoring: {timeout}");
                return Ok(filtered);
            }
        };

        let node = node_to_udev_node(what);
        let unit = unit_name::from_path(&node, ".device");

        write_drop_in(
            &self.output_dir,
            &unit,
            50,
            "device-timeout",
            &self.generator_name,
            &format!("[Unit]\nJobTimeoutSec={}\n", duration.as_secs()),
        )?;

        Ok(filtered)
    }

    /// Root mount: hook the system-provided check service into
    /// `local-fs.target.wants/` instead of generating anything.
    fn symlink_root_fsck(&self) -> Result<(), GeneratorError> {
        let wants_dir = self
            .output_dir
            .join(format!("{LOCAL_FS_TARGET}.wants"));
        std::fs::create_dir_all(&wants_dir).map_err(|e| GeneratorError::io(&wants_dir, e))?;

        let lnk = wants_dir.join(FSCK_ROOT_SERVICE);
        let target = Path::new(SYSTEM_DATA_UNIT_DIR).join(FSCK_ROOT_SERVICE);

        match std::os::unix::fs::symlink(&target, &lnk) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(GeneratorError::io(&lnk, e)),
        }
    }

    /// Initrd second-stage root: synthesize the dedicated one-shot check
    /// service. The unit participates in an explicit minimal ordering, so
    /// default dependency wiring is disabled, and the check may
    /// legitimately run long, so the job timeout is unbounded.
    fn write_fsck_sysroot_service(&self, what: &str) -> Result<(), GeneratorError> {
        let unit_path = self.output_dir.join(FSCK_ROOT_SERVICE);
        debug!("Creating {}", unit_path.display());

        let device = unit_name::from_path(what, ".device");
        let escaped = cescape(what);

        let body = format!(
            "[Unit]\n\
             Documentation=man:systemd-fsck-root.service(8)\n\
             Description=File System Check on {what}\n\
             DefaultDependencies=no\n\
             BindsTo={device}\n\
             After={device}\n\
             Before=shutdown.target\n\
             \n\
             [Service]\n\
             Type=oneshot\n\
             RemainAfterExit=yes\n\
             ExecStart={} {escaped}\n\
             TimeoutSec=0\n",
            self.fsck_path.display(),
        );

        write_unit_file(&unit_path, &self.generator_name, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    struct Fixture {
        out: TempDir,
        tools: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                out: tempfile::tempdir().unwrap(),
                tools: tempfile::tempdir().unwrap(),
            }
        }

        fn ctx(&self) -> GeneratorContext {
            let mut ctx = GeneratorContext::new(self.out.path(), "systemd-fstab-generator");
            ctx.fsck_search_path = self.tools.path().to_str().unwrap().to_string();
            ctx
        }

        fn add_fsck_tool(&self, fstype: &str) {
            let path = self.tools.path().join(format!("fsck.{fstype}"));
            fs::write(&path, "#!/bin/sh\n").unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        fn out_entries(&self) -> Vec<String> {
            let mut names: Vec<String> = fs::read_dir(self.out.path())
                .unwrap()
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
    }

    #[test]
    fn test_root_mount_creates_symlink_only() {
        let fx = Fixture::new();
        fx.add_fsck_tool("ext4");
        let mut unit = Vec::new();

        fx.ctx()
            .write_fsck_deps(&mut unit, "/dev/sda1", "/", "ext4")
            .unwrap();

        // No dependency lines appended.
        assert!(unit.is_empty());

        let lnk = fx.out.path().join("local-fs.target.wants/systemd-fsck-root.service");
        let target = fs::read_link(&lnk).unwrap();
        assert_eq!(
            target,
            Path::new("/usr/lib/systemd/system/systemd-fsck-root.service")
        );

        // No generated check service next to it.
        assert!(!fx.out.path().join("systemd-fsck-root.service").exists());
    }

    #[test]
    fn test_root_symlink_target_independent_of_device() {
        let fx = Fixture::new();
        fx.add_fsck_tool("ext4");
        fx.add_fsck_tool("btrfs");

        let mut unit = Vec::new();
        fx.ctx()
            .write_fsck_deps(&mut unit, "/dev/nvme0n1p2", "/", "btrfs")
            .unwrap();

        let lnk = fx.out.path().join("local-fs.target.wants/systemd-fsck-root.service");
        assert_eq!(
            fs::read_link(&lnk).unwrap(),
            Path::new("/usr/lib/systemd/system/systemd-fsck-root.service")
        );
    }

    #[test]
    fn test_root_symlink_tolerates_existing() {
        let fx = Fixture::new();
        fx.add_fsck_tool("ext4");

        let mut unit = Vec::new();
        let ctx = fx.ctx();
        ctx.write_fsck_deps(&mut unit, "/dev/sda1", "/", "ext4").unwrap();
        // Second run over the same entry hits the existing symlink.
        ctx.write_fsck_deps(&mut unit, "/dev/sda1", "/", "ext4").unwrap();
    }

    #[test]
    fn test_non_device_is_noop() {
        let fx = Fixture::new();
        let mut unit = Vec::new();

        fx.ctx()
            .write_fsck_deps(&mut unit, "tmpfs", "/tmp", "tmpfs")
            .unwrap();

        assert!(unit.is_empty());
        assert!(fx.out_entries().is_empty());
    }

    #[test]
    fn test_regular_mount_appends_dependency_lines() {
        let fx = Fixture::new();
        fx.add_fsck_tool("ext4");
        let mut unit = Vec::new();

        fx.ctx()
            .write_fsck_deps(&mut unit, "/dev/sda2", "/var", "ext4")
            .unwrap();

        let text = String::from_utf8(unit).unwrap();
        assert_eq!(
            text,
            "RequiresOverridable=systemd-fsck@dev-sda2.service\n\
             After=systemd-fsck@dev-sda2.service\n"
        );

        // Nothing written to the output dir for this case.
        assert!(fx.out_entries().is_empty());
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_dependency_write_failure_names_mount_unit() {
        let fx = Fixture::new();
        fx.add_fsck_tool("ext4");

        let err = fx
            .ctx()
            .write_fsck_deps(&mut BrokenWriter, "/dev/sda2", "/var", "ext4")
            .unwrap_err();
        match err {
            GeneratorError::Io { path, source } => {
                assert_eq!(path, Path::new("var.mount"));
                assert_eq!(source.kind(), std::io::ErrorKind::BrokenPipe);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_fsck_tool_is_success() {
        let fx = Fixture::new();
        let mut unit = Vec::new();

        fx.ctx()
            .write_fsck_deps(&mut unit, "/dev/sdb1", "/data", "vfat")
            .unwrap();

        assert!(unit.is_empty());
        assert!(fx.out_entries().is_empty());
    }

    #[test]
    fn test_fsck_probe_malfunction_propagates() {
        let fx = Fixture::new();
        // Point the probe at a search-path entry that is a regular file,
        // so statting fsck.ext4 under it fails with ENOTDIR. Unlike a
        // missing tool, a malfunctioning probe is a per-entry error.
        let not_a_dir = fx.tools.path().join("sbin");
        fs::write(&not_a_dir, "").unwrap();
        let mut ctx = fx.ctx();
        ctx.fsck_search_path = not_a_dir.to_str().unwrap().to_string();

        let mut unit = Vec::new();
        let err = ctx
            .write_fsck_deps(&mut unit, "/dev/sda2", "/var", "ext4")
            .unwrap_err();
        match err {
            GeneratorError::FsckProbe { fstype, .. } => assert_eq!(fstype, "ext4"),
            other => panic!("unexpected error: {other}"),
        }

        // No dependency lines, no artifacts.
        assert!(unit.is_empty());
        assert!(fx.out_entries().is_empty());
    }

    #[test]
    fn test_auto_fstype_skips_probe() {
        let fx = Fixture::new();
        let mut unit = Vec::new();

        // "auto" must not be probed; the dependency is still generated.
        fx.ctx()
            .write_fsck_deps(&mut unit, "/dev/sdb1", "/data", "auto")
            .unwrap();

        let text = String::from_utf8(unit).unwrap();
        assert!(text.contains("systemd-fsck@dev-sdb1.service"));
    }

    #[test]
    fn test_empty_fstype_skips_probe() {
        let fx = Fixture::new();
        let mut unit = Vec::new();

        fx.ctx()
            .write_fsck_deps(&mut unit, "/dev/sdb1", "/data", "")
            .unwrap();

        let text = String::from_utf8(unit).unwrap();
        assert!(text.contains("RequiresOverridable=systemd-fsck@dev-sdb1.service"));
    }

    #[test]
    fn test_initrd_sysroot_synthesizes_service() {
        let fx = Fixture::new();
        fx.add_fsck_tool("ext4");
        let mut ctx = fx.ctx();
        ctx.in_initrd = true;

        let mut unit = Vec::new();
        ctx.write_fsck_deps(&mut unit, "/dev/sda1", "/sysroot", "ext4")
            .unwrap();

        let text = String::from_utf8(unit).unwrap();
        assert_eq!(
            text,
            "RequiresOverridable=systemd-fsck-root.service\n\
             After=systemd-fsck-root.service\n"
        );

        let service = fs::read_to_string(fx.out.path().join("systemd-fsck-root.service")).unwrap();
        assert!(service.starts_with("# Automatically generated by systemd-fstab-generator\n"));
        assert!(service.contains("Description=File System Check on /dev/sda1\n"));
        assert!(service.contains("DefaultDependencies=no\n"));
        assert!(service.contains("BindsTo=dev-sda1.device\n"));
        assert!(service.contains("After=dev-sda1.device\n"));
        assert!(service.contains("Before=shutdown.target\n"));
        assert!(service.contains("Type=oneshot\n"));
        assert!(service.contains("RemainAfterExit=yes\n"));
        assert!(service.contains("ExecStart=/usr/lib/systemd/systemd-fsck /dev/sda1\n"));
        assert!(service.contains("TimeoutSec=0\n"));
    }

    #[test]
    fn test_sysroot_outside_initrd_is_regular() {
        let fx = Fixture::new();
        fx.add_fsck_tool("ext4");
        let mut unit = Vec::new();

        fx.ctx()
            .write_fsck_deps(&mut unit, "/dev/sda1", "/sysroot", "ext4")
            .unwrap();

        let text = String::from_utf8(unit).unwrap();
        assert!(text.contains("systemd-fsck@dev-sda1.service"));
        assert!(!fx.out.path().join("systemd-fsck-root.service").exists());
    }

    #[test]
    fn test_sysroot_service_refuses_overwrite() {
        let fx = Fixture::new();
        fx.add_fsck_tool("ext4");
        let mut ctx = fx.ctx();
        ctx.in_initrd = true;

        let mut unit = Vec::new();
        ctx.write_fsck_deps(&mut unit, "/dev/sda1", "/sysroot", "ext4")
            .unwrap();

        let err = ctx
            .write_fsck_deps(&mut unit, "/dev/sda1", "/sysroot", "ext4")
            .unwrap_err();
        match err {
            GeneratorError::Io { path, source } => {
                assert!(path.ends_with("systemd-fsck-root.service"));
                assert_eq!(source.kind(), std::io::ErrorKind::AlreadyExists);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_timeout_round_trip() {
        let fx = Fixture::new();

        let filtered = fx
            .ctx()
            .write_timeouts("/dev/sda3", "/home", "rw,x-systemd.device-timeout=45,noatime")
            .unwrap();
        assert_eq!(filtered, "rw,noatime");

        let conf = fs::read_to_string(
            fx.out
                .path()
                .join("dev-sda3.device.d/50-device-timeout.conf"),
        )
        .unwrap();
        let directive = conf
            .lines()
            .find(|l| l.starts_with("JobTimeoutSec="))
            .unwrap();
        assert_eq!(directive, "JobTimeoutSec=45");
    }

    #[test]
    fn test_timeout_with_unit_suffix() {
        let fx = Fixture::new();

        let filtered = fx
            .ctx()
            .write_timeouts("/dev/sdb1", "/srv", "ro,x-systemd.device-timeout=2min")
            .unwrap();
        assert_eq!(filtered, "ro");

        let conf = fs::read_to_string(
            fx.out
                .path()
                .join("dev-sdb1.device.d/50-device-timeout.conf"),
        )
        .unwrap();
        assert!(conf.contains("[Unit]\nJobTimeoutSec=120\n"));
    }

    #[test]
    fn test_timeout_absent_is_noop() {
        let fx = Fixture::new();

        let filtered = fx.ctx().write_timeouts("/dev/sda1", "/", "ro,noatime").unwrap();
        assert_eq!(filtered, "ro,noatime");
        assert!(fx.out_entries().is_empty());
    }

    #[test]
    fn test_malformed_timeout_downgrades_to_noop() {
        let fx = Fixture::new();

        let filtered = fx
            .ctx()
            .write_timeouts("/dev/sda1", "/", "x-systemd.device-timeout=notanumber,ro")
            .unwrap();
        // The bad key is still stripped from the remainder.
        assert_eq!(filtered, "ro");
        assert!(fx.out_entries().is_empty());
    }

    #[test]
    fn test_timeout_resolves_uuid_specifier() {
        let fx = Fixture::new();

        fx.ctx()
            .write_timeouts(
                "UUID=abad1dea-0000-4a94-a374-bcfb68aa11f7",
                "/data",
                "x-systemd.device-timeout=30",
            )
            .unwrap();

        let dropin_dir = fx.out.path().join(
            "dev-disk-by\\x2duuid-abad1dea\\x2d0000\\x2d4a94\\x2da374\\x2dbcfb68aa11f7.device.d",
        );
        assert!(dropin_dir.join("50-device-timeout.conf").exists(), "missing drop-in under {}", dropin_dir.display());
    }

    #[test]
    fn test_timeout_legacy_comment_key() {
        let fx = Fixture::new();

        let filtered = fx
            .ctx()
            .write_timeouts("/dev/sdc1", "/backup", "comment=systemd.device-timeout=10,rw")
            .unwrap();
        assert_eq!(filtered, "rw");

        let conf = fs::read_to_string(
            fx.out
                .path()
                .join("dev-sdc1.device.d/50-device-timeout.conf"),
        )
        .unwrap();
        assert!(conf.contains("JobTimeoutSec=10"));
    }
}
