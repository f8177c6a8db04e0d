//! Volume readiness and free-space checks run before a process starts.

use std::fs;
use std::path::{Path, PathBuf};

use bulkfs_core::{ErrorKind, IoSide, ProcessError, SizeAccount};

/// Volume lookups used by pre-flight checks.
pub trait VolumeProbe: Send + Sync {
    /// The root of the volume holding `path`. The path itself need not
    /// exist; its nearest existing ancestor decides the volume.
    fn volume_root(&self, path: &Path) -> Result<PathBuf, ProcessError>;

    /// Bytes available to the current user on the volume holding `path`.
    fn available_space(&self, path: &Path) -> Result<u64, ProcessError>;
}

/// Probe backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVolumes;

impl VolumeProbe for SystemVolumes {
    fn volume_root(&self, path: &Path) -> Result<PathBuf, ProcessError> {
        let existing = nearest_existing(path).ok_or_else(|| drive_not_ready(path))?;
        volume_root_of(&existing)
    }

    fn available_space(&self, path: &Path) -> Result<u64, ProcessError> {
        fs2::available_space(path).map_err(|e| ProcessError::io(IoSide::Destination, path, &e))
    }
}

fn drive_not_ready(path: &Path) -> ProcessError {
    ProcessError::at(ErrorKind::DriveNotReady, path, "volume is not accessible")
}

fn nearest_existing(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| fs::symlink_metadata(p).is_ok())
        .map(Path::to_path_buf)
}

/// Get device ID for a path (Unix only).
#[cfg(unix)]
fn get_dev(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).ok().map(|m| m.dev())
}

/// The highest ancestor still on the same device.
#[cfg(unix)]
fn volume_root_of(path: &Path) -> Result<PathBuf, ProcessError> {
    let dev = get_dev(path).ok_or_else(|| drive_not_ready(path))?;
    let mut root = path;
    while let Some(parent) = root.parent() {
        if get_dev(parent) != Some(dev) {
            break;
        }
        root = parent;
    }
    Ok(root.to_path_buf())
}

/// The drive or share prefix of the path.
#[cfg(not(unix))]
fn volume_root_of(path: &Path) -> Result<PathBuf, ProcessError> {
    let root: PathBuf = path
        .components()
        .take_while(|c| {
            matches!(
                c,
                std::path::Component::Prefix(_) | std::path::Component::RootDir
            )
        })
        .collect();
    if root.as_os_str().is_empty() || fs::metadata(&root).is_err() {
        return Err(drive_not_ready(path));
    }
    Ok(root)
}

/// Resolve the volume holding `path`, failing with `DriveNotReady`.
pub fn check_volume(probe: &dyn VolumeProbe, path: &Path) -> Result<PathBuf, ProcessError> {
    probe
        .volume_root(path)
        .map_err(|e| ProcessError::new(ErrorKind::DriveNotReady, e.message))
}

/// Compare the queued size against the free space at `destination`.
///
/// An unknown total skips the comparison: a partial sum would make the
/// check meaningless. The skip is logged.
pub fn check_free_space(
    probe: &dyn VolumeProbe,
    destination: &Path,
    required: SizeAccount,
) -> Result<(), ProcessError> {
    let SizeAccount::Known(required) = required else {
        tracing::warn!(
            destination = %destination.display(),
            "Total size unknown, skipping free space check"
        );
        return Ok(());
    };

    let available = probe.available_space(destination)?;
    tracing::debug!(required, available, "Free space check");
    if available < required {
        return Err(ProcessError::at(
            ErrorKind::NotEnoughSpace,
            destination,
            format!("{required} bytes required, {available} bytes available"),
        ));
    }
    Ok(())
}
