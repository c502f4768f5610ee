use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Raw OS error for a rename across filesystems
const EXDEV: i32 = 18;

const STALE_EXTENSIONS: [&str; 2] = ["mkv", "srt"];

#[derive(Debug, Error)]
pub enum RelocateError {
    #[error("source file does not exist, cannot continue: {0:?}")]
    MissingSource(PathBuf),
    #[error("failed to move {from:?} to {to:?}: {source}")]
    Io {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// First free `<path>_BACKUP<n>`, counting from 0.
pub fn next_backup_path(path: &Path) -> PathBuf {
    let mut counter = 0u32;
    loop {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!("_BACKUP{}", counter));
        let candidate = PathBuf::from(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Move an existing file at `path` out of the way. Returns where it went.
pub fn backup_if_exists(path: &Path) -> Result<Option<PathBuf>, RelocateError> {
    if !path.exists() {
        return Ok(None);
    }
    let backup = next_backup_path(path);
    move_file(path, &backup)?;
    info!("Backed up {:?} to {:?}", path, backup);
    Ok(Some(backup))
}

/// Rename `from` to `to`, copying when they live on different filesystems.
pub fn move_file(from: &Path, to: &Path) -> Result<(), RelocateError> {
    let io_err = |source| RelocateError::Io {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            debug!("Cross-filesystem move, copying {:?}", from);
            fs::copy(from, to).map_err(io_err)?;
            fs::remove_file(from).map_err(io_err)
        }
        Err(e) => Err(io_err(e)),
    }
}

/// Move a finished artifact to its destination, never overwriting: an
/// existing destination is first renamed with a `_BACKUP<n>` suffix.
pub fn move_with_backup(
    source: &Path,
    destination: &Path,
) -> Result<Option<PathBuf>, RelocateError> {
    if !source.exists() {
        return Err(RelocateError::MissingSource(source.to_path_buf()));
    }
    let backup = backup_if_exists(destination)?;
    move_file(source, destination)?;
    Ok(backup)
}

/// Rename leftovers of an earlier run in the scratch directory to
/// `<stem>_<ext>.tmp` so they cannot be taken for fresh artifacts.
pub fn quarantine_stale_artifacts(temp_dir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(temp_dir)?;

    let mut moved = Vec::new();
    for entry in WalkDir::new(temp_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !STALE_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(ext)) {
            continue;
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = temp_dir.join(format!("{}_{}.tmp", stem, ext));
        match fs::rename(path, &target) {
            Ok(()) => moved.push(target),
            Err(e) => warn!("Could not set aside {:?}: {}", path, e),
        }
    }
    Ok(moved)
}
