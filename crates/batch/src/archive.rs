//! Archive module for moving converted originals out of the scan tree.
//!
//! Originals are moved into a single archive directory once their FLAC
//! counterpart has been verified. An existing file of the same name is never
//! overwritten; the incoming file gets a short random suffix instead.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Length of the random suffix used to resolve name collisions
const SUFFIX_LEN: usize = 6;

/// Errors that can occur while archiving an original.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Source path has no file name component.
    #[error("Source has no file name: {0}")]
    NoFileName(PathBuf),

    /// Failed to create the archive directory.
    #[error("Failed to create archive directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    /// Failed to move the original into the archive.
    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

/// Builds a suffixed archive name: `<stem>_<suffix><.ext>`.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use wav2flac::archive::suffixed_name;
///
/// let name = suffixed_name(Path::new("take.wav"), "1a2b3c");
/// assert_eq!(name, "take_1a2b3c.wav");
/// ```
pub fn suffixed_name(file_name: &Path, suffix: &str) -> String {
    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    }
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_string()
}

/// Chooses the destination for `source` inside `archive_dir`.
///
/// Uses the plain basename when free, otherwise a suffixed variant. The check
/// is not atomic with the later move.
pub fn archive_destination(source: &Path, archive_dir: &Path) -> Result<PathBuf, ArchiveError> {
    let file_name = source
        .file_name()
        .ok_or_else(|| ArchiveError::NoFileName(source.to_path_buf()))?;

    let plain = archive_dir.join(file_name);
    if !plain.exists() {
        return Ok(plain);
    }

    loop {
        let candidate = archive_dir.join(suffixed_name(Path::new(file_name), &random_suffix()));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
}

/// Windows `ERROR_NOT_SAME_DEVICE`
#[cfg(windows)]
const ERROR_NOT_SAME_DEVICE: i32 = 17;

/// True when a rename failed only because source and target live on
/// different filesystems
fn is_cross_device(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(libc::EXDEV)
    }
    #[cfg(windows)]
    {
        e.raw_os_error() == Some(ERROR_NOT_SAME_DEVICE)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = e;
        false
    }
}

/// Moves a file by rename, falling back to copy + remove only when the
/// archive directory is on another filesystem.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(e) if is_cross_device(&e) => {}
        Err(e) => return Err(e),
    }

    fs::copy(from, to)?;
    if let Err(e) = fs::remove_file(from) {
        // Keep exactly one copy of the original
        let _ = fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}

/// Moves `source` into `archive_dir`, creating the directory if needed.
///
/// # Returns
///
/// * `Ok(PathBuf)` - Where the original now lives
/// * `Err(ArchiveError)` - The original is still at `source`
pub fn archive_original(source: &Path, archive_dir: &Path) -> Result<PathBuf, ArchiveError> {
    fs::create_dir_all(archive_dir).map_err(|source| ArchiveError::CreateDir {
        path: archive_dir.to_path_buf(),
        source,
    })?;

    let destination = archive_destination(source, archive_dir)?;

    move_file(source, &destination).map_err(|e| ArchiveError::Move {
        from: source.to_path_buf(),
        to: destination.clone(),
        source: e,
    })?;

    Ok(destination)
}
