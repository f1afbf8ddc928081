//! Single-file move with retry and cross-filesystem fallback.
//!
//! The destination name is claimed first by creating an empty file with
//! `create_new`, so two moves can never end up on the same path. The file is
//! then put in place by a small state machine:
//!
//! ```text
//! RenameAttempt(1) ─ok──────────────────────────────▶ Done
//!      │ err (retryable, attempts left): sleep, n+1
//!      │ err (cross-device, or budget spent)
//!      ▼
//! CopyFallback ─ok (source removed or warning)──────▶ Done
//!      └─err────────────────────────────────────────▶ Failed
//! ```
//!
//! On failure the claimed destination is removed and the source is left
//! where it was. On success exactly one copy exists at the destination,
//! except when the source could not be deleted after a successful copy; that
//! case is reported as a warning.

use crate::classifier::split_extension;
use crate::log_sink::LogSink;
use chrono::Local;
use std::ffi::OsStr;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Rename attempts before falling back to copy+delete.
pub const MAX_RENAME_ATTEMPTS: u32 = 3;

/// Pause between rename attempts.
pub const RENAME_BACKOFF: Duration = Duration::from_millis(100);

/// Numbered names tried after the timestamped one before giving up.
const MAX_NAME_SUFFIX: u32 = 9_999;

/// The rename primitive. Swappable so tests can simulate failures.
pub type RenameFn = dyn Fn(&Path, &Path) -> io::Result<()> + Send + Sync;

/// How a file reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMethod {
    /// Atomic rename on the same filesystem.
    Renamed,
    /// Stream copy followed by deletion of the source.
    Copied,
}

impl fmt::Display for MoveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveMethod::Renamed => f.write_str("renamed"),
            MoveMethod::Copied => f.write_str("copied"),
        }
    }
}

/// A completed move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReport {
    /// Final path of the file, including any collision suffix.
    pub destination: PathBuf,
    pub method: MoveMethod,
    /// Set when the file was copied but the source could not be removed.
    pub warning: Option<String>,
}

/// Errors that fail a single move. The source is untouched in every case.
#[derive(Debug, Error)]
pub enum MoveError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} has no file name", .0.display())]
    NoFileName(PathBuf),
    #[error("no free name left for {}", .0.display())]
    NoFreeName(PathBuf),
    #[error("failed to open source {}: {source}", path.display())]
    OpenSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create destination {}: {source}", path.display())]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read metadata of {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy permissions to {}: {source}", path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to sync {}: {source}", path.display())]
    Sync {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// States of one move.
#[derive(Debug)]
pub(crate) enum MoveState {
    RenameAttempt(u32),
    CopyFallback,
    Done(MoveReport),
    Failed(MoveError),
}

/// Moves files into destination directories.
///
/// Cheap to clone; every worker can hold its own copy.
#[derive(Clone)]
pub struct Mover {
    max_attempts: u32,
    backoff: Duration,
    rename: Arc<RenameFn>,
}

impl Default for Mover {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RENAME_ATTEMPTS,
            backoff: RENAME_BACKOFF,
            rename: Arc::new(|from: &Path, to: &Path| fs::rename(from, to)),
        }
    }
}

impl fmt::Debug for Mover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mover")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl Mover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the retry budget (at least one attempt) and backoff.
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Replaces the rename primitive.
    pub fn with_rename<F>(mut self, rename: F) -> Self
    where
        F: Fn(&Path, &Path) -> io::Result<()> + Send + Sync + 'static,
    {
        self.rename = Arc::new(rename);
        self
    }

    /// Moves `source` into `destination_dir`, creating the directory first.
    ///
    /// If a file with the same name already exists there, the incoming file
    /// gets a `_YYYYMMDD_HHMMSS` suffix before its extension, plus `_1`, `_2`
    /// and so on while that is taken too. An existing file is never
    /// replaced. Safe to call concurrently for distinct sources.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dirsort::log_sink::NullSink;
    /// use dirsort::mover::Mover;
    /// use std::path::Path;
    ///
    /// let report = Mover::new()
    ///     .move_file(Path::new("/inbox/a.txt"), Path::new("/sorted/.txt"), &NullSink)
    ///     .expect("move failed");
    /// println!("now at {}", report.destination.display());
    /// ```
    pub fn move_file(
        &self,
        source: &Path,
        destination_dir: &Path,
        sink: &dyn LogSink,
    ) -> Result<MoveReport, MoveError> {
        fs::create_dir_all(destination_dir).map_err(|source| MoveError::CreateDirectory {
            path: destination_dir.to_path_buf(),
            source,
        })?;

        let file_name = source
            .file_name()
            .ok_or_else(|| MoveError::NoFileName(source.to_path_buf()))?;
        let destination = claim_destination(destination_dir, file_name)?;

        let mut state = MoveState::RenameAttempt(1);
        loop {
            state = match state {
                MoveState::Done(report) => return Ok(report),
                MoveState::Failed(err) => {
                    release_claim(&destination);
                    return Err(err);
                }
                pending => self.step(pending, source, &destination, sink),
            };
        }
    }

    /// Performs one transition. `destination` must already be claimed.
    pub(crate) fn step(
        &self,
        state: MoveState,
        source: &Path,
        destination: &Path,
        sink: &dyn LogSink,
    ) -> MoveState {
        match state {
            MoveState::RenameAttempt(attempt) => match (self.rename)(source, destination) {
                Ok(()) => MoveState::Done(MoveReport {
                    destination: destination.to_path_buf(),
                    method: MoveMethod::Renamed,
                    warning: None,
                }),
                Err(err) if is_cross_device(&err) => {
                    tracing::debug!(source = %source.display(), "cross-device rename, copying instead");
                    MoveState::CopyFallback
                }
                Err(err) if attempt < self.max_attempts => {
                    tracing::debug!(
                        source = %source.display(),
                        attempt,
                        error = %err,
                        "rename failed, retrying"
                    );
                    thread::sleep(self.backoff);
                    MoveState::RenameAttempt(attempt + 1)
                }
                Err(err) => {
                    tracing::warn!(
                        source = %source.display(),
                        error = %err,
                        "rename retries exhausted, copying instead"
                    );
                    MoveState::CopyFallback
                }
            },
            MoveState::CopyFallback => match copy_then_remove(source, destination) {
                Ok(warning) => {
                    if let Some(message) = &warning {
                        sink.accept(message.clone());
                    }
                    MoveState::Done(MoveReport {
                        destination: destination.to_path_buf(),
                        method: MoveMethod::Copied,
                        warning,
                    })
                }
                Err(err) => MoveState::Failed(err),
            },
            terminal => terminal,
        }
    }
}

/// Whether a rename failed because source and destination live on different
/// filesystems.
pub fn is_cross_device(err: &io::Error) -> bool {
    err.kind() == ErrorKind::CrossesDevices
}

/// Reserves a free name for `file_name` inside `dir` by creating an empty
/// file there with `create_new`.
///
/// Tries `report.txt`, then `report_20240305_143052.txt`, then
/// `report_20240305_143052_1.txt`, `_2` and so on. Concurrent callers always
/// get distinct paths.
pub fn claim_destination(dir: &Path, file_name: &OsStr) -> Result<PathBuf, MoveError> {
    let plain = dir.join(file_name);
    if try_claim(&plain)? {
        return Ok(plain);
    }

    let name = file_name.to_string_lossy();
    let (stem, extension) = split_extension(&name);
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

    for n in 0..=MAX_NAME_SUFFIX {
        let candidate = if n == 0 {
            dir.join(format!("{stem}_{timestamp}{extension}"))
        } else {
            dir.join(format!("{stem}_{timestamp}_{n}{extension}"))
        };
        if try_claim(&candidate)? {
            return Ok(candidate);
        }
    }

    Err(MoveError::NoFreeName(plain))
}

/// `Ok(false)` when something already exists at `path`.
fn try_claim(path: &Path) -> Result<bool, MoveError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(source) => Err(MoveError::CreateDestination {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Removes the claimed destination of a failed move. The source never
/// reached it, so it holds nothing or a partial copy.
fn release_claim(destination: &Path) {
    match fs::remove_file(destination) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(
            destination = %destination.display(),
            error = %err,
            "could not remove claimed destination"
        ),
    }
}

/// Copies `source` into the claimed file at `destination`, syncs it, then
/// removes the source.
///
/// Returns a warning when only the removal failed. On any earlier failure
/// the source is untouched and the caller releases the claim.
fn copy_then_remove(source: &Path, destination: &Path) -> Result<Option<String>, MoveError> {
    let mut reader = File::open(source).map_err(|err| MoveError::OpenSource {
        path: source.to_path_buf(),
        source: err,
    })?;

    // The claim must still be there; nothing is created here.
    let mut writer = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(destination)
        .map_err(|err| MoveError::CreateDestination {
            path: destination.to_path_buf(),
            source: err,
        })?;

    write_contents(&mut reader, &mut writer, source, destination)?;
    drop(writer);
    drop(reader);

    match fs::remove_file(source) {
        Ok(()) => Ok(None),
        Err(err) => Ok(Some(format!(
            "warning: copied {} to {} but could not remove the original: {err}",
            source.display(),
            destination.display()
        ))),
    }
}

fn write_contents(
    reader: &mut File,
    writer: &mut File,
    source: &Path,
    destination: &Path,
) -> Result<(), MoveError> {
    let permissions = reader
        .metadata()
        .map_err(|err| MoveError::Metadata {
            path: source.to_path_buf(),
            source: err,
        })?
        .permissions();

    writer
        .set_permissions(permissions)
        .map_err(|err| MoveError::Permissions {
            path: destination.to_path_buf(),
            source: err,
        })?;

    io::copy(reader, writer).map_err(|err| MoveError::Copy {
        from: source.to_path_buf(),
        to: destination.to_path_buf(),
        source: err,
    })?;

    writer.sync_all().map_err(|err| MoveError::Sync {
        path: destination.to_path_buf(),
        source: err,
    })
}
