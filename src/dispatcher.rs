//! Worker pool that classifies and moves scanned files.
//!
//! Every input path is queued once on a work channel that is closed before
//! the workers start draining it. Each worker handles one file end to end
//! (stat, extension filter, classify, move) and sends a [`MoveOutcome`] on
//! the result channel. The collector runs on the calling thread and stops
//! when the last worker has dropped its sender, so each input produces
//! exactly one outcome. Outcome order is unspecified.

use crate::classifier::{destination_for, extension_of};
use crate::config::OrganizeConfig;
use crate::log_sink::LogSink;
use crate::mover::{MoveMethod, Mover};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use thiserror::Error;

/// Inputs smaller than this use [`SMALL_POOL_SIZE`] workers.
pub const SMALL_INPUT_THRESHOLD: usize = 20;

/// Worker count for small inputs.
pub const SMALL_POOL_SIZE: usize = 2;

/// Upper bound on workers regardless of hardware.
pub const MAX_WORKERS: usize = 10;

/// Number of workers for `file_count` files on a machine with `parallelism`
/// hardware threads.
pub fn worker_count(file_count: usize, parallelism: usize) -> usize {
    if file_count < SMALL_INPUT_THRESHOLD {
        SMALL_POOL_SIZE
    } else {
        parallelism.clamp(1, MAX_WORKERS)
    }
}

/// Run-level failures. Per-file problems never surface here.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("cannot create target directory {}: {source}", path.display())]
    TargetDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a file was left in place without it being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ExtensionNotSelected,
    /// The file already sits in the folder it would be moved to.
    AlreadyInPlace,
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ExtensionNotSelected => f.write_str("extension not selected"),
            SkipReason::AlreadyInPlace => f.write_str("already in place"),
            SkipReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveStatus {
    Moved {
        destination: PathBuf,
        method: MoveMethod,
        /// The source survived a successful copy.
        warning: Option<String>,
    },
    Skipped(SkipReason),
    Failed(String),
}

/// Result of handling one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub source: PathBuf,
    /// Computed folder, when classification got that far.
    pub destination_dir: Option<PathBuf>,
    pub status: MoveStatus,
    /// 1-based id of the worker that produced it.
    pub worker: usize,
}

impl MoveOutcome {
    fn skipped(source: PathBuf, reason: SkipReason, worker: usize) -> Self {
        Self {
            source,
            destination_dir: None,
            status: MoveStatus::Skipped(reason),
            worker,
        }
    }

    fn failed(
        source: PathBuf,
        destination_dir: Option<PathBuf>,
        error: impl fmt::Display,
        worker: usize,
    ) -> Self {
        Self {
            source,
            destination_dir,
            status: MoveStatus::Failed(error.to_string()),
            worker,
        }
    }

    pub fn is_moved(&self) -> bool {
        matches!(self.status, MoveStatus::Moved { .. })
    }

    /// The line this outcome is logged as.
    pub fn log_line(&self) -> String {
        let name = self
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string());
        match &self.status {
            MoveStatus::Moved { destination, .. } => format!(
                "moved: {} -> {} [worker {}]",
                name,
                destination.display(),
                self.worker
            ),
            MoveStatus::Skipped(reason) => format!(
                "skipped: {} ({}) [worker {}]",
                self.source.display(),
                reason,
                self.worker
            ),
            MoveStatus::Failed(error) => format!(
                "failed: {}: {} [worker {}]",
                self.source.display(),
                error,
                self.worker
            ),
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// Outcomes received; equals the number of input files.
    pub checked: usize,
    pub moved: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Moved files per destination folder name.
    pub per_folder: BTreeMap<String, usize>,
}

impl Summary {
    fn record(&mut self, outcome: &MoveOutcome) {
        self.checked += 1;
        match &outcome.status {
            MoveStatus::Moved { .. } => {
                self.moved += 1;
                let folder = outcome
                    .destination_dir
                    .as_deref()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                *self.per_folder.entry(folder).or_insert(0) += 1;
            }
            MoveStatus::Skipped(_) => self.skipped += 1,
            MoveStatus::Failed(_) => self.failed += 1,
        }
    }

    pub fn log_line(&self) -> String {
        format!(
            "done: checked {} files, moved {} files",
            self.checked, self.moved
        )
    }
}

/// Where one file should go.
enum Placement {
    Move(PathBuf),
    Skip(SkipReason),
}

/// What a dry run would do with one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub source: PathBuf,
    /// `None` when the file would be skipped or could not be inspected.
    pub destination_dir: Option<PathBuf>,
}

/// Bounded pool that moves files according to an [`OrganizeConfig`].
pub struct Dispatcher {
    config: OrganizeConfig,
    mover: Mover,
    parallelism: usize,
    cancel: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(config: OrganizeConfig) -> Self {
        Self {
            config,
            mover: Mover::default(),
            parallelism: num_cpus::get(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_mover(mut self, mover: Mover) -> Self {
        self.mover = mover;
        self
    }

    /// Overrides the detected hardware parallelism.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Flag that, once set, makes workers skip every file they have not
    /// started yet. In-flight moves always complete.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &OrganizeConfig {
        &self.config
    }

    /// Moves `files`, returning counters once every file has an outcome.
    ///
    /// # Errors
    ///
    /// Fails only when the target root cannot be created; no file is touched
    /// in that case.
    pub fn process<I>(&self, files: I, sink: &dyn LogSink) -> Result<Summary, OrganizeError>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.process_with(files, sink, |_| {})
    }

    /// Like [`Dispatcher::process`], calling `observer` for each outcome as
    /// it is collected.
    pub fn process_with<I, F>(
        &self,
        files: I,
        sink: &dyn LogSink,
        mut observer: F,
    ) -> Result<Summary, OrganizeError>
    where
        I: IntoIterator<Item = PathBuf>,
        F: FnMut(&MoveOutcome),
    {
        let files: Vec<PathBuf> = files.into_iter().collect();
        let target = &self.config.target_dir;

        fs::create_dir_all(target).map_err(|source| OrganizeError::TargetDirectory {
            path: target.clone(),
            source,
        })?;

        let workers = worker_count(files.len(), self.parallelism);
        sink.accept(format!(
            "processing {} files with {} workers",
            files.len(),
            workers
        ));
        tracing::debug!(files = files.len(), workers, "starting worker pool");

        let (work_tx, work_rx) = crossbeam_channel::bounded::<PathBuf>(files.len().max(1));
        for path in files {
            // The receiver is held locally, so the send cannot fail.
            let _ = work_tx.send(path);
        }
        drop(work_tx);

        let (result_tx, result_rx) = crossbeam_channel::unbounded::<MoveOutcome>();
        let mut summary = Summary::default();

        thread::scope(|scope| {
            for worker in 1..=workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || self.run_worker(worker, work_rx, result_tx, sink));
            }
            drop(result_tx);

            for outcome in result_rx.iter() {
                summary.record(&outcome);
                sink.accept(outcome.log_line());
                observer(&outcome);
            }
        });

        sink.accept(summary.log_line());
        Ok(summary)
    }

    fn run_worker(
        &self,
        worker: usize,
        work_rx: Receiver<PathBuf>,
        result_tx: Sender<MoveOutcome>,
        sink: &dyn LogSink,
    ) {
        tracing::trace!(worker, "worker started");
        for source in work_rx.iter() {
            let outcome = if self.cancel.load(Ordering::Relaxed) {
                MoveOutcome::skipped(source, SkipReason::Cancelled, worker)
            } else {
                self.handle_file(worker, source, sink)
            };
            if result_tx.send(outcome).is_err() {
                break;
            }
        }
        tracing::trace!(worker, "worker finished");
    }

    fn handle_file(&self, worker: usize, source: PathBuf, sink: &dyn LogSink) -> MoveOutcome {
        let destination_dir = match self.placement(&source) {
            Ok(Placement::Move(dir)) => dir,
            Ok(Placement::Skip(reason)) => return MoveOutcome::skipped(source, reason, worker),
            Err(err) => return MoveOutcome::failed(source, None, err, worker),
        };

        match self.mover.move_file(&source, &destination_dir, sink) {
            Ok(report) => MoveOutcome {
                source,
                destination_dir: Some(destination_dir),
                status: MoveStatus::Moved {
                    destination: report.destination,
                    method: report.method,
                    warning: report.warning,
                },
                worker,
            },
            Err(err) => MoveOutcome::failed(source, Some(destination_dir), err, worker),
        }
    }

    /// Stats `source`, applies the extension filter and classifies it.
    ///
    /// A file whose parent already is its destination folder is skipped, so
    /// sorting a tree a second time leaves it unchanged.
    fn placement(&self, source: &Path) -> Result<Placement, String> {
        let metadata =
            fs::metadata(source).map_err(|e| format!("cannot read file metadata: {e}"))?;

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !self.config.accepts_extension(extension_of(&name)) {
            return Ok(Placement::Skip(SkipReason::ExtensionNotSelected));
        }

        let modified = metadata
            .modified()
            .map_err(|e| format!("cannot read modification time: {e}"))?;

        let Some(folder) = destination_for(&name, modified, &self.config) else {
            return Ok(Placement::Skip(SkipReason::ExtensionNotSelected));
        };
        let destination_dir = self.config.target_dir.join(folder);
        if source.parent() == Some(destination_dir.as_path()) {
            return Ok(Placement::Skip(SkipReason::AlreadyInPlace));
        }
        Ok(Placement::Move(destination_dir))
    }

    /// Computes destinations without touching the filesystem beyond a stat.
    pub fn plan<'a, I>(&self, files: I) -> Vec<PlannedMove>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        files
            .into_iter()
            .map(|source| PlannedMove {
                source: source.to_path_buf(),
                destination_dir: match self.placement(source) {
                    Ok(Placement::Move(dir)) => Some(dir),
                    _ => None,
                },
            })
            .collect()
    }
}
