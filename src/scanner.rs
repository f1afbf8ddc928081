//! Concurrent multi-directory scanner.
//!
//! Each source directory gets its own walker thread. Walkers collect files
//! locally and merge them into one shared accumulator, taking the lock once
//! per batch rather than once per file. An unreadable subtree is reported as
//! a warning and skipped; it never aborts the scan.

use crate::classifier::extension_of;
use crate::log_sink::LogSink;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::thread;
use walkdir::WalkDir;

/// Files buffered by a walker before it takes the accumulator lock.
const BATCH_SIZE: usize = 512;

/// The directories to scan, in insertion order and without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSet {
    dirs: Vec<PathBuf>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory, made absolute against the current directory.
    ///
    /// Returns `false` if it was already present.
    pub fn insert(&mut self, dir: impl AsRef<Path>) -> bool {
        let dir = dir.as_ref();
        let absolute = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
        if self.dirs.contains(&absolute) {
            return false;
        }
        self.dirs.push(absolute);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().map(PathBuf::as_path)
    }

    pub fn first(&self) -> Option<&Path> {
        self.dirs.first().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

impl<P: AsRef<Path>> FromIterator<P> for SourceSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut set = SourceSet::new();
        for dir in iter {
            set.insert(dir);
        }
        set
    }
}

/// Snapshot of one completed scan.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    files: BTreeSet<PathBuf>,
    extensions: BTreeSet<String>,
    warnings: Vec<String>,
}

impl ScanResult {
    /// Absolute paths of every regular file found.
    pub fn files(&self) -> &BTreeSet<PathBuf> {
        &self.files
    }

    /// Lowercase extensions, each with its leading dot.
    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }

    /// One entry per subtree that could not be read.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Number of files per extension. Files without one are not counted.
    pub fn extension_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for path in &self.files {
            if let Some(extension) = file_extension(path) {
                *counts.entry(extension).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn into_files(self) -> BTreeSet<PathBuf> {
        self.files
    }
}

fn file_extension(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    extension_of(&name).map(str::to_lowercase)
}

/// Shared state the walker threads merge into.
#[derive(Default)]
struct Accumulator {
    files: BTreeSet<PathBuf>,
    extensions: BTreeSet<String>,
    warnings: Vec<String>,
}

/// Per-walker buffer, flushed into the [`Accumulator`] under one lock.
#[derive(Default)]
struct Batch {
    files: Vec<PathBuf>,
    warnings: Vec<String>,
}

impl Batch {
    fn flush(&mut self, shared: &Mutex<Accumulator>) {
        if self.files.is_empty() && self.warnings.is_empty() {
            return;
        }
        let mut acc = shared.lock();
        for path in self.files.drain(..) {
            if let Some(extension) = file_extension(&path) {
                acc.extensions.insert(extension);
            }
            acc.files.insert(path);
        }
        acc.warnings.append(&mut self.warnings);
    }
}

/// Scans every source directory concurrently and returns once all walkers
/// have finished.
pub fn scan(sources: &SourceSet, sink: &dyn LogSink) -> ScanResult {
    sink.accept(format!(
        "scanning {} source {}",
        sources.len(),
        if sources.len() == 1 { "directory" } else { "directories" }
    ));

    let shared = Mutex::new(Accumulator::default());

    thread::scope(|scope| {
        for dir in sources.iter() {
            let shared = &shared;
            scope.spawn(move || walk_source(dir, shared, sink));
        }
    });

    let acc = shared.into_inner();
    sink.accept(format!(
        "scan complete: {} files, {} extensions",
        acc.files.len(),
        acc.extensions.len()
    ));
    if !acc.warnings.is_empty() {
        tracing::warn!(count = acc.warnings.len(), "scan finished with unreadable entries");
    }

    ScanResult {
        files: acc.files,
        extensions: acc.extensions,
        warnings: acc.warnings,
    }
}

fn walk_source(dir: &Path, shared: &Mutex<Accumulator>, sink: &dyn LogSink) {
    sink.accept(format!("scanning: {}", dir.display()));
    tracing::debug!(dir = %dir.display(), "walker started");

    let mut batch = Batch::default();

    // walkdir does not descend into a directory it failed to read, so an
    // error entry skips exactly that subtree.
    for entry in WalkDir::new(dir).follow_links(false) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() {
                    batch.files.push(entry.into_path());
                    if batch.files.len() >= BATCH_SIZE {
                        batch.flush(shared);
                    }
                }
            }
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| dir.display().to_string());
                let message = format!("warning: error scanning {path}: {err}");
                sink.accept(message.clone());
                batch.warnings.push(message);
            }
        }
    }

    batch.flush(shared);
    tracing::debug!(dir = %dir.display(), "walker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_sink::CollectingSink;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(path, b"data").expect("Failed to write file");
    }

    #[test]
    fn test_source_set_deduplicates() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut sources = SourceSet::new();
        assert!(sources.insert(temp_dir.path()));
        assert!(!sources.insert(temp_dir.path()));
        assert_eq!(sources.len(), 1);
        assert!(sources.first().is_some_and(Path::is_absolute));
    }

    #[test]
    fn test_scan_collects_files_and_extensions() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        touch(&root.join("a.TXT"));
        touch(&root.join("nested/deeper/b.txt"));
        touch(&root.join("nested/c.Jpg"));
        touch(&root.join("Makefile"));
        fs::create_dir_all(root.join("empty")).expect("Failed to create dir");

        let sink = CollectingSink::new();
        let result = scan(&SourceSet::from_iter([root]), &sink);

        assert_eq!(result.files().len(), 4);
        assert!(result.files().iter().all(|p| p.is_absolute() && p.is_file()));
        let extensions: Vec<&str> = result.extensions().iter().map(String::as_str).collect();
        assert_eq!(extensions, vec![".jpg", ".txt"]);
        assert!(result.warnings().is_empty());
        assert!(sink.contains("scan complete: 4 files, 2 extensions"));
    }

    #[test]
    fn test_scan_merges_multiple_sources() {
        let first = TempDir::new().expect("Failed to create temp directory");
        let second = TempDir::new().expect("Failed to create temp directory");
        for i in 0..600 {
            touch(&first.path().join(format!("f{i}.log")));
        }
        touch(&second.path().join("x.md"));

        let result = scan(
            &SourceSet::from_iter([first.path(), second.path()]),
            &CollectingSink::new(),
        );

        assert_eq!(result.files().len(), 601);
        assert_eq!(result.extension_counts().get(".log"), Some(&600));
        assert_eq!(result.extension_counts().get(".md"), Some(&1));
    }

    #[test]
    fn test_missing_source_is_a_warning() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        touch(&temp_dir.path().join("ok.txt"));
        let missing = temp_dir.path().join("does-not-exist");

        let sink = CollectingSink::new();
        let result = scan(
            &SourceSet::from_iter([temp_dir.path().to_path_buf(), missing]),
            &sink,
        );

        assert_eq!(result.files().len(), 1);
        assert_eq!(result.warnings().len(), 1);
        assert!(sink.contains("warning: error scanning"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subtree_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        touch(&root.join("visible/a.txt"));
        touch(&root.join("locked/hidden.txt"));
        let locked = root.join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))
            .expect("Failed to lock directory");

        // Privileged users can read the directory anyway.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).ok();
            return;
        }

        let sink = CollectingSink::new();
        let result = scan(&SourceSet::from_iter([root]), &sink);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).ok();

        assert!(result.files().contains(&root.join("visible/a.txt")));
        assert!(!result.files().iter().any(|p| p.ends_with("hidden.txt")));
        assert_eq!(result.warnings().len(), 1);
        assert!(sink.contains("warning:"));
    }
}
