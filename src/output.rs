//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored output,
//! progress tracking, and formatted tables. Log lines produced by the core are
//! rendered here, so changing the look of a run only touches this file.

use colored::*;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::BTreeMap;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress bars for the move phase
/// - Summary tables with statistics
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dirsort::output::OutputFormatter;
    /// OutputFormatter::success("moved: photo.jpg -> /sorted/.jpg");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Renders one core log line, styled by its leading marker.
    ///
    /// | marker     | style   |
    /// |------------|---------|
    /// | `moved:`   | success |
    /// | `failed:`  | error   |
    /// | `warning:` | warning |
    /// | `skipped:` | plain   |
    /// | other      | info    |
    pub fn render(line: &str) {
        if line.starts_with("moved:") {
            Self::success(line);
        } else if line.starts_with("failed:") {
            Self::error(line);
        } else if line.starts_with("warning:") {
            Self::warning(line);
        } else if line.starts_with("skipped:") {
            Self::plain(line);
        } else {
            Self::info(line);
        }
    }

    /// Creates a progress bar for the move phase.
    ///
    /// The bar starts hidden; call [`OutputFormatter::show_progress_bar`] once
    /// the number of files is known.
    pub fn create_progress_bar() -> ProgressBar {
        let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        pb
    }

    /// Sizes the bar and starts drawing it on stderr.
    pub fn show_progress_bar(pb: &ProgressBar, total: u64) {
        pb.set_length(total);
        pb.set_position(0);
        pb.set_draw_target(ProgressDrawTarget::stderr());
    }

    /// Prints a summary table of moved files per destination folder.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dirsort::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("2024-03-05".to_string(), 15);
    /// counts.insert("2024-03-06".to_string(), 8);
    /// OutputFormatter::summary_table(&counts, 23);
    /// ```
    pub fn summary_table(folder_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");
        Self::count_table("Folder", folder_counts, total_files);
    }

    /// Prints the extensions found by a scan with how many files carry each.
    pub fn extension_table(extension_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("EXTENSIONS");
        Self::count_table("Extension", extension_counts, total_files);
    }

    fn count_table(label: &str, counts: &BTreeMap<String, usize>, total_files: usize) {
        let width = counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(label.len());

        println!("{:<width$} | {}", label.bold(), "Files".bold(), width = width);
        println!("{}", "-".repeat(width + 10));

        for (name, count) in counts {
            println!(
                "{:<width$} | {} {}",
                name,
                count.to_string().green(),
                Self::file_word(*count),
                width = width
            );
        }

        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            Self::file_word(total_files),
            width = width
        );
    }

    fn file_word(count: usize) -> &'static str {
        if count == 1 { "file" } else { "files" }
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}
