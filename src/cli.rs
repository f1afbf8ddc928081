//! Command-line interface module for dirsort.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - Merging flags over the saved settings file
//! - Wiring the scanner and dispatcher to the terminal log renderer
//! - Dry runs, saved transcripts and remembered choices

use crate::config::{DateFormat, ExtensionCase, OrganizeConfig, Rule, Settings};
use crate::dispatcher::Dispatcher;
use crate::log_sink::{ChannelSink, LOG_CHANNEL_CAPACITY, LogPump, LogSink};
use crate::output::OutputFormatter;
use crate::scanner::{self, ScanResult, SourceSet};
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Sort files from one or more folders into date- or extension-named folders.
#[derive(Debug, Parser)]
#[command(name = "dirsort", version, about)]
pub struct Cli {
    /// Settings file to read (and write with --remember).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only print the final report, not every log line.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase diagnostic output (-v, -vv, -vvv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the files and extensions found in the source folders.
    Scan(ScanArgs),
    /// Move files into folders named by date or extension.
    Organize(OrganizeArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Source folders to scan.
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct OrganizeArgs {
    /// Source folders to scan.
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Folder to sort into. Defaults to the first source folder.
    #[arg(short, long)]
    pub target: Option<PathBuf>,

    /// Grouping rule.
    #[arg(short, long, value_enum)]
    pub rule: Option<Rule>,

    /// Extension to move, e.g. `jpg` or `.jpg`. Repeatable.
    #[arg(short = 'e', long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Move every extension found by the scan.
    #[arg(long, conflicts_with = "extensions")]
    pub all_extensions: bool,

    /// Folder name pattern for the date rule: YYYY-MM-DD, YYYYMMDD, YY-MM-DD or YYMMDD.
    #[arg(long, value_name = "PATTERN")]
    pub date_format: Option<String>,

    /// Letter case of folder names for the extension rule.
    #[arg(long, value_enum)]
    pub extension_case: Option<ExtensionCase>,

    /// Show where files would go without moving anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Write the run log to FILE (default: dirsort_log_<timestamp>.txt).
    #[arg(long, value_name = "FILE", num_args = 0..=1)]
    pub save_log: Option<Option<PathBuf>>,

    /// Store the chosen rule, pattern, case, extensions and target in the settings file.
    #[arg(long)]
    pub remember: bool,
}

/// Runs the parsed command line.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use dirsort::cli::{run_cli, Cli};
///
/// let cli = Cli::parse_from(["dirsort", "scan", "/home/user/Downloads"]);
/// if let Err(e) = run_cli(cli) {
///     eprintln!("Error: {e:#}");
/// }
/// ```
pub fn run_cli(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match &cli.command {
        Command::Scan(args) => scan_command(args, cli.quiet),
        Command::Organize(args) => organize_command(args, &settings, &cli),
    }
}

/// Scanner plus the terminal renderer for its log lines.
struct Session {
    sink: ChannelSink,
    pump: LogPump,
    progress: ProgressBar,
}

impl Session {
    fn start(quiet: bool) -> Self {
        let (sink, rx) = ChannelSink::bounded(LOG_CHANNEL_CAPACITY);
        let progress = OutputFormatter::create_progress_bar();
        let pump = LogPump::spawn(rx, progress.clone(), !quiet);
        Self {
            sink,
            pump,
            progress,
        }
    }

    /// Closes the log channel and waits for the renderer to drain it.
    fn finish(self) -> Vec<String> {
        let dropped = self.sink.dropped();
        drop(self.sink);
        let transcript = self.pump.finish();
        if dropped > 0 {
            OutputFormatter::warning(&format!("{dropped} log lines were dropped"));
        }
        transcript
    }
}

fn source_set(paths: &[PathBuf]) -> Result<SourceSet> {
    let sources: SourceSet = paths.iter().collect();
    for dir in sources.iter() {
        if !dir.is_dir() {
            bail!("source is not a directory: {}", dir.display());
        }
    }
    Ok(sources)
}

fn scan_command(args: &ScanArgs, quiet: bool) -> Result<()> {
    let sources = source_set(&args.sources)?;
    let session = Session::start(quiet);
    let result = scanner::scan(&sources, &session.sink);
    session.finish();

    OutputFormatter::extension_table(&result.extension_counts(), result.files().len());
    report_scan_warnings(&result);
    Ok(())
}

fn report_scan_warnings(result: &ScanResult) {
    if !result.warnings().is_empty() {
        OutputFormatter::warning(&format!(
            "{} entries could not be read and were skipped",
            result.warnings().len()
        ));
    }
}

/// Builds the run configuration: flags first, then saved settings, then
/// defaults. The target falls back to the first source folder.
fn build_config(
    args: &OrganizeArgs,
    settings: &Settings,
    sources: &SourceSet,
    scan: &ScanResult,
) -> Result<OrganizeConfig> {
    let saved = &settings.organize;

    let target = match args.target.as_ref().or(saved.target.as_ref()) {
        Some(target) => std::path::absolute(target)
            .with_context(|| format!("resolving target {}", target.display()))?,
        None => sources
            .first()
            .map(Path::to_path_buf)
            .context("no source folder given")?,
    };

    let rule = args.rule.or(saved.rule).unwrap_or_default();
    let date_format = args
        .date_format
        .as_deref()
        .map(DateFormat::from_name)
        .or_else(|| settings.date_format())
        .unwrap_or_default();
    let extension_case = args
        .extension_case
        .or(saved.extension_case)
        .unwrap_or_default();

    let config = OrganizeConfig::new(target)
        .with_rule(rule)
        .with_date_format(date_format)
        .with_extension_case(extension_case);

    let config = if args.all_extensions {
        config.with_extensions(scan.extensions())
    } else if !args.extensions.is_empty() {
        config.with_extensions(&args.extensions)
    } else {
        config.with_extensions(&saved.extensions)
    };

    Ok(config)
}

fn organize_command(args: &OrganizeArgs, settings: &Settings, cli: &Cli) -> Result<()> {
    let sources = source_set(&args.sources)?;
    let session = Session::start(cli.quiet);

    let scan = scanner::scan(&sources, &session.sink);
    let config = build_config(args, settings, &sources, &scan)?;

    session.sink.accept(format!("target: {}", config.target_dir.display()));
    session.sink.accept(format!("rule: {}", config.rule));
    if config.extension_filter.is_empty() {
        session
            .sink
            .accept("warning: no extensions selected, nothing will be moved".to_string());
    } else {
        let selected: Vec<&str> = config.extension_filter.iter().map(String::as_str).collect();
        session
            .sink
            .accept(format!("extensions: {}", selected.join(" ")));
    }

    let dispatcher = Dispatcher::new(config);

    if args.dry_run {
        let transcript = session.finish();
        print_plan(&dispatcher, &scan);
        save_transcript(args, &transcript)?;
        report_scan_warnings(&scan);
        return Ok(());
    }

    OutputFormatter::show_progress_bar(&session.progress, scan.files().len() as u64);
    let progress = session.progress.clone();
    let summary = dispatcher
        .process_with(scan.files().iter().cloned(), &session.sink, |_| {
            progress.inc(1)
        })
        .context("organize run aborted")?;
    progress.finish_and_clear();
    let transcript = session.finish();

    OutputFormatter::summary_table(&summary.per_folder, summary.moved);
    OutputFormatter::info(&format!(
        "Checked {} files, moved {}, skipped {}, failed {}.",
        summary.checked, summary.moved, summary.skipped, summary.failed
    ));
    if summary.failed > 0 {
        OutputFormatter::error("Some files could not be moved. Please review the errors above.");
    }
    report_scan_warnings(&scan);

    save_transcript(args, &transcript)?;

    if args.remember {
        remember_choices(dispatcher.config(), settings, cli.config.as_deref())?;
    }

    Ok(())
}

fn print_plan(dispatcher: &Dispatcher, scan: &ScanResult) {
    let plan = dispatcher.plan(scan.files().iter().map(PathBuf::as_path));
    let mut folder_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut planned = 0;

    for item in &plan {
        if let Some(dir) = &item.destination_dir {
            OutputFormatter::dry_run_notice(&format!(
                "{} → {}",
                item.source.display(),
                dir.display()
            ));
            let folder = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            *folder_counts.entry(folder).or_insert(0) += 1;
            planned += 1;
        }
    }

    if planned == 0 {
        OutputFormatter::dry_run_notice("No files would be moved.");
        return;
    }

    OutputFormatter::summary_table(&folder_counts, planned);
    OutputFormatter::success("Dry run complete. No files were modified.");
}

fn save_transcript(args: &OrganizeArgs, transcript: &[String]) -> Result<()> {
    let Some(requested) = &args.save_log else {
        return Ok(());
    };
    let path = requested.clone().unwrap_or_else(default_log_file_name);

    let mut content = transcript.join("\n");
    content.push('\n');
    fs::write(&path, content).with_context(|| format!("writing log to {}", path.display()))?;
    OutputFormatter::success(&format!("Log saved to {}", path.display()));
    Ok(())
}

/// `dirsort_log_YYYYMMDD_HHMMSS.txt` in the current directory.
pub fn default_log_file_name() -> PathBuf {
    PathBuf::from(format!(
        "dirsort_log_{}.txt",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}

fn remember_choices(
    config: &OrganizeConfig,
    settings: &Settings,
    settings_path: Option<&Path>,
) -> Result<()> {
    let path = match settings_path {
        Some(path) => path.to_path_buf(),
        None => Settings::user_settings_path().context("HOME is not set")?,
    };

    let mut updated = settings.clone();
    updated.organize.rule = Some(config.rule);
    updated.organize.date_format = Some(config.date_format.name().to_string());
    updated.organize.extension_case = Some(config.extension_case);
    updated.organize.extensions = config.extension_filter.iter().cloned().collect();
    updated.organize.target = Some(config.target_dir.clone());

    updated
        .save(&path)
        .with_context(|| format!("saving settings to {}", path.display()))?;
    OutputFormatter::info(&format!("Choices saved to {}", path.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrganizeSettings;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_organize_flags() {
        let cli = Cli::try_parse_from([
            "dirsort",
            "organize",
            "/a",
            "/b",
            "--rule",
            "extension",
            "-e",
            "jpg",
            "--ext",
            ".PNG",
            "--extension-case",
            "uppercase",
            "--save-log",
        ])
        .expect("Failed to parse");

        let Command::Organize(args) = cli.command else {
            panic!("expected organize");
        };
        assert_eq!(args.sources.len(), 2);
        assert_eq!(args.rule, Some(Rule::Extension));
        assert_eq!(args.extensions, vec!["jpg".to_string(), ".PNG".to_string()]);
        assert_eq!(args.extension_case, Some(ExtensionCase::Upper));
        assert_eq!(args.save_log, Some(None));
    }

    #[test]
    fn test_flags_override_settings() {
        let args = OrganizeArgs {
            sources: vec![PathBuf::from("/src")],
            target: None,
            rule: None,
            extensions: vec![],
            all_extensions: false,
            date_format: Some("YYMMDD".to_string()),
            extension_case: None,
            dry_run: false,
            save_log: None,
            remember: false,
        };
        let settings = Settings {
            organize: OrganizeSettings {
                rule: Some(Rule::Extension),
                date_format: Some("YYYYMMDD".to_string()),
                extension_case: Some(ExtensionCase::Upper),
                extensions: vec!["txt".to_string()],
                target: None,
            },
        };
        let sources: SourceSet = [Path::new("/src")].into_iter().collect();

        let config = build_config(&args, &settings, &sources, &ScanResult::default())
            .expect("Failed to build config");

        assert_eq!(config.target_dir, PathBuf::from("/src"));
        assert_eq!(config.rule, Rule::Extension);
        assert_eq!(config.date_format, DateFormat::CompactShortYearMonthDay);
        assert_eq!(config.extension_case, ExtensionCase::Upper);
        assert!(config.extension_filter.contains(".txt"));
    }

    #[test]
    fn test_default_log_file_name() {
        let name = default_log_file_name().to_string_lossy().into_owned();
        assert!(name.starts_with("dirsort_log_") && name.ends_with(".txt"));
    }
}
