//! dirsort - move files from several folders into date- or extension-named folders
//!
//! The pipeline is scan → classify → move. [`scanner`] walks every source
//! folder on its own thread, [`classifier`] names each file's destination
//! folder, [`mover`] relocates one file with retry and a copy fallback, and
//! [`dispatcher`] runs the moves on a bounded worker pool. Progress is
//! reported through a [`log_sink::LogSink`].

pub mod classifier;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod log_sink;
pub mod mover;
pub mod output;
pub mod scanner;

pub use config::{ConfigError, DateFormat, ExtensionCase, OrganizeConfig, Rule, Settings};
pub use dispatcher::{Dispatcher, MoveOutcome, MoveStatus, OrganizeError, SkipReason, Summary};
pub use log_sink::{ChannelSink, CollectingSink, LogSink, NullSink};
pub use mover::{MoveError, MoveMethod, MoveReport, Mover};
pub use scanner::{ScanResult, SourceSet, scan};

pub use cli::{Cli, run_cli};
