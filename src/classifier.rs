//! Destination naming.
//!
//! Maps a file's name and modification time to the subdirectory of the
//! target directory it belongs in. Nothing here touches the filesystem.
//!
//! # Examples
//!
//! ```
//! use dirsort::classifier::{destination_for, extension_of};
//! use dirsort::config::{ExtensionCase, OrganizeConfig, Rule};
//! use std::time::SystemTime;
//!
//! let config = OrganizeConfig::new("/sorted")
//!     .with_rule(Rule::Extension)
//!     .with_extension_case(ExtensionCase::Upper);
//!
//! assert_eq!(extension_of("photo.jpg"), Some(".jpg"));
//! assert_eq!(
//!     destination_for("photo.jpg", SystemTime::now(), &config),
//!     Some(".JPG".to_string())
//! );
//! ```

use crate::config::{OrganizeConfig, Rule};
use chrono::{DateTime, Local};
use std::time::SystemTime;

/// Returns the suffix of `file_name` starting at its last `.`.
///
/// A name without a dot has no extension. Neither does one ending in a dot:
/// `notes.` yields `None` here, where path helpers that report `"."` for it
/// would sort it into a folder named `.`. Dotfiles such as `.bashrc` are
/// their own extension.
pub fn extension_of(file_name: &str) -> Option<&str> {
    let dot = file_name.rfind('.')?;
    let extension = &file_name[dot..];
    if extension.len() > 1 {
        Some(extension)
    } else {
        None
    }
}

/// Splits a file name into the part before its extension and the extension
/// (empty when there is none).
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match extension_of(file_name) {
        Some(extension) => (&file_name[..file_name.len() - extension.len()], extension),
        None => (file_name, ""),
    }
}

/// Computes the subdirectory name for a file under `config.target_dir`.
///
/// - [`Rule::Date`]: the local-time modification date, formatted with the
///   configured pattern.
/// - [`Rule::Extension`]: the extension including its dot, upper- or
///   lower-cased. Files without an extension have no destination.
pub fn destination_for(
    file_name: &str,
    modified: SystemTime,
    config: &OrganizeConfig,
) -> Option<String> {
    match config.rule {
        Rule::Date => {
            let local: DateTime<Local> = modified.into();
            Some(local.format(config.date_format.strftime()).to_string())
        }
        Rule::Extension => {
            extension_of(file_name).map(|extension| config.extension_case.apply(extension))
        }
    }
}
