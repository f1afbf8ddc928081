//! Organize configuration and the persisted settings file.
//!
//! [`OrganizeConfig`] is what the dispatcher consumes: a fully populated,
//! validated description of one organize run. [`Settings`] is the on-disk
//! TOML file that remembers the user's last choices between runs.
//!
//! # Settings File Format
//!
//! ```toml
//! [organize]
//! rule = "date"              # or "extension"
//! date_format = "YYYY-MM-DD" # YYYYMMDD, YY-MM-DD, YYMMDD
//! extension_case = "lower"   # or "upper"
//! extensions = [".jpg", ".png"]
//! target = "/home/user/Sorted"
//! ```

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-directory settings file.
pub const LOCAL_SETTINGS_FILE: &str = ".dirsortrc.toml";

/// Errors that can occur while loading or saving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings file not found at the specified path.
    #[error("settings file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("invalid settings in {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
    /// Settings could not be serialized back to TOML.
    #[error("could not serialize settings: {0}")]
    Serialize(String),
    /// IO error while reading or writing settings.
    #[error("IO error on settings file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How a file's destination subdirectory is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Rule {
    /// Group by calendar date of last modification.
    #[default]
    Date,
    /// Group by file extension.
    Extension,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Date => f.write_str("date"),
            Rule::Extension => f.write_str("extension"),
        }
    }
}

/// The four supported folder-name date patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// `2024-03-05`
    #[default]
    YearMonthDay,
    /// `20240305`
    CompactYearMonthDay,
    /// `24-03-05`
    ShortYearMonthDay,
    /// `240305`
    CompactShortYearMonthDay,
}

impl DateFormat {
    pub const ALL: [DateFormat; 4] = [
        DateFormat::YearMonthDay,
        DateFormat::CompactYearMonthDay,
        DateFormat::ShortYearMonthDay,
        DateFormat::CompactShortYearMonthDay,
    ];

    /// Parses a pattern name such as `YYYYMMDD`.
    ///
    /// Unknown names fall back to `YYYY-MM-DD` instead of failing.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "YYYY-MM-DD" => DateFormat::YearMonthDay,
            "YYYYMMDD" => DateFormat::CompactYearMonthDay,
            "YY-MM-DD" => DateFormat::ShortYearMonthDay,
            "YYMMDD" => DateFormat::CompactShortYearMonthDay,
            other => {
                tracing::debug!(pattern = other, "unknown date pattern, using YYYY-MM-DD");
                DateFormat::default()
            }
        }
    }

    /// The user-facing pattern name.
    pub fn name(&self) -> &'static str {
        match self {
            DateFormat::YearMonthDay => "YYYY-MM-DD",
            DateFormat::CompactYearMonthDay => "YYYYMMDD",
            DateFormat::ShortYearMonthDay => "YY-MM-DD",
            DateFormat::CompactShortYearMonthDay => "YYMMDD",
        }
    }

    /// The `chrono` format string for this pattern.
    pub fn strftime(&self) -> &'static str {
        match self {
            DateFormat::YearMonthDay => "%Y-%m-%d",
            DateFormat::CompactYearMonthDay => "%Y%m%d",
            DateFormat::ShortYearMonthDay => "%y-%m-%d",
            DateFormat::CompactShortYearMonthDay => "%y%m%d",
        }
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Letter case used for extension-named folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum ExtensionCase {
    #[serde(rename = "upper", alias = "uppercase")]
    #[value(alias = "uppercase")]
    Upper,
    #[default]
    #[serde(rename = "lower", alias = "lowercase")]
    #[value(alias = "lowercase")]
    Lower,
}

impl ExtensionCase {
    pub fn apply(&self, extension: &str) -> String {
        match self {
            ExtensionCase::Upper => extension.to_uppercase(),
            ExtensionCase::Lower => extension.to_lowercase(),
        }
    }
}

/// Normalizes a user-supplied extension to the scanner's form: lowercase
/// with a leading dot. `"JPG"` and `".jpg"` both become `".jpg"`.
///
/// Returns `None` for blank input.
pub fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with('.') {
        Some(lower)
    } else {
        Some(format!(".{lower}"))
    }
}

/// Everything one organize run needs.
///
/// An empty `extension_filter` means no file qualifies; that is a valid
/// configuration that simply moves nothing.
#[derive(Debug, Clone)]
pub struct OrganizeConfig {
    pub target_dir: PathBuf,
    pub rule: Rule,
    pub extension_filter: BTreeSet<String>,
    pub date_format: DateFormat,
    pub extension_case: ExtensionCase,
}

impl OrganizeConfig {
    /// Creates a config with default rule, date format and case, and an
    /// empty extension filter.
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            rule: Rule::default(),
            extension_filter: BTreeSet::new(),
            date_format: DateFormat::default(),
            extension_case: ExtensionCase::default(),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rule = rule;
        self
    }

    pub fn with_date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = date_format;
        self
    }

    pub fn with_extension_case(mut self, extension_case: ExtensionCase) -> Self {
        self.extension_case = extension_case;
        self
    }

    /// Adds extensions to the inclusion list, normalizing each one.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extension_filter.extend(
            extensions
                .into_iter()
                .filter_map(|ext| normalize_extension(ext.as_ref())),
        );
        self
    }

    /// Whether a file with this extension (leading dot, any case) is selected.
    pub fn accepts_extension(&self, extension: Option<&str>) -> bool {
        match extension {
            Some(ext) => self.extension_filter.contains(&ext.to_lowercase()),
            None => false,
        }
    }
}

/// Persisted user choices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub organize: OrganizeSettings,
}

/// The `[organize]` table. Every field is optional so a partial file works.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizeSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_case: Option<ExtensionCase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
}

impl Settings {
    /// Load settings, with fallback to defaults.
    ///
    /// Lookup order:
    /// 1. `settings_path`, if provided
    /// 2. `.dirsortrc.toml` in the current directory
    /// 3. `~/.config/dirsort/config.toml`
    /// 4. defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a file is explicitly provided but cannot be read,
    /// or if any discovered file is not valid TOML.
    pub fn load(settings_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = settings_path {
            return Self::load_from_file(path);
        }

        let local = PathBuf::from(LOCAL_SETTINGS_FILE);
        if local.exists() {
            return Self::load_from_file(&local);
        }

        if let Some(user) = Self::user_settings_path()
            && user.exists()
        {
            return Self::load_from_file(&user);
        }

        Ok(Self::default())
    }

    /// `~/.config/dirsort/config.toml`, when `HOME` is set.
    pub fn user_settings_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("dirsort")
                .join("config.toml")
        })
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Writes these settings to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The stored date format, if any, resolved leniently.
    pub fn date_format(&self) -> Option<DateFormat> {
        self.organize
            .date_format
            .as_deref()
            .map(DateFormat::from_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unknown_date_format_falls_back_to_default() {
        assert_eq!(DateFormat::from_name("DD/MM/YYYY"), DateFormat::YearMonthDay);
        assert_eq!(DateFormat::from_name(""), DateFormat::YearMonthDay);
    }

    #[test]
    fn test_date_format_names_round_trip() {
        for format in DateFormat::ALL {
            assert_eq!(DateFormat::from_name(format.name()), format);
        }
        assert_eq!(DateFormat::from_name("yymmdd"), DateFormat::CompactShortYearMonthDay);
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("JPG"), Some(".jpg".to_string()));
        assert_eq!(normalize_extension(".Txt"), Some(".txt".to_string()));
        assert_eq!(normalize_extension("  "), None);
        assert_eq!(normalize_extension("."), None);
    }

    #[test]
    fn test_empty_filter_accepts_nothing() {
        let config = OrganizeConfig::new("/target");
        assert!(!config.accepts_extension(Some(".txt")));
        assert!(!config.accepts_extension(None));
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let config = OrganizeConfig::new("/target").with_extensions(["txt"]);
        assert!(config.accepts_extension(Some(".TXT")));
        assert!(config.accepts_extension(Some(".txt")));
        assert!(!config.accepts_extension(Some(".jpg")));
    }

    #[test]
    fn test_extension_case_apply() {
        assert_eq!(ExtensionCase::Upper.apply(".jpg"), ".JPG");
        assert_eq!(ExtensionCase::Lower.apply(".JPG"), ".jpg");
    }

    #[test]
    fn test_load_missing_explicit_file_is_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = Settings::load(Some(&temp_dir.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_invalid_toml_is_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "[organize\nrule = ").expect("Failed to write settings");

        let result = Settings::load(Some(&path));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_load_partial_settings() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("settings.toml");
        fs::write(
            &path,
            "[organize]\nrule = \"extension\"\nextension_case = \"uppercase\"\n",
        )
        .expect("Failed to write settings");

        let settings = Settings::load(Some(&path)).expect("Failed to load settings");
        assert_eq!(settings.organize.rule, Some(Rule::Extension));
        assert_eq!(settings.organize.extension_case, Some(ExtensionCase::Upper));
        assert_eq!(settings.date_format(), None);
        assert!(settings.organize.extensions.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("nested").join("config.toml");

        let settings = Settings {
            organize: OrganizeSettings {
                rule: Some(Rule::Date),
                date_format: Some("YYMMDD".to_string()),
                extension_case: Some(ExtensionCase::Lower),
                extensions: vec![".jpg".to_string()],
                target: Some(PathBuf::from("/sorted")),
            },
        };
        settings.save(&path).expect("Failed to save settings");

        let loaded = Settings::load(Some(&path)).expect("Failed to load settings");
        assert_eq!(loaded, settings);
        assert_eq!(loaded.date_format(), Some(DateFormat::CompactShortYearMonthDay));
    }
}
