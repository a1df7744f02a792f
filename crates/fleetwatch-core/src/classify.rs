//! Classification of the active compose configuration.

use std::fmt;

use serde::{Serialize, Serializer};

/// Which environment a host's compose project is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigStatus {
    /// No configuration files were reported.
    Undetermined,
    /// The base (test database) configuration is active.
    TestDatabase,
    /// The production database configuration is active.
    ProductionDatabase,
    /// Neither known file is active; carries the first file name.
    Other(String),
    /// The compose project of interest is not running.
    ProjectNotFound,
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undetermined => f.write_str("configuration undetermined"),
            Self::TestDatabase => f.write_str("test database attached"),
            Self::ProductionDatabase => f.write_str("production database attached"),
            Self::Other(first) => write!(f, "other configuration in use: {first}"),
            Self::ProjectNotFound => f.write_str("project not found"),
        }
    }
}

impl Serialize for ConfigStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Split a comma-joined compose `ConfigFiles` value into trimmed entries.
#[must_use]
pub fn split_config_files(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Classify an ordered list of config file paths.
///
/// The first entry naming either `base` or `prod` decides; unset names never match.
#[must_use]
pub fn classify<S: AsRef<str>>(
    config_files: Option<&[S]>,
    base: Option<&str>,
    prod: Option<&str>,
) -> ConfigStatus {
    let Some(files) = config_files.filter(|files| !files.is_empty()) else {
        return ConfigStatus::Undetermined;
    };

    for path in files {
        let name = file_name(path.as_ref().trim());
        if base.is_some_and(|base| base == name) {
            return ConfigStatus::TestDatabase;
        }
        if prod.is_some_and(|prod| prod == name) {
            return ConfigStatus::ProductionDatabase;
        }
    }

    ConfigStatus::Other(file_name(files[0].as_ref().trim()).to_string())
}

/// Classify the raw comma-joined value reported by `docker compose ls`.
#[must_use]
pub fn classify_raw(raw: Option<&str>, base: Option<&str>, prod: Option<&str>) -> ConfigStatus {
    let files = raw.map(split_config_files).unwrap_or_default();
    classify(Some(files.as_slice()), base, prod)
}
