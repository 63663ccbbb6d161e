//! Optional `errata.toml` settings.
//!
//! ```toml
//! corpus = "errata.xml"
//! pattern_table = "patterns.tsv"
//!
//! [backup]
//! enabled = true
//! suffix = ".bak"
//! ```

use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "errata.toml";
pub const CONFIG_ENV: &str = "ERRATA_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Corpus used when no `--corpus` is given
    #[serde(default)]
    pub corpus: Option<PathBuf>,
    /// Pattern table used by `learn` and `locate`
    #[serde(default)]
    pub pattern_table: Option<PathBuf>,
    #[serde(default)]
    pub backup: BackupSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            suffix: default_suffix(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_suffix() -> String {
    ".bak".to_string()
}

impl Settings {
    /// Suffix for backup copies, or `None` when backups are off.
    pub fn backup_suffix(&self) -> Option<&str> {
        self.backup.enabled.then_some(self.backup.suffix.as_str())
    }

    /// Make relative paths relative to the directory holding the settings
    /// file rather than the current directory.
    fn anchor_paths(&mut self, base: &Path) {
        for path in [&mut self.corpus, &mut self.pattern_table].into_iter().flatten() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn validate(&self) -> Result<(), SettingsIssue> {
        if self.backup.enabled && self.backup.suffix.is_empty() {
            return Err(SettingsIssue(
                "backup.suffix must not be empty while backups are enabled".to_string(),
            ));
        }
        if self.backup.suffix.contains(['/', '\\']) {
            return Err(SettingsIssue(format!(
                "backup.suffix '{}' must not contain a path separator",
                self.backup.suffix
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsIssue(pub String);

impl fmt::Display for SettingsIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SettingsIssue {}

#[derive(Debug)]
pub enum SettingsError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Invalid {
        path: Option<PathBuf>,
        source: SettingsIssue,
    },
}

impl SettingsError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            SettingsError::Toml { path: None, source } => SettingsError::Toml {
                path: Some(path),
                source,
            },
            SettingsError::Invalid { path: None, source } => SettingsError::Invalid {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Io { path, source } => {
                write!(f, "failed to read settings from {}: {}", path.display(), source)
            }
            SettingsError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse settings ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse settings: {}", source),
            },
            SettingsError::Invalid { path, source } => match path {
                Some(path) => write!(f, "invalid settings ({}): {}", path.display(), source),
                None => write!(f, "invalid settings: {}", source),
            },
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::Io { source, .. } => Some(source),
            SettingsError::Toml { source, .. } => Some(source),
            SettingsError::Invalid { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<Settings, SettingsError> {
    let settings: Settings = toml_edit::de::from_str(input)
        .map_err(|source| SettingsError::Toml { path: None, source })?;
    settings
        .validate()
        .map_err(|source| SettingsError::Invalid { path: None, source })?;
    Ok(settings)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Settings, SettingsError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut settings = load_from_str(&content).map_err(|e| e.with_path(path))?;
    if let Some(base) = path.parent() {
        settings.anchor_paths(base);
    }
    Ok(settings)
}

/// Load settings from the first source that exists:
///
/// 1. `explicit` (a `--config` flag); must exist
/// 2. the `ERRATA_CONFIG` environment variable; must exist
/// 3. `errata.toml` in `cwd`
/// 4. built-in defaults
pub fn resolve(explicit: Option<&Path>, cwd: &Path) -> Result<Settings, SettingsError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return load_from_path(PathBuf::from(path));
    }
    let local = cwd.join(SETTINGS_FILE);
    if local.is_file() {
        return load_from_path(local);
    }
    Ok(Settings::default())
}
