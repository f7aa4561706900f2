//! Persisted user preferences (last file, last column selection).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Preferences file used when `--prefs` is not given.
pub const C_FILE_PREFS_DEFAULT: &str = "colsplit_settings.json";

/// On-disk preferences document. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecPreferences {
    /// Table file loaded most recently.
    pub last_used_file: Option<PathBuf>,
    /// Columns selected when the last job started.
    pub last_selected_columns: Vec<String>,
}

/// Preferences load/save failures.
#[derive(Debug, thiserror::Error)]
pub enum PreferencesError {
    /// Filesystem access failed.
    #[error("Preferences file {}: {source}", path.display())]
    Io {
        /// Preferences file path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Document could not be (de)serialized.
    #[error("Preferences file {} is not valid JSON: {source}", path.display())]
    Json {
        /// Preferences file path.
        path: PathBuf,
        /// Underlying serde error.
        source: serde_json::Error,
    },
}

/// Preferences bound to one file.
#[derive(Debug, Clone)]
pub struct StorePreferences {
    path_file_prefs: PathBuf,
    prefs: SpecPreferences,
}

impl StorePreferences {
    /// Load preferences from `path`.
    ///
    /// A missing or malformed file yields defaults; malformed files are
    /// reported with a warning.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path_file_prefs = path.into();
        let prefs = match read_preferences(&path_file_prefs) {
            Ok(Some(prefs)) => prefs,
            Ok(None) => {
                debug!(path = %path_file_prefs.display(), "no preferences file");
                SpecPreferences::default()
            }
            Err(err) => {
                warn!("{err}; using defaults");
                SpecPreferences::default()
            }
        };
        Self {
            path_file_prefs,
            prefs,
        }
    }

    /// Current preferences.
    pub fn get(&self) -> &SpecPreferences {
        &self.prefs
    }

    /// Remember a successfully loaded table file.
    pub fn record_loaded_file(&mut self, path: &Path) {
        self.prefs.last_used_file = Some(path.to_path_buf());
    }

    /// Remember the columns of a started job.
    pub fn record_selected_columns<S: AsRef<str>>(&mut self, columns: &[S]) {
        self.prefs.last_selected_columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
    }

    /// Write preferences as pretty JSON, creating the parent directory.
    pub fn save(&self) -> Result<(), PreferencesError> {
        let err_io = |source: std::io::Error| PreferencesError::Io {
            path: self.path_file_prefs.clone(),
            source,
        };
        if let Some(path_dir_parent) = self
            .path_file_prefs
            .parent()
            .filter(|path| !path.as_os_str().is_empty())
        {
            fs::create_dir_all(path_dir_parent).map_err(err_io)?;
        }
        let c_json =
            serde_json::to_string_pretty(&self.prefs).map_err(|source| PreferencesError::Json {
                path: self.path_file_prefs.clone(),
                source,
            })?;
        fs::write(&self.path_file_prefs, c_json).map_err(err_io)?;
        debug!(path = %self.path_file_prefs.display(), "preferences saved");
        Ok(())
    }

    /// [`Self::save`], logging instead of returning failures.
    pub fn save_or_warn(&self) {
        if let Err(err) = self.save() {
            warn!("{err}");
        }
    }
}

fn read_preferences(path: &Path) -> Result<Option<SpecPreferences>, PreferencesError> {
    let c_text = match fs::read_to_string(path) {
        Ok(c_text) => c_text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PreferencesError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&c_text)
        .map(Some)
        .map_err(|source| PreferencesError::Json {
            path: path.to_path_buf(),
            source,
        })
}
