//! Workflow directory layout and file helpers.
//!
//! ```text
//! <root>/<SCHEMA>/                 committed, versioned SQL files
//! <root>/<SCHEMA>/temp/            in-progress workflow
//!     raw/                         untouched extraction
//!     analysis/                    templating_analysis.{md,json}
//!     suggested/                   safe-only preview, advisory
//!     final/                       generator output, ready to commit
//!     decisions.json
//!     decisions.partial.json       decisions kept across a quit review
//!     workflow_state.json
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::Result;
use crate::state::StateStore;

/// Paths of one schema's workflow.
#[derive(Debug, Clone)]
pub struct WorkflowPaths {
    schema: String,
    schema_dir: PathBuf,
    temp_dir: PathBuf,
}

impl WorkflowPaths {
    /// Creates the layout for `schema` under `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>, schema: &str) -> Self {
        let schema_dir = root.as_ref().join(schema);
        let temp_dir = schema_dir.join("temp");
        Self {
            schema: schema.to_string(),
            schema_dir,
            temp_dir,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Directory receiving committed files.
    #[must_use]
    pub fn schema_dir(&self) -> &Path {
        &self.schema_dir
    }

    /// Root of the in-progress workflow.
    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    #[must_use]
    pub fn raw_dir(&self) -> PathBuf {
        self.temp_dir.join("raw")
    }

    #[must_use]
    pub fn analysis_dir(&self) -> PathBuf {
        self.temp_dir.join("analysis")
    }

    #[must_use]
    pub fn suggested_dir(&self) -> PathBuf {
        self.temp_dir.join("suggested")
    }

    #[must_use]
    pub fn final_dir(&self) -> PathBuf {
        self.temp_dir.join("final")
    }

    #[must_use]
    pub fn analysis_markdown(&self) -> PathBuf {
        self.analysis_dir().join("templating_analysis.md")
    }

    #[must_use]
    pub fn analysis_json(&self) -> PathBuf {
        self.analysis_dir().join("templating_analysis.json")
    }

    #[must_use]
    pub fn decisions_file(&self) -> PathBuf {
        self.temp_dir.join("decisions.json")
    }

    #[must_use]
    pub fn partial_decisions_file(&self) -> PathBuf {
        self.temp_dir.join("decisions.partial.json")
    }

    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.temp_dir.join("workflow_state.json")
    }

    /// Returns the state store of this workflow.
    #[must_use]
    pub fn state_store(&self) -> StateStore {
        StateStore::new(self.state_file())
    }

    /// Creates `raw/`, `analysis/`, `suggested/` and `final/`.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn create_layout(&self) -> Result<()> {
        for dir in [
            self.raw_dir(),
            self.analysis_dir(),
            self.suggested_dir(),
            self.final_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Deletes the whole temporary workflow directory, if present.
    ///
    /// Returns true if something was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub fn remove_temp(&self) -> Result<bool> {
        if self.temp_dir.exists() {
            std::fs::remove_dir_all(&self.temp_dir)?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Writes `contents` to `path` through a temporary file in the same
/// directory, then renames it into place.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or the file
/// cannot be written or moved into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path)?;
    Ok(())
}

/// Lists the `*.sql` files of `dir`, sorted by name. A missing directory
/// yields an empty list.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn sql_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Returns the file name of `path` as a string.
#[must_use]
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
