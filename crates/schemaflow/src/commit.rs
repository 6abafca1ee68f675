//! Committing the final files to the schema directory.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::error::{Result, WorkflowError};
use crate::paths::{file_name, sql_files, WorkflowPaths};
use crate::state::{Transition, WorkflowStep};

/// A file copied (or to be copied) by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedFile {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Runs the commit step for one schema.
pub struct Committer<'a> {
    paths: &'a WorkflowPaths,
}

impl<'a> Committer<'a> {
    #[must_use]
    pub const fn new(paths: &'a WorkflowPaths) -> Self {
        Self { paths }
    }

    /// Copies `final/*.sql` into the schema directory and advances the state
    /// to `COMMITTED`. A dry run only reports the copies.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidState`] unless the state is
    /// `FINAL_GENERATED`, [`WorkflowError::NoFinalFiles`] when `final/` is
    /// missing or empty, or an IO error.
    pub fn run(&self, dry_run: bool) -> Result<Vec<CommittedFile>> {
        self.paths.state_store().require(Transition::Commit)?;

        let final_dir = self.paths.final_dir();
        let sources = sql_files(&final_dir)?;
        if sources.is_empty() {
            return Err(WorkflowError::NoFinalFiles(final_dir));
        }

        let files: Vec<CommittedFile> = sources
            .into_iter()
            .map(|source| {
                let target = self.paths.schema_dir().join(file_name(&source));
                CommittedFile { source, target }
            })
            .collect();

        if dry_run {
            println!("DRY RUN: files that would be committed:");
            for file in &files {
                println!("   - {} → {}", file_name(&file.source), file.target.display());
            }
            println!("No files were modified");
            return Ok(files);
        }

        for file in &files {
            std::fs::copy(&file.source, &file.target)?;
            println!("Committed: {}", file_name(&file.source));
        }
        self.paths.state_store().save(
            WorkflowStep::Committed,
            json!({
                "committed_at": Utc::now().to_rfc3339(),
                "committed_files": files.iter().map(|f| file_name(&f.target)).collect::<Vec<_>>(),
            }),
        )?;
        info!(
            schema = %self.paths.schema(),
            files = files.len(),
            target = %self.paths.schema_dir().display(),
            "schema committed"
        );
        Ok(files)
    }
}
