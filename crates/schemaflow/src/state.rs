//! Persisted workflow state.
//!
//! Each schema's workflow is a linear state machine:
//!
//! ```text
//! NOT_STARTED -extract-> EXTRACTION_COMPLETE -review-> REVIEW_COMPLETE
//!             -generate-> FINAL_GENERATED -commit-> COMMITTED
//! ```
//!
//! Every transition except `extract` requires the persisted state to equal
//! its precondition. `extract` runs from any state and resets the workflow.
//! The state file is replaced atomically on every write.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WorkflowError};
use crate::paths::write_atomic;

/// A workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStep {
    NotStarted,
    ExtractionComplete,
    ReviewComplete,
    FinalGenerated,
    Committed,
}

impl WorkflowStep {
    /// Returns the persisted name, e.g. `REVIEW_COMPLETE`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::ExtractionComplete => "EXTRACTION_COMPLETE",
            Self::ReviewComplete => "REVIEW_COMPLETE",
            Self::FinalGenerated => "FINAL_GENERATED",
            Self::Committed => "COMMITTED",
        }
    }

    /// Returns the transition that moves forward from this state, or `None`
    /// once the workflow is committed.
    #[must_use]
    pub const fn next(&self) -> Option<Transition> {
        match self {
            Self::NotStarted => Some(Transition::Extract),
            Self::ExtractionComplete => Some(Transition::Review),
            Self::ReviewComplete => Some(Transition::Generate),
            Self::FinalGenerated => Some(Transition::Commit),
            Self::Committed => None,
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation that advances the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Extract,
    Review,
    Generate,
    Commit,
}

impl Transition {
    /// State required before the transition, `None` when any state is
    /// accepted.
    #[must_use]
    pub const fn precondition(&self) -> Option<WorkflowStep> {
        match self {
            Self::Extract => None,
            Self::Review => Some(WorkflowStep::ExtractionComplete),
            Self::Generate => Some(WorkflowStep::ReviewComplete),
            Self::Commit => Some(WorkflowStep::FinalGenerated),
        }
    }

    /// State reached when the transition succeeds.
    #[must_use]
    pub const fn target(&self) -> WorkflowStep {
        match self {
            Self::Extract => WorkflowStep::ExtractionComplete,
            Self::Review => WorkflowStep::ReviewComplete,
            Self::Generate => WorkflowStep::FinalGenerated,
            Self::Commit => WorkflowStep::Committed,
        }
    }

    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Extract => "Start extraction",
            Self::Review => "Review templating suggestions",
            Self::Generate => "Generate final version",
            Self::Commit => "Commit to main schema folder",
        }
    }

    /// Returns the command line that runs this transition for `schema`.
    #[must_use]
    pub fn command(&self, schema: &str) -> String {
        match self {
            Self::Extract => format!(
                "schemaflow extract --schema {schema} --database <DATABASE> --snapshot <FILE>"
            ),
            Self::Review => format!("schemaflow review --schema {schema}"),
            Self::Generate => format!("schemaflow generate --schema {schema}"),
            Self::Commit => format!("schemaflow commit --schema {schema}"),
        }
    }
}

/// Checks that `transition` may run from `current`.
///
/// # Errors
///
/// Returns [`WorkflowError::InvalidState`] with the expected and actual
/// states when the precondition does not hold.
pub fn validate(current: WorkflowStep, transition: Transition) -> Result<()> {
    match transition.precondition() {
        Some(expected) if expected != current => Err(WorkflowError::InvalidState {
            expected,
            actual: current,
        }),
        _ => Ok(()),
    }
}

/// The persisted state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub current_step: WorkflowStep,
    pub last_updated: DateTime<Utc>,
    /// Free-form audit details of the last transition.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl WorkflowState {
    /// Creates a state stamped with the current time.
    #[must_use]
    pub fn new(current_step: WorkflowStep, details: serde_json::Value) -> Self {
        Self {
            current_step,
            last_updated: Utc::now(),
            details,
        }
    }

    /// Returns a string detail, if present.
    #[must_use]
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(serde_json::Value::as_str)
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new(WorkflowStep::NotStarted, serde_json::Value::Null)
    }
}

/// Reads and writes one schema's `workflow_state.json`.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Creates a store for the given state file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the state. A missing file means the workflow has not started.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<WorkflowState> {
        if !self.path.exists() {
            return Ok(WorkflowState::default());
        }
        let text = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Returns the current step.
    ///
    /// # Errors
    ///
    /// See [`StateStore::load`].
    pub fn current_step(&self) -> Result<WorkflowStep> {
        Ok(self.load()?.current_step)
    }

    /// Loads the state and checks it allows `transition`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidState`] on a precondition mismatch,
    /// or a load error.
    pub fn require(&self, transition: Transition) -> Result<WorkflowState> {
        let state = self.load()?;
        validate(state.current_step, transition)?;
        Ok(state)
    }

    /// Persists `step` with `details`, replacing the file atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized or written.
    pub fn save(&self, step: WorkflowStep, details: serde_json::Value) -> Result<WorkflowState> {
        let state = WorkflowState::new(step, details);
        let json = serde_json::to_string_pretty(&state)?;
        write_atomic(&self.path, json.as_bytes())?;
        debug!(step = %step, path = %self.path.display(), "workflow state saved");
        Ok(state)
    }

    /// Resets the workflow to `NOT_STARTED`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    pub fn reset(&self) -> Result<WorkflowState> {
        self.save(WorkflowStep::NotStarted, serde_json::json!({}))
    }
}
