//! Error types for the schema workflow.

use std::path::PathBuf;

use crate::state::WorkflowStep;

/// Errors that can occur while running a workflow step.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A step was invoked from the wrong workflow state.
    #[error("Workflow state is '{actual}', not '{expected}'")]
    InvalidState {
        /// State the step requires.
        expected: WorkflowStep,
        /// State found on disk.
        actual: WorkflowStep,
    },

    /// Artifacts a step depends on are missing.
    #[error("Missing required files: {}", .0.join(", "))]
    MissingFiles(Vec<String>),

    /// Extraction found nothing; the schema is likely wrong or not accessible.
    #[error("Schema '{database}.{schema}' not found or access denied: no objects or grants extracted")]
    EmptyExtraction {
        /// Source database.
        database: String,
        /// Source schema.
        schema: String,
    },

    /// The final directory holds no SQL files.
    #[error("No final files found in: {0}")]
    NoFinalFiles(PathBuf),

    /// The committed schema directory does not exist.
    #[error("Schema directory not found: {0}")]
    SchemaDirNotFound(PathBuf),

    /// A warehouse command failed.
    #[error("Warehouse error: {0}")]
    Warehouse(String),

    /// The schema does not exist in the target database.
    #[error("Schema {database}.{schema} does not exist")]
    SchemaNotFound {
        /// Target database.
        database: String,
        /// Target schema.
        schema: String,
    },

    /// The migration runner exited unsuccessfully.
    #[error("Migration runner failed with exit code {}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Runner {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// Invalid configuration or arguments.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (reading/writing workflow files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error (runner config).
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Project configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// A pattern could not be compiled.
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// An atomic write could not be moved into place.
    #[error("Failed to persist file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;
