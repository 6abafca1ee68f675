//! One schema's workflow: the entry point used by the CLI.

use std::path::Path;

use tracing::info;

use schemaflow_core::{Environment, Placeholders};

use crate::commit::{CommittedFile, Committer};
use crate::config::Config;
use crate::error::{Result, WorkflowError};
use crate::extract::{ExtractRequest, ExtractionSummary, Extractor};
use crate::gate::{Gate, GateOutcome};
use crate::generate::{GenerationSummary, Generator};
use crate::paths::WorkflowPaths;
use crate::review::{Prompt, ReviewOutcome, Reviewer};
use crate::runner::{RunOutput, Runner};
use crate::state::{Transition, WorkflowState};
use crate::warehouse::Warehouse;

/// Where a schema's workflow stands.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// No temporary workflow directory exists.
    Inactive,
    Active {
        state: WorkflowState,
        next: Option<Transition>,
    },
}

/// Extract, review, generate and commit for one schema, plus the
/// deployment commands that read the committed files.
#[derive(Debug, Clone)]
pub struct Workflow {
    paths: WorkflowPaths,
    config: Config,
}

impl Workflow {
    #[must_use]
    pub fn new(root: impl AsRef<Path>, schema: &str, config: Config) -> Self {
        Self {
            paths: WorkflowPaths::new(root, schema),
            config,
        }
    }

    #[must_use]
    pub const fn paths(&self) -> &WorkflowPaths {
        &self.paths
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        self.paths.schema()
    }

    /// Runs extraction from any state; see [`Extractor::run`].
    ///
    /// # Errors
    ///
    /// See [`Extractor::run`].
    pub fn extract<W: Warehouse + ?Sized>(
        &self,
        warehouse: &mut W,
        request: &ExtractRequest,
    ) -> Result<ExtractionSummary> {
        Extractor::new(&self.paths, &self.config).run(warehouse, request)
    }

    /// Runs the interactive review; see [`Reviewer::run`].
    ///
    /// # Errors
    ///
    /// See [`Reviewer::run`].
    pub fn review<P: Prompt>(&self, prompt: &mut P) -> Result<ReviewOutcome> {
        Reviewer::new(&self.paths, prompt).run()
    }

    /// Generates the final files with the configured decision scope.
    ///
    /// # Errors
    ///
    /// See [`Generator::run`].
    pub fn generate(&self) -> Result<GenerationSummary> {
        Generator::new(&self.paths, self.config.review.decision_scope).run()
    }

    /// Commits the final files.
    ///
    /// # Errors
    ///
    /// See [`Committer::run`].
    pub fn commit(&self, dry_run: bool) -> Result<Vec<CommittedFile>> {
        Committer::new(&self.paths).run(dry_run)
    }

    /// Reads the workflow status.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file exists but cannot be read.
    pub fn status(&self) -> Result<Status> {
        if !self.paths.temp_dir().exists() {
            return Ok(Status::Inactive);
        }
        let state = self.paths.state_store().load()?;
        let next = state.current_step.next();
        Ok(Status::Active { state, next })
    }

    /// Prints the workflow status with the next command to run.
    ///
    /// # Errors
    ///
    /// See [`Workflow::status`].
    pub fn print_status(&self) -> Result<()> {
        let schema = self.schema();
        println!("WORKFLOW STATUS: {schema}");
        match self.status()? {
            Status::Inactive => {
                println!("Status: No active workflow");
                println!("Start with: {}", Transition::Extract.command(schema));
            }
            Status::Active { state, next } => {
                println!("Current State: {}", state.current_step);
                println!("Last Updated: {}", state.last_updated.to_rfc3339());
                println!("Location: {}", self.paths.temp_dir().display());
                match next {
                    Some(transition) => {
                        println!("\nNEXT STEP");
                        println!("Purpose: {}", transition.description());
                        println!("Command: {}", transition.command(schema));
                    }
                    None => println!("\nWorkflow complete: schema committed"),
                }
            }
        }
        Ok(())
    }

    /// Deletes the temporary workflow directory. Returns true if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be removed.
    pub fn clean(&self) -> Result<bool> {
        let removed = self.paths.remove_temp()?;
        if removed {
            info!(schema = %self.schema(), "workflow files removed");
        }
        Ok(removed)
    }

    /// Resolves the placeholder values of a deployment target.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Config`] when no database base is known
    /// for the schema.
    pub fn placeholders(
        &self,
        target: Environment,
        db_base: Option<&str>,
        db_prefix: Option<&str>,
    ) -> Result<Placeholders> {
        let schema = self.schema();
        let base = self.config.db_base(schema, db_base, None, None).ok_or_else(|| {
            WorkflowError::Config(format!(
                "no database base for schema {schema}: pass --db-base or add it to [db_bases]"
            ))
        })?;
        Ok(Placeholders::new(target, base).with_prefix(self.config.db_prefix(db_prefix)))
    }

    /// Builds the deployment gate over the committed files.
    #[must_use]
    pub fn gate(&self, placeholders: Placeholders, schema_dir: Option<&Path>) -> Gate {
        let dir = schema_dir.unwrap_or_else(|| self.paths.schema_dir());
        Gate::new(self.schema(), dir, placeholders)
    }

    /// Runs the gate, then the migration runner unless the comparison
    /// failed.
    ///
    /// # Errors
    ///
    /// Returns the comparison error, or the runner error.
    pub fn deploy<W: Warehouse + ?Sized>(
        &self,
        warehouse: &mut W,
        placeholders: &Placeholders,
        dry_run: bool,
        verbose: bool,
    ) -> Result<(GateOutcome, RunOutput)> {
        let outcome = self.gate(placeholders.clone(), None).run(warehouse)?;
        crate::gate::print_report(&outcome);
        let output = Runner::new(&self.config.runner).deploy(
            self.paths.schema_dir(),
            self.schema(),
            placeholders,
            dry_run,
            verbose,
        )?;
        Ok((outcome, output))
    }
}
