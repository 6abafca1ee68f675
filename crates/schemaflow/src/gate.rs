//! Deployment gate: compares a target schema with the committed files.
//!
//! The verdict is meant as a process exit code: 0 when deploying would be a
//! no-op, 2 when meaningful changes are pending (including a schema that
//! does not exist yet), 1 when the comparison itself failed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use schemaflow_core::catalog::is_user_defined;
use schemaflow_core::compare::{object_key, parse_proposed_grants, parse_proposed_objects};
use schemaflow_core::normalize::{render_placeholders, retarget_environment};
use schemaflow_core::{Comparison, Environment, Placeholders, SchemaCoordinate, Verdict};

use crate::error::{Result, WorkflowError};
use crate::paths::{file_name, sql_files};
use crate::warehouse::Warehouse;

const BASELINE_PREFIX: &str = "V1000__";
const GRANTS_PREFIX: &str = "V1001__";

/// Objects and schema-level grants of a live schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaState {
    /// `KIND:NAME` to DDL.
    pub objects: BTreeMap<String, String>,
    /// Grant statements, upper-cased.
    pub grants: BTreeSet<String>,
}

/// Reads the current state of `coord`.
///
/// # Errors
///
/// Returns [`WorkflowError::SchemaNotFound`] when the schema does not exist
/// in the database, or the warehouse error of the schema listing.
pub fn current_state<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    coord: &SchemaCoordinate,
) -> Result<SchemaState> {
    let exists = warehouse
        .execute(&coord.schemas_command())?
        .iter()
        .any(|row| row.get("name").is_some_and(|name| name.eq_ignore_ascii_case(&coord.schema)));
    if !exists {
        return Err(WorkflowError::SchemaNotFound {
            database: coord.database.clone(),
            schema: coord.schema.clone(),
        });
    }

    let mut state = SchemaState::default();
    for (kind, command) in coord.listing_commands() {
        let Ok(rows) = warehouse.execute(&command) else {
            debug!(kind = %kind, "object kind unavailable, skipping");
            continue;
        };
        for row in rows {
            let Some(name) = row.get("name").filter(|name| is_user_defined(name)) else {
                continue;
            };
            let ddl = match warehouse.object_ddl(kind, coord, name) {
                Ok(ddl) => ddl.trim().to_string(),
                Err(e) => format!("-- ERROR: {e}"),
            };
            state.objects.insert(object_key(kind, name), ddl);
        }
    }

    match warehouse.execute(&coord.grants_command()) {
        Ok(rows) => {
            for row in rows {
                let (Some(privilege), Some(granted_on), Some(granted_to), Some(grantee)) = (
                    row.get("privilege"),
                    row.get("granted_on"),
                    row.get("granted_to"),
                    row.get("grantee_name"),
                ) else {
                    continue;
                };
                if !granted_on.eq_ignore_ascii_case("SCHEMA") {
                    continue;
                }
                let on = match row.get("name").filter(|n| !n.is_empty()) {
                    Some(name) => name.to_string(),
                    None => coord.to_string(),
                };
                let option = if row
                    .get("grant_option")
                    .is_some_and(|v| v.eq_ignore_ascii_case("true"))
                {
                    " WITH GRANT OPTION"
                } else {
                    ""
                };
                state.grants.insert(
                    format!("GRANT {privilege} ON {granted_on} {on} TO {granted_to} {grantee}{option}")
                        .to_uppercase(),
                );
            }
        }
        Err(e) => warn!(schema = %coord, error = %e, "could not read current grants"),
    }
    Ok(state)
}

/// Proposed objects and grants, rendered for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposedState {
    pub objects: BTreeMap<String, String>,
    /// Normalized grants.
    pub grants: BTreeSet<String>,
    /// Files the proposal was read from.
    pub files: Vec<PathBuf>,
}

/// Reads the `V1000__*.sql` baseline and `V1001__*.sql` grants of
/// `schema_dir`, rendered with `values`.
///
/// # Errors
///
/// Returns an error if the directory or a file cannot be read.
pub fn proposed_state(schema_dir: &Path, values: &Placeholders) -> Result<ProposedState> {
    let mut proposed = ProposedState::default();
    let files = sql_files(schema_dir)?;

    if let Some(baseline) = files.iter().find(|f| file_name(f).starts_with(BASELINE_PREFIX)) {
        println!("Reading proposed DDL: {}", baseline.display());
        let rendered = render_placeholders(&std::fs::read_to_string(baseline)?, values);
        proposed.objects = parse_proposed_objects(&retarget_environment(&rendered, values.env));
        proposed.files.push(baseline.clone());
    }
    if let Some(grants) = files.iter().find(|f| file_name(f).starts_with(GRANTS_PREFIX)) {
        println!("Reading proposed grants: {}", grants.display());
        let rendered = render_placeholders(&std::fs::read_to_string(grants)?, values);
        proposed.grants = parse_proposed_grants(&rendered);
        proposed.files.push(grants.clone());
    }
    Ok(proposed)
}

/// Outcome of a gate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The schema does not exist in the target yet.
    FirstDeployment { database: String, schema: String },
    Compared(Comparison),
}

impl GateOutcome {
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        match self {
            Self::FirstDeployment { .. } => Verdict::Changes,
            Self::Compared(comparison) => comparison.verdict(),
        }
    }
}

/// A comparison of one schema against one target environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gate {
    pub schema: String,
    pub schema_dir: PathBuf,
    pub placeholders: Placeholders,
}

impl Gate {
    #[must_use]
    pub fn new(schema: impl Into<String>, schema_dir: impl Into<PathBuf>, placeholders: Placeholders) -> Self {
        Self {
            schema: schema.into(),
            schema_dir: schema_dir.into(),
            placeholders,
        }
    }

    #[must_use]
    pub fn target(&self) -> Environment {
        self.placeholders.env
    }

    /// Name of the target database, e.g. `TEST_PLATFORM_QA`.
    #[must_use]
    pub fn target_database(&self) -> String {
        self.placeholders.database_name()
    }

    /// Compares the target schema with the proposed files.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::SchemaDirNotFound`] without a schema
    /// directory, or any warehouse or IO failure. A missing target schema
    /// is not an error.
    pub fn run<W: Warehouse + ?Sized>(&self, warehouse: &mut W) -> Result<GateOutcome> {
        if !self.schema_dir.is_dir() {
            return Err(WorkflowError::SchemaDirNotFound(self.schema_dir.clone()));
        }
        let coord = SchemaCoordinate::new(self.target_database(), self.schema.as_str());
        println!("Comparing {} schema for {} environment", self.schema, self.target());
        println!("Using schema files from: {}", self.schema_dir.display());
        info!(schema = %coord, "comparing target schema");

        let current = match current_state(warehouse, &coord) {
            Ok(current) => current,
            Err(WorkflowError::SchemaNotFound { database, schema }) => {
                return Ok(GateOutcome::FirstDeployment { database, schema });
            }
            Err(e) => return Err(e),
        };
        let proposed = proposed_state(&self.schema_dir, &self.placeholders)?;
        Ok(GateOutcome::Compared(Comparison::new(
            &current.objects,
            &proposed.objects,
            &current.grants,
            &proposed.grants,
            self.target(),
        )))
    }
}

/// Prints the human-readable comparison report.
pub fn print_report(outcome: &GateOutcome) {
    let rule = "=".repeat(80);
    let comparison = match outcome {
        GateOutcome::FirstDeployment { database, schema } => {
            println!("Schema {database}.{schema} does not exist in target");
            println!("FIRST DEPLOYMENT: every object and grant will be created");
            return;
        }
        GateOutcome::Compared(comparison) => comparison,
    };

    let objects = &comparison.objects;
    println!("\n{rule}\nOBJECT COMPARISON REPORT\n{rule}");
    println!("NEW OBJECTS: {}", objects.new.len());
    for key in &objects.new {
        println!("   + {key}");
    }
    println!("\nMODIFIED OBJECTS: {}", objects.modified.len());
    for key in &objects.modified {
        println!("   ~ {key}");
    }
    println!("\nREMOVED OBJECTS: {}", objects.removed.len());
    for key in &objects.removed {
        println!("   - {key}");
    }
    println!("\nUNCHANGED OBJECTS: {}", objects.unchanged.len());

    let grants = &comparison.grants;
    println!("\n{rule}\nGRANTS COMPARISON REPORT\n{rule}");
    println!("NEW GRANTS: {}", grants.new.len());
    for grant in &grants.new {
        println!("   + {grant}");
    }
    println!("\nREMOVED GRANTS: {}", grants.removed.len());
    for grant in &grants.removed {
        println!("   - {grant}");
    }
    println!("\nUNCHANGED GRANTS: {}", grants.unchanged.len());

    let triage = &comparison.removed_grants;
    let meaningful = comparison.meaningful_changes();
    println!("\n{rule}\nSUMMARY\n{rule}");
    if meaningful == 0 && triage.scope_cleanup.is_empty() {
        println!("No changes detected - target schema matches proposed state");
        println!("Safe to proceed with deployment (will be a no-op)");
        return;
    }
    println!("MEANINGFUL CHANGES: {meaningful}");
    if objects.change_count() > 0 {
        println!("   - {} object changes", objects.change_count());
    }
    if !grants.new.is_empty() {
        println!("   - {} new grants", grants.new.len());
    }
    if !triage.environment_cleanup.is_empty() {
        println!(
            "   - {} environment cleanup (wrong environment roles)",
            triage.environment_cleanup.len()
        );
    }
    if !triage.other.is_empty() {
        println!("   - {} removed grants", triage.other.len());
    }
    if !triage.scope_cleanup.is_empty() {
        println!(
            "\nSCOPE CLEANUP: {} grants for unmanaged object types (not counted)",
            triage.scope_cleanup.len()
        );
    }
    if meaningful > 0 {
        println!("\nRun deployment to apply these changes");
    }
}
