//! Raw schema extraction into the workflow's `raw/` directory.
//!
//! Extraction always starts from scratch: any previous workflow directory is
//! deleted and the state reset before the warehouse is queried. The DDL is
//! written exactly as the warehouse returns it; templating happens later,
//! through review.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use schemaflow_core::catalog::is_user_defined;
use schemaflow_core::SchemaCoordinate;

use crate::config::Config;
use crate::error::{Result, WorkflowError};
use crate::paths::{file_name, write_atomic, WorkflowPaths};
use crate::state::WorkflowStep;
use crate::warehouse::Warehouse;

/// Schema-level grant target written into extracted grants.
const GRANT_TARGET: &str = "{{ DB_PREFIX }}_{{ DB_BASE }}_{{ ENV }}";

/// Source of an extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    /// Source database, e.g. `PLATFORM_SIT`.
    pub database: String,
    /// Database base; resolved from configuration when absent.
    pub db_base: Option<String>,
    /// Database prefix; resolved from configuration when absent.
    pub db_prefix: Option<String>,
}

impl ExtractRequest {
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            db_base: None,
            db_prefix: None,
        }
    }

    #[must_use]
    pub fn db_base(mut self, db_base: Option<String>) -> Self {
        self.db_base = db_base;
        self
    }

    #[must_use]
    pub fn db_prefix(mut self, db_prefix: Option<String>) -> Self {
        self.db_prefix = db_prefix;
        self
    }
}

/// Outcome of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub database: String,
    pub schema: String,
    pub object_count: usize,
    pub grant_count: usize,
    /// Files written to `raw/`.
    pub files: Vec<PathBuf>,
}

/// Fetches the DDL of every user-defined object of the schema, in catalog
/// order.
///
/// A kind whose listing fails is skipped. A listed object whose DDL cannot
/// be fetched is kept as an error comment so the gap stays visible.
pub fn extract_objects<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    coord: &SchemaCoordinate,
) -> Vec<String> {
    let mut statements = Vec::new();
    for (kind, command) in coord.listing_commands() {
        let rows = match warehouse.execute(&command) {
            Ok(rows) => rows,
            Err(e) => {
                debug!(kind = %kind, error = %e, "object kind unavailable, skipping");
                continue;
            }
        };
        for row in rows {
            let Some(name) = row.get("name").filter(|name| is_user_defined(name)) else {
                continue;
            };
            match warehouse.object_ddl(kind, coord, name) {
                Ok(ddl) => {
                    let mut ddl = ddl.trim().to_string();
                    if !ddl.ends_with(';') {
                        ddl.push(';');
                    }
                    statements.push(ddl);
                }
                Err(e) => {
                    warn!(kind = %kind, name, error = %e, "could not extract object");
                    statements.push(format!("-- ERROR: could not extract {kind} {name}: {e}"));
                }
            }
        }
    }
    statements
}

/// Builds the templated `GRANT` statements of the schema's grants.
///
/// Grantees are renamed through `[role_map]`. A failing grants listing is
/// reported and yields no grants.
pub fn extract_grants<W: Warehouse + ?Sized>(
    warehouse: &mut W,
    coord: &SchemaCoordinate,
    config: &Config,
) -> Vec<String> {
    let rows = match warehouse.execute(&coord.grants_command()) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(schema = %coord, error = %e, "could not extract grants");
            return Vec::new();
        }
    };

    rows.iter()
        .filter_map(|row| {
            let privilege = row.get("privilege").filter(|v| !v.is_empty())?;
            let grantee = row.get("grantee_name").filter(|v| !v.is_empty())?;
            let granted_to = row.get("granted_to").filter(|v| !v.is_empty())?;
            let with_option = row
                .get("grant_option")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
            Some(format!(
                "GRANT {privilege} ON SCHEMA IDENTIFIER('{GRANT_TARGET}.{schema}') TO {granted_to} {role}{option};",
                schema = coord.schema,
                role = config.map_role(grantee),
                option = if with_option { " WITH GRANT OPTION" } else { "" },
            ))
        })
        .collect()
}

/// Runs the extract step for one schema.
pub struct Extractor<'a> {
    paths: &'a WorkflowPaths,
    config: &'a Config,
}

impl<'a> Extractor<'a> {
    #[must_use]
    pub const fn new(paths: &'a WorkflowPaths, config: &'a Config) -> Self {
        Self { paths, config }
    }

    /// Extracts the schema into a fresh `temp/raw/` and advances the state
    /// to `EXTRACTION_COMPLETE`.
    ///
    /// Runs from any state. On failure the temporary directory is removed,
    /// so no state file is left behind.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::EmptyExtraction`] when neither objects nor
    /// grants were found, or any IO error.
    pub fn run<W: Warehouse + ?Sized>(
        &self,
        warehouse: &mut W,
        request: &ExtractRequest,
    ) -> Result<ExtractionSummary> {
        if self.paths.remove_temp()? {
            info!(schema = %self.paths.schema(), "removed previous workflow files");
        }
        self.paths.create_layout()?;
        self.paths.state_store().reset()?;

        match self.extract_into_raw(warehouse, request) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                self.paths.remove_temp()?;
                Err(e)
            }
        }
    }

    fn extract_into_raw<W: Warehouse + ?Sized>(
        &self,
        warehouse: &mut W,
        request: &ExtractRequest,
    ) -> Result<ExtractionSummary> {
        let schema = self.paths.schema();
        let coord = SchemaCoordinate::new(request.database.as_str(), schema);
        info!(schema = %coord, "extracting schema");

        let objects = extract_objects(warehouse, &coord);
        let grants = extract_grants(warehouse, &coord, self.config);
        if objects.is_empty() && grants.is_empty() {
            return Err(WorkflowError::EmptyExtraction {
                database: request.database.clone(),
                schema: schema.to_string(),
            });
        }

        let now = Utc::now();
        let timestamp = now.format("%Y%m%d%H%M%S");
        let database = &request.database;
        let raw = self.paths.raw_dir();

        let ddl_file = raw.join(format!("V1000__baseline_from_{database}.sql"));
        let mut ddl_text = format!(
            "-- Exported from {database} at {timestamp}\n\
             -- Raw extraction: environment references are templated during review\n"
        );
        if objects.is_empty() {
            ddl_text.push_str("-- No objects found in schema\n");
        } else {
            ddl_text.push_str(&objects.join("\n"));
            ddl_text.push('\n');
        }
        write_atomic(&ddl_file, ddl_text.as_bytes())?;

        let grants_file = raw.join(format!("V1001__grants_from_{database}.sql"));
        let mut grants_text = format!(
            "-- Grants exported from {database} at {timestamp}\n\
             -- Schema target is templated for multi-environment deployment\n"
        );
        if grants.is_empty() {
            grants_text.push_str("-- No grants found for schema\n");
        } else {
            grants_text.push_str(&grants.join("\n"));
            grants_text.push('\n');
        }
        write_atomic(&grants_file, grants_text.as_bytes())?;

        let db_prefix = self.config.db_prefix(request.db_prefix.as_deref());
        let db_base = self.config.db_base(
            schema,
            request.db_base.as_deref(),
            Some(database),
            db_prefix.as_deref(),
        );
        if db_base.is_none() {
            warn!(database = %database, "database base unknown, templating analysis will find no candidates");
        }

        let files = vec![ddl_file, grants_file];
        self.paths.state_store().save(
            WorkflowStep::ExtractionComplete,
            json!({
                "extracted_at": now.to_rfc3339(),
                "database": database,
                "schema": schema,
                "db_base": db_base,
                "db_prefix": db_prefix,
                "files": files.iter().map(|f| file_name(f)).collect::<Vec<_>>(),
            }),
        )?;
        info!(
            schema = %coord,
            objects = objects.len(),
            grants = grants.len(),
            "extraction complete"
        );

        Ok(ExtractionSummary {
            database: database.clone(),
            schema: schema.to_string(),
            object_count: objects.len(),
            grant_count: grants.len(),
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use schemaflow_core::ObjectKind;

    use super::*;
    use crate::warehouse::{SnapshotGrant, SnapshotWarehouse};

    fn coord() -> SchemaCoordinate {
        SchemaCoordinate::new("PLATFORM_SIT", "REPORTING")
    }

    #[test]
    fn test_extract_objects_terminates_and_reports_failures() {
        let mut wh = SnapshotWarehouse::new()
            .with_object(
                "PLATFORM_SIT",
                "REPORTING",
                ObjectKind::Table,
                "ORDERS",
                Some("  create TABLE ORDERS (ID NUMBER)\n"),
            )
            .with_object("PLATFORM_SIT", "REPORTING", ObjectKind::View, "SECRET", None)
            .with_object(
                "PLATFORM_SIT",
                "REPORTING",
                ObjectKind::Table,
                "SYSTEM$INTERNAL",
                Some("create TABLE X"),
            )
            .with_unsupported_kind(ObjectKind::Stream);

        let statements = extract_objects(&mut wh, &coord());
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "create TABLE ORDERS (ID NUMBER);");
        assert!(statements[1].starts_with("-- ERROR: could not extract VIEW SECRET:"));
    }

    #[test]
    fn test_extract_grants_applies_role_map() {
        let mut grant = SnapshotGrant::role("USAGE", "LEGACY");
        grant.grant_option = true;
        let mut wh = SnapshotWarehouse::new()
            .with_grant("PLATFORM_SIT", "REPORTING", grant)
            .with_grant("PLATFORM_SIT", "REPORTING", SnapshotGrant::role("MONITOR", "READER"));
        let config = Config::from_toml("[role_map]\nLEGACY = \"LOADER\"").unwrap();

        let grants = extract_grants(&mut wh, &coord(), &config);
        assert_eq!(
            grants,
            vec![
                "GRANT USAGE ON SCHEMA IDENTIFIER('{{ DB_PREFIX }}_{{ DB_BASE }}_{{ ENV }}.REPORTING') TO ROLE LOADER WITH GRANT OPTION;",
                "GRANT MONITOR ON SCHEMA IDENTIFIER('{{ DB_PREFIX }}_{{ DB_BASE }}_{{ ENV }}.REPORTING') TO ROLE READER;",
            ]
        );
    }

    #[test]
    fn test_extract_grants_missing_schema_is_empty() {
        let mut wh = SnapshotWarehouse::new();
        assert!(extract_grants(&mut wh, &coord(), &Config::default()).is_empty());
    }
}
