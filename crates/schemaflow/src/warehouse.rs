//! Warehouse boundary.
//!
//! The workflow only needs to run a command and read back rows, plus fetch
//! the canonical DDL of one object at a time. [`Warehouse`] captures that
//! contract; [`SnapshotWarehouse`] answers it offline from a JSON catalog
//! snapshot.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use schemaflow_core::{ObjectKind, SchemaCoordinate};

use crate::error::{Result, WorkflowError};

static SHOW_OBJECTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^SHOW\s+(.+?)\s+IN\s+SCHEMA\s+([^\s.]+)\.([^\s.]+)$").expect("valid regex")
});

static SHOW_GRANTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^SHOW\s+GRANTS\s+ON\s+SCHEMA\s+([^\s.]+)\.([^\s.]+)$").expect("valid regex")
});

static SHOW_SCHEMAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^SHOW\s+SCHEMAS\s+IN\s+DATABASE\s+([^\s.]+)$").expect("valid regex")
});

static GET_DDL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^SELECT\s+GET_DDL\(\s*'([^']+)'\s*,\s*'([^']+)'\s*\)$").expect("valid regex")
});

/// One result row: named columns in result order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, String)>,
}

impl Row {
    /// Creates a row from `(column, value)` pairs.
    #[must_use]
    pub fn new<I, K, V>(columns: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the value of a column, matched case-insensitively.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the value at a position.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|(_, value)| value.as_str())
    }
}

/// A warehouse session.
///
/// Implementations hold one connection for the duration of a workflow
/// step; the caller drops it when the step ends.
pub trait Warehouse {
    /// Runs a command and returns every result row.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Warehouse`] when the command fails.
    fn execute(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// Fetches the canonical DDL of one object.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Warehouse`] when the object cannot be
    /// described.
    fn object_ddl(
        &mut self,
        kind: ObjectKind,
        schema: &SchemaCoordinate,
        name: &str,
    ) -> Result<String> {
        let rows = self.execute(&kind.ddl_query(schema, name))?;
        rows.first()
            .and_then(|row| row.value(0))
            .map(str::to_string)
            .ok_or_else(|| WorkflowError::Warehouse(format!("GET_DDL returned no rows for {kind} {name}")))
    }
}

/// An object in a snapshot. A `null` DDL makes `GET_DDL` fail for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotObject {
    pub kind: ObjectKind,
    pub name: String,
    #[serde(default)]
    pub ddl: Option<String>,
}

fn default_granted_on() -> String {
    "SCHEMA".to_string()
}

fn default_granted_to() -> String {
    "ROLE".to_string()
}

/// A grant row in a snapshot, shaped like `SHOW GRANTS` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotGrant {
    pub privilege: String,
    #[serde(default = "default_granted_on")]
    pub granted_on: String,
    /// Name of the object the privilege is granted on.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_granted_to")]
    pub granted_to: String,
    pub grantee_name: String,
    #[serde(default)]
    pub grant_option: bool,
}

impl SnapshotGrant {
    /// A schema-level privilege granted to a role.
    #[must_use]
    pub fn role(privilege: &str, grantee: &str) -> Self {
        Self {
            privilege: privilege.to_string(),
            granted_on: default_granted_on(),
            name: String::new(),
            granted_to: default_granted_to(),
            grantee_name: grantee.to_string(),
            grant_option: false,
        }
    }

    fn to_row(&self) -> Row {
        Row::new([
            ("privilege", self.privilege.clone()),
            ("granted_on", self.granted_on.clone()),
            ("name", self.name.clone()),
            ("granted_to", self.granted_to.clone()),
            ("grantee_name", self.grantee_name.clone()),
            ("grant_option", self.grant_option.to_string()),
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSchema {
    #[serde(default)]
    pub objects: Vec<SnapshotObject>,
    #[serde(default)]
    pub grants: Vec<SnapshotGrant>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDatabase {
    #[serde(default)]
    pub schemas: BTreeMap<String, SnapshotSchema>,
}

/// An offline warehouse answering commands from a catalog snapshot.
///
/// ```json
/// {
///   "databases": {
///     "PLATFORM_SIT": {
///       "schemas": {
///         "REPORTING": {
///           "objects": [{ "kind": "TABLE", "name": "ORDERS", "ddl": "create table ORDERS (ID NUMBER)" }],
///           "grants": [{ "privilege": "USAGE", "grantee_name": "READER" }]
///         }
///       }
///     }
///   },
///   "unsupported_kinds": ["DYNAMIC_TABLE"]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotWarehouse {
    #[serde(default)]
    pub databases: BTreeMap<String, SnapshotDatabase>,
    /// Kinds whose listing command fails, as on accounts without them.
    #[serde(default)]
    pub unsupported_kinds: Vec<ObjectKind>,
}

impl SnapshotWarehouse {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::Warehouse(format!("cannot open snapshot {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Parses snapshot JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid snapshot.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Ensures a schema exists, creating it empty if needed.
    #[must_use]
    pub fn with_schema(mut self, database: &str, schema: &str) -> Self {
        self.schema_entry(database, schema);
        self
    }

    /// Adds an object; `ddl: None` makes its DDL fetch fail.
    #[must_use]
    pub fn with_object(
        mut self,
        database: &str,
        schema: &str,
        kind: ObjectKind,
        name: &str,
        ddl: Option<&str>,
    ) -> Self {
        self.schema_entry(database, schema).objects.push(SnapshotObject {
            kind,
            name: name.to_string(),
            ddl: ddl.map(str::to_string),
        });
        self
    }

    #[must_use]
    pub fn with_grant(mut self, database: &str, schema: &str, grant: SnapshotGrant) -> Self {
        self.schema_entry(database, schema).grants.push(grant);
        self
    }

    #[must_use]
    pub fn with_unsupported_kind(mut self, kind: ObjectKind) -> Self {
        self.unsupported_kinds.push(kind);
        self
    }

    fn schema_entry(&mut self, database: &str, schema: &str) -> &mut SnapshotSchema {
        self.databases
            .entry(database.to_string())
            .or_default()
            .schemas
            .entry(schema.to_string())
            .or_default()
    }

    fn database(&self, database: &str) -> Result<&SnapshotDatabase> {
        self.databases
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(database))
            .map(|(_, db)| db)
            .ok_or_else(|| {
                WorkflowError::Warehouse(format!(
                    "Database '{database}' does not exist or not authorized."
                ))
            })
    }

    fn schema(&self, database: &str, schema: &str) -> Result<&SnapshotSchema> {
        self.database(database)?
            .schemas
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(schema))
            .map(|(_, s)| s)
            .ok_or_else(|| {
                WorkflowError::Warehouse(format!(
                    "Schema '{database}.{schema}' does not exist or not authorized."
                ))
            })
    }

    fn show_objects(&self, kind_text: &str, database: &str, schema: &str) -> Result<Vec<Row>> {
        let kind = ObjectKind::from_keyword(kind_text).ok_or_else(|| {
            WorkflowError::Warehouse(format!("unsupported object type '{kind_text}'"))
        })?;
        if self.unsupported_kinds.contains(&kind) {
            return Err(WorkflowError::Warehouse(format!(
                "object type '{kind}' is not supported in this account"
            )));
        }
        let rows = self
            .schema(database, schema)?
            .objects
            .iter()
            .filter(|object| object.kind == kind)
            .map(|object| {
                Row::new([
                    ("name", object.name.as_str()),
                    ("database_name", database),
                    ("schema_name", schema),
                ])
            })
            .collect();
        Ok(rows)
    }

    fn get_ddl(&self, kind_text: &str, path: &str) -> Result<Vec<Row>> {
        let kind = ObjectKind::from_keyword(kind_text).ok_or_else(|| {
            WorkflowError::Warehouse(format!("unsupported object type '{kind_text}'"))
        })?;
        let parts: Vec<&str> = path.split('.').collect();
        let [database, schema, name] = parts[..] else {
            return Err(WorkflowError::Warehouse(format!(
                "GET_DDL expects a fully qualified name, got '{path}'"
            )));
        };
        let object = self
            .schema(database, schema)?
            .objects
            .iter()
            .find(|object| object.kind == kind && object.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                WorkflowError::Warehouse(format!("{kind} '{path}' does not exist"))
            })?;
        let ddl = object.ddl.as_deref().ok_or_else(|| {
            WorkflowError::Warehouse(format!("insufficient privileges to describe {kind} '{path}'"))
        })?;
        Ok(vec![Row::new([("GET_DDL", ddl)])])
    }
}

impl Warehouse for SnapshotWarehouse {
    fn execute(&mut self, sql: &str) -> Result<Vec<Row>> {
        let sql = sql.trim().trim_end_matches(';').trim();
        debug!(sql, "snapshot query");

        if let Some(caps) = SHOW_GRANTS.captures(sql) {
            let rows = self
                .schema(&caps[1], &caps[2])?
                .grants
                .iter()
                .map(SnapshotGrant::to_row)
                .collect();
            return Ok(rows);
        }
        if let Some(caps) = SHOW_SCHEMAS.captures(sql) {
            let rows = self
                .database(&caps[1])?
                .schemas
                .keys()
                .map(|name| Row::new([("name", name.as_str())]))
                .collect();
            return Ok(rows);
        }
        if let Some(caps) = SHOW_OBJECTS.captures(sql) {
            return self.show_objects(&caps[1], &caps[2], &caps[3]);
        }
        if let Some(caps) = GET_DDL.captures(sql) {
            return self.get_ddl(&caps[1], &caps[2]);
        }
        Err(WorkflowError::Warehouse(format!("unsupported command: {sql}")))
    }
}
