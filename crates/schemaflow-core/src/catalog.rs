//! Object catalog descriptor.
//!
//! Static knowledge about the warehouse objects this system manages: which
//! object kinds are extracted (in dependency order), how each kind is listed,
//! which names belong to the system rather than the user, and which
//! privileges are never dropped by grant filtering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name prefixes of system-owned objects that are never extracted.
const SYSTEM_PREFIXES: &[&str] = &["SYSTEM$", "INFORMATION_SCHEMA"];

/// Privileges that are always kept, whatever object kind they relate to.
pub const ESSENTIAL_PRIVILEGES: &[&str] = &[
    "USAGE",
    "OWNERSHIP",
    "MONITOR",
    "CREATE TABLE",
    "CREATE VIEW",
    "MODIFY",
];

/// Kinds of schema objects that are extracted and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectKind {
    /// File format.
    FileFormat,
    /// Sequence.
    Sequence,
    /// Stage.
    Stage,
    /// Table.
    Table,
    /// View.
    View,
    /// Materialized view.
    MaterializedView,
    /// Dynamic table.
    DynamicTable,
    /// Stream.
    Stream,
    /// Pipe.
    Pipe,
    /// Task.
    Task,
}

impl ObjectKind {
    /// Every managed kind, in the order objects must be created.
    pub const ALL: [Self; 10] = [
        Self::FileFormat,
        Self::Sequence,
        Self::Stage,
        Self::Table,
        Self::View,
        Self::MaterializedView,
        Self::DynamicTable,
        Self::Stream,
        Self::Pipe,
        Self::Task,
    ];

    /// Returns the SQL keyword(s) for this kind, e.g. `MATERIALIZED VIEW`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FileFormat => "FILE FORMAT",
            Self::Sequence => "SEQUENCE",
            Self::Stage => "STAGE",
            Self::Table => "TABLE",
            Self::View => "VIEW",
            Self::MaterializedView => "MATERIALIZED VIEW",
            Self::DynamicTable => "DYNAMIC TABLE",
            Self::Stream => "STREAM",
            Self::Pipe => "PIPE",
            Self::Task => "TASK",
        }
    }

    /// Returns the plural form used by listing commands.
    #[must_use]
    pub const fn plural(&self) -> &'static str {
        match self {
            Self::FileFormat => "FILE FORMATS",
            Self::Sequence => "SEQUENCES",
            Self::Stage => "STAGES",
            Self::Table => "TABLES",
            Self::View => "VIEWS",
            Self::MaterializedView => "MATERIALIZED VIEWS",
            Self::DynamicTable => "DYNAMIC TABLES",
            Self::Stream => "STREAMS",
            Self::Pipe => "PIPES",
            Self::Task => "TASKS",
        }
    }

    /// Parses a kind from its singular or plural keyword form.
    ///
    /// Matching ignores case and collapses internal whitespace, so
    /// `"materialized   views"` resolves to [`ObjectKind::MaterializedView`].
    #[must_use]
    pub fn from_keyword(text: &str) -> Option<Self> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let normalized = words.join(" ").to_uppercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized || kind.plural() == normalized)
    }

    /// Returns the listing command for this kind within a schema.
    #[must_use]
    pub fn listing_command(&self, schema: &SchemaCoordinate) -> String {
        format!(
            "SHOW {} IN SCHEMA {}.{}",
            self.plural(),
            schema.database,
            schema.schema
        )
    }

    /// Returns the query that fetches the canonical DDL of one object.
    #[must_use]
    pub fn ddl_query(&self, schema: &SchemaCoordinate, name: &str) -> String {
        format!(
            "SELECT GET_DDL('{}', '{}.{}.{}')",
            self.as_str(),
            schema.database,
            schema.schema,
            name
        )
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `database.schema` coordinate in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaCoordinate {
    /// Database name.
    pub database: String,
    /// Schema name.
    pub schema: String,
}

impl SchemaCoordinate {
    /// Creates a new coordinate.
    #[must_use]
    pub fn new(database: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
        }
    }

    /// Returns the ordered `(kind, listing command)` pairs to enumerate.
    #[must_use]
    pub fn listing_commands(&self) -> Vec<(ObjectKind, String)> {
        ObjectKind::ALL
            .into_iter()
            .map(|kind| (kind, kind.listing_command(self)))
            .collect()
    }

    /// Returns the command listing the grants on this schema.
    #[must_use]
    pub fn grants_command(&self) -> String {
        format!("SHOW GRANTS ON SCHEMA {}.{}", self.database, self.schema)
    }

    /// Returns the command listing the schemas of this coordinate's database.
    #[must_use]
    pub fn schemas_command(&self) -> String {
        format!("SHOW SCHEMAS IN DATABASE {}", self.database)
    }
}

impl fmt::Display for SchemaCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.schema)
    }
}

/// Returns true if `name` is a user-defined object rather than a system one.
#[must_use]
pub fn is_user_defined(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let upper = name.to_uppercase();
    !SYSTEM_PREFIXES
        .iter()
        .any(|prefix| upper.starts_with(prefix))
}

/// Returns true if `privilege` is exempt from grant filtering.
#[must_use]
pub fn is_essential_privilege(privilege: &str) -> bool {
    let upper = privilege.trim().to_uppercase();
    ESSENTIAL_PRIVILEGES.contains(&upper.as_str())
}

/// Returns true if a privilege concerns something this system manages.
///
/// Only `CREATE <kind>` privileges can fall outside the managed scope: they
/// are managed when `<kind>` is a catalog kind (singular or plural) or the
/// privilege is essential.
#[must_use]
pub fn is_managed_privilege(privilege: &str) -> bool {
    let upper = privilege.trim().to_uppercase();
    match upper.strip_prefix("CREATE ") {
        Some(kind) => ObjectKind::from_keyword(kind).is_some() || is_essential_privilege(&upper),
        None => true,
    }
}
