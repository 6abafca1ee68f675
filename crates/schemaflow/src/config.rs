//! Project configuration (`schemaflow.toml`).
//!
//! Every section is optional:
//!
//! ```toml
//! db_prefix = "TEST"
//!
//! [db_bases]
//! DATA_AMS = "ALTO"
//!
//! [role_map]
//! LEGACY_LOADER = "LOADER"
//!
//! [review]
//! decision_scope = "origin-file"
//!
//! [runner]
//! program = "schemachange"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use schemaflow_core::Environment;

use crate::error::Result;

/// Which files an accepted decision is applied to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionScope {
    /// Every accepted replacement is applied to every file.
    #[default]
    AllFiles,
    /// A replacement is applied only to the file its suggestion came from.
    OriginFile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReviewConfig {
    pub decision_scope: DecisionScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Migration-runner executable.
    pub program: String,
    /// Explicit runner config file; generated when absent.
    pub config_file: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "schemachange".to_string(),
            config_file: None,
        }
    }
}

/// Parsed `schemaflow.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Default database-name prefix.
    pub db_prefix: Option<String>,
    /// Schema name to database base.
    pub db_bases: BTreeMap<String, String>,
    /// Grantee renames applied during extraction.
    pub role_map: BTreeMap<String, String>,
    pub review: ReviewConfig,
    pub runner: RunnerConfig,
}

impl Config {
    /// Loads the configuration file; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parses configuration text.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML or unknown keys.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Resolves the prefix: explicit value first, then configuration.
    /// Empty strings mean "no prefix".
    #[must_use]
    pub fn db_prefix(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.db_prefix.clone())
            .filter(|prefix| !prefix.is_empty())
    }

    /// Resolves the database base for `schema`: explicit value, then
    /// `[db_bases]`, then derivation from `database` if one is given.
    #[must_use]
    pub fn db_base(
        &self,
        schema: &str,
        explicit: Option<&str>,
        database: Option<&str>,
        prefix: Option<&str>,
    ) -> Option<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.db_bases.get(schema).cloned())
            .or_else(|| database.and_then(|db| derive_db_base(db, prefix)))
            .filter(|base| !base.is_empty())
    }

    /// Maps a grantee through `[role_map]`.
    #[must_use]
    pub fn map_role<'a>(&'a self, grantee: &'a str) -> &'a str {
        self.role_map.get(grantee).map_or(grantee, String::as_str)
    }
}

/// Derives the base of a database name by removing a trailing `_<ENV>` and
/// a leading `<prefix>_`: `TEST_PLATFORM_SIT` gives `PLATFORM`.
#[must_use]
pub fn derive_db_base(database: &str, prefix: Option<&str>) -> Option<String> {
    let (base, _) = Environment::split_suffix(database)?;
    let base = prefix
        .and_then(|p| base.strip_prefix(p).and_then(|rest| rest.strip_prefix('_')))
        .unwrap_or(base);
    (!base.is_empty()).then(|| base.to_string())
}
