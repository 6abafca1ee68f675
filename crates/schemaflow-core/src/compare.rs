//! Comparison engine.
//!
//! Classifies objects and grants of a live schema against a proposed file
//! set, and reduces the result to a deployment [`Verdict`]. Everything here
//! is pure: callers gather the current state and read the proposed files.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog::{is_managed_privilege, ObjectKind};
use crate::environment::Environment;
use crate::grant::GrantStatement;
use crate::lexer::split_statements;
use crate::normalize::{normalize_ddl, normalize_grant};

/// Returns the comparison key of an object: `KIND:NAME`.
#[must_use]
pub fn object_key(kind: ObjectKind, name: &str) -> String {
    format!("{}:{}", kind.as_str(), name)
}

/// Per-object classification, keys sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectChanges {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ObjectChanges {
    /// Number of new, modified and removed objects.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.new.len() + self.modified.len() + self.removed.len()
    }
}

/// Classifies every object key of either side.
///
/// DDL is compared by its normalized form; normalizing already-normalized
/// text is a no-op, so either raw or normalized DDL may be passed.
#[must_use]
pub fn compare_objects(
    current: &BTreeMap<String, String>,
    proposed: &BTreeMap<String, String>,
) -> ObjectChanges {
    let keys: BTreeSet<&String> = current.keys().chain(proposed.keys()).collect();
    let mut changes = ObjectChanges::default();

    for key in keys {
        match (current.get(key), proposed.get(key)) {
            (None, Some(_)) => changes.new.push(key.clone()),
            (Some(_), None) => changes.removed.push(key.clone()),
            (Some(cur), Some(prop)) => {
                if normalize_ddl(cur) == normalize_ddl(prop) {
                    changes.unchanged.push(key.clone());
                } else {
                    changes.modified.push(key.clone());
                }
            }
            (None, None) => {}
        }
    }
    changes
}

/// Set classification of normalized grants. Grants have no "modified".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantChanges {
    pub new: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

/// Compares two grant collections by normalized form.
#[must_use]
pub fn compare_grants<'a, C, P>(current: C, proposed: P) -> GrantChanges
where
    C: IntoIterator<Item = &'a String>,
    P: IntoIterator<Item = &'a String>,
{
    let current: BTreeSet<String> = current.into_iter().map(|g| normalize_grant(g)).collect();
    let proposed: BTreeSet<String> = proposed.into_iter().map(|g| normalize_grant(g)).collect();

    GrantChanges {
        new: proposed.difference(&current).cloned().collect(),
        removed: current.difference(&proposed).cloned().collect(),
        unchanged: current.intersection(&proposed).cloned().collect(),
    }
}

/// Extracts `KIND:NAME -> statement` from a baseline script.
///
/// Only `CREATE` statements for catalog kinds are kept; a later statement
/// for the same key replaces an earlier one.
#[must_use]
pub fn parse_proposed_objects(script: &str) -> BTreeMap<String, String> {
    split_statements(script)
        .iter()
        .filter_map(|stmt| {
            let (kind, name) = stmt.created_object()?;
            Some((object_key(kind, &name), stmt.text().to_string()))
        })
        .collect()
}

/// Extracts normalized grants from a grants script: every line starting
/// with `GRANT`, trailing semicolons removed.
#[must_use]
pub fn parse_proposed_grants(script: &str) -> BTreeSet<String> {
    script
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.get(..5)
                .is_some_and(|head| head.eq_ignore_ascii_case("grant"))
        })
        .map(|line| normalize_grant(line.trim_end_matches(';')))
        .collect()
}

/// Removed grants split by why they disappear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedGrantTriage {
    /// Grants to roles of another environment (`QA_READER` when targeting
    /// SIT).
    pub environment_cleanup: Vec<String>,
    /// Grants of privileges on object kinds this tool does not manage.
    pub scope_cleanup: Vec<String>,
    /// Everything else.
    pub other: Vec<String>,
}

/// Splits removed grants. Environment cleanup is checked before scope
/// cleanup; unparseable grants land in `other`.
#[must_use]
pub fn triage_removed_grants<'a, I>(removed: I, target: Environment) -> RemovedGrantTriage
where
    I: IntoIterator<Item = &'a String>,
{
    let mut triage = RemovedGrantTriage::default();
    for grant in removed {
        let Some(parsed) = GrantStatement::parse(grant) else {
            triage.other.push(grant.clone());
            continue;
        };
        let wrong_env = target
            .others()
            .any(|env| parsed.grantee.starts_with(&format!("{}_", env.code())));
        if wrong_env {
            triage.environment_cleanup.push(grant.clone());
        } else if !is_managed_privilege(&parsed.privilege) {
            triage.scope_cleanup.push(grant.clone());
        } else {
            triage.other.push(grant.clone());
        }
    }
    triage
}

/// Deployment gate outcome. The discriminant is the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Target already matches: deploying is a no-op.
    NoChanges = 0,
    /// The comparison itself failed.
    Error = 1,
    /// Meaningful changes are pending.
    Changes = 2,
}

impl Verdict {
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        self as i32
    }
}

/// Full result of comparing a target schema with proposed files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub objects: ObjectChanges,
    pub grants: GrantChanges,
    pub removed_grants: RemovedGrantTriage,
}

impl Comparison {
    /// Compares current and proposed state for a target environment.
    #[must_use]
    pub fn new(
        current_objects: &BTreeMap<String, String>,
        proposed_objects: &BTreeMap<String, String>,
        current_grants: &BTreeSet<String>,
        proposed_grants: &BTreeSet<String>,
        target: Environment,
    ) -> Self {
        let objects = compare_objects(current_objects, proposed_objects);
        let grants = compare_grants(current_grants, proposed_grants);
        let removed_grants = triage_removed_grants(&grants.removed, target);
        Self {
            objects,
            grants,
            removed_grants,
        }
    }

    /// Changes that make a deployment necessary. Scope cleanup never counts.
    #[must_use]
    pub fn meaningful_changes(&self) -> usize {
        self.objects.change_count()
            + self.grants.new.len()
            + self.removed_grants.environment_cleanup.len()
            + self.removed_grants.other.len()
    }

    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.meaningful_changes() == 0 {
            Verdict::NoChanges
        } else {
            Verdict::Changes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn set(entries: &[&str]) -> BTreeSet<String> {
        entries.iter().map(|g| (*g).to_string()).collect()
    }

    #[test]
    fn test_compare_objects_classification() {
        let current = map(&[
            ("TABLE:A", "create table a (x int);"),
            ("TABLE:B", "create table b (x int)"),
            ("VIEW:C", "create view c as select 1"),
        ]);
        let proposed = map(&[
            ("TABLE:A", "CREATE TABLE A ( X INT )"),
            ("TABLE:B", "create table b (x int, y int)"),
            ("VIEW:D", "create view d as select 1"),
        ]);
        let changes = compare_objects(&current, &proposed);
        assert_eq!(changes.unchanged, vec!["TABLE:A"]);
        assert_eq!(changes.modified, vec!["TABLE:B"]);
        assert_eq!(changes.removed, vec!["VIEW:C"]);
        assert_eq!(changes.new, vec!["VIEW:D"]);
        assert_eq!(changes.change_count(), 3);
    }

    #[test]
    fn test_compare_grants() {
        let current = set(&[
            "GRANT USAGE ON SCHEMA IDENTIFIER('FOO') TO ROLE BAR",
            "GRANT MONITOR ON SCHEMA FOO TO ROLE OLD",
        ]);
        let proposed = set(&[
            "grant usage on schema foo to role bar",
            "GRANT MODIFY ON SCHEMA FOO TO ROLE NEW",
        ]);
        let changes = compare_grants(&current, &proposed);
        assert_eq!(changes.unchanged, set(&["GRANT USAGE ON SCHEMA FOO TO ROLE BAR"]));
        assert_eq!(changes.new, set(&["GRANT MODIFY ON SCHEMA FOO TO ROLE NEW"]));
        assert_eq!(changes.removed, set(&["GRANT MONITOR ON SCHEMA FOO TO ROLE OLD"]));
    }

    #[test]
    fn test_identical_state_is_no_op() {
        let objects = map(&[("TABLE:A", "CREATE TABLE A (X INT)")]);
        let grants = set(&["GRANT USAGE ON SCHEMA S TO ROLE R"]);
        let comparison = Comparison::new(&objects, &objects, &grants, &grants, Environment::Sit);
        assert_eq!(comparison.objects.change_count(), 0);
        assert_eq!(comparison.meaningful_changes(), 0);
        assert_eq!(comparison.verdict(), Verdict::NoChanges);
        assert_eq!(comparison.verdict().exit_code(), 0);
    }

    #[test]
    fn test_triage_removed_grants() {
        let removed = set(&[
            "GRANT USAGE ON SCHEMA S TO ROLE QA_READER",
            "GRANT USAGE ON SCHEMA S TO ROLE SIT_READER",
            "GRANT CREATE MASKING POLICY ON SCHEMA S TO ROLE ADMIN",
            "GRANT CREATE TABLE ON SCHEMA S TO ROLE PROD_ADMIN",
            "NOT A GRANT",
        ]);
        let triage = triage_removed_grants(&removed, Environment::Sit);
        assert_eq!(
            triage.environment_cleanup,
            vec![
                "GRANT CREATE TABLE ON SCHEMA S TO ROLE PROD_ADMIN",
                "GRANT USAGE ON SCHEMA S TO ROLE QA_READER",
            ]
        );
        assert_eq!(
            triage.scope_cleanup,
            vec!["GRANT CREATE MASKING POLICY ON SCHEMA S TO ROLE ADMIN"]
        );
        assert_eq!(
            triage.other,
            vec!["GRANT USAGE ON SCHEMA S TO ROLE SIT_READER", "NOT A GRANT"]
        );
    }

    #[test]
    fn test_scope_cleanup_alone_is_not_meaningful() {
        let objects = BTreeMap::new();
        let current = set(&["GRANT CREATE TAG ON SCHEMA S TO ROLE ADMIN"]);
        let comparison =
            Comparison::new(&objects, &objects, &current, &BTreeSet::new(), Environment::Qa);
        assert_eq!(comparison.removed_grants.scope_cleanup.len(), 1);
        assert_eq!(comparison.verdict(), Verdict::NoChanges);

        let current = set(&["GRANT USAGE ON SCHEMA S TO ROLE SIT_READER"]);
        let comparison =
            Comparison::new(&objects, &objects, &current, &BTreeSet::new(), Environment::Qa);
        assert_eq!(comparison.verdict(), Verdict::Changes);
        assert_eq!(comparison.verdict().exit_code(), 2);
    }

    #[test]
    fn test_parse_proposed_objects() {
        let script = "-- FINAL VERSION: S Schema\n\
                      -- header; with semicolon\n\
                      CREATE OR REPLACE TABLE orders (id INT, note VARCHAR DEFAULT 'a;b');\n\
                      create secure view PLATFORM_SIT.S.V_ORDERS as select * from orders;\n\
                      ALTER TABLE orders ADD COLUMN x INT;\n\
                      CREATE TASK t AS $$ select 1; $$;\n";
        let objects = parse_proposed_objects(script);
        let keys: Vec<_> = objects.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["TABLE:ORDERS", "TASK:T", "VIEW:V_ORDERS"]);
        assert_eq!(
            objects["TABLE:ORDERS"],
            "CREATE OR REPLACE TABLE orders (id INT, note VARCHAR DEFAULT 'a;b')"
        );
    }

    #[test]
    fn test_parse_proposed_grants() {
        let script = "-- Grants\n\
                      GRANT USAGE ON SCHEMA IDENTIFIER('DB.S') TO ROLE R;\n\
                      grant monitor on schema DB.S to role R;\n\
                      -- GRANT OWNERSHIP ON SCHEMA DB.S TO ROLE X;\n\
                      \n";
        let grants = parse_proposed_grants(script);
        assert_eq!(
            grants,
            set(&[
                "GRANT MONITOR ON SCHEMA DB.S TO ROLE R",
                "GRANT USAGE ON SCHEMA DB.S TO ROLE R",
            ])
        );
    }
}
