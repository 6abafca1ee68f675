//! End-to-end behavior of the analyzer, normalizer and comparison engine.

use std::collections::{BTreeMap, BTreeSet};

use schemaflow_core::analyzer::{REASON_FROM_JOIN, REASON_UNCLEAR};
use schemaflow_core::compare::{parse_proposed_grants, parse_proposed_objects};
use schemaflow_core::normalize::{
    normalize_ddl, normalize_grant, render_placeholders, retarget_environment,
};
use schemaflow_core::{Comparison, Environment, Placeholders, TemplatingAnalyzer, Verdict};

const BASELINE: &str = "\
-- Schema extraction from PLATFORM_SIT.REPORTING
CREATE OR REPLACE TABLE ORDERS (
    ID NUMBER(38,0),
    STATUS VARCHAR(16)
);
create or replace view V_OPEN_ORDERS as
    select * from PLATFORM_SIT.REPORTING.ORDERS where status = 'OPEN';
";

const GRANTS: &str = "\
-- Grants for REPORTING
GRANT USAGE ON SCHEMA IDENTIFIER('{{ DB_PREFIX }}_{{ DB_BASE }}_{{ ENV }}.REPORTING') TO ROLE READER;
GRANT CREATE TABLE ON SCHEMA IDENTIFIER('{{ DB_PREFIX }}_{{ DB_BASE }}_{{ ENV }}.REPORTING') TO ROLE LOADER;
";

#[test]
fn create_table_reference_is_unsafe() {
    let analyzer = TemplatingAnalyzer::new("PLATFORM").unwrap();
    let report = analyzer.analyze([("raw.sql", "CREATE TABLE PLATFORM_SIT.FOO (ID INT)")]);
    let suggestion = report.suggestions().next().unwrap();
    assert_eq!(suggestion.original, "PLATFORM_SIT");
    assert!(!suggestion.is_safe);
    assert!(suggestion.reason.contains("table/view name"));
}

#[test]
fn from_clause_reference_is_safe() {
    let analyzer = TemplatingAnalyzer::new("PLATFORM").unwrap();
    let report = analyzer.analyze([("raw.sql", "SELECT * FROM PLATFORM_SIT.FOO.BAR")]);
    let suggestion = report.suggestions().next().unwrap();
    assert!(suggestion.is_safe);
    assert_eq!(suggestion.reason, REASON_FROM_JOIN);
    assert_eq!(report.cross_database_refs().count(), 1);
}

#[test]
fn cross_database_refs_are_never_suggested() {
    let analyzer = TemplatingAnalyzer::new("PLATFORM").unwrap();
    let report = analyzer.analyze([("raw.sql", BASELINE)]);
    let refs: Vec<_> = report
        .cross_database_refs()
        .map(|r| r.reference.clone())
        .collect();
    assert!(!refs.is_empty());
    for suggestion in report.suggestions() {
        assert!(!refs.contains(&suggestion.original));
    }
}

#[test]
fn unrecognized_context_is_never_safe() {
    let analyzer = TemplatingAnalyzer::new("PLATFORM").unwrap();
    for sql in [
        "USE PLATFORM_SIT",
        "CALL PLATFORM_SIT.S.P()",
        "SET DB = PLATFORM_SIT",
        "INSERT INTO PLATFORM_SIT.S.T VALUES (1)",
        "COPY INTO PLATFORM_SIT.S.T",
    ] {
        let report = analyzer.analyze([("raw.sql", sql)]);
        let suggestion = report.suggestions().next().unwrap();
        assert!(!suggestion.is_safe, "{sql}");
        assert_eq!(suggestion.reason, REASON_UNCLEAR, "{sql}");
    }
}

#[test]
fn identifier_wrapped_grant_normalizes_equal() {
    assert_eq!(
        normalize_grant("GRANT USAGE ON SCHEMA IDENTIFIER('FOO') TO ROLE BAR"),
        normalize_grant("grant usage on schema foo to role bar")
    );
}

#[test]
fn normalization_is_idempotent() {
    for text in BASELINE.split(';').chain(GRANTS.lines()) {
        let ddl = normalize_ddl(text);
        assert_eq!(normalize_ddl(&ddl), ddl);
        let grant = normalize_grant(text);
        assert_eq!(normalize_grant(&grant), grant);
    }
}

#[test]
fn rendered_proposal_matches_live_state() {
    let values = Placeholders::new(Environment::Qa, "PLATFORM").with_prefix(Some("TEST".into()));
    let baseline = retarget_environment(&render_placeholders(BASELINE, &values), Environment::Qa);
    let grants = render_placeholders(GRANTS, &values);

    let proposed_objects = parse_proposed_objects(&baseline);
    let proposed_grants = parse_proposed_grants(&grants);
    assert_eq!(proposed_objects.len(), 2);
    assert_eq!(proposed_grants.len(), 2);

    // The live QA schema holds the same objects, formatted differently.
    let current_objects: BTreeMap<String, String> = [
        (
            "TABLE:ORDERS".to_string(),
            "create or replace TABLE ORDERS (\n\tID NUMBER(38,0),\n\tSTATUS VARCHAR(16)\n);"
                .to_string(),
        ),
        (
            "VIEW:V_OPEN_ORDERS".to_string(),
            "create or replace view V_OPEN_ORDERS as select * from PLATFORM_QA.REPORTING.ORDERS where status = 'OPEN'"
                .to_string(),
        ),
    ]
    .into_iter()
    .collect();
    let current_grants: BTreeSet<String> = [
        "GRANT USAGE ON SCHEMA TEST_PLATFORM_QA.REPORTING TO ROLE READER",
        "GRANT CREATE TABLE ON SCHEMA TEST_PLATFORM_QA.REPORTING TO ROLE LOADER",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    let comparison = Comparison::new(
        &current_objects,
        &proposed_objects,
        &current_grants,
        &proposed_grants,
        Environment::Qa,
    );
    assert_eq!(comparison.objects.unchanged.len(), 2);
    assert_eq!(comparison.grants.unchanged.len(), 2);
    assert_eq!(comparison.verdict(), Verdict::NoChanges);
}

#[test]
fn modified_object_is_a_change() {
    let current: BTreeMap<String, String> =
        [("TABLE:T".to_string(), "CREATE TABLE T (A INT)".to_string())]
            .into_iter()
            .collect();
    let proposed: BTreeMap<String, String> =
        [("TABLE:T".to_string(), "CREATE TABLE T (A INT, B INT)".to_string())]
            .into_iter()
            .collect();
    let grants = BTreeSet::new();
    let comparison = Comparison::new(&current, &proposed, &grants, &grants, Environment::Uat);
    assert_eq!(comparison.objects.modified, vec!["TABLE:T"]);
    assert_eq!(comparison.verdict(), Verdict::Changes);
}
