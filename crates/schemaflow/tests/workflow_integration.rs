//! Integration tests for the extract, review, generate and commit workflow
//! and the deployment gate, run against in-memory catalog snapshots.

use std::path::Path;

use schemaflow::config::RunnerConfig;
use schemaflow::prelude::*;
use schemaflow::review::load_decisions;
use schemaflow_core::{Environment, ObjectKind, Verdict};
use tempfile::TempDir;

const SCHEMA: &str = "REPORTING";

const ORDERS_SIT: &str = "create or replace TABLE ORDERS (\n\tID NUMBER(38,0),\n\tSTATUS VARCHAR(16)\n);";
const OPEN_ORDERS_SIT: &str = "create or replace view V_OPEN_ORDERS as select * from PLATFORM_SIT.REPORTING.ORDERS where status = 'OPEN';";
const CLOSED_ORDERS_SIT: &str = "create or replace view V_CLOSED_ORDERS as select * from PLATFORM_SIT.REPORTING.ORDERS where status = 'CLOSED';";

fn sit_warehouse() -> SnapshotWarehouse {
    SnapshotWarehouse::new()
        .with_object("PLATFORM_SIT", SCHEMA, ObjectKind::Table, "ORDERS", Some(ORDERS_SIT))
        .with_object(
            "PLATFORM_SIT",
            SCHEMA,
            ObjectKind::View,
            "V_OPEN_ORDERS",
            Some(OPEN_ORDERS_SIT),
        )
        .with_object(
            "PLATFORM_SIT",
            SCHEMA,
            ObjectKind::View,
            "V_CLOSED_ORDERS",
            Some(CLOSED_ORDERS_SIT),
        )
        .with_grant("PLATFORM_SIT", SCHEMA, SnapshotGrant::role("USAGE", "READER"))
}

/// The same schema as deployed in QA.
fn qa_warehouse() -> SnapshotWarehouse {
    SnapshotWarehouse::new()
        .with_object("PLATFORM_QA", SCHEMA, ObjectKind::Table, "ORDERS", Some(ORDERS_SIT))
        .with_object(
            "PLATFORM_QA",
            SCHEMA,
            ObjectKind::View,
            "V_OPEN_ORDERS",
            Some(&OPEN_ORDERS_SIT.replace("PLATFORM_SIT", "PLATFORM_QA")),
        )
        .with_object(
            "PLATFORM_QA",
            SCHEMA,
            ObjectKind::View,
            "V_CLOSED_ORDERS",
            Some(&CLOSED_ORDERS_SIT.replace("PLATFORM_SIT", "PLATFORM_QA")),
        )
        .with_grant("PLATFORM_QA", SCHEMA, SnapshotGrant::role("USAGE", "READER"))
}

fn workflow(root: &Path) -> Workflow {
    Workflow::new(root, SCHEMA, Config::default())
}

fn request() -> ExtractRequest {
    ExtractRequest::new("PLATFORM_SIT").db_base(Some("PLATFORM".to_string()))
}

fn accept_all() -> ScriptedPrompt {
    ScriptedPrompt::new(std::iter::repeat("y").take(50))
}

fn step(workflow: &Workflow) -> WorkflowStep {
    workflow.paths().state_store().current_step().unwrap()
}

fn sql_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".sql"))
        .collect();
    names.sort();
    names
}

#[test]
fn review_before_extract_is_rejected() {
    let root = TempDir::new().unwrap();
    let wf = workflow(root.path());

    let err = wf.review(&mut accept_all()).unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InvalidState {
            expected: WorkflowStep::ExtractionComplete,
            actual: WorkflowStep::NotStarted,
        }
    ));
    assert!(!wf.paths().decisions_file().exists());
}

#[test]
fn generate_and_commit_require_their_state() {
    let root = TempDir::new().unwrap();
    let wf = workflow(root.path());
    wf.extract(&mut sit_warehouse(), &request()).unwrap();

    let err = wf.generate().unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InvalidState {
            expected: WorkflowStep::ReviewComplete,
            actual: WorkflowStep::ExtractionComplete,
        }
    ));
    assert!(!wf.paths().final_dir().join("V1000__baseline_from_PLATFORM_SIT.sql").exists());

    wf.review(&mut accept_all()).unwrap();
    let err = wf.commit(false).unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InvalidState {
            expected: WorkflowStep::FinalGenerated,
            actual: WorkflowStep::ReviewComplete,
        }
    ));
    assert!(sql_names(wf.paths().schema_dir()).is_empty());
}

#[test]
fn extraction_writes_raw_files_and_state() {
    let root = TempDir::new().unwrap();
    let wf = workflow(root.path());

    let summary = wf.extract(&mut sit_warehouse(), &request()).unwrap();
    assert_eq!(summary.object_count, 3);
    assert_eq!(summary.grant_count, 1);
    assert_eq!(
        sql_names(&wf.paths().raw_dir()),
        vec![
            "V1000__baseline_from_PLATFORM_SIT.sql",
            "V1001__grants_from_PLATFORM_SIT.sql"
        ]
    );

    let state = wf.paths().state_store().load().unwrap();
    assert_eq!(state.current_step, WorkflowStep::ExtractionComplete);
    assert_eq!(state.detail_str("database"), Some("PLATFORM_SIT"));
    assert_eq!(state.detail_str("db_base"), Some("PLATFORM"));

    let raw = std::fs::read_to_string(
        wf.paths().raw_dir().join("V1000__baseline_from_PLATFORM_SIT.sql"),
    )
    .unwrap();
    assert!(raw.contains("from PLATFORM_SIT.REPORTING.ORDERS"));

    let grants =
        std::fs::read_to_string(wf.paths().raw_dir().join("V1001__grants_from_PLATFORM_SIT.sql"))
            .unwrap();
    assert!(grants.contains(
        "GRANT USAGE ON SCHEMA IDENTIFIER('{{ DB_PREFIX }}_{{ DB_BASE }}_{{ ENV }}.REPORTING') TO ROLE READER;"
    ));
}

#[test]
fn empty_schema_leaves_no_workflow_behind() {
    let root = TempDir::new().unwrap();
    let wf = Workflow::new(root.path(), "GHOST", Config::default());

    let err = wf.extract(&mut sit_warehouse(), &request()).unwrap_err();
    assert!(matches!(err, WorkflowError::EmptyExtraction { .. }));
    assert!(!wf.paths().temp_dir().exists());
    assert_eq!(wf.status().unwrap(), Status::Inactive);
}

#[test]
fn extract_restarts_a_finished_workflow() {
    let root = TempDir::new().unwrap();
    let wf = workflow(root.path());
    wf.extract(&mut sit_warehouse(), &request()).unwrap();
    wf.review(&mut accept_all()).unwrap();
    wf.generate().unwrap();
    assert_eq!(step(&wf), WorkflowStep::FinalGenerated);

    wf.extract(&mut sit_warehouse(), &request()).unwrap();
    assert_eq!(step(&wf), WorkflowStep::ExtractionComplete);
    assert!(!wf.paths().decisions_file().exists());
    assert!(!wf.paths().final_dir().join("V1000__baseline_from_PLATFORM_SIT.sql").exists());
}

#[test]
fn full_workflow_then_compare_with_qa() {
    let root = TempDir::new().unwrap();
    let wf = workflow(root.path());

    wf.extract(&mut sit_warehouse(), &request()).unwrap();

    let mut prompt = accept_all();
    let ReviewOutcome::Completed(summary) = wf.review(&mut prompt).unwrap() else {
        panic!("review should complete");
    };
    assert!(!summary.decisions.is_empty());
    assert_eq!(summary.rejected().count(), 0);
    assert!(wf.paths().analysis_markdown().exists());
    assert!(wf.paths().analysis_json().exists());
    assert_eq!(
        load_decisions(&wf.paths().decisions_file()).unwrap().len(),
        summary.decisions.len()
    );
    assert_eq!(step(&wf), WorkflowStep::ReviewComplete);

    wf.generate().unwrap();
    assert_eq!(step(&wf), WorkflowStep::FinalGenerated);
    let baseline = std::fs::read_to_string(
        wf.paths().final_dir().join("V1000__baseline_from_PLATFORM_SIT.sql"),
    )
    .unwrap();
    assert!(baseline.contains("-- FINAL VERSION: REPORTING Schema"));
    assert!(baseline.contains(
        "from {{DB_BASE}}_{{ENV}}.REPORTING.ORDERS where status = 'OPEN';"
    ));
    assert!(baseline.contains(
        "from {{DB_BASE}}_{{ENV}}.REPORTING.ORDERS where status = 'CLOSED';"
    ));

    let committed = wf.commit(false).unwrap();
    assert_eq!(committed.len(), 2);
    assert_eq!(step(&wf), WorkflowStep::Committed);
    assert_eq!(
        sql_names(wf.paths().schema_dir()),
        vec![
            "V1000__baseline_from_PLATFORM_SIT.sql",
            "V1001__grants_from_PLATFORM_SIT.sql"
        ]
    );

    let placeholders = wf.placeholders(Environment::Qa, Some("PLATFORM"), None).unwrap();
    assert_eq!(placeholders.database_name(), "PLATFORM_QA");
    let outcome = wf.gate(placeholders.clone(), None).run(&mut qa_warehouse()).unwrap();
    assert_eq!(outcome.verdict(), Verdict::NoChanges);

    // A table that exists in QA only is a pending change.
    let mut drifted = qa_warehouse().with_object(
        "PLATFORM_QA",
        SCHEMA,
        ObjectKind::Table,
        "AUDIT",
        Some("create or replace TABLE AUDIT (ID NUMBER(38,0));"),
    );
    let outcome = wf.gate(placeholders, None).run(&mut drifted).unwrap();
    assert_eq!(outcome.verdict(), Verdict::Changes);
}

#[test]
fn compare_against_missing_schema_is_first_deployment() {
    let root = TempDir::new().unwrap();
    let wf = workflow(root.path());
    wf.extract(&mut sit_warehouse(), &request()).unwrap();
    wf.review(&mut accept_all()).unwrap();
    wf.generate().unwrap();
    wf.commit(false).unwrap();

    let mut uat = SnapshotWarehouse::new().with_schema("PLATFORM_UAT", "OTHER");
    let placeholders = wf.placeholders(Environment::Uat, Some("PLATFORM"), None).unwrap();
    let outcome = wf.gate(placeholders, None).run(&mut uat).unwrap();
    assert!(matches!(outcome, GateOutcome::FirstDeployment { .. }));
    assert_eq!(outcome.verdict(), Verdict::Changes);
}

#[test]
fn compare_needs_a_database_base() {
    let root = TempDir::new().unwrap();
    let wf = workflow(root.path());
    let err = wf.placeholders(Environment::Qa, None, None).unwrap_err();
    assert!(matches!(err, WorkflowError::Config(_)));

    let configured = Workflow::new(
        root.path(),
        SCHEMA,
        Config::from_toml("[db_bases]\nREPORTING = \"PLATFORM\"").unwrap(),
    );
    let placeholders = configured
        .placeholders(Environment::Prod, None, Some("TEST"))
        .unwrap();
    assert_eq!(placeholders.database_name(), "TEST_PLATFORM_PROD");
}

#[test]
fn quit_review_then_resume() {
    let root = TempDir::new().unwrap();
    let wf = workflow(root.path());
    wf.extract(&mut sit_warehouse(), &request()).unwrap();

    let mut prompt = ScriptedPrompt::new(["y", "q"]);
    let ReviewOutcome::Quit { decided, total } = wf.review(&mut prompt).unwrap() else {
        panic!("review should stop at quit");
    };
    assert_eq!(decided, 1);
    assert!(total >= 2);
    assert!(wf.paths().partial_decisions_file().exists());
    assert!(!wf.paths().decisions_file().exists());
    assert_eq!(step(&wf), WorkflowStep::ExtractionComplete);

    // Running out of input behaves like quit.
    let outcome = wf.review(&mut ScriptedPrompt::new(Vec::<String>::new())).unwrap();
    assert_eq!(outcome, ReviewOutcome::Quit { decided: 1, total });

    let mut prompt = accept_all();
    let ReviewOutcome::Completed(summary) = wf.review(&mut prompt).unwrap() else {
        panic!("resumed review should complete");
    };
    assert_eq!(summary.decisions.len(), total);
    assert_eq!(prompt.remaining(), 50 - (total - 1));
    assert!(!wf.paths().partial_decisions_file().exists());
    assert_eq!(step(&wf), WorkflowStep::ReviewComplete);
}

#[test]
fn rejected_suggestions_keep_literals() {
    let root = TempDir::new().unwrap();
    let wf = workflow(root.path());
    wf.extract(&mut sit_warehouse(), &request()).unwrap();

    // Every suggestion rejected with an empty note.
    let mut prompt = ScriptedPrompt::new(std::iter::repeat("n").take(100));
    let ReviewOutcome::Completed(summary) = wf.review(&mut prompt).unwrap() else {
        panic!("review should complete");
    };
    assert_eq!(summary.accepted().count(), 0);

    wf.generate().unwrap();
    let baseline = std::fs::read_to_string(
        wf.paths().final_dir().join("V1000__baseline_from_PLATFORM_SIT.sql"),
    )
    .unwrap();
    assert!(baseline.contains("from PLATFORM_SIT.REPORTING.ORDERS"));
    assert!(!baseline.contains("{{DB_BASE}}_{{ENV}}"));
}

#[test]
fn commit_dry_run_changes_nothing() {
    let root = TempDir::new().unwrap();
    let wf = workflow(root.path());
    wf.extract(&mut sit_warehouse(), &request()).unwrap();
    wf.review(&mut accept_all()).unwrap();
    wf.generate().unwrap();

    let files = wf.commit(true).unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| !f.target.exists()));
    assert_eq!(step(&wf), WorkflowStep::FinalGenerated);
}

#[test]
fn status_and_clean() {
    let root = TempDir::new().unwrap();
    let wf = workflow(root.path());
    assert_eq!(wf.status().unwrap(), Status::Inactive);
    assert!(!wf.clean().unwrap());

    wf.extract(&mut sit_warehouse(), &request()).unwrap();
    match wf.status().unwrap() {
        Status::Active { state, next } => {
            assert_eq!(state.current_step, WorkflowStep::ExtractionComplete);
            assert_eq!(next, Some(Transition::Review));
        }
        Status::Inactive => panic!("workflow should be active"),
    }
    wf.print_status().unwrap();

    assert!(wf.clean().unwrap());
    assert_eq!(wf.status().unwrap(), Status::Inactive);
}

#[cfg(unix)]
#[test]
fn deploy_runs_gate_then_runner() {
    let root = TempDir::new().unwrap();
    let config = Config {
        runner: RunnerConfig {
            program: "true".to_string(),
            config_file: None,
        },
        ..Config::default()
    };
    let wf = Workflow::new(root.path(), SCHEMA, config);
    wf.extract(&mut sit_warehouse(), &request()).unwrap();
    wf.review(&mut accept_all()).unwrap();
    wf.generate().unwrap();
    wf.commit(false).unwrap();

    let placeholders = wf.placeholders(Environment::Qa, Some("PLATFORM"), None).unwrap();
    let (outcome, _) = wf
        .deploy(&mut qa_warehouse(), &placeholders, true, false)
        .unwrap();
    assert_eq!(outcome.verdict(), Verdict::NoChanges);

    // A warehouse without the target database fails the gate.
    let err = wf
        .deploy(&mut SnapshotWarehouse::new(), &placeholders, true, false)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Warehouse(_)));
}
