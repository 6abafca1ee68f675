//! Final version generation from review decisions.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::config::DecisionScope;
use crate::error::{Result, WorkflowError};
use crate::paths::{file_name, sql_files, write_atomic, WorkflowPaths};
use crate::review::{load_decisions, DecisionRecord};
use crate::state::{Transition, WorkflowStep};

const CONTENT_BANNER: &str = "\
-- ==========================================
-- SCHEMA CONTENT BELOW
-- ==========================================

";

/// Applies the accepted decisions to one file, in decision order, as
/// literal replacements of every occurrence.
///
/// With [`DecisionScope::AllFiles`] every accepted decision is applied,
/// whichever file it came from. A decision counts as applied when the
/// result contains its replacement text.
#[must_use]
pub fn apply_decisions<'d>(
    content: &str,
    file: &str,
    decisions: &'d [DecisionRecord],
    scope: DecisionScope,
) -> (String, Vec<&'d DecisionRecord>) {
    let mut content = content.to_string();
    let mut applied = Vec::new();
    for decision in decisions.iter().filter(|d| d.is_accepted()) {
        if scope == DecisionScope::OriginFile && decision.file != file {
            continue;
        }
        content = content.replace(&decision.original, &decision.suggested);
        if content.contains(&decision.suggested) {
            applied.push(decision);
        }
    }
    (content, applied)
}

fn scope_note(scope: DecisionScope) -> &'static str {
    match scope {
        DecisionScope::AllFiles => "accepted decisions apply to every file",
        DecisionScope::OriginFile => "accepted decisions apply to their file of origin only",
    }
}

fn header_with_decisions(
    schema: &str,
    file: &str,
    applied: &[&DecisionRecord],
    scope: DecisionScope,
    generated_at: &str,
) -> String {
    let mut header = String::new();
    let _ = writeln!(header, "-- FINAL VERSION: {schema} Schema");
    let _ = writeln!(header, "-- File: {file}");
    let _ = writeln!(header, "-- Generated at: {generated_at}");
    let _ = writeln!(header, "-- Based on: {} templating decisions", applied.len());
    let _ = writeln!(header, "-- Decision scope: {}\n", scope_note(scope));
    if applied.is_empty() {
        header.push_str("-- No templating changes applied - using raw extraction\n\n");
    } else {
        header.push_str("-- APPLIED TEMPLATING CHANGES:\n");
        for (i, change) in applied.iter().enumerate() {
            let _ = writeln!(header, "-- {}. {} → {}", i + 1, change.original, change.suggested);
            let context = change.context.split_whitespace().collect::<Vec<_>>().join(" ");
            let _ = writeln!(header, "--    Context: {context}");
            let _ = writeln!(header, "--    Reason: {}", change.reason);
        }
        header.push('\n');
    }
    header.push_str(CONTENT_BANNER);
    header
}

fn header_without_decisions(schema: &str, generated_at: &str) -> String {
    format!(
        "-- FINAL VERSION: {schema} Schema\n\
         -- Generated at: {generated_at}\n\
         -- Note: No templating decisions were made - using raw extraction\n\
         -- This version may contain environment-specific references\n\n"
    )
}

/// Result of the generate step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSummary {
    pub total_decisions: usize,
    pub accepted_decisions: usize,
    /// Files written to `final/`.
    pub files: Vec<PathBuf>,
}

/// Runs the generate step for one schema.
pub struct Generator<'a> {
    paths: &'a WorkflowPaths,
    scope: DecisionScope,
}

impl<'a> Generator<'a> {
    #[must_use]
    pub const fn new(paths: &'a WorkflowPaths, scope: DecisionScope) -> Self {
        Self { paths, scope }
    }

    /// Writes one final file per raw file and advances the state to
    /// `FINAL_GENERATED`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidState`] unless the state is
    /// `REVIEW_COMPLETE`, [`WorkflowError::MissingFiles`] without raw files
    /// or decisions, or an IO error.
    pub fn run(&self) -> Result<GenerationSummary> {
        self.paths.state_store().require(Transition::Generate)?;

        let raw_dir = self.paths.raw_dir();
        let decisions_file = self.paths.decisions_file();
        let mut missing = Vec::new();
        if !raw_dir.is_dir() {
            missing.push("raw".to_string());
        }
        if !decisions_file.is_file() {
            missing.push("decisions.json".to_string());
        }
        if !missing.is_empty() {
            return Err(WorkflowError::MissingFiles(missing));
        }

        let decisions = load_decisions(&decisions_file)?;
        let schema = self.paths.schema();
        let final_dir = self.paths.final_dir();
        let generated_at = Utc::now().to_rfc3339();
        let mut files = Vec::new();

        for raw in sql_files(&raw_dir)? {
            let name = file_name(&raw);
            let content = std::fs::read_to_string(&raw)?;
            let text = if decisions.is_empty() {
                header_without_decisions(schema, &generated_at) + &content
            } else {
                let (templated, applied) =
                    apply_decisions(&content, &name, &decisions, self.scope);
                println!("Final version generated: {name}");
                if applied.is_empty() {
                    println!("   No changes applied (using raw version)");
                } else {
                    println!("   Applied {} templating changes", applied.len());
                }
                header_with_decisions(schema, &name, &applied, self.scope, &generated_at)
                    + &templated
            };
            let target = final_dir.join(&name);
            write_atomic(&target, text.as_bytes())?;
            files.push(target);
        }

        let accepted: Vec<&DecisionRecord> = decisions.iter().filter(|d| d.is_accepted()).collect();
        let file_names: Vec<String> = files.iter().map(|f| file_name(f)).collect();
        let details = if decisions.is_empty() {
            json!({
                "generated_at": generated_at,
                "method": "no_decisions",
                "files_generated": file_names,
            })
        } else {
            json!({
                "generated_at": generated_at,
                "method": "with_decisions",
                "decision_scope": scope_note(self.scope),
                "total_decisions": decisions.len(),
                "accepted_decisions": accepted.len(),
                "files_generated": file_names,
            })
        };
        self.paths
            .state_store()
            .save(WorkflowStep::FinalGenerated, details)?;

        println!("\nFINAL VERSION SUMMARY");
        if decisions.is_empty() {
            println!("Method: No review decisions - using raw extraction");
        } else {
            println!("Total Decisions: {}", decisions.len());
            println!("Applied Changes: {}", accepted.len());
            println!("Ignored Changes: {}", decisions.len() - accepted.len());
            for d in decisions.iter().filter(|d| !d.is_accepted()) {
                if !d.user_notes.is_empty() {
                    println!("  - {} ignored. Note: {}", d.original, d.user_notes);
                }
            }
        }
        println!("Files: {} SQL files created", files.len());
        println!("Location: {}", final_dir.display());
        info!(schema = %schema, files = files.len(), "final version generated");

        Ok(GenerationSummary {
            total_decisions: decisions.len(),
            accepted_decisions: accepted.len(),
            files,
        })
    }
}
