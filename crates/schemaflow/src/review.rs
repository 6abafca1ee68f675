//! Templating analysis and interactive review.
//!
//! Review walks every templating suggestion, safe ones first, and records
//! one accept/reject decision per suggestion. The default answer always
//! follows the analyzer's recommendation: accept for safe suggestions,
//! reject for the rest. Quitting keeps the decisions made so far in
//! `decisions.partial.json` and leaves the workflow state untouched.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use schemaflow_core::{AnalysisReport, RiskLevel, Suggestion, TemplatingAnalyzer};

use crate::error::{Result, WorkflowError};
use crate::paths::{file_name, sql_files, write_atomic, WorkflowPaths};
use crate::state::{Transition, WorkflowStep};

const HELP: &str = "
REVIEW HELP

This tool helps you review templating suggestions for multi-environment deployment.

DECISION GUIDANCE:
ACCEPT (Y):
   - Safe suggestions (low risk)
   - You understand the context and agree with the change
   - The suggestion makes sense for your target environment

REJECT (N):
   - Unsafe suggestions (medium/high risk)
   - You're unsure about the context
   - The change doesn't make sense for your use case
   - You want to keep the original reference

QUIT (Q):
   - Exit the review process
   - Decisions made so far are kept; run the review again to resume

TIPS:
- When in doubt, REJECT and review manually
- Cross-database references should usually be REJECTED
- Table/view names with environment references need careful review
- FROM/JOIN clause references are usually safe to ACCEPT
";

/// An operator's verdict on one suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Reject => "REJECT",
        }
    }
}

/// One entry of `decisions.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Position in review order, starting at 1.
    pub suggestion_num: usize,
    /// File the suggestion was found in.
    pub file: String,
    pub original: String,
    pub suggested: String,
    pub context: String,
    pub reason: String,
    pub is_safe: bool,
    pub risk_level: RiskLevel,
    pub decision: Decision,
    pub reviewed_at: DateTime<Utc>,
    #[serde(default)]
    pub user_notes: String,
}

impl DecisionRecord {
    fn new(suggestion_num: usize, suggestion: &Suggestion, decision: Decision) -> Self {
        Self {
            suggestion_num,
            file: suggestion.file.clone(),
            original: suggestion.original.clone(),
            suggested: suggestion.suggested.clone(),
            context: suggestion.context.clone(),
            reason: suggestion.reason.clone(),
            is_safe: suggestion.is_safe,
            risk_level: suggestion.risk_level,
            decision,
            reviewed_at: Utc::now(),
            user_notes: String::new(),
        }
    }

    /// True if this record was made for `suggestion`.
    #[must_use]
    pub fn matches(&self, suggestion: &Suggestion) -> bool {
        self.file == suggestion.file
            && self.original == suggestion.original
            && self.context == suggestion.context
            && self.is_safe == suggestion.is_safe
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.decision == Decision::Accept
    }
}

/// Loads a decision list.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_decisions(path: &std::path::Path) -> Result<Vec<DecisionRecord>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn save_decisions(path: &std::path::Path, decisions: &[DecisionRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(decisions)?;
    write_atomic(path, json.as_bytes())
}

/// A parsed answer to the review question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Decide(Decision),
    Quit,
    Help,
    Invalid,
}

/// Parses an answer. An empty answer picks the recommended decision:
/// accept for safe suggestions, reject otherwise.
#[must_use]
pub fn parse_choice(input: &str, is_safe: bool) -> Choice {
    match input.trim().to_lowercase().as_str() {
        "" if is_safe => Choice::Decide(Decision::Accept),
        "" => Choice::Decide(Decision::Reject),
        "y" | "yes" => Choice::Decide(Decision::Accept),
        "n" | "no" => Choice::Decide(Decision::Reject),
        "q" | "quit" => Choice::Quit,
        "h" | "help" => Choice::Help,
        _ => Choice::Invalid,
    }
}

/// Source of operator answers.
pub trait Prompt {
    /// Shows `question` and returns the answer, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be read.
    fn ask(&mut self, question: &str) -> Result<Option<String>>;
}

/// Reads answers from standard input.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{question}")?;
        stdout.flush()?;

        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Answers queued in advance, e.g. piped from a file. Running out of
/// answers is end of input.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
}

impl ScriptedPrompt {
    #[must_use]
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }

    /// Answers not consumed yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        let answer = self.answers.pop_front();
        println!("{question}{}", answer.as_deref().unwrap_or(""));
        Ok(answer)
    }
}

/// Decisions of a completed review.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewSummary {
    pub decisions: Vec<DecisionRecord>,
}

impl ReviewSummary {
    pub fn accepted(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.decisions.iter().filter(|d| d.is_accepted())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.decisions.iter().filter(|d| !d.is_accepted())
    }
}

/// How a review run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Every suggestion was decided; the state is `REVIEW_COMPLETE`.
    Completed(ReviewSummary),
    /// The operator quit after deciding `decided` of `total` suggestions.
    Quit { decided: usize, total: usize },
}

/// Analyzes the raw files and writes `analysis/` and `suggested/`.
///
/// # Errors
///
/// Returns an error if the raw files cannot be read, the analyzer cannot
/// be built for `db_base`, or an output cannot be written.
pub fn analyze_raw_files(paths: &WorkflowPaths, db_base: &str) -> Result<AnalysisReport> {
    let mut contents = Vec::new();
    for path in sql_files(&paths.raw_dir())? {
        contents.push((file_name(&path), std::fs::read_to_string(&path)?));
    }

    let analyzer = TemplatingAnalyzer::new(db_base)?;
    let report = analyzer.analyze(
        contents
            .iter()
            .map(|(name, content)| (name.as_str(), content.as_str())),
    );

    let analyzed_at = Utc::now().to_rfc3339();
    write_atomic(
        &paths.analysis_markdown(),
        report.render_markdown(paths.schema(), &analyzed_at).as_bytes(),
    )?;
    write_atomic(
        &paths.analysis_json(),
        serde_json::to_string_pretty(&report)?.as_bytes(),
    )?;

    for (analysis, (name, content)) in report.files.iter().zip(&contents) {
        let Some((preview, applied)) = analysis.suggested_content(content) else {
            continue;
        };
        let text = format!(
            "-- SUGGESTED TEMPLATING (REVIEW CAREFULLY):\n\
             -- This file contains suggested changes for multi-environment deployment\n\
             -- MANUAL REVIEW REQUIRED before using\n\
             -- Applied {applied} safe suggestions\n\n\
             {preview}"
        );
        write_atomic(&paths.suggested_dir().join(name), text.as_bytes())?;
        debug!(file = %name, applied, "suggested preview written");
    }

    info!(
        schema = %paths.schema(),
        suggestions = report.summary.total_suggestions,
        safe = report.summary.safe_suggestions,
        risk = %report.overall_risk(),
        "templating analysis complete"
    );
    Ok(report)
}

/// Runs the review step for one schema.
pub struct Reviewer<'a, P: Prompt> {
    paths: &'a WorkflowPaths,
    prompt: &'a mut P,
}

impl<'a, P: Prompt> Reviewer<'a, P> {
    pub fn new(paths: &'a WorkflowPaths, prompt: &'a mut P) -> Self {
        Self { paths, prompt }
    }

    /// Reviews every suggestion of the extracted files.
    ///
    /// Requires `EXTRACTION_COMPLETE`. The analysis is run first if it is
    /// not on disk yet.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidState`] from the wrong state,
    /// [`WorkflowError::MissingFiles`] without raw files, or an IO error.
    pub fn run(&mut self) -> Result<ReviewOutcome> {
        let state = self.paths.state_store().require(Transition::Review)?;
        if sql_files(&self.paths.raw_dir())?.is_empty() {
            return Err(WorkflowError::MissingFiles(vec!["raw/*.sql".to_string()]));
        }

        let report: AnalysisReport = if self.paths.analysis_json().exists() {
            serde_json::from_str(&std::fs::read_to_string(self.paths.analysis_json())?)?
        } else {
            println!("Running templating analysis...");
            analyze_raw_files(self.paths, state.detail_str("db_base").unwrap_or_default())?
        };

        let suggestions: Vec<&Suggestion> = report
            .safe_suggestions()
            .chain(report.unsafe_suggestions())
            .collect();
        let total = suggestions.len();

        let mut decisions = self.resumed_decisions(&suggestions)?;
        if !decisions.is_empty() {
            println!(
                "Resuming review: {} of {total} suggestions already decided",
                decisions.len()
            );
        } else if total > 0 {
            println!("Reviewing {total} suggestions...");
        }

        for (index, suggestion) in suggestions.iter().enumerate().skip(decisions.len()) {
            match self.review_one(index + 1, total, suggestion)? {
                Some(record) => decisions.push(record),
                None => {
                    save_decisions(&self.paths.partial_decisions_file(), &decisions)?;
                    println!("Review cancelled");
                    info!(
                        schema = %self.paths.schema(),
                        decided = decisions.len(),
                        total,
                        "review quit, decisions kept for resume"
                    );
                    return Ok(ReviewOutcome::Quit {
                        decided: decisions.len(),
                        total,
                    });
                }
            }
        }

        let summary = self.complete(decisions)?;
        Ok(ReviewOutcome::Completed(summary))
    }

    /// Decisions kept by an earlier quit, as long as they still line up
    /// with the current suggestions.
    fn resumed_decisions(&self, suggestions: &[&Suggestion]) -> Result<Vec<DecisionRecord>> {
        let path = self.paths.partial_decisions_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let partial = load_decisions(&path)?;
        Ok(partial
            .into_iter()
            .zip(suggestions)
            .take_while(|(record, suggestion)| record.matches(suggestion))
            .map(|(record, _)| record)
            .collect())
    }

    fn review_one(
        &mut self,
        num: usize,
        total: usize,
        suggestion: &Suggestion,
    ) -> Result<Option<DecisionRecord>> {
        println!("--- Suggestion {num}/{total} ---");
        println!("File: {}", suggestion.file);
        println!("Original: {}", suggestion.original);
        println!("Suggested: {}", suggestion.suggested);
        println!("Context: {}", suggestion.context);
        println!("Reason: {}", suggestion.reason);
        println!("Risk Level: {}", suggestion.risk_level);
        println!(
            "Safe to Template: {}",
            if suggestion.is_safe { "YES" } else { "REVIEW REQUIRED" }
        );
        println!();
        println!("Options:");
        let (question, invalid) = if suggestion.is_safe {
            println!("  [Y] Accept (recommended - low risk)");
            println!("  [n] Reject");
            (
                "Accept this suggestion? [Y/n/q/h]: ",
                "Invalid choice. Please enter Y, n, q, or h.",
            )
        } else {
            println!("  [y] Accept (use with caution)");
            println!("  [N] Reject (recommended - needs review)");
            (
                "Accept this suggestion? [y/N/q/h]: ",
                "Invalid choice. Please enter y, N, q, or h.",
            )
        };
        println!("  [q] Quit review");
        println!("  [h] Help");

        let decision = loop {
            let Some(answer) = self.prompt.ask(question)? else {
                return Ok(None);
            };
            match parse_choice(&answer, suggestion.is_safe) {
                Choice::Decide(decision) => break decision,
                Choice::Quit => return Ok(None),
                Choice::Help => println!("{HELP}"),
                Choice::Invalid => println!("{invalid}"),
            }
        };

        let mut record = DecisionRecord::new(num, suggestion, decision);
        if decision == Decision::Reject {
            let notes = self
                .prompt
                .ask("Add notes about why you rejected this (optional): ")?
                .unwrap_or_default();
            record.user_notes = notes.trim().to_string();
        }
        println!("Decision: {}", decision.as_str());
        println!();
        Ok(Some(record))
    }

    fn complete(&self, decisions: Vec<DecisionRecord>) -> Result<ReviewSummary> {
        save_decisions(&self.paths.decisions_file(), &decisions)?;
        let partial = self.paths.partial_decisions_file();
        if partial.exists() {
            std::fs::remove_file(partial)?;
        }

        let summary = ReviewSummary { decisions };
        self.paths.state_store().save(
            WorkflowStep::ReviewComplete,
            json!({
                "reviewed_at": Utc::now().to_rfc3339(),
                "total_suggestions": summary.decisions.len(),
                "accepted": summary.accepted().count(),
                "rejected": summary.rejected().count(),
            }),
        )?;
        self.print_summary(&summary);
        Ok(summary)
    }

    fn print_summary(&self, summary: &ReviewSummary) {
        let temp = self.paths.temp_dir().display();
        println!("\nREVIEW SUMMARY");
        if summary.decisions.is_empty() {
            println!("Status: No suggestions to review");
        } else {
            println!("Status: Review complete");
        }
        println!("Analysis: {} suggestions found", summary.decisions.len());
        println!("Report: {temp}/analysis/templating_analysis.md");
        println!("Decisions: Saved to {temp}/decisions.json");
        if summary.decisions.is_empty() {
            return;
        }

        let accepted: Vec<_> = summary.accepted().collect();
        let rejected: Vec<_> = summary.rejected().collect();
        println!("Accepted: {}", accepted.len());
        println!("Rejected: {}", rejected.len());
        if !accepted.is_empty() {
            println!("\nACCEPTED SUGGESTIONS:");
            for d in accepted {
                println!("  - {} → {} ({})", d.original, d.suggested, d.file);
            }
        }
        if !rejected.is_empty() {
            println!("\nREJECTED SUGGESTIONS:");
            for d in rejected {
                println!("  - {} → {} ({})", d.original, d.suggested, d.file);
                if !d.user_notes.is_empty() {
                    println!("    Note: {}", d.user_notes);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_follows_recommendation() {
        assert_eq!(parse_choice("", true), Choice::Decide(Decision::Accept));
        assert_eq!(parse_choice("  ", false), Choice::Decide(Decision::Reject));
        assert_eq!(parse_choice("Y", false), Choice::Decide(Decision::Accept));
        assert_eq!(parse_choice("no", true), Choice::Decide(Decision::Reject));
        assert_eq!(parse_choice("QUIT", true), Choice::Quit);
        assert_eq!(parse_choice("h", false), Choice::Help);
        assert_eq!(parse_choice("maybe", true), Choice::Invalid);
    }

    #[test]
    fn test_decision_record_format() {
        let suggestion = Suggestion {
            file: "V1000.sql".to_string(),
            original: "PLATFORM_SIT".to_string(),
            suggested: "{{DB_BASE}}_{{ENV}}".to_string(),
            context: "FROM PLATFORM_SIT.S.T".to_string(),
            start: 5,
            end: 17,
            is_safe: true,
            reason: "safe".to_string(),
            risk_level: RiskLevel::Low,
        };
        let record = DecisionRecord::new(1, &suggestion, Decision::Accept);
        assert!(record.matches(&suggestion));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["decision"], "accept");
        assert_eq!(json["risk_level"], "LOW");
        assert_eq!(json["suggestion_num"], 1);

        let other = Suggestion {
            is_safe: false,
            ..suggestion
        };
        assert!(!record.matches(&other));
    }

    #[test]
    fn test_scripted_prompt_runs_out() {
        let mut prompt = ScriptedPrompt::new(["y"]);
        assert_eq!(prompt.ask("? ").unwrap().as_deref(), Some("y"));
        assert_eq!(prompt.ask("? ").unwrap(), None);
        assert_eq!(prompt.remaining(), 0);
    }
}
