//! Templating analyzer.
//!
//! Finds environment-qualified database references (`PLATFORM_SIT`) in
//! extracted DDL and decides, from the words right before each one, whether
//! replacing it with `{{DB_BASE}}_{{ENV}}` is safe. Anything the analyzer
//! does not positively recognize is reported as unsafe.
//!
//! The analyzer also reports, without suggesting anything:
//! - three-part `DB.SCHEMA.OBJECT` references, which must never be templated;
//! - hardcoded environment codes and dynamic SQL execution.

use std::fmt;
use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::lexer::CREATE_MODIFIERS;
use crate::normalize::{template_references, Placeholder};

/// Characters of context kept on each side of a match.
const CONTEXT_CHARS: usize = 50;

static CROSS_DATABASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z_]+)\.([A-Z_]+)\.([A-Z_]+)").expect("valid cross-database pattern")
});

/// Dynamic SQL patterns with the label used in warnings.
static DYNAMIC_SQL: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("EXEC(", r"(?i)EXEC\s*\("),
        ("EXECUTE(", r"(?i)EXECUTE\s*\("),
        ("EXECUTE IMMEDIATE", r"(?i)EXECUTE\s+IMMEDIATE"),
    ]
    .into_iter()
    .map(|(label, pattern)| (label, Regex::new(pattern).expect("valid dynamic SQL pattern")))
    .collect()
});

/// Environment codes scanned for, in report order.
const WARNED_ENVIRONMENTS: [Environment; 5] = [
    Environment::Sit,
    Environment::Dev,
    Environment::Qa,
    Environment::Uat,
    Environment::Prod,
];

pub const REASON_FROM_JOIN: &str = "Database reference in FROM/JOIN clause - safe to template";
pub const REASON_OBJECT_NAME: &str = "Database reference in table/view name - do not template";
pub const REASON_STRING_LITERAL: &str = "Database reference in string literal - do not template";
pub const REASON_UNCLEAR: &str = "Unclear context - review manually";

/// Risk attached to a suggestion or warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed replacement of one database reference by placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// File the reference was found in.
    pub file: String,
    /// Literal text found, e.g. `PLATFORM_SIT`.
    pub original: String,
    /// Replacement text, e.g. `{{DB_BASE}}_{{ENV}}`.
    pub suggested: String,
    /// Surrounding text, trimmed.
    pub context: String,
    /// Byte offset of the reference in the file.
    pub start: usize,
    /// Byte offset just past the reference.
    pub end: usize,
    pub is_safe: bool,
    pub reason: String,
    pub risk_level: RiskLevel,
}

/// A `DB.SCHEMA.OBJECT` reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossDatabaseRef {
    pub file: String,
    /// The full dotted reference.
    pub reference: String,
    pub database: String,
    pub schema: String,
    pub object: String,
    pub context: String,
}

/// What a warning is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// An environment code appears literally in the text.
    HardcodedEnvironment,
    /// The text executes dynamically built SQL.
    DynamicSql,
}

impl WarningKind {
    /// Heading used in rendered reports.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::HardcodedEnvironment => "Hardcoded Environment",
            Self::DynamicSql => "Dynamic SQL",
        }
    }
}

/// A risk pattern found in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub file: String,
    pub kind: WarningKind,
    pub message: String,
    pub risk_level: RiskLevel,
}

/// Analysis of a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub file: String,
    /// Size of the analyzed text in bytes.
    pub size: usize,
    pub suggestions: Vec<Suggestion>,
    pub cross_database_refs: Vec<CrossDatabaseRef>,
    pub warnings: Vec<Warning>,
    /// 10 per HIGH warning, 5 per MEDIUM warning, 3 per unsafe suggestion.
    pub risk_score: u32,
}

impl FileAnalysis {
    fn compute_risk_score(&self) -> u32 {
        let mut score = 0u32;
        for warning in &self.warnings {
            score += match warning.risk_level {
                RiskLevel::High => 10,
                RiskLevel::Medium => 5,
                RiskLevel::Low => 0,
            };
        }
        let unsafe_count = self.suggestions.iter().filter(|s| !s.is_safe).count();
        score + 3 * u32::try_from(unsafe_count).unwrap_or(u32::MAX / 3)
    }

    /// Returns the file text with only the safe suggestions applied, or
    /// `None` when the file produced no suggestions at all.
    #[must_use]
    pub fn suggested_content(&self, content: &str) -> Option<(String, usize)> {
        if self.suggestions.is_empty() {
            return None;
        }
        let mut safe: Vec<&Suggestion> = self.suggestions.iter().filter(|s| s.is_safe).collect();
        safe.sort_by_key(|s| s.start);

        let mut out = String::with_capacity(content.len());
        let mut last = 0;
        for suggestion in &safe {
            if suggestion.start < last || suggestion.end > content.len() {
                continue;
            }
            out.push_str(&content[last..suggestion.start]);
            out.push_str(&suggestion.suggested);
            last = suggestion.end;
        }
        out.push_str(&content[last..]);
        Some((out, safe.len()))
    }
}

/// Counts over a whole analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub files_analyzed: usize,
    pub total_suggestions: usize,
    pub safe_suggestions: usize,
    pub unsafe_suggestions: usize,
    pub cross_database_refs: usize,
    pub total_warnings: usize,
    pub high_risk_warnings: usize,
    pub risk_score: u32,
    pub overall_risk: Option<RiskLevel>,
}

/// Output of [`TemplatingAnalyzer::analyze`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Database base the candidates were searched for.
    pub db_base: String,
    pub files: Vec<FileAnalysis>,
    pub summary: Summary,
}

impl AnalysisReport {
    /// All suggestions, in file order then position order.
    pub fn suggestions(&self) -> impl Iterator<Item = &Suggestion> {
        self.files.iter().flat_map(|f| f.suggestions.iter())
    }

    pub fn safe_suggestions(&self) -> impl Iterator<Item = &Suggestion> {
        self.suggestions().filter(|s| s.is_safe)
    }

    pub fn unsafe_suggestions(&self) -> impl Iterator<Item = &Suggestion> {
        self.suggestions().filter(|s| !s.is_safe)
    }

    pub fn cross_database_refs(&self) -> impl Iterator<Item = &CrossDatabaseRef> {
        self.files.iter().flat_map(|f| f.cross_database_refs.iter())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.files.iter().flat_map(|f| f.warnings.iter())
    }

    /// Overall risk: HIGH with any HIGH warning, MEDIUM with any warning,
    /// LOW otherwise.
    #[must_use]
    pub fn overall_risk(&self) -> RiskLevel {
        self.summary.overall_risk.unwrap_or(RiskLevel::Low)
    }

    fn summarize(&mut self) {
        let total_suggestions = self.suggestions().count();
        let safe_suggestions = self.safe_suggestions().count();
        let total_warnings = self.warnings().count();
        let high_risk_warnings = self
            .warnings()
            .filter(|w| w.risk_level == RiskLevel::High)
            .count();
        let overall = if total_warnings == 0 {
            RiskLevel::Low
        } else if high_risk_warnings == 0 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        };
        self.summary = Summary {
            files_analyzed: self.files.len(),
            total_suggestions,
            safe_suggestions,
            unsafe_suggestions: total_suggestions - safe_suggestions,
            cross_database_refs: self.cross_database_refs().count(),
            total_warnings,
            high_risk_warnings,
            risk_score: self.files.iter().map(|f| f.risk_score).sum(),
            overall_risk: Some(overall),
        };
    }

    /// Renders the human-readable report.
    #[must_use]
    pub fn render_markdown(&self, schema: &str, analyzed_at: &str) -> String {
        let s = &self.summary;
        let mut out = String::new();
        let _ = writeln!(out, "# Templating Analysis Report\n");
        let _ = writeln!(out, "## Schema: {schema}");
        let _ = writeln!(out, "**Analyzed at:** {analyzed_at}\n");
        let _ = writeln!(out, "## Summary");
        let _ = writeln!(out, "- **Total Files:** {}", s.files_analyzed);
        let _ = writeln!(out, "- **Total Suggestions:** {}", s.total_suggestions);
        let _ = writeln!(out, "- **Safe to Template:** {}", s.safe_suggestions);
        let _ = writeln!(out, "- **Needs Review:** {}", s.unsafe_suggestions);
        let _ = writeln!(out, "- **Total Warnings:** {}", s.total_warnings);
        let _ = writeln!(out, "- **Risk Score:** {}", s.risk_score);
        let _ = writeln!(out, "- **Overall Risk:** {}\n", self.overall_risk());
        let _ = writeln!(out, "## Templating Suggestions\n");

        let safe: Vec<_> = self.safe_suggestions().collect();
        if !safe.is_empty() {
            let _ = writeln!(out, "### Safe to Template (High Confidence)\n");
            for (i, suggestion) in safe.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{}. **{}** → **{}** ({})",
                    i + 1,
                    suggestion.original,
                    suggestion.suggested,
                    suggestion.file
                );
                let _ = writeln!(out, "   - Context: `{}`", suggestion.context);
                let _ = writeln!(out, "   - Reason: {}\n", suggestion.reason);
            }
        }

        let needs_review: Vec<_> = self.unsafe_suggestions().collect();
        if !needs_review.is_empty() {
            let _ = writeln!(out, "### Needs Manual Review (Medium Confidence)\n");
            for (i, suggestion) in needs_review.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{}. **{}** → **{}** ({})",
                    i + 1,
                    suggestion.original,
                    suggestion.suggested,
                    suggestion.file
                );
                let _ = writeln!(out, "   - Context: `{}`", suggestion.context);
                let _ = writeln!(out, "   - Reason: {}", suggestion.reason);
                let _ = writeln!(out, "   - Risk: {}\n", suggestion.risk_level);
            }
        }

        if self.cross_database_refs().next().is_some() {
            let _ = writeln!(out, "## Cross-Database Dependencies\n");
            let _ = writeln!(out, "**These references should NOT be templated:**\n");
            for r in self.cross_database_refs() {
                let _ = writeln!(out, "- **{}**", r.reference);
                let _ = writeln!(out, "  - Database: {}", r.database);
                let _ = writeln!(out, "  - Schema: {}", r.schema);
                let _ = writeln!(out, "  - Object: {}", r.object);
                let _ = writeln!(out, "  - Context: `{}`\n", r.context);
            }
        }

        if self.warnings().next().is_some() {
            let _ = writeln!(out, "## Warnings and Issues\n");
            for warning in self.warnings() {
                let _ = writeln!(out, "- **{}** ({})", warning.kind.title(), warning.file);
                let _ = writeln!(out, "  - {}", warning.message);
                let _ = writeln!(out, "  - Risk Level: {}\n", warning.risk_level);
            }
        }

        let _ = writeln!(out, "## Recommendations\n");
        let _ = writeln!(out, "1. **Start with raw DDL** - Use the extracted files as-is initially");
        let _ = writeln!(out, "2. **Apply only 'Safe to Template' changes** - These are low-risk");
        let _ = writeln!(out, "3. **Manually review 'Needs Review' items** - Understand the context");
        let _ = writeln!(out, "4. **Never template cross-database references** - These must remain unchanged");
        let _ = writeln!(out, "5. **Test in target environment** - Verify changes work as expected\n");
        let _ = writeln!(out, "## Next Steps\n");
        let _ = writeln!(out, "1. Review this analysis report");
        let _ = writeln!(out, "2. Run interactive review: `schemaflow review --schema {schema}`");
        let _ = writeln!(out, "3. Generate final version: `schemaflow generate --schema {schema}`");
        out
    }
}

/// Scans DDL for templating candidates of one database base.
#[derive(Debug, Clone)]
pub struct TemplatingAnalyzer {
    db_base: String,
    candidate: Option<Regex>,
}

impl TemplatingAnalyzer {
    /// Creates an analyzer for `db_base`. An empty base yields no candidates.
    ///
    /// # Errors
    ///
    /// Returns an error if the candidate pattern for `db_base` exceeds the
    /// regex size limits.
    pub fn new(db_base: &str) -> Result<Self, regex::Error> {
        let candidate = if db_base.is_empty() {
            None
        } else {
            Some(Regex::new(&format!("(?i){}_[A-Z]+", regex::escape(db_base)))?)
        };
        Ok(Self {
            db_base: db_base.to_string(),
            candidate,
        })
    }

    #[must_use]
    pub fn db_base(&self) -> &str {
        &self.db_base
    }

    /// Analyzes a set of `(file name, content)` pairs.
    #[must_use]
    pub fn analyze<'a, I>(&self, files: I) -> AnalysisReport
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut report = AnalysisReport {
            db_base: self.db_base.clone(),
            files: files
                .into_iter()
                .map(|(name, content)| self.analyze_file(name, content))
                .collect(),
            summary: Summary::default(),
        };
        report.summarize();
        report
    }

    /// Analyzes a single file.
    #[must_use]
    pub fn analyze_file(&self, file: &str, content: &str) -> FileAnalysis {
        let suggestions = match &self.candidate {
            Some(re) => re
                .find_iter(content)
                .map(|m| self.suggest(file, content, m.start(), m.end()))
                .collect(),
            None => Vec::new(),
        };

        let mut analysis = FileAnalysis {
            file: file.to_string(),
            size: content.len(),
            suggestions,
            cross_database_refs: find_cross_database_refs(file, content),
            warnings: find_warnings(file, content),
            risk_score: 0,
        };
        analysis.risk_score = analysis.compute_risk_score();
        analysis
    }

    fn suggest(&self, file: &str, content: &str, start: usize, end: usize) -> Suggestion {
        let original = &content[start..end];
        let suggested = match original
            .rsplit_once('_')
            .and_then(|(_, suffix)| suffix.parse::<Environment>().ok())
        {
            Some(env) => template_references(original, env, &self.db_base),
            None => format!(
                "{}_{}",
                Placeholder::DbBase.unspaced(),
                Placeholder::Env.unspaced()
            ),
        };
        let (is_safe, reason) = classify(content, start);

        Suggestion {
            file: file.to_string(),
            original: original.to_string(),
            suggested,
            context: context_window(content, start, end),
            start,
            end,
            is_safe,
            reason: reason.to_string(),
            risk_level: if is_safe {
                RiskLevel::Low
            } else {
                RiskLevel::Medium
            },
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Returns up to `limit` words directly preceding the end of `text`,
/// nearest first, separated only by whitespace.
fn preceding_words(text: &str, limit: usize) -> Vec<&str> {
    let mut words = Vec::new();
    let mut rest = text;
    while words.len() < limit {
        let trimmed = rest.trim_end();
        let start = trimmed
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_word_char(*c))
            .last()
            .map(|(i, _)| i);
        match start {
            Some(i) => {
                words.push(&trimmed[i..]);
                rest = &trimmed[..i];
            }
            None => break,
        }
    }
    words
}

/// Returns true if `words` (nearest first, after the object keyword) lead
/// back to `CREATE`, skipping `OR REPLACE` and creation modifiers.
fn leads_to_create(words: &[String]) -> bool {
    for word in words {
        let w = word.as_str();
        if w == "CREATE" {
            return true;
        }
        let skippable = w == "OR" || w == "REPLACE" || CREATE_MODIFIERS.contains(&w);
        if !skippable {
            return false;
        }
    }
    false
}

/// Returns true if an odd number of unescaped quotes of either kind
/// precedes the end of `before`.
fn inside_string_literal(before: &str) -> bool {
    let single = before.matches('\'').count() - before.matches("\\'").count();
    let double = before.matches('"').count() - before.matches("\\\"").count();
    single % 2 == 1 || double % 2 == 1
}

/// Classifies the candidate starting at `start`. Rules apply in order and
/// the first match wins; no match means unsafe.
fn classify(content: &str, start: usize) -> (bool, &'static str) {
    let before = &content[..start];
    let words: Vec<String> = preceding_words(before, 8)
        .into_iter()
        .map(str::to_uppercase)
        .collect();

    match words.first().map(String::as_str) {
        Some("FROM" | "JOIN" | "UPDATE") => return (true, REASON_FROM_JOIN),
        Some("TABLE") => {
            let prev = words.get(1).map(String::as_str);
            if matches!(prev, Some("ALTER" | "DROP")) || leads_to_create(&words[1..]) {
                return (false, REASON_OBJECT_NAME);
            }
        }
        Some("VIEW") => {
            if leads_to_create(&words[1..]) {
                return (false, REASON_OBJECT_NAME);
            }
        }
        _ => {}
    }

    if inside_string_literal(before) {
        return (false, REASON_STRING_LITERAL);
    }
    (false, REASON_UNCLEAR)
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Returns the match plus up to [`CONTEXT_CHARS`] characters on each side,
/// trimmed.
fn context_window(content: &str, start: usize, end: usize) -> String {
    let from = content[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_CHARS - 1)
        .map_or(0, |(i, _)| i);
    let to = content[end..]
        .char_indices()
        .nth(CONTEXT_CHARS)
        .map_or(content.len(), |(i, _)| end + i);
    content[floor_boundary(content, from)..to].trim().to_string()
}

fn find_cross_database_refs(file: &str, content: &str) -> Vec<CrossDatabaseRef> {
    CROSS_DATABASE
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(CrossDatabaseRef {
                file: file.to_string(),
                reference: whole.as_str().to_string(),
                database: caps.get(1)?.as_str().to_string(),
                schema: caps.get(2)?.as_str().to_string(),
                object: caps.get(3)?.as_str().to_string(),
                context: context_window(content, whole.start(), whole.end()),
            })
        })
        .collect()
}

fn find_warnings(file: &str, content: &str) -> Vec<Warning> {
    let mut warnings: Vec<Warning> = WARNED_ENVIRONMENTS
        .iter()
        .filter(|env| content.contains(env.code()))
        .map(|env| Warning {
            file: file.to_string(),
            kind: WarningKind::HardcodedEnvironment,
            message: format!("Hardcoded environment reference: {env}"),
            risk_level: RiskLevel::Medium,
        })
        .collect();

    for (label, re) in DYNAMIC_SQL.iter() {
        if re.is_match(content) {
            warnings.push(Warning {
                file: file.to_string(),
                kind: WarningKind::DynamicSql,
                message: format!("Dynamic SQL execution detected: {label}"),
                risk_level: RiskLevel::High,
            });
        }
    }
    warnings
}
