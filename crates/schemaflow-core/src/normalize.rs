//! Reference normalizer.
//!
//! Two unrelated jobs live here:
//!
//! - **Placeholders**: moving between literal database/environment names
//!   (`PLATFORM_SIT`) and the template tokens replayed by the migration
//!   runner (`{{DB_BASE}}_{{ENV}}`).
//! - **Canonical forms**: turning DDL and grant text into a comparable
//!   string. Two statements are equal for diffing iff their canonical forms
//!   are byte-equal; this is syntactic, not semantic, equivalence.

use std::sync::LazyLock;

use regex::Regex;

use crate::environment::Environment;

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)--.*$").expect("valid comment pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));
static PUNCT_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([(),;])\s*").expect("valid punctuation pattern"));
static COMMA_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*").expect("valid comma pattern"));
static EQ_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*=\s*").expect("valid equals pattern"));
static ENV_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\{\{\s*(?:VAR\s*\(\s*["']ENV["']\s*\)|ENV)\s*\}\}"#)
        .expect("valid env placeholder pattern")
});
static DB_PREFIX_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\{\{\s*(?:VAR\s*\(\s*["']DB_PREFIX["']\s*\)|DB_PREFIX)\s*\}\}"#)
        .expect("valid prefix placeholder pattern")
});
static DB_BASE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\{\{\s*(?:VAR\s*\(\s*["']DB_BASE["']\s*\)|DB_BASE)\s*\}\}"#)
        .expect("valid base placeholder pattern")
});
static IDENTIFIER_SINGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"IDENTIFIER\s*\(\s*'([^']+)'\s*\)").expect("valid identifier pattern")
});
static IDENTIFIER_DOUBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"IDENTIFIER\s*\(\s*"([^"]+)"\s*\)"#).expect("valid identifier pattern")
});
static SINGLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']+)'").expect("valid quote pattern"));
static DOUBLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("valid quote pattern"));

/// A template token understood by the migration runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Target environment code (`SIT`, `QA`, ...).
    Env,
    /// Database-name prefix (`TEST`, ...).
    DbPrefix,
    /// Database base name (`PLATFORM`, `ALTO`, ...).
    DbBase,
}

impl Placeholder {
    /// Returns the variable name, e.g. `DB_BASE`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Env => "ENV",
            Self::DbPrefix => "DB_PREFIX",
            Self::DbBase => "DB_BASE",
        }
    }

    /// Returns the spaced form, e.g. `{{ ENV }}`.
    #[must_use]
    pub fn spaced(&self) -> String {
        format!("{{{{ {} }}}}", self.name())
    }

    /// Returns the unspaced form, e.g. `{{ENV}}`.
    #[must_use]
    pub fn unspaced(&self) -> String {
        format!("{{{{{}}}}}", self.name())
    }
}

/// Literal values substituted for placeholders when rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    /// Target environment.
    pub env: Environment,
    /// Database-name prefix, if the target uses one.
    pub db_prefix: Option<String>,
    /// Database base name.
    pub db_base: String,
}

impl Placeholders {
    /// Creates placeholder values without a prefix.
    #[must_use]
    pub fn new(env: Environment, db_base: impl Into<String>) -> Self {
        Self {
            env,
            db_prefix: None,
            db_base: db_base.into(),
        }
    }

    /// Sets the database prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.db_prefix = prefix.filter(|p| !p.is_empty());
        self
    }

    /// Returns the database name these values describe:
    /// `<prefix>_<base>_<ENV>` or `<base>_<ENV>`.
    #[must_use]
    pub fn database_name(&self) -> String {
        match &self.db_prefix {
            Some(prefix) => format!("{}_{}_{}", prefix, self.db_base, self.env),
            None => format!("{}_{}", self.db_base, self.env),
        }
    }
}

/// Replaces every placeholder (spaced and unspaced) with its literal value.
///
/// Plain string replacement, no patterns. Without a prefix the
/// `{{ DB_PREFIX }}_` segment is dropped together with its separator so the
/// rendered database name stays well-formed.
#[must_use]
pub fn render_placeholders(text: &str, values: &Placeholders) -> String {
    let mut out = text.to_string();
    for form in [Placeholder::Env.spaced(), Placeholder::Env.unspaced()] {
        out = out.replace(&form, values.env.code());
    }
    for form in [Placeholder::DbPrefix.spaced(), Placeholder::DbPrefix.unspaced()] {
        out = match &values.db_prefix {
            Some(prefix) => out.replace(&form, prefix),
            None => out.replace(&format!("{form}_"), "").replace(&form, ""),
        };
    }
    for form in [Placeholder::DbBase.spaced(), Placeholder::DbBase.unspaced()] {
        out = out.replace(&form, &values.db_base);
    }
    out
}

/// Returns true if `c` ends an environment suffix: `_`, or anything that is
/// not a letter or digit.
fn is_suffix_boundary(c: Option<char>) -> bool {
    match c {
        None => true,
        Some('_') => true,
        Some(c) => !c.is_alphanumeric(),
    }
}

/// Replaces `needle` with `replacement` wherever it is followed by a suffix
/// boundary. With `ignore_case`, ASCII case is ignored when matching.
fn replace_bounded(text: &str, needle: &str, replacement: &str, ignore_case: bool) -> String {
    if needle.is_empty() {
        return text.to_string();
    }
    let haystack = if ignore_case {
        text.to_ascii_uppercase()
    } else {
        text.to_string()
    };
    let needle = if ignore_case {
        needle.to_ascii_uppercase()
    } else {
        needle.to_string()
    };

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut from = 0;
    while let Some(found) = haystack[from..].find(&needle) {
        let start = from + found;
        let end = start + needle.len();
        if is_suffix_boundary(text[end..].chars().next()) {
            out.push_str(&text[last..start]);
            out.push_str(replacement);
            last = end;
            from = end;
        } else {
            from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Rewrites bare environment suffixes (`_SIT`, `_QA`, ...) of every other
/// environment to `_<target>`.
///
/// A suffix is only rewritten when followed by `_`, end of text, or a
/// non-alphanumeric character, so `_SITE` or `_QUALITY` are left alone.
#[must_use]
pub fn retarget_environment(text: &str, target: Environment) -> String {
    let replacement = format!("_{}", target.code());
    target.others().fold(text.to_string(), |acc, env| {
        replace_bounded(&acc, &format!("_{}", env.code()), &replacement, false)
    })
}

/// Replaces literal `<db_base>_<source_env>` references (any case) with
/// `{{DB_BASE}}_{{ENV}}`.
#[must_use]
pub fn template_references(text: &str, source_env: Environment, db_base: &str) -> String {
    if db_base.is_empty() {
        return text.to_string();
    }
    let literal = format!("{}_{}", db_base, source_env.code());
    let templated = format!(
        "{}_{}",
        Placeholder::DbBase.unspaced(),
        Placeholder::Env.unspaced()
    );
    replace_bounded(text, &literal, &templated, true)
}

/// Values that stand in for placeholders left unrendered in DDL being
/// compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderDefaults {
    /// Stand-in for `ENV`.
    pub env: String,
    /// Stand-in for `DB_PREFIX`.
    pub db_prefix: String,
    /// Stand-in for `DB_BASE`.
    pub db_base: String,
}

impl Default for PlaceholderDefaults {
    fn default() -> Self {
        Self {
            env: "SIT".to_string(),
            db_prefix: "TEST".to_string(),
            db_base: "PLATFORM".to_string(),
        }
    }
}

/// Normalizes DDL with the default placeholder stand-ins.
#[must_use]
pub fn normalize_ddl(ddl: &str) -> String {
    normalize_ddl_with(ddl, &PlaceholderDefaults::default())
}

/// Normalizes DDL into its canonical comparable form.
///
/// Residual placeholders are substituted, then the text is upper-cased,
/// line comments are dropped, whitespace runs collapse to one space,
/// whitespace around `(`, `)`, `,`, `;` and `=` is removed, and trailing
/// semicolons are stripped. The result is a fixed point:
/// `normalize_ddl(normalize_ddl(x)) == normalize_ddl(x)`.
#[must_use]
pub fn normalize_ddl_with(ddl: &str, defaults: &PlaceholderDefaults) -> String {
    let text = ENV_TOKEN.replace_all(ddl, defaults.env.as_str());
    let text = DB_PREFIX_TOKEN.replace_all(&text, defaults.db_prefix.as_str());
    let text = DB_BASE_TOKEN.replace_all(&text, defaults.db_base.as_str());

    let upper = text.to_uppercase();
    let text = LINE_COMMENT.replace_all(&upper, "");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = PUNCT_SPACING.replace_all(&text, "$1");
    let text = COMMA_SPACING.replace_all(&text, ",");
    let text = EQ_SPACING.replace_all(&text, "=");

    text.trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .trim()
        .to_string()
}

/// Applies `re` repeatedly until the text stops changing.
fn replace_to_fixpoint(re: &Regex, text: String, replacement: &str) -> String {
    let mut current = text;
    loop {
        let next = re.replace_all(&current, replacement).into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Normalizes a grant statement into its canonical comparable form.
///
/// Upper-cases, unwraps `IDENTIFIER('X')` / `IDENTIFIER("X")` to `X`,
/// strips quotes around quoted names and collapses whitespace.
#[must_use]
pub fn normalize_grant(grant: &str) -> String {
    let upper = grant.to_uppercase();
    let text = IDENTIFIER_SINGLE.replace_all(&upper, "$1");
    let text = IDENTIFIER_DOUBLE.replace_all(&text, "$1").into_owned();
    let text = replace_to_fixpoint(&SINGLE_QUOTED, text, "$1");
    let text = replace_to_fixpoint(&DOUBLE_QUOTED, text, "$1");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}
