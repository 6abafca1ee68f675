//! Structured grant statements.

use std::fmt;

use crate::normalize::normalize_grant;

/// `GRANT <privilege> ON <on> TO <grantee_kind> <grantee> [WITH GRANT OPTION]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GrantStatement {
    /// Privilege, possibly several words (`CREATE TABLE`).
    pub privilege: String,
    /// Securable, e.g. `SCHEMA PLATFORM_SIT.REPORTING`.
    pub on: String,
    /// Grantee kind, usually `ROLE`.
    pub grantee_kind: String,
    /// Grantee name.
    pub grantee: String,
    pub with_grant_option: bool,
}

impl GrantStatement {
    /// Creates a grant without grant option.
    #[must_use]
    pub fn new(
        privilege: impl Into<String>,
        on: impl Into<String>,
        grantee_kind: impl Into<String>,
        grantee: impl Into<String>,
    ) -> Self {
        Self {
            privilege: privilege.into(),
            on: on.into(),
            grantee_kind: grantee_kind.into(),
            grantee: grantee.into(),
            with_grant_option: false,
        }
    }

    /// Sets the grant option.
    #[must_use]
    pub fn with_grant_option(mut self, enabled: bool) -> Self {
        self.with_grant_option = enabled;
        self
    }

    /// Parses a grant statement. The text is normalized first, so the parts
    /// come back upper-cased and unquoted.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let normalized = normalize_grant(text.trim().trim_end_matches(';'));
        let body = normalized.strip_prefix("GRANT ")?;
        let (privilege, rest) = body.split_once(" ON ")?;
        let (on, target) = rest.rsplit_once(" TO ")?;

        let (target, with_grant_option) = match target.strip_suffix(" WITH GRANT OPTION") {
            Some(target) => (target, true),
            None => (target, false),
        };
        let (grantee_kind, grantee) = target.split_once(' ')?;
        if privilege.is_empty() || on.is_empty() || grantee.is_empty() {
            return None;
        }

        Some(
            Self::new(privilege, on, grantee_kind, grantee).with_grant_option(with_grant_option),
        )
    }

    /// Returns the canonical comparable form.
    #[must_use]
    pub fn normalized(&self) -> String {
        normalize_grant(&self.to_string())
    }
}

impl fmt::Display for GrantStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GRANT {} ON {} TO {} {}",
            self.privilege, self.on, self.grantee_kind, self.grantee
        )?;
        if self.with_grant_option {
            f.write_str(" WITH GRANT OPTION")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let grant = GrantStatement::new("USAGE", "SCHEMA DB.S", "ROLE", "SIT_READER")
            .with_grant_option(true);
        assert_eq!(
            grant.to_string(),
            "GRANT USAGE ON SCHEMA DB.S TO ROLE SIT_READER WITH GRANT OPTION"
        );
    }

    #[test]
    fn test_parse() {
        let grant = GrantStatement::parse(
            "grant create table on schema IDENTIFIER('{{ DB_BASE }}_{{ ENV }}.S') to role Loader;",
        )
        .unwrap();
        assert_eq!(grant.privilege, "CREATE TABLE");
        assert_eq!(grant.on, "SCHEMA {{ DB_BASE }}_{{ ENV }}.S");
        assert_eq!(grant.grantee_kind, "ROLE");
        assert_eq!(grant.grantee, "LOADER");
        assert!(!grant.with_grant_option);

        let grant =
            GrantStatement::parse("GRANT OWNERSHIP ON SCHEMA S TO ROLE ADMIN WITH GRANT OPTION")
                .unwrap();
        assert!(grant.with_grant_option);
        assert_eq!(grant.grantee, "ADMIN");
    }

    #[test]
    fn test_parse_rejects_other_statements() {
        assert_eq!(GrantStatement::parse("REVOKE USAGE ON SCHEMA S FROM ROLE R"), None);
        assert_eq!(GrantStatement::parse("GRANT USAGE TO ROLE R"), None);
    }

    #[test]
    fn test_normalized_round_trip() {
        let text = "GRANT USAGE ON SCHEMA FOO TO ROLE BAR";
        let grant = GrantStatement::parse(text).unwrap();
        assert_eq!(grant.normalized(), normalize_grant(text));
    }
}
