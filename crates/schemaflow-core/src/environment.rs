//! Deployment environment codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A deployment environment, encoded as a suffix on database names
/// (`PLATFORM_SIT`) and a prefix on environment-specific role names
/// (`SIT_ANALYST`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Environment {
    Dev,
    Sit,
    Qa,
    Uat,
    Prod,
}

impl Environment {
    /// All known environments.
    pub const ALL: [Self; 5] = [Self::Dev, Self::Sit, Self::Qa, Self::Uat, Self::Prod];

    /// Returns the upper-case environment code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Dev => "DEV",
            Self::Sit => "SIT",
            Self::Qa => "QA",
            Self::Uat => "UAT",
            Self::Prod => "PROD",
        }
    }

    /// Returns every environment other than `self`.
    pub fn others(self) -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(move |env| *env != self)
    }

    /// Splits a trailing `_<ENV>` suffix off a database name.
    ///
    /// Returns the remaining base and the environment, or `None` when the
    /// name has no recognized suffix.
    #[must_use]
    pub fn split_suffix(database: &str) -> Option<(&str, Self)> {
        let (base, suffix) = database.rsplit_once('_')?;
        let env = suffix.parse().ok()?;
        Some((base, env))
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned when parsing an unknown environment code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEnvironment(pub String);

impl fmt::Display for UnknownEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown environment '{}' (expected one of DEV, SIT, QA, UAT, PROD)",
            self.0
        )
    }
}

impl std::error::Error for UnknownEnvironment {}

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|env| env.code() == upper)
            .ok_or_else(|| UnknownEnvironment(s.to_string()))
    }
}
