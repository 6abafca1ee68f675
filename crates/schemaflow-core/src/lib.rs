//! Core logic for multi-environment warehouse schema management.
//!
//! `schemaflow-core` holds the decision logic of the `schemaflow` tool and
//! performs no I/O:
//!
//! - **Catalog** - which object kinds are managed, in dependency order, and
//!   which privileges are essential.
//! - **Normalizer** - placeholder rendering/templating and the canonical
//!   forms DDL and grants are compared by.
//! - **Analyzer** - finds environment-qualified database references and
//!   decides which can safely become `{{DB_BASE}}_{{ENV}}`.
//! - **Comparison** - classifies objects and grants as new, modified,
//!   removed or unchanged and derives a deployment verdict.
//!
//! # Example
//!
//! ```rust
//! use schemaflow_core::normalize::normalize_grant;
//!
//! assert_eq!(
//!     normalize_grant("GRANT USAGE ON SCHEMA IDENTIFIER('FOO') TO ROLE BAR"),
//!     normalize_grant("grant usage on schema foo to role bar"),
//! );
//! ```

pub mod analyzer;
pub mod catalog;
pub mod compare;
pub mod environment;
pub mod grant;
pub mod lexer;
pub mod normalize;

pub use analyzer::{AnalysisReport, RiskLevel, Suggestion, TemplatingAnalyzer};
pub use catalog::{ObjectKind, SchemaCoordinate};
pub use compare::{Comparison, Verdict};
pub use environment::Environment;
pub use grant::GrantStatement;
pub use normalize::{Placeholder, Placeholders};
