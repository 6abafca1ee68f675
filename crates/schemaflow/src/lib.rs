//! Reviewed, resumable schema extraction and deployment for cloud
//! warehouses.
//!
//! `schemaflow` moves a schema from a source environment into versioned,
//! environment-neutral SQL files through a gated workflow:
//!
//! - **Extract** - dumps object DDL and schema grants into `temp/raw/`.
//! - **Review** - analyzes environment references and asks the operator to
//!   accept or reject each templating suggestion.
//! - **Generate** - applies the accepted suggestions into `temp/final/`.
//! - **Commit** - copies the final files into the schema directory.
//!
//! Each step checks the persisted workflow state before touching anything.
//! The committed files are then compared against a target environment
//! (the deployment gate) and handed to the migration runner.
//!
//! # CLI Usage
//!
//! ```bash
//! schemaflow extract --schema REPORTING --database PLATFORM_SIT --snapshot sit.json
//! schemaflow review --schema REPORTING
//! schemaflow generate --schema REPORTING
//! schemaflow commit --schema REPORTING
//!
//! # exit code 0: no changes, 2: changes pending, 1: comparison failed
//! schemaflow compare --target-env QA --schema REPORTING --snapshot qa.json
//! ```

pub mod commit;
pub mod config;
pub mod error;
pub mod extract;
pub mod gate;
pub mod generate;
pub mod paths;
pub mod review;
pub mod runner;
pub mod state;
pub mod warehouse;
pub mod workflow;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{Config, DecisionScope};
    pub use crate::error::{Result, WorkflowError};
    pub use crate::extract::{ExtractRequest, ExtractionSummary};
    pub use crate::gate::{Gate, GateOutcome};
    pub use crate::review::{
        Decision, DecisionRecord, Prompt, ReviewOutcome, ScriptedPrompt, StdinPrompt,
    };
    pub use crate::state::{StateStore, Transition, WorkflowState, WorkflowStep};
    pub use crate::warehouse::{Row, SnapshotGrant, SnapshotWarehouse, Warehouse};
    pub use crate::workflow::{Status, Workflow};
}
