//! Migration-runner invocation.
//!
//! Committed files keep their placeholders. Before a deployment they are
//! rendered for the target into a temporary directory, next to a generated
//! runner configuration, and the runner is started as a child process.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, info};

use schemaflow_core::normalize::render_placeholders;
use schemaflow_core::Placeholders;

use crate::config::RunnerConfig;
use crate::error::{Result, WorkflowError};
use crate::paths::{file_name, sql_files, write_atomic};

const CONFIG_FILE_NAME: &str = "schemachange-config.yml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct RunnerVars {
    env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db_prefix: Option<String>,
    db_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
struct RunnerConfigDocument {
    config_version: u32,
    create_change_history_table: bool,
    vars: RunnerVars,
}

/// Renders the runner configuration for a target.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn render_config(values: &Placeholders, schema: Option<&str>) -> Result<String> {
    let document = RunnerConfigDocument {
        config_version: 1,
        create_change_history_table: true,
        vars: RunnerVars {
            env: values.env.to_string(),
            db_prefix: values.db_prefix.clone(),
            db_base: values.db_base.clone(),
            schema: schema.map(str::to_string),
        },
    };
    Ok(serde_yaml::to_string(&document)?)
}

/// Writes every `*.sql` of `schema_dir` into `out_dir` with placeholders
/// rendered.
///
/// # Errors
///
/// Returns [`WorkflowError::MissingFiles`] when `schema_dir` has no SQL
/// files, or an IO error.
pub fn render_schema_dir(
    schema_dir: &Path,
    values: &Placeholders,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let sources = sql_files(schema_dir)?;
    if sources.is_empty() {
        return Err(WorkflowError::MissingFiles(vec![format!(
            "{}/*.sql",
            schema_dir.display()
        )]));
    }
    let mut rendered = Vec::with_capacity(sources.len());
    for source in sources {
        let text = render_placeholders(&std::fs::read_to_string(&source)?, values);
        let target = out_dir.join(file_name(&source));
        write_atomic(&target, text.as_bytes())?;
        debug!(file = %target.display(), "rendered");
        rendered.push(target);
    }
    Ok(rendered)
}

/// Command line of one runner invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub config_file: PathBuf,
    pub root_folder: PathBuf,
    pub dry_run: bool,
    pub verbose: bool,
}

impl Invocation {
    /// Arguments passed to the runner program.
    #[must_use]
    pub fn args(&self) -> Vec<OsString> {
        let folder = match self.config_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.as_os_str().to_owned(),
            _ => OsString::from("."),
        };
        let name = self
            .config_file
            .file_name()
            .map_or_else(|| OsString::from(CONFIG_FILE_NAME), ToOwned::to_owned);

        let mut args: Vec<OsString> = vec![
            "deploy".into(),
            "--config-folder".into(),
            folder,
            "--config-file-name".into(),
            name,
            "--root-folder".into(),
            self.root_folder.as_os_str().to_owned(),
        ];
        if self.dry_run {
            args.push("--dry-run".into());
        }
        if self.verbose {
            args.push("--verbose".into());
        }
        args
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Deploys rendered schema files with the configured runner.
#[derive(Debug, Clone)]
pub struct Runner<'a> {
    config: &'a RunnerConfig,
}

impl<'a> Runner<'a> {
    #[must_use]
    pub const fn new(config: &'a RunnerConfig) -> Self {
        Self { config }
    }

    /// Renders `schema_dir` for the target and runs the runner over it.
    /// The rendered files are removed when the run ends.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Runner`] when the runner exits unsuccessfully,
    /// or an IO error when it cannot be started.
    pub fn deploy(
        &self,
        schema_dir: &Path,
        schema: &str,
        values: &Placeholders,
        dry_run: bool,
        verbose: bool,
    ) -> Result<RunOutput> {
        let workdir = TempDir::new()?;
        let root_folder = workdir.path().join(schema);
        let files = render_schema_dir(schema_dir, values, &root_folder)?;
        info!(schema, files = files.len(), "schema files rendered for deployment");

        let config_file = match &self.config.config_file {
            Some(path) => path.clone(),
            None => {
                let path = workdir.path().join(CONFIG_FILE_NAME);
                write_atomic(&path, render_config(values, Some(schema))?.as_bytes())?;
                path
            }
        };

        let invocation = Invocation {
            program: self.config.program.clone(),
            config_file,
            root_folder,
            dry_run,
            verbose,
        };
        self.run(&invocation)
    }

    /// Runs one invocation and captures its output.
    ///
    /// # Errors
    ///
    /// See [`Runner::deploy`].
    pub fn run(&self, invocation: &Invocation) -> Result<RunOutput> {
        info!(program = %invocation.program, dry_run = invocation.dry_run, "starting migration runner");
        let output = Command::new(&invocation.program)
            .args(invocation.args())
            .output()?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(WorkflowError::Runner {
                code: output.status.code(),
                stdout,
                stderr,
            });
        }
        Ok(RunOutput { stdout, stderr })
    }
}

#[cfg(test)]
mod tests {
    use schemaflow_core::Environment;

    use super::*;

    fn values() -> Placeholders {
        Placeholders::new(Environment::Uat, "PLATFORM").with_prefix(Some("TEST".to_string()))
    }

    #[test]
    fn test_render_config() {
        let yaml = render_config(&values(), Some("REPORTING")).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(doc["config-version"], serde_yaml::Value::from(1));
        assert_eq!(doc["create-change-history-table"], serde_yaml::Value::from(true));
        assert_eq!(doc["vars"]["ENV"], serde_yaml::Value::from("UAT"));
        assert_eq!(doc["vars"]["DB_PREFIX"], serde_yaml::Value::from("TEST"));
        assert_eq!(doc["vars"]["DB_BASE"], serde_yaml::Value::from("PLATFORM"));
        assert_eq!(doc["vars"]["SCHEMA"], serde_yaml::Value::from("REPORTING"));

        let bare = render_config(&Placeholders::new(Environment::Dev, "ALTO"), None).unwrap();
        assert!(!bare.contains("DB_PREFIX"));
        assert!(!bare.contains("SCHEMA"));
    }

    #[test]
    fn test_invocation_args() {
        let invocation = Invocation {
            program: "schemachange".to_string(),
            config_file: PathBuf::from("/tmp/x/schemachange-config.yml"),
            root_folder: PathBuf::from("/tmp/x/REPORTING"),
            dry_run: true,
            verbose: false,
        };
        let args: Vec<String> = invocation
            .args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "deploy",
                "--config-folder",
                "/tmp/x",
                "--config-file-name",
                "schemachange-config.yml",
                "--root-folder",
                "/tmp/x/REPORTING",
                "--dry-run",
            ]
        );
    }

    #[test]
    fn test_render_schema_dir() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(
            src.path().join("V1001__grants.sql"),
            "GRANT USAGE ON SCHEMA IDENTIFIER('{{ DB_PREFIX }}_{{ DB_BASE }}_{{ ENV }}.S') TO ROLE R;",
        )
        .unwrap();
        std::fs::write(src.path().join("README.md"), "{{ ENV }}").unwrap();

        let files = render_schema_dir(src.path(), &values(), out.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(
            std::fs::read_to_string(&files[0]).unwrap(),
            "GRANT USAGE ON SCHEMA IDENTIFIER('TEST_PLATFORM_UAT.S') TO ROLE R;"
        );

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            render_schema_dir(empty.path(), &values(), out.path()),
            Err(WorkflowError::MissingFiles(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_runner_exit_status() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("V1000__baseline.sql"), "select 1;").unwrap();

        let ok = RunnerConfig {
            program: "true".to_string(),
            config_file: None,
        };
        assert!(Runner::new(&ok)
            .deploy(src.path(), "S", &values(), true, false)
            .is_ok());

        let failing = RunnerConfig {
            program: "false".to_string(),
            config_file: None,
        };
        let err = Runner::new(&failing)
            .deploy(src.path(), "S", &values(), false, false)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Runner { code: Some(1), .. }));
    }
}
