//! schemaflow CLI
//!
//! Command-line tool for the schema workflow and the deployment gate.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use schemaflow::extract::ExtractRequest;
use schemaflow::gate::print_report;
use schemaflow::prelude::*;
use schemaflow_core::{Environment, Placeholders, Verdict};

/// Reviewed, resumable schema extraction and deployment.
#[derive(Parser)]
#[command(name = "schemaflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory holding one folder per schema.
    #[arg(long, env = "SCHEMAFLOW_ROOT", default_value = "schemas")]
    root: PathBuf,

    /// Project configuration file.
    #[arg(long, env = "SCHEMAFLOW_CONFIG", default_value = "schemaflow.toml")]
    config: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a schema into a fresh workflow (discards work in progress).
    Extract {
        /// Schema name.
        #[arg(short, long)]
        schema: String,

        /// Source database, e.g. PLATFORM_SIT.
        #[arg(short, long)]
        database: String,

        /// Catalog snapshot answering warehouse queries.
        #[arg(long)]
        snapshot: PathBuf,

        /// Database base name (e.g. PLATFORM).
        #[arg(long)]
        db_base: Option<String>,

        /// Database name prefix (e.g. TEST).
        #[arg(long)]
        db_prefix: Option<String>,
    },

    /// Review templating suggestions interactively.
    Review {
        #[arg(short, long)]
        schema: String,
    },

    /// Generate the final files from review decisions.
    Generate {
        #[arg(short, long)]
        schema: String,
    },

    /// Copy the final files into the schema directory.
    Commit {
        #[arg(short, long)]
        schema: String,

        /// List the files without copying them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the workflow state and the next step.
    Status {
        #[arg(short, long)]
        schema: String,
    },

    /// Remove the temporary workflow files.
    Clean {
        #[arg(short, long)]
        schema: String,
    },

    /// Compare a target schema with the committed files.
    /// Exit code: 0 no changes, 2 changes pending, 1 error.
    Compare {
        /// Target environment (DEV, SIT, QA, UAT, PROD).
        #[arg(short, long)]
        target_env: Environment,

        #[arg(short, long)]
        schema: String,

        /// Catalog snapshot of the target.
        #[arg(long)]
        snapshot: PathBuf,

        /// Schema directory (default: <root>/<SCHEMA>).
        #[arg(long)]
        schema_dir: Option<PathBuf>,

        #[arg(long)]
        db_base: Option<String>,

        #[arg(long)]
        db_prefix: Option<String>,
    },

    /// Compare, then deploy the committed files with the migration runner.
    Deploy {
        #[arg(short, long)]
        target_env: Environment,

        #[arg(short, long)]
        schema: String,

        #[arg(long)]
        snapshot: PathBuf,

        #[arg(long)]
        db_base: Option<String>,

        #[arg(long)]
        db_prefix: Option<String>,

        /// Validate only, don't deploy.
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(&cli.config)?;

    if let Commands::Compare {
        target_env,
        schema,
        snapshot,
        schema_dir,
        db_base,
        db_prefix,
    } = &cli.command
    {
        let workflow = Workflow::new(&cli.root, &schema.to_uppercase(), config);
        let verdict = match compare(
            &workflow,
            *target_env,
            snapshot,
            schema_dir.as_deref(),
            db_base.as_deref(),
            db_prefix.as_deref(),
        ) {
            Ok(verdict) => verdict,
            Err(e) => {
                error!("{e}");
                println!("Error: {e}");
                Verdict::Error
            }
        };
        std::process::exit(verdict.exit_code());
    }

    if let Err(e) = run(&cli, config) {
        error!("{e}");
        print_remedy(&e, &cli.command);
        std::process::exit(1);
    }
    Ok(())
}

fn compare(
    workflow: &Workflow,
    target: Environment,
    snapshot: &Path,
    schema_dir: Option<&Path>,
    db_base: Option<&str>,
    db_prefix: Option<&str>,
) -> Result<Verdict> {
    let placeholders = workflow.placeholders(target, db_base, db_prefix)?;
    let gate = workflow.gate(placeholders, schema_dir);
    let mut warehouse = SnapshotWarehouse::load(snapshot)?;
    let outcome = gate.run(&mut warehouse)?;
    print_report(&outcome);
    Ok(outcome.verdict())
}

fn run(cli: &Cli, config: Config) -> Result<()> {
    match &cli.command {
        Commands::Extract {
            schema,
            database,
            snapshot,
            db_base,
            db_prefix,
        } => {
            let workflow = Workflow::new(&cli.root, &schema.to_uppercase(), config);
            let request = ExtractRequest::new(database.to_uppercase())
                .db_base(db_base.clone())
                .db_prefix(db_prefix.clone());
            extract(&workflow, snapshot, &request)?;
        }

        Commands::Review { schema } => {
            let workflow = Workflow::new(&cli.root, &schema.to_uppercase(), config);
            match workflow.review(&mut StdinPrompt)? {
                ReviewOutcome::Completed(_) => print_next(&workflow, Transition::Generate),
                ReviewOutcome::Quit { decided, total } => {
                    println!("{decided} of {total} decisions kept. Resume with:");
                    println!("   {}", Transition::Review.command(workflow.schema()));
                }
            }
        }

        Commands::Generate { schema } => {
            let workflow = Workflow::new(&cli.root, &schema.to_uppercase(), config);
            workflow.generate()?;
            print_next(&workflow, Transition::Commit);
        }

        Commands::Commit { schema, dry_run } => {
            let workflow = Workflow::new(&cli.root, &schema.to_uppercase(), config);
            let files = workflow.commit(*dry_run)?;
            if !dry_run {
                println!("\nCOMMIT SUMMARY");
                println!("Schema: {}", workflow.schema());
                println!("Files: {} SQL files committed", files.len());
                println!("Target: {}", workflow.paths().schema_dir().display());
            }
        }

        Commands::Status { schema } => {
            let workflow = Workflow::new(&cli.root, &schema.to_uppercase(), config);
            workflow.print_status()?;
        }

        Commands::Clean { schema } => {
            let workflow = Workflow::new(&cli.root, &schema.to_uppercase(), config);
            if workflow.clean()? {
                println!("Cleaned temporary files for {}", workflow.schema());
            } else {
                println!("No temporary files for {}", workflow.schema());
            }
        }

        Commands::Deploy {
            target_env,
            schema,
            snapshot,
            db_base,
            db_prefix,
            dry_run,
        } => {
            let workflow = Workflow::new(&cli.root, &schema.to_uppercase(), config);
            let placeholders =
                workflow.placeholders(*target_env, db_base.as_deref(), db_prefix.as_deref())?;
            deploy(&workflow, snapshot, &placeholders, *dry_run, cli.verbose)?;
        }

        // Exits with the verdict before reaching here.
        Commands::Compare { .. } => {}
    }
    Ok(())
}

fn extract(workflow: &Workflow, snapshot: &Path, request: &ExtractRequest) -> Result<()> {
    let mut warehouse = SnapshotWarehouse::load(snapshot)?;
    let summary = workflow.extract(&mut warehouse, request)?;

    println!("\nEXTRACTION SUMMARY");
    println!("Schema: {}", summary.schema);
    println!("Database: {}", summary.database);
    println!("Objects: {}", summary.object_count);
    println!("Grants: {}", summary.grant_count);
    println!("Location: {}", workflow.paths().temp_dir().display());
    print_next(workflow, Transition::Review);
    Ok(())
}

fn deploy(
    workflow: &Workflow,
    snapshot: &Path,
    placeholders: &Placeholders,
    dry_run: bool,
    verbose: bool,
) -> Result<()> {
    let mut warehouse = SnapshotWarehouse::load(snapshot)?;
    info!(
        schema = %workflow.schema(),
        database = %placeholders.database_name(),
        dry_run,
        "deploying"
    );
    let (outcome, output) = workflow.deploy(&mut warehouse, placeholders, dry_run, verbose)?;
    if outcome.verdict() == Verdict::NoChanges {
        println!("Target already matches; deployment only records change history");
    }
    print!("{}", output.stdout);
    println!(
        "Successfully {} {}",
        if dry_run { "validated" } else { "deployed" },
        workflow.schema()
    );
    Ok(())
}

fn print_next(workflow: &Workflow, transition: Transition) {
    println!("\nNEXT STEP");
    println!("Command: {}", transition.command(workflow.schema()));
    println!("Purpose: {}", transition.description());
}

fn print_remedy(e: &WorkflowError, command: &Commands) {
    println!("Error: {e}");
    let schema = match command {
        Commands::Extract { schema, .. }
        | Commands::Review { schema }
        | Commands::Generate { schema }
        | Commands::Commit { schema, .. }
        | Commands::Status { schema }
        | Commands::Clean { schema }
        | Commands::Compare { schema, .. }
        | Commands::Deploy { schema, .. } => schema.to_uppercase(),
    };
    match e {
        WorkflowError::InvalidState { actual, .. } => match actual.next() {
            Some(transition) => {
                println!("Next step for state {actual}:");
                println!("   {}", transition.command(&schema));
            }
            None => {
                println!("Workflow already committed. Restart with:");
                println!("   {}", Transition::Extract.command(&schema));
            }
        },
        WorkflowError::MissingFiles(_) | WorkflowError::NoFinalFiles(_) => {
            println!("The workflow looks incomplete. Restart extraction:");
            println!("   {}", Transition::Extract.command(&schema));
        }
        WorkflowError::Runner { stdout, stderr, .. } => {
            if !stdout.is_empty() {
                println!("{stdout}");
            }
            if !stderr.is_empty() {
                eprintln!("{stderr}");
            }
        }
        _ => {}
    }
}
