use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trellis_config::WorkflowDef;
use trellis_engine::{EngineConfig, WorkflowService};
use trellis_store::SqliteStore;
use trellis_task_runtime::ScriptTaskRegistry;

/// Trellis - runs trees of scripted tasks, branching on each task's outcome
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.trellis)
  #[arg(long, global = true, env = "TRELLIS_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Database URL (default: sqlite://<data-dir>/trellis.db)
  #[arg(long, global = true, env = "TRELLIS_DATABASE_URL")]
  database_url: Option<String>,

  /// Log filter used when RUST_LOG is not set
  #[arg(long, global = true, default_value = "info", env = "TRELLIS_LOG_LEVEL")]
  log_level: String,

  #[command(flatten)]
  limits: Limits,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Args)]
struct Limits {
  /// Seconds a single task may run before the run fails
  #[arg(long, global = true, env = "TRELLIS_TASK_TIMEOUT_SECS")]
  task_timeout_secs: Option<u64>,

  /// Seconds a whole run may take before it fails
  #[arg(long, global = true, env = "TRELLIS_RUN_TIMEOUT_SECS")]
  run_timeout_secs: Option<u64>,

  /// Most tasks of one run executing at once
  #[arg(long, global = true, env = "TRELLIS_MAX_PARALLEL_TASKS")]
  max_parallel_tasks: Option<NonZeroUsize>,
}

impl Limits {
  fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      task_timeout: self.task_timeout_secs.map(Duration::from_secs),
      run_timeout: self.run_timeout_secs.map(Duration::from_secs),
      max_parallel_tasks: self.max_parallel_tasks,
    }
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Manage projects
  Project {
    #[command(subcommand)]
    command: ProjectCommand,
  },

  /// Manage and run workflows
  Workflow {
    #[command(subcommand)]
    command: WorkflowCommand,
  },
}

#[derive(Subcommand)]
enum ProjectCommand {
  /// Register a project
  Add {
    #[arg(long)]
    name: String,

    /// Project id (generated if omitted)
    #[arg(long)]
    id: Option<String>,
  },
}

#[derive(Subcommand)]
enum WorkflowCommand {
  /// Create a workflow from a JSON definition
  Create {
    /// Path to the workflow file
    workflow_file: PathBuf,
  },

  /// Print a stored workflow
  Show { workflow_id: String },

  /// List the workflows of a project
  List {
    #[arg(long)]
    project: String,
  },

  /// Run a workflow and wait for it to finish
  Run { workflow_id: String },

  /// Print the run history of a workflow with task logs
  Logs { workflow_id: String },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
    )
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();

  let Some(command) = cli.command else {
    println!("trellis - use --help to see available commands");
    return Ok(());
  };

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".trellis"),
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let service = connect(&data_dir, cli.database_url, cli.limits.engine_config()).await?;
    match command {
      Commands::Project { command } => run_project_command(&service, command).await,
      Commands::Workflow { command } => run_workflow_command(&service, command).await,
    }
  })
}

async fn connect(
  data_dir: &Path,
  database_url: Option<String>,
  config: EngineConfig,
) -> Result<WorkflowService> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let database_url = database_url
    .unwrap_or_else(|| format!("sqlite://{}", data_dir.join("trellis.db").display()));
  let store = SqliteStore::connect(&database_url)
    .await
    .with_context(|| format!("failed to open database: {}", database_url))?;

  let registry = ScriptTaskRegistry::new(data_dir.join("tasks"), data_dir.join("environments"));
  info!(data_dir = %data_dir.display(), "using data directory");

  Ok(WorkflowService::new(
    Arc::new(store),
    Arc::new(registry),
    config,
  ))
}

async fn run_project_command(service: &WorkflowService, command: ProjectCommand) -> Result<()> {
  match command {
    ProjectCommand::Add { name, id } => {
      let project = service
        .create_project(&name, id)
        .await
        .context("failed to create project")?;
      print_json(&project)
    }
  }
}

async fn run_workflow_command(service: &WorkflowService, command: WorkflowCommand) -> Result<()> {
  match command {
    WorkflowCommand::Create { workflow_file } => {
      let content = tokio::fs::read_to_string(&workflow_file)
        .await
        .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;
      let def: WorkflowDef = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;

      let workflow = service
        .create_workflow(def)
        .await
        .context("failed to create workflow")?;
      eprintln!(
        "Created workflow {} with {} nodes",
        workflow.id,
        workflow.node_count()
      );
      print_json(&workflow)
    }
    WorkflowCommand::Show { workflow_id } => {
      let workflow = service
        .get_workflow(&workflow_id)
        .await
        .context("failed to load workflow")?;
      print_json(&workflow)
    }
    WorkflowCommand::List { project } => {
      let workflows = service
        .list_workflows(&project)
        .await
        .context("failed to list workflows")?;
      print_json(&workflows)
    }
    WorkflowCommand::Run { workflow_id } => {
      let cancel = CancellationToken::new();
      let on_interrupt = cancel.clone();
      tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          warn!("interrupted, cancelling run");
          on_interrupt.cancel();
        }
      });

      let report = service
        .execute_workflow(&workflow_id, cancel)
        .await
        .context("workflow run failed")?;
      eprintln!("Tasks executed: {}", report.tasks_executed);
      print_json(&serde_json::json!({ "run_id": report.run_id }))
    }
    WorkflowCommand::Logs { workflow_id } => {
      let logs = service
        .workflow_logs(&workflow_id)
        .await
        .context("failed to load workflow logs")?;
      print_json(&logs)
    }
  }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
