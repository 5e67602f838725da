use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::manifest::TaskManifest;
use crate::registry::{ExitCode, TaskRegistry};

const DEFAULT_INTERPRETER: &str = "python3";

/// Filesystem-based task registry that runs each task's script as a child
/// process.
///
/// Tasks and environments are laid out as:
/// ```text
/// {tasks_dir}/
/// └── {task_id}/
///     ├── task.json
///     └── main.py
/// {environments_dir}/
/// └── {environment_id}.env
/// ```
///
/// The script's exit code is returned as-is. A process killed by a signal
/// has no exit code and is reported as `1`.
#[derive(Debug, Clone)]
pub struct ScriptTaskRegistry {
  tasks_dir: PathBuf,
  environments_dir: PathBuf,
  default_interpreter: String,
}

impl ScriptTaskRegistry {
  /// Create a new registry rooted at the given directories.
  pub fn new(tasks_dir: impl Into<PathBuf>, environments_dir: impl Into<PathBuf>) -> Self {
    Self {
      tasks_dir: tasks_dir.into(),
      environments_dir: environments_dir.into(),
      default_interpreter: DEFAULT_INTERPRETER.to_string(),
    }
  }

  /// Use a different interpreter for tasks whose manifest names none.
  pub fn with_default_interpreter(mut self, interpreter: impl Into<String>) -> Self {
    self.default_interpreter = interpreter.into();
    self
  }

  /// Get the tasks directory.
  pub fn tasks_dir(&self) -> &Path {
    &self.tasks_dir
  }

  /// Read the manifest of a task.
  pub async fn manifest(&self, task_id: &str) -> Result<TaskManifest, TaskError> {
    check_id("task", task_id)?;
    let path = self.tasks_dir.join(task_id).join("task.json");
    let content = match fs::read_to_string(&path).await {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Err(TaskError::NotFound {
          task_id: task_id.to_string(),
        });
      }
      Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&content).map_err(|source| TaskError::InvalidManifest {
      task_id: task_id.to_string(),
      source,
    })
  }

  /// Load the variables of an environment. An empty id means none.
  async fn environment(&self, environment_id: &str) -> Result<Vec<(String, String)>, TaskError> {
    if environment_id.is_empty() {
      return Ok(Vec::new());
    }
    check_id("environment", environment_id)?;

    let path = self.environments_dir.join(format!("{}.env", environment_id));
    if !fs::try_exists(&path).await? {
      return Err(TaskError::EnvironmentNotFound {
        environment_id: environment_id.to_string(),
      });
    }

    let invalid = |source| TaskError::InvalidEnvironment {
      environment_id: environment_id.to_string(),
      source,
    };
    dotenvy::from_path_iter(&path)
      .map_err(invalid)?
      .collect::<Result<Vec<_>, _>>()
      .map_err(invalid)
  }
}

/// Ids are joined onto the registry directories, so each must be exactly one
/// plain path component.
fn check_id(kind: &'static str, id: &str) -> Result<(), TaskError> {
  let mut components = Path::new(id).components();
  let single = matches!(
    (components.next(), components.next()),
    (Some(Component::Normal(_)), None)
  );
  if single && !id.contains(['/', '\\']) {
    return Ok(());
  }
  Err(TaskError::InvalidId {
    kind,
    id: id.to_string(),
  })
}

#[async_trait]
impl TaskRegistry for ScriptTaskRegistry {
  async fn run_task(&self, task_id: &str, environment_id: &str) -> Result<ExitCode, TaskError> {
    let manifest = self.manifest(task_id).await?;
    let vars = self.environment(environment_id).await?;

    let task_dir = self.tasks_dir.join(task_id);
    let interpreter = manifest
      .interpreter
      .as_deref()
      .unwrap_or(&self.default_interpreter);

    debug!(
      task_id = %task_id,
      interpreter = %interpreter,
      script = %manifest.script,
      "launching task script"
    );

    let launch_error = |source| TaskError::Launch {
      task_id: task_id.to_string(),
      source,
    };

    let mut child = Command::new(interpreter)
      .arg(&manifest.script)
      .current_dir(&task_dir)
      .envs(vars)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(launch_error)?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (status, _, _) = tokio::join!(
      child.wait(),
      forward_lines(task_id, "stdout", stdout),
      forward_lines(task_id, "stderr", stderr),
    );
    let status = status.map_err(launch_error)?;

    let exit_code = status.code().unwrap_or(1);
    info!(task_id = %task_id, exit_code, "task script exited");
    Ok(exit_code)
  }

  async fn task_name(&self, task_id: &str) -> Option<String> {
    self.manifest(task_id).await.ok().map(|m| m.name)
  }
}

/// Emit each line a script writes as a log event.
async fn forward_lines<R>(task_id: &str, stream: &'static str, reader: Option<R>)
where
  R: AsyncRead + Unpin,
{
  let Some(reader) = reader else {
    return;
  };

  let mut lines = BufReader::new(reader).lines();
  loop {
    match lines.next_line().await {
      Ok(Some(line)) if stream == "stderr" => warn!(task_id = %task_id, stream, "{}", line),
      Ok(Some(line)) => info!(task_id = %task_id, stream, "{}", line),
      Ok(None) => break,
      Err(e) => {
        warn!(task_id = %task_id, stream, error = %e, "failed to read task output");
        break;
      }
    }
  }
}
