use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{BuildError, BuildResult};
use crate::job::{Job, Step};
use crate::recipe::template::expand;
use crate::rule::Recipe;

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub duration: f64,
    pub exit_code: Option<i32>,
}

/// Runs `<shell> -c <command>` in `workdir`, handing every stdout/stderr line
/// to `output` as it arrives.
pub async fn execute_step<F>(
    shell: &str,
    command: &str,
    workdir: &Path,
    mut output: F,
) -> BuildResult<ExecutionResult>
where
    F: FnMut(String),
{
    let start = Instant::now();

    let mut child = Command::new(shell)
        .arg("-c")
        .arg(command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| BuildError::Spawn {
            command: command.to_string(),
            source,
        })?;

    debug!(pid = ?child.id(), %command, "spawned");

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, tx.clone());
    }
    drop(tx);

    while let Some(line) = rx.recv().await {
        output(line);
    }

    let status = child
        .wait()
        .await
        .map_err(|e| BuildError::io(format!("waiting for `{}`", command), e))?;

    Ok(ExecutionResult {
        success: status.success(),
        duration: start.elapsed().as_secs_f64(),
        exit_code: status.code(),
    })
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

/// Declares templated dependencies, then runs a templated shell command when
/// the target is stale. Without a command the target only aggregates its
/// dependencies; it never gets a stamp, so its dependents rebuild whenever it
/// does.
#[derive(Debug, Clone)]
pub struct CommandRecipe {
    deps: Vec<String>,
    command: Option<String>,
    shell: String,
    workdir: PathBuf,
}

impl CommandRecipe {
    pub fn new(deps: Vec<String>, command: Option<String>) -> Self {
        Self {
            deps,
            command,
            shell: "sh".to_string(),
            workdir: PathBuf::from("."),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }
}

#[async_trait]
impl Recipe for CommandRecipe {
    async fn build(&self, job: Job) -> BuildResult<()> {
        let deps = self
            .deps
            .iter()
            .map(|dep| expand(dep, job.captures(), None))
            .collect::<BuildResult<Vec<_>>>()?;

        if job.dep(&deps).await? == Step::Done {
            return Ok(());
        }

        let Some(template) = &self.command else {
            return Ok(());
        };
        let command = expand(template, job.captures(), Some(&deps))?;

        let result = execute_step(&self.shell, &command, &self.workdir, |line| {
            job.output(line)
        })
        .await?;

        debug!(name = %job.name(), duration = result.duration, "command finished");

        if !result.success {
            return Err(BuildError::CommandFailed {
                target: job.name().to_string(),
                command,
                code: result.exit_code,
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.command {
            Some(command) => command.clone(),
            None => format!("aggregate of {}", self.deps.join(" ")),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::{BuildContext, Engine};
    use crate::report::BuildEvent;
    use crate::rule::Rules;
    use crate::stamp::{FreshnessSource, FsStat};
    use crate::target::TargetStatus;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_execute_step_collects_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut lines = Vec::new();

        let result = execute_step("sh", "echo one; echo two >&2; exit 3", dir.path(), |line| {
            lines.push(line)
        })
        .await
        .unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        lines.sort();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_command_recipe_builds_from_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("greeting.txt"), "hello\n").unwrap();

        let mut rules = Rules::new();
        rules
            .register(
                r"(.*)\.upper",
                CommandRecipe::new(
                    vec!["{1}.txt".to_string()],
                    Some("tr a-z A-Z < {deps} > {0} && echo converted".to_string()),
                )
                .with_workdir(dir.path()),
            )
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let stat: Arc<dyn FreshnessSource> = Arc::new(FsStat::new(dir.path()));
        let engine = Engine::new(BuildContext::new(rules, stat).with_events(tx));

        let target = engine.build("greeting.upper").await;
        assert_eq!(target.status(), TargetStatus::DoneBuilt);
        assert!(target.freshness().is_some());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("greeting.upper")).unwrap(),
            "HELLO\n"
        );

        engine.settle().await;
        let mut saw_output = false;
        while let Ok(event) = rx.try_recv() {
            if let BuildEvent::Output { line, .. } = event {
                saw_output |= line == "converted";
            }
        }
        assert!(saw_output);
    }

    #[tokio::test]
    async fn test_failing_command_errors_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut rules = Rules::new();
        rules
            .register(
                "broken",
                CommandRecipe::new(Vec::new(), Some("exit 7".to_string()))
                    .with_workdir(dir.path()),
            )
            .unwrap();

        let stat: Arc<dyn FreshnessSource> = Arc::new(FsStat::new(dir.path()));
        let engine = Engine::new(BuildContext::new(rules, stat));
        let target = engine.build("broken").await;

        assert_eq!(target.status(), TargetStatus::Errored);
        assert!(matches!(
            target.error().as_deref(),
            Some(BuildError::CommandFailed { code: Some(7), .. })
        ));
    }

    #[tokio::test]
    async fn test_aggregate_without_command() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), "").unwrap();
        std::fs::write(dir.path().join("b"), "").unwrap();

        let mut rules = Rules::new();
        rules
            .register(
                "all",
                CommandRecipe::new(vec!["a".to_string(), "b".to_string()], None),
            )
            .unwrap();

        let stat: Arc<dyn FreshnessSource> = Arc::new(FsStat::new(dir.path()));
        let engine = Engine::new(BuildContext::new(rules, stat));
        let target = engine.build("all").await;

        assert_eq!(target.status(), TargetStatus::DoneBuilt);
        assert!(target.freshness().is_none());
    }
}
