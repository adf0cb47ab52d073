use std::path::{Path, PathBuf};

use llmperf_build::{BuildAdapter, ExecResult};
use llmperf_core::{path_component, BaselineKind, EvalError, PatchName, RunScope, Task};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug)]
pub enum BenchOutcome {
    /// A result from an earlier run exists; the harness was not invoked.
    AlreadyPresent(PathBuf),
    Written { path: PathBuf, exec: ExecResult },
}

impl BenchOutcome {
    pub fn path(&self) -> &Path {
        match self {
            BenchOutcome::AlreadyPresent(p) => p,
            BenchOutcome::Written { path, .. } => path,
        }
    }
}

/// Harness failure. Carries the invocation when there was one, for the evidence log.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct BenchFailure {
    pub error: EvalError,
    pub exec: Option<ExecResult>,
}

impl BenchFailure {
    fn harness(reason: impl Into<String>, exec: Option<ExecResult>) -> Self {
        Self { error: EvalError::BenchmarkHarness(reason.into()), exec }
    }
}

/// Runs the designated benchmark and keeps its raw result at a deterministic path.
#[derive(Clone, Debug)]
pub struct BenchmarkInvoker {
    pub root: PathBuf,
}

impl BenchmarkInvoker {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// `{root}/{project}/{scope}[/{patch}]/{benchmark_id}_{task_id}[_dev].json`.
    /// Baselines have no patch level; post-fix results carry `_dev`.
    pub fn result_path(&self, task: &Task, scope: &RunScope, patch: Option<&PatchName>) -> PathBuf {
        let mut dir = self.root.join(task.project.as_str()).join(path_component(&scope.label()));
        if let (RunScope::Model(_), Some(p)) = (scope, patch) {
            dir = dir.join(path_component(p.as_str()));
        }
        let suffix = match scope {
            RunScope::Baseline(BaselineKind::PostFix) => "_dev",
            _ => "",
        };
        dir.join(format!(
            "{}_{}{}.json",
            path_component(&task.benchmark_id),
            path_component(task.id.as_str()),
            suffix
        ))
    }

    pub fn run(
        &self,
        adapter: &dyn BuildAdapter,
        workspace_root: &Path,
        task: &Task,
        scope: &RunScope,
        patch: Option<&PatchName>,
    ) -> Result<BenchOutcome, BenchFailure> {
        let path = self.result_path(task, scope, patch);
        if path.exists() {
            info!(project = %task.project, task = %task.id, path = %path.display(), "benchmark result present, skipping");
            return Ok(BenchOutcome::AlreadyPresent(path));
        }
        if task.benchmark_id.trim().is_empty() {
            return Err(BenchFailure::harness("task has no benchmark", None));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BenchFailure::harness(format!("create {}: {e}", parent.display()), None))?;
        }

        info!(project = %task.project, task = %task.id, benchmark = %task.benchmark_id, "running benchmark");
        let exec = adapter
            .bench(workspace_root, &task.benchmark_id, &path)
            .map_err(|e| BenchFailure::harness(format!("{e:#}"), None))?;

        if !exec.passed {
            // a partial result would be taken for a finished one on the next run
            let _ = std::fs::remove_file(&path);
            let code = exec.exit_code.map_or("killed".to_string(), |c| format!("exit {c}"));
            warn!(task = %task.id, %code, "benchmark harness failed");
            return Err(BenchFailure::harness(format!("`{}` failed ({code})", exec.command), Some(exec)));
        }
        if !path.exists() {
            warn!(task = %task.id, path = %path.display(), "benchmark produced no result file");
            return Err(BenchFailure::harness(format!("no result file at {}", path.display()), Some(exec)));
        }
        Ok(BenchOutcome::Written { path, exec })
    }
}
