use std::path::{Path, PathBuf};

use llmperf_build::{run_argv, Bootstrap, QuirkHit, QuirkStage, QuirkTable, TemplateVars};
use llmperf_core::{BaselineKind, EvalError, Pin, Project, Task};
use llmperf_vcs::VcsAdapter;
use tracing::{debug, info};

/// One project checkout that the pipeline resets, patches and builds.
#[derive(Clone, Debug)]
pub struct Workspace {
    pub project: Project,
    pub root_path: PathBuf,
    /// `None` until the first successful reset, and again while one is in progress.
    pub current_pin: Option<Pin>,
}

impl Workspace {
    pub fn open(project: Project, root_path: PathBuf) -> Self {
        Self { project, root_path, current_pin: None }
    }

    fn error(&self, reason: impl Into<String>) -> EvalError {
        EvalError::workspace(&self.root_path, reason)
    }
}

/// What a reset did, for the evidence trail.
#[derive(Clone, Debug, Default)]
pub struct ResetReport {
    pub restored_from: Option<String>,
    pub quirks: Vec<QuirkHit>,
    pub bootstrapped: bool,
}

pub struct WorkspaceController<'a> {
    vcs: &'a dyn VcsAdapter,
    quirks: &'a QuirkTable,
    clean_ignored: bool,
}

impl<'a> WorkspaceController<'a> {
    pub fn new(vcs: &'a dyn VcsAdapter, quirks: &'a QuirkTable, clean_ignored: bool) -> Self {
        Self { vcs, quirks, clean_ignored }
    }

    /// Bring `ws` to the task's fix commit (post-fix) or to the fix commit with
    /// the target paths rolled back to their pre-fix content (pre-fix).
    ///
    /// Untracked files and local edits from a previous candidate are discarded
    /// first. Any failure leaves `current_pin` unset.
    pub fn reset(
        &self,
        ws: &mut Workspace,
        task: &Task,
        kind: BaselineKind,
        bootstrap: Option<&Bootstrap>,
    ) -> Result<ResetReport, EvalError> {
        ws.current_pin = None;
        let root = ws.root_path.clone();
        if !root.is_dir() {
            return Err(ws.error("workspace directory does not exist"));
        }
        let is_repo = self.vcs.is_repo(&root).map_err(|e| ws.error(format!("{e:#}")))?;
        if !is_repo {
            return Err(ws.error(format!("not a {} checkout", self.vcs.name())));
        }

        debug!(project = %ws.project, task = %task.id, kind = kind.as_str(), "resetting workspace");
        self.vcs
            .clean(&root, self.clean_ignored)
            .map_err(|e| ws.error(format!("clean failed: {e:#}")))?;
        self.vcs
            .hard_reset(&root, &task.commit_hash)
            .map_err(|e| ws.error(format!("checkout {} failed: {e:#}", task.commit_hash)))?;

        let mut report = ResetReport::default();
        if kind == BaselineKind::PreFix {
            let rev = task.pre_fix_rev();
            self.vcs
                .restore_paths_from(&root, &rev, &task.target_paths)
                .map_err(|e| ws.error(format!("restore from {rev} failed: {e:#}")))?;
            report.restored_from = Some(rev);
        }

        report.quirks = self
            .quirks
            .apply(ws.project, QuirkStage::Reset, &root)
            .map_err(|e| ws.error(format!("reset quirks: {e:#}")))?;

        if let Some(b) = bootstrap {
            report.bootstrapped = run_bootstrap(&root, b).map_err(|reason| ws.error(reason))?;
        }

        info!(
            project = %ws.project,
            task = %task.id,
            commit = %task.commit_hash,
            kind = kind.as_str(),
            quirks = report.quirks.len(),
            "workspace reset"
        );
        ws.current_pin = Some(Pin { commit_hash: task.commit_hash.clone(), kind });
        Ok(report)
    }
}

fn run_bootstrap(root: &Path, b: &Bootstrap) -> Result<bool, String> {
    if root.join(&b.creates).exists() {
        return Ok(false);
    }
    let argv = b.command.render(&TemplateVars::default()).map_err(|e| e.to_string())?;
    let exec = run_argv(root, &argv).map_err(|e| format!("bootstrap `{}`: {e:#}", b.command))?;
    if !exec.passed {
        return Err(format!("bootstrap `{}` failed:\n{}", exec.command, exec.combined_output()));
    }
    if !root.join(&b.creates).exists() {
        return Err(format!("bootstrap `{}` did not create {}", exec.command, b.creates));
    }
    info!(root = %root.display(), creates = %b.creates, "bootstrapped workspace");
    Ok(true)
}
