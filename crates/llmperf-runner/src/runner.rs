use std::path::{Path, PathBuf};

use anyhow::Result;
use llmperf_artifacts::{ArtifactStore, EvidenceManifest, EvidenceRole, FsArtifactStore};
use llmperf_bench::{BenchOutcome, BenchmarkInvoker};
use llmperf_build::{adapter_for, run_tests, BuildAdapter, ProjectProfile, QuirkStage, QuirkTable, TestReport};
use llmperf_core::{
    path_component, should_benchmark, EvalError, LedgerKey, Patch, PatchSource, Project, RunId, RunScope,
    Task, Verdict,
};
use llmperf_ledger::{CsvLedger, Ledger};
use llmperf_ledger_sqlite::SqliteLedger;
use llmperf_tasks::TaskRegistry;
use llmperf_vcs::{normalize_patch, ApplyOutcome, VcsAdapter};
use llmperf_vcs_git::GitAdapter;
use tracing::{debug, info, warn};

use crate::doctor::{doctor, Check};
use crate::workspace::{Workspace, WorkspaceController};
use crate::{Config, LedgerBackend};

/// Extension of patch files picked up from a model's patch directory.
pub const PATCH_EXTENSION: &str = "diff";

pub struct Runner {
    pub repo_root: PathBuf,
    pub cfg: Config,
    pub ledger: Box<dyn Ledger>,
    pub artifacts: FsArtifactStore,
    pub vcs: Box<dyn VcsAdapter>,
    pub quirks: QuirkTable,
    pub bench: BenchmarkInvoker,
}

#[derive(Clone, Debug)]
pub struct RunRequest {
    pub scope: RunScope,
    /// Restrict the run to one project.
    pub project: Option<Project>,
    /// Invoke benchmarks for eligible candidates.
    pub bench: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub recorded: usize,
    /// Candidates already in the ledger.
    pub skipped: usize,
    pub plausible: usize,
    /// Tasks abandoned because their workspace could not be prepared.
    pub task_errors: usize,
    pub benchmarks_written: usize,
    pub benchmark_failures: usize,
}

/// Why a candidate stopped short of a verdict.
enum Abort {
    /// Stop the whole run.
    Run(anyhow::Error),
    /// Give up on the current task, keep going with the next.
    Task(EvalError),
}

impl From<EvalError> for Abort {
    fn from(e: EvalError) -> Self {
        if e.is_fatal_for_run() {
            Abort::Run(e.into())
        } else {
            Abort::Task(e)
        }
    }
}

/// Per-project state shared by every task of that project.
struct ProjectCtx<'a> {
    profile: ProjectProfile,
    adapter: Box<dyn BuildAdapter>,
    controller: WorkspaceController<'a>,
    fingerprint: &'a str,
}

impl Runner {
    pub fn open(repo_root: PathBuf) -> Result<Self> {
        let cfg = Config::load_or_init(&repo_root)?;
        Self::with_config(repo_root, cfg)
    }

    pub fn with_config(repo_root: PathBuf, cfg: Config) -> Result<Self> {
        cfg.validate()?;
        let ledger: Box<dyn Ledger> = match cfg.ledger.backend {
            LedgerBackend::Csv => Box::new(CsvLedger::new(cfg.results_root(&repo_root))),
            LedgerBackend::Sqlite => {
                let db = cfg.sqlite_path(&repo_root);
                if let Some(parent) = db.parent() {
                    std::fs::create_dir_all(parent).ok();
                }
                Box::new(SqliteLedger::open(&db)?)
            }
        };
        let artifacts = FsArtifactStore::new(cfg.artifacts_root(&repo_root));
        let quirks = cfg.quirk_table(&repo_root)?;
        let bench = BenchmarkInvoker::new(cfg.benchmarks_root(&repo_root));

        Ok(Self { repo_root, cfg, ledger, artifacts, vcs: Box::new(GitAdapter::new()), quirks, bench })
    }

    pub fn init_repo(repo_root: &Path) -> Result<()> {
        let cfg = Config::load_or_init(repo_root)?;
        for dir in [cfg.results_root(repo_root), cfg.benchmarks_root(repo_root), cfg.artifacts_root(repo_root)] {
            std::fs::create_dir_all(&dir).ok();
        }
        if cfg.ledger.backend == LedgerBackend::Sqlite {
            let _ = SqliteLedger::open(&cfg.sqlite_path(repo_root))?;
        }
        Ok(())
    }

    pub fn doctor(&self, projects: &[Project]) -> Vec<Check> {
        doctor(&self.repo_root, &self.cfg, self.vcs.as_ref(), projects)
    }

    /// Evaluate every candidate of every task in `registry` (optionally one
    /// project only) for `req.scope`. Candidates already in the ledger are
    /// skipped, so re-running after an interruption resumes where it stopped.
    /// A recorded candidate whose benchmark result is missing is rebuilt and
    /// benchmarked again.
    pub fn run(&self, registry: &TaskRegistry, req: &RunRequest) -> Result<RunSummary> {
        if let RunScope::Model(name) = &req.scope {
            if name.trim().is_empty() || path_component(name) != *name || name.starts_with('.') {
                return Err(EvalError::Usage(format!("invalid model name `{name}`")).into());
            }
        }

        let mut summary = RunSummary::default();
        let projects: Vec<Project> =
            registry.projects().into_iter().filter(|p| req.project.map_or(true, |only| only == *p)).collect();
        if projects.is_empty() {
            warn!(project = ?req.project, "no tasks selected");
        }

        for project in projects {
            let profile = self.cfg.profile(project);
            let adapter = adapter_for(&profile).map_err(|e| EvalError::Usage(e.to_string()))?;
            let mut ws = Workspace::open(project, self.cfg.workspace_dir(&self.repo_root, &profile));
            let tasks: Vec<&Task> = registry.for_project(project).collect();

            if !ws.root_path.is_dir() {
                warn!(%project, path = %ws.root_path.display(), tasks = tasks.len(), "workspace missing, skipping project");
                summary.task_errors += tasks.len();
                continue;
            }

            let ctx = ProjectCtx {
                profile,
                adapter,
                controller: WorkspaceController::new(self.vcs.as_ref(), &self.quirks, self.cfg.workspace.clean_ignored),
                fingerprint: registry.fingerprint(),
            };
            info!(%project, scope = %req.scope.label(), tasks = tasks.len(), tool = ?ctx.adapter.tool(), "project started");

            for task in tasks {
                match self.run_task(&ctx, &mut ws, task, req, &mut summary) {
                    Ok(()) => {}
                    Err(Abort::Task(e)) => {
                        warn!(%project, task = %task.id, error = %e, "task abandoned");
                        summary.task_errors += 1;
                    }
                    Err(Abort::Run(e)) => return Err(e),
                }
            }
        }

        info!(?summary, "run finished");
        Ok(summary)
    }

    fn run_task(
        &self,
        ctx: &ProjectCtx<'_>,
        ws: &mut Workspace,
        task: &Task,
        req: &RunRequest,
        summary: &mut RunSummary,
    ) -> Result<(), Abort> {
        for candidate in self.candidates(task, &req.scope)? {
            self.run_candidate(ctx, ws, task, &candidate, req, summary)?;
        }
        Ok(())
    }

    /// Baselines have a single candidate, the checked-out source. Model runs
    /// take every patch file under `{patches_root}/{project}/{model}/{task_id}/`
    /// in name order.
    fn candidates(&self, task: &Task, scope: &RunScope) -> Result<Vec<Patch>, Abort> {
        let model = match scope {
            RunScope::Baseline(_) => return Ok(vec![Patch::developer(task.id.clone())]),
            RunScope::Model(m) => m,
        };
        let dir = self
            .cfg
            .patches_root(&self.repo_root)
            .join(task.project.as_str())
            .join(model)
            .join(path_component(task.id.as_str()));
        if !dir.is_dir() {
            debug!(task = %task.id, dir = %dir.display(), "no patches for task");
            return Ok(vec![]);
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|e| Abort::from(EvalError::Io(e)))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| p.extension().and_then(|x| x.to_str()).map_or(false, |x| x == PATCH_EXTENSION))
            .collect();
        files.sort();

        let mut out = Vec::with_capacity(files.len());
        for f in files {
            match Patch::from_file(&f, PatchSource::Model(model.clone()), task.id.clone()) {
                Ok(p) => out.push(p),
                Err(e) => warn!(path = %f.display(), error = %e, "unreadable patch file skipped"),
            }
        }
        Ok(out)
    }

    fn run_candidate(
        &self,
        ctx: &ProjectCtx<'_>,
        ws: &mut Workspace,
        task: &Task,
        candidate: &Patch,
        req: &RunRequest,
        summary: &mut RunSummary,
    ) -> Result<(), Abort> {
        let key = LedgerKey::new(task.project, &req.scope, &task.id, &candidate.name);
        if let Some(stored) = self.ledger.get(&key).map_err(Abort::Run)? {
            summary.skipped += 1;
            let bench_pending =
                req.bench && should_benchmark(&req.scope, &stored) && !self.bench_result_exists(task, candidate, &req.scope);
            if bench_pending {
                return self.resume_benchmark(ctx, ws, task, candidate, req, &key, stored, summary);
            }
            debug!(%key, "already recorded, skipping");
            return Ok(());
        }

        let (run_dir, mut manifest) = self.open_run(ctx, task, candidate, &key, None)?;
        let root = self.reset_stage(ctx, ws, task, req, &run_dir, &mut manifest)?;

        let verdict = match self.evaluate(ctx, &root, task, candidate, &run_dir, &mut manifest) {
            Ok(v) => v,
            Err(e) => {
                manifest.verdict = Some("error".into());
                return Err(self.fail(&run_dir, &manifest, e)?);
            }
        };

        if !self.ledger.record(&key, &verdict).map_err(Abort::Run)? {
            debug!(%key, "verdict was recorded concurrently");
        }
        summary.recorded += 1;
        if verdict.is_plausible() {
            summary.plausible += 1;
        }
        manifest.verdict = Some(verdict.to_string());
        info!(project = %task.project, task = %task.id, patch = %candidate.name, %verdict, "verdict recorded");
        self.log(&run_dir, &format!("- verdict: {verdict}"))?;

        if req.bench && should_benchmark(&req.scope, &verdict) {
            self.benchmark(ctx, &root, task, candidate, &req.scope, &run_dir, &mut manifest, summary)?;
        }

        self.artifacts.write_manifest(&run_dir, &manifest).map_err(Abort::Run)?;
        Ok(())
    }

    fn bench_result_exists(&self, task: &Task, candidate: &Patch, scope: &RunScope) -> bool {
        self.bench.result_path(task, scope, candidate.result_name()).exists()
    }

    /// The verdict is in the ledger but the benchmark never produced a result
    /// (harness failure, or the process died after recording). Rebuild the
    /// candidate and run only the benchmark; the verdict is not re-derived.
    #[allow(clippy::too_many_arguments)]
    fn resume_benchmark(
        &self,
        ctx: &ProjectCtx<'_>,
        ws: &mut Workspace,
        task: &Task,
        candidate: &Patch,
        req: &RunRequest,
        key: &LedgerKey,
        stored: Verdict,
        summary: &mut RunSummary,
    ) -> Result<(), Abort> {
        info!(%key, verdict = %stored, "benchmark result missing, resuming benchmark");
        let (run_dir, mut manifest) = self.open_run(ctx, task, candidate, key, Some(stored))?;
        let root = self.reset_stage(ctx, ws, task, req, &run_dir, &mut manifest)?;

        let ready = match self.apply_stage(&root, task, candidate, &run_dir, &mut manifest) {
            Ok(true) => self.build_stage(ctx, &root, task, candidate, &run_dir, &mut manifest),
            other => other,
        };
        let ready = match ready {
            Ok(ready) => ready,
            Err(e) => return Err(self.fail(&run_dir, &manifest, e)?),
        };
        if !ready {
            warn!(%key, "candidate no longer applies or builds, benchmark not resumed");
            manifest.push_stage(EvidenceRole::Bench, "error", vec![], Some("candidate did not apply or build on resume"));
            summary.benchmark_failures += 1;
            return self.finish(&run_dir, &manifest, "- bench: not resumed, candidate did not apply or build");
        }

        self.benchmark(ctx, &root, task, candidate, &req.scope, &run_dir, &mut manifest, summary)?;
        self.artifacts.write_manifest(&run_dir, &manifest).map_err(Abort::Run)?;
        Ok(())
    }

    /// Run dir, worklog header and manifest for one candidate. A resumed
    /// candidate keeps the stages of its earlier manifest.
    fn open_run(
        &self,
        ctx: &ProjectCtx<'_>,
        task: &Task,
        candidate: &Patch,
        key: &LedgerKey,
        stored: Option<Verdict>,
    ) -> Result<(PathBuf, EvidenceManifest), Abort> {
        let run_id = RunId::new();
        let run_dir = self.artifacts.create_run_dir(key).map_err(Abort::Run)?;
        let heading = match stored {
            Some(_) => format!("## Run {} for {} (benchmark resume)", run_id, key),
            None => format!("## Run {} for {}", run_id, key),
        };
        self.artifacts.append_worklog(&run_dir, &heading).map_err(Abort::Run)?;

        let previous = stored.and_then(|_| FsArtifactStore::read_manifest(&run_dir).ok());
        let mut manifest = previous.unwrap_or_else(|| EvidenceManifest {
            run_id: String::new(),
            project: task.project.as_str().to_string(),
            scope: key.scope.clone(),
            task_id: task.id.as_str().to_string(),
            patch: candidate.name.as_str().to_string(),
            commit_hash: task.commit_hash.clone(),
            restored_from: None,
            task_fingerprint: ctx.fingerprint.to_string(),
            head_rev: None,
            stages: vec![],
            verdict: None,
        });
        manifest.run_id = run_id.as_str().to_string();
        if let Some(v) = stored {
            manifest.verdict = Some(v.to_string());
        }
        Ok((run_dir, manifest))
    }

    fn reset_stage(
        &self,
        ctx: &ProjectCtx<'_>,
        ws: &mut Workspace,
        task: &Task,
        req: &RunRequest,
        run_dir: &Path,
        manifest: &mut EvidenceManifest,
    ) -> Result<PathBuf, Abort> {
        match ctx.controller.reset(ws, task, req.scope.reset_kind(), ctx.profile.bootstrap.as_ref()) {
            Ok(r) => {
                let quirks: Vec<String> = r.quirks.iter().map(|h| format!("{} {}", h.quirk, h.path.display())).collect();
                manifest.restored_from = r.restored_from;
                manifest.push_stage(EvidenceRole::Reset, "success", vec![], Some(quirks.join("\n").as_str()));
            }
            Err(e) => {
                manifest.push_stage(EvidenceRole::Reset, "error", vec![], Some(e.to_string().as_str()));
                self.finish(run_dir, manifest, &format!("- reset: error: {e}"))?;
                return Err(e.into());
            }
        }
        let root = ws.root_path.clone();
        manifest.head_rev = self.vcs.head_rev(&root).ok();
        self.log(run_dir, &format!("- reset: {} at {}", req.scope.reset_kind().as_str(), task.commit_hash))?;
        Ok(root)
    }

    /// Apply, build and test one candidate on a freshly reset workspace.
    fn evaluate(
        &self,
        ctx: &ProjectCtx<'_>,
        root: &Path,
        task: &Task,
        candidate: &Patch,
        run_dir: &Path,
        manifest: &mut EvidenceManifest,
    ) -> Result<Verdict, Abort> {
        if !self.apply_stage(root, task, candidate, run_dir, manifest)? {
            info!(task = %task.id, patch = %candidate.name, "patch did not apply");
            return Ok(Verdict::patch_rejected());
        }
        if !self.build_stage(ctx, root, task, candidate, run_dir, manifest)? {
            info!(task = %task.id, patch = %candidate.name, module = task.build_module(), "build failed");
            return Ok(Verdict::build_failed());
        }

        // test
        let mut report =
            run_tests(ctx.adapter.as_ref(), root, &task.unit_test_ids).map_err(|e| workspace_error(root, "test", e))?;
        let arts = self.test_artifacts(run_dir, &mut report)?;
        let status = if report.passed() { "success" } else { "failed" };
        let failed: Vec<String> = report.failed().map(|o| o.exec.combined_output()).collect();
        manifest.push_stage(EvidenceRole::Test, status, arts, Some(failed.join("\n").as_str()));
        self.log(
            run_dir,
            &format!("- test: {status} ({} selected, {} failed)", report.outcomes.len(), report.failed().count()),
        )?;
        Ok(Verdict::tested(report.passed()))
    }

    /// `true` when the candidate is in the tree: applied, or a baseline.
    fn apply_stage(
        &self,
        root: &Path,
        task: &Task,
        candidate: &Patch,
        run_dir: &Path,
        manifest: &mut EvidenceManifest,
    ) -> Result<bool, Abort> {
        if candidate.source == PatchSource::Developer {
            manifest.push_stage(EvidenceRole::Patch, "skipped", vec![], None);
            return Ok(true);
        }
        match normalize_patch(&candidate.diff_text) {
            Err(e) => {
                let art = self.artifact(run_dir, EvidenceRole::Patch, "candidate.diff", candidate.diff_text.as_bytes())?;
                manifest.push_stage(EvidenceRole::Patch, "failed", vec![art], Some(e.to_string().as_str()));
                self.log(run_dir, &format!("- patch: rejected before apply: {e}"))?;
                Ok(false)
            }
            Ok(normalized) => {
                let art = self.artifact(run_dir, EvidenceRole::Patch, "candidate.diff", normalized.text.as_bytes())?;
                match self.vcs.apply_patch(root, &normalized).map_err(|e| workspace_error(root, "apply", e))? {
                    ApplyOutcome::Applied => {
                        manifest.push_stage(EvidenceRole::Patch, "success", vec![art], None);
                        self.log(run_dir, &format!("- patch: applied ({} files)", normalized.files.len()))?;
                        debug!(task = %task.id, patch = %candidate.name, "patch applied");
                        Ok(true)
                    }
                    ApplyOutcome::Rejected(why) => {
                        manifest.push_stage(EvidenceRole::Patch, "failed", vec![art], Some(why.as_str()));
                        self.log(run_dir, "- patch: rejected by git apply")?;
                        Ok(false)
                    }
                }
            }
        }
    }

    fn build_stage(
        &self,
        ctx: &ProjectCtx<'_>,
        root: &Path,
        task: &Task,
        candidate: &Patch,
        run_dir: &Path,
        manifest: &mut EvidenceManifest,
    ) -> Result<bool, Abort> {
        let hits =
            self.quirks.apply(task.project, QuirkStage::Build, root).map_err(|e| workspace_error(root, "build quirks", e))?;
        if !hits.is_empty() {
            debug!(task = %task.id, quirks = hits.len(), "build quirks applied");
        }
        let module = task.build_module();
        let exec = ctx.adapter.compile(root, module).map_err(|e| workspace_error(root, "compile", e))?;
        let art = self.artifact(run_dir, EvidenceRole::Build, "compile.log", exec.log_text().as_bytes())?;
        let status = if exec.passed { "success" } else { "failed" };
        manifest.push_stage(EvidenceRole::Build, status, vec![art], Some(exec.combined_output().as_str()));
        self.log(run_dir, &format!("- build: {status} (`{}`, {:.1?})", exec.command, exec.duration))?;
        debug!(task = %task.id, patch = %candidate.name, module, passed = exec.passed, "build finished");
        Ok(exec.passed)
    }

    /// One log per test invocation; each outcome gets its log path.
    fn test_artifacts(&self, run_dir: &Path, report: &mut TestReport) -> Result<Vec<String>, Abort> {
        let mut out = Vec::with_capacity(report.outcomes.len());
        for o in &mut report.outcomes {
            let name = format!("{}.log", path_component(&o.selection.id));
            let rel = self.artifact(run_dir, EvidenceRole::Test, &name, o.exec.log_text().as_bytes())?;
            o.log = Some(run_dir.join(&rel));
            out.push(rel);
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn benchmark(
        &self,
        ctx: &ProjectCtx<'_>,
        root: &Path,
        task: &Task,
        candidate: &Patch,
        scope: &RunScope,
        run_dir: &Path,
        manifest: &mut EvidenceManifest,
        summary: &mut RunSummary,
    ) -> Result<(), Abort> {
        let patch = candidate.result_name();
        match self.bench.run(ctx.adapter.as_ref(), root, task, scope, patch) {
            Ok(BenchOutcome::AlreadyPresent(path)) => {
                manifest.push_stage(EvidenceRole::Bench, "skipped", vec![path.display().to_string()], None);
                self.log(run_dir, &format!("- bench: result already at {}", path.display()))?;
            }
            Ok(BenchOutcome::Written { path, exec }) => {
                let log = self.artifact(run_dir, EvidenceRole::Bench, "bench.log", exec.log_text().as_bytes())?;
                manifest.push_stage(EvidenceRole::Bench, "success", vec![path.display().to_string(), log], None);
                self.log(run_dir, &format!("- bench: wrote {}", path.display()))?;
                summary.benchmarks_written += 1;
            }
            Err(failure) => {
                // recorded verdict stands; the benchmark can be retried later
                warn!(task = %task.id, patch = %candidate.name, error = %failure, "benchmark failed");
                let mut arts = vec![];
                if let Some(exec) = &failure.exec {
                    arts.push(self.artifact(run_dir, EvidenceRole::Bench, "bench.log", exec.log_text().as_bytes())?);
                }
                manifest.push_stage(EvidenceRole::Bench, "error", arts, Some(failure.to_string().as_str()));
                self.log(run_dir, &format!("- bench: {failure}"))?;
                summary.benchmark_failures += 1;
            }
        }
        Ok(())
    }

    /// Write one evidence file; returns its path relative to the run dir.
    fn artifact(&self, run_dir: &Path, role: EvidenceRole, name: &str, bytes: &[u8]) -> Result<String, Abort> {
        let path = self.artifacts.write_role_bytes(run_dir, role, name, bytes).map_err(Abort::Run)?;
        Ok(path.strip_prefix(run_dir).unwrap_or(&path).display().to_string())
    }

    fn log(&self, run_dir: &Path, line: &str) -> Result<(), Abort> {
        self.artifacts.append_worklog(run_dir, line).map_err(Abort::Run)
    }

    fn finish(&self, run_dir: &Path, manifest: &EvidenceManifest, line: &str) -> Result<(), Abort> {
        self.log(run_dir, line)?;
        self.artifacts.write_manifest(run_dir, manifest).map_err(Abort::Run)
    }

    /// Persist the evidence of a candidate that stopped with an error and
    /// hand the error back to the caller.
    fn fail(&self, run_dir: &Path, manifest: &EvidenceManifest, e: Abort) -> Result<Abort, Abort> {
        let line = match &e {
            Abort::Task(e) => format!("- error: {e}"),
            Abort::Run(e) => format!("- error: {e:#}"),
        };
        self.finish(run_dir, manifest, &line)?;
        Ok(e)
    }
}

fn workspace_error(root: &Path, what: &str, e: anyhow::Error) -> Abort {
    EvalError::workspace(root, format!("{what}: {e:#}")).into()
}

/// Parse a `--mode` value into a scope. `model` needs the model name.
pub fn scope_for_mode(mode: &str, model: Option<&str>) -> Result<RunScope> {
    use llmperf_core::BaselineKind;
    match (mode, model) {
        ("baseline-pre-fix", _) => Ok(RunScope::Baseline(BaselineKind::PreFix)),
        ("baseline-post-fix", _) => Ok(RunScope::Baseline(BaselineKind::PostFix)),
        ("model", Some(m)) if !m.trim().is_empty() => Ok(RunScope::Model(m.trim().to_string())),
        ("model", _) => Err(EvalError::Usage("--mode model requires --model".into()).into()),
        (other, _) => Err(EvalError::Usage(format!("unknown mode `{other}`")).into()),
    }
}
