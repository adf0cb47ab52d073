use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ids::*, model::*};

/// One evaluation unit: a historical fix commit and the files it touched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub project: Project,
    pub id: TaskId,
    pub commit_hash: String,
    pub target_paths: Vec<String>,
    pub benchmark_id: String,
    pub unit_test_ids: Vec<String>,
    /// Commits between the buggy state and `commit_hash`.
    pub fix_depth: u32,
    pub commit_url: Option<String>,
}

impl Task {
    /// Module to compile: first segment of the first target path, "" for the root build.
    pub fn build_module(&self) -> &str {
        self.target_paths.first().map(|p| module_of(p)).unwrap_or("")
    }

    /// Revision the pre-fix footprint is restored from, e.g. `abc123~1`.
    pub fn pre_fix_rev(&self) -> String {
        format!("{}~{}", self.commit_hash, self.fix_depth)
    }
}

/// Owning module of a repository-relative path (its first segment).
pub fn module_of(path: &str) -> &str {
    let path = path.trim_start_matches("./");
    match path.split_once('/') {
        Some((first, _)) => first,
        None => "",
    }
}

/// Bare class/test name: file name with its extension stripped.
pub fn test_name_of(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    }
}

/// Directory-safe component for ids that end up in paths.
pub fn path_component(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// One candidate fix for a task.
#[derive(Clone, Debug)]
pub struct Patch {
    pub name: PatchName,
    pub source: PatchSource,
    pub task_id: TaskId,
    pub diff_text: String,
}

impl Patch {
    /// The baseline candidate: the fix as checked out, nothing to apply.
    pub fn developer(task_id: TaskId) -> Self {
        Self { name: PatchName::developer(), source: PatchSource::Developer, task_id, diff_text: String::new() }
    }

    /// Name under which a benchmark result is filed; baselines have none.
    pub fn result_name(&self) -> Option<&PatchName> {
        match self.source {
            PatchSource::Developer => None,
            PatchSource::Model(_) => Some(&self.name),
        }
    }

    pub fn from_file(path: &Path, source: PatchSource, task_id: TaskId) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("patch");
        Ok(Self {
            name: PatchName::from_str(name),
            source,
            task_id,
            diff_text: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

/// Plausibility verdict for one (task, patch). Fields are private so a verdict
/// can only be built along the stage chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Verdict {
    patch_apply: ApplyStatus,
    build: StageStatus,
    test: StageStatus,
}

impl Verdict {
    pub(crate) fn new_unchecked(patch_apply: ApplyStatus, build: StageStatus, test: StageStatus) -> Self {
        Self { patch_apply, build, test }
    }

    pub fn patch_rejected() -> Self {
        Self::new_unchecked(ApplyStatus::Failed, StageStatus::Skipped, StageStatus::Skipped)
    }

    pub fn build_failed() -> Self {
        Self::new_unchecked(ApplyStatus::Success, StageStatus::Failed, StageStatus::Skipped)
    }

    pub fn tested(passed: bool) -> Self {
        Self::new_unchecked(ApplyStatus::Success, StageStatus::Success, StageStatus::from_passed(passed))
    }

    pub fn patch_apply(&self) -> ApplyStatus {
        self.patch_apply
    }

    pub fn build(&self) -> StageStatus {
        self.build
    }

    pub fn test(&self) -> StageStatus {
        self.test
    }

    /// Applied, compiled and passed every selected test.
    pub fn is_plausible(&self) -> bool {
        self.test == StageStatus::Success
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "apply={} build={} test={}",
            self.patch_apply.as_ledger_str(),
            or_skipped(self.build),
            or_skipped(self.test)
        )
    }
}

fn or_skipped(s: StageStatus) -> &'static str {
    match s {
        StageStatus::Skipped => "skipped",
        other => other.as_ledger_str(),
    }
}

/// Ledger identity of one processed candidate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerKey {
    pub project: Project,
    pub scope: String,
    pub task_id: TaskId,
    pub patch: PatchName,
}

impl LedgerKey {
    pub fn new(project: Project, scope: &RunScope, task_id: &TaskId, patch: &PatchName) -> Self {
        Self { project, scope: scope.label(), task_id: task_id.clone(), patch: patch.clone() }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.project, self.scope, self.task_id, self.patch)
    }
}

/// What a workspace currently has materialised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pin {
    pub commit_hash: String,
    pub kind: BaselineKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_model_patches_file_results_under_their_name() {
        let dev = Patch::developer(TaskId::from_str("T1"));
        assert_eq!(dev.name, PatchName::developer());
        assert_eq!(dev.result_name(), None);

        let p = Patch {
            name: PatchName::from_str("T1_prompt3"),
            source: PatchSource::Model("gpt".into()),
            task_id: TaskId::from_str("T1"),
            diff_text: String::new(),
        };
        assert_eq!(p.result_name(), Some(&PatchName::from_str("T1_prompt3")));
    }

    fn task(paths: &[&str]) -> Task {
        Task {
            project: Project::Kafka,
            id: TaskId::from_str("T1"),
            commit_hash: "abc123".into(),
            target_paths: paths.iter().map(|s| s.to_string()).collect(),
            benchmark_id: "FooBench".into(),
            unit_test_ids: vec![],
            fix_depth: 1,
            commit_url: None,
        }
    }

    #[test]
    fn build_module_is_first_segment() {
        assert_eq!(task(&["clients/src/main/java/Foo.java"]).build_module(), "clients");
        assert_eq!(task(&["Foo.java"]).build_module(), "");
        assert_eq!(task(&[]).build_module(), "");
        assert_eq!(task(&["./core/A.java"]).build_module(), "core");
    }

    #[test]
    fn pre_fix_rev_uses_depth() {
        let mut t = task(&["a/B.java"]);
        assert_eq!(t.pre_fix_rev(), "abc123~1");
        t.fix_depth = 3;
        assert_eq!(t.pre_fix_rev(), "abc123~3");
    }

    #[test]
    fn test_name_strips_extension() {
        assert_eq!(test_name_of("modA/src/test/java/FooTest.java"), "FooTest");
        assert_eq!(test_name_of("FooTest"), "FooTest");
        assert_eq!(test_name_of("core/x/.hidden"), ".hidden");
    }

    #[test]
    fn path_component_replaces_separators() {
        assert_eq!(path_component("a/b:c d"), "a_b_c_d");
        assert_eq!(path_component("Bench.run"), "Bench.run");
    }

    #[test]
    fn verdict_constructors_follow_chain() {
        let v = Verdict::patch_rejected();
        assert_eq!(v.build(), StageStatus::Skipped);
        assert_eq!(v.test(), StageStatus::Skipped);
        let v = Verdict::build_failed();
        assert_eq!(v.patch_apply(), ApplyStatus::Success);
        assert_eq!(v.test(), StageStatus::Skipped);
        assert!(Verdict::tested(true).is_plausible());
        assert!(!Verdict::tested(false).is_plausible());
        assert_eq!(Verdict::build_failed().to_string(), "apply=success build=failed test=skipped");
    }
}
