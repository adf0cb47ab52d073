use std::path::Path;

use anyhow::Result;

use crate::patch::NormalizedPatch;

pub type RevId = String;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The VCS refused the diff; the tree is untouched. Carries the tool's diagnostic.
    Rejected(String),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }
}

/// Operations the workspace controller and patch applicator need from a VCS.
/// Every call names the checkout it operates on; adapters never rely on the
/// process working directory.
pub trait VcsAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_repo(&self, root: &Path) -> Result<bool>;

    fn is_clean(&self, root: &Path) -> Result<bool>;

    fn head_rev(&self, root: &Path) -> Result<RevId>;

    /// Discard tracked modifications and delete untracked files
    /// (ignored ones too when `include_ignored`).
    fn clean(&self, root: &Path, include_ignored: bool) -> Result<()>;

    fn hard_reset(&self, root: &Path, rev: &str) -> Result<()>;

    fn path_exists_at(&self, root: &Path, rev: &str, path: &str) -> Result<bool>;

    /// Restore `paths` from `rev`. Paths absent at `rev` are removed from the worktree.
    fn restore_paths_from(&self, root: &Path, rev: &str, paths: &[String]) -> Result<()>;

    /// Atomically apply a normalised diff. A rejection leaves the tree unmodified.
    fn apply_patch(&self, root: &Path, patch: &NormalizedPatch) -> Result<ApplyOutcome>;
}
