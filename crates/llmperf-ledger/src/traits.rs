use llmperf_core::{LedgerKey, Project, Verdict};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    pub key: LedgerKey,
    pub verdict: Verdict,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("corrupt ledger {location}: {reason}")]
    Corrupt { location: String, reason: String },
}

/// Durable, append-only record of verdicts keyed by
/// (project, model_or_baseline, task_id, patch_name).
pub trait Ledger: Send + Sync {
    fn contains(&self, key: &LedgerKey) -> anyhow::Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn get(&self, key: &LedgerKey) -> anyhow::Result<Option<Verdict>>;

    /// Append a verdict. Returns `false` without writing when the key is already recorded.
    fn record(&self, key: &LedgerKey, verdict: &Verdict) -> anyhow::Result<bool>;

    /// Every entry recorded for one project and model/baseline scope.
    fn entries(&self, project: Project, scope: &str) -> anyhow::Result<Vec<LedgerEntry>>;

    /// Model/baseline scopes with at least one verdict for `project`, sorted.
    fn scopes(&self, project: Project) -> anyhow::Result<Vec<String>>;
}
