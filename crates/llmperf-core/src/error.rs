use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy of the evaluation pipeline.
///
/// Patch-apply, build and test failures are not errors: they are recorded as
/// verdict values. These variants cover everything that stops a stage from
/// producing a verdict at all.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("workspace {}: {reason}", path.display())]
    Workspace { path: PathBuf, reason: String },

    #[error("malformed {what}: {reason}")]
    MalformedInput { what: String, reason: String },

    #[error("patch rejected: {0}")]
    PatchRejected(String),

    #[error("benchmark harness failed: {0}")]
    BenchmarkHarness(String),

    #[error("invalid verdict chain: {0}")]
    InvalidVerdict(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EvalError {
    pub fn workspace(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EvalError::Workspace { path: path.into(), reason: reason.into() }
    }

    pub fn malformed(what: impl Into<String>, reason: impl Into<String>) -> Self {
        EvalError::MalformedInput { what: what.into(), reason: reason.into() }
    }

    /// Whether the whole run must stop, as opposed to the current task or patch.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, EvalError::Usage(_) | EvalError::MalformedInput { .. } | EvalError::InvalidVerdict(_) | EvalError::Io(_))
    }
}
