use crate::{ApplyStatus, EvalError, RunScope, StageStatus, Verdict};

/// Rebuild a verdict from stored stage values, enforcing the dependency chain:
/// a stage is SKIPPED iff the stage before it did not succeed.
pub fn verdict_from_parts(apply: ApplyStatus, build: StageStatus, test: StageStatus) -> Result<Verdict, EvalError> {
    let build_ok = match (apply, build) {
        (ApplyStatus::Failed, StageStatus::Skipped) => false,
        (ApplyStatus::Failed, other) => {
            return Err(EvalError::InvalidVerdict(format!("build={:?} after failed patch apply", other)))
        }
        (ApplyStatus::Success, StageStatus::Skipped) => {
            return Err(EvalError::InvalidVerdict("build skipped after successful patch apply".into()))
        }
        (ApplyStatus::Success, b) => b == StageStatus::Success,
    };
    match (build_ok, test) {
        (false, StageStatus::Skipped) | (true, StageStatus::Success) | (true, StageStatus::Failed) => {}
        (false, t) => return Err(EvalError::InvalidVerdict(format!("test={:?} without a successful build", t))),
        (true, StageStatus::Skipped) => {
            return Err(EvalError::InvalidVerdict("test skipped after successful build".into()))
        }
    }
    Ok(Verdict::new_unchecked(apply, build, test))
}

/// Benchmarks run for plausible patches, and always for baseline runs.
pub fn should_benchmark(scope: &RunScope, verdict: &Verdict) -> bool {
    match scope {
        RunScope::Baseline(_) => true,
        RunScope::Model(_) => verdict.is_plausible(),
    }
}
