use serde::{Deserialize, Serialize};

/// Maximum bytes of stage output embedded in a manifest summary.
pub const MAX_SUMMARY_BYTES: usize = 4 * 1024;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceRole {
    Reset,
    Patch,
    Build,
    Test,
    Bench,
}

impl EvidenceRole {
    pub fn dir_name(self) -> &'static str {
        match self {
            EvidenceRole::Reset => "reset",
            EvidenceRole::Patch => "patch",
            EvidenceRole::Build => "build",
            EvidenceRole::Test => "test",
            EvidenceRole::Bench => "bench",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: EvidenceRole,
    /// `success`, `failed`, `skipped` or `error`.
    pub status: String,
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvidenceManifest {
    pub run_id: String,
    pub project: String,
    pub scope: String,
    pub task_id: String,
    pub patch: String,
    pub commit_hash: String,
    /// Revision the target paths were restored from, `None` for post-fix runs.
    pub restored_from: Option<String>,
    pub task_fingerprint: String,
    pub head_rev: Option<String>,

    pub stages: Vec<StageRecord>,
    pub verdict: Option<String>,
}

impl EvidenceManifest {
    pub fn push_stage(&mut self, stage: EvidenceRole, status: &str, artifacts: Vec<String>, output: Option<&str>) {
        self.stages.push(StageRecord {
            stage,
            status: status.to_string(),
            artifacts,
            summary: output.filter(|s| !s.trim().is_empty()).map(summarize_output),
        });
    }

    pub fn stage(&self, stage: EvidenceRole) -> Option<&StageRecord> {
        self.stages.iter().rev().find(|s| s.stage == stage)
    }
}

/// Keep the tail of a tool log, where build and test failures are reported.
pub fn summarize_output(text: &str) -> String {
    if text.len() <= MAX_SUMMARY_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - MAX_SUMMARY_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("[output truncated]...\n{}", &text[start..])
}
