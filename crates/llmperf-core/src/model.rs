use std::fmt;

use serde::{Deserialize, Serialize};

/// Target codebases of the evaluation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Project {
    #[serde(rename = "kafka")]
    Kafka,
    #[serde(rename = "netty")]
    Netty,
    #[serde(rename = "presto")]
    Presto,
    #[serde(rename = "RoaringBitmap")]
    RoaringBitmap,
}

impl Project {
    pub const ALL: [Project; 4] = [Project::Kafka, Project::Netty, Project::Presto, Project::RoaringBitmap];

    /// Canonical name, also used as the on-disk directory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Project::Kafka => "kafka",
            Project::Netty => "netty",
            Project::Presto => "presto",
            Project::RoaringBitmap => "RoaringBitmap",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|p| p.as_str().eq_ignore_ascii_case(s))
    }

    /// Static project -> build tool mapping. Configuration may override it.
    pub fn default_build_tool(&self) -> BuildTool {
        match self {
            Project::Kafka | Project::RoaringBitmap => BuildTool::Gradle,
            Project::Netty | Project::Presto => BuildTool::Maven,
        }
    }

    /// RoaringBitmap's build is not split into independently buildable modules.
    pub fn has_scoped_build(&self) -> bool {
        !matches!(self, Project::RoaringBitmap)
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BuildTool {
    Gradle,
    Maven,
    Script,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BaselineKind {
    PreFix,
    PostFix,
}

impl BaselineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaselineKind::PreFix => "pre_fix",
            BaselineKind::PostFix => "post_fix",
        }
    }
}

/// Who wrote a candidate fix. Developer candidates are the checked-out fix
/// itself and are never applied.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PatchSource {
    Developer,
    Model(String),
}

/// Which ledger/result namespace a run belongs to: a baseline or one model's patches.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RunScope {
    Baseline(BaselineKind),
    Model(String),
}

impl RunScope {
    pub fn label(&self) -> String {
        match self {
            RunScope::Baseline(kind) => format!("baseline_{}", kind.as_str()),
            RunScope::Model(name) => name.clone(),
        }
    }

    /// Baseline kind the workspace is reset to before the candidate is applied.
    /// Model patches are generated against the pre-fix source.
    pub fn reset_kind(&self) -> BaselineKind {
        match self {
            RunScope::Baseline(kind) => *kind,
            RunScope::Model(_) => BaselineKind::PreFix,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApplyStatus {
    Success,
    Failed,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum StageStatus {
    Success,
    Failed,
    Skipped,
}

impl ApplyStatus {
    pub fn as_ledger_str(&self) -> &'static str {
        match self {
            ApplyStatus::Success => "success",
            ApplyStatus::Failed => "failed",
        }
    }

    pub fn from_ledger_str(s: &str) -> Option<Self> {
        match s.trim() {
            "success" => Some(ApplyStatus::Success),
            "failed" => Some(ApplyStatus::Failed),
            _ => None,
        }
    }
}

impl StageStatus {
    /// Ledger cell value; skipped stages are written as empty cells.
    pub fn as_ledger_str(&self) -> &'static str {
        match self {
            StageStatus::Success => "success",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "",
        }
    }

    pub fn from_ledger_str(s: &str) -> Option<Self> {
        match s.trim() {
            "success" => Some(StageStatus::Success),
            "failed" => Some(StageStatus::Failed),
            "" => Some(StageStatus::Skipped),
            _ => None,
        }
    }

    pub fn from_passed(passed: bool) -> Self {
        if passed {
            StageStatus::Success
        } else {
            StageStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_parse_is_case_insensitive() {
        assert_eq!(Project::parse("Kafka"), Some(Project::Kafka));
        assert_eq!(Project::parse("roaringbitmap"), Some(Project::RoaringBitmap));
        assert_eq!(Project::parse(" presto "), Some(Project::Presto));
        assert_eq!(Project::parse("spark"), None);
    }

    #[test]
    fn default_tools_follow_projects() {
        assert_eq!(Project::Kafka.default_build_tool(), BuildTool::Gradle);
        assert_eq!(Project::Netty.default_build_tool(), BuildTool::Maven);
        assert!(!Project::RoaringBitmap.has_scoped_build());
    }

    #[test]
    fn model_scope_resets_to_pre_fix() {
        assert_eq!(RunScope::Model("gpt".into()).reset_kind(), BaselineKind::PreFix);
        assert_eq!(RunScope::Baseline(BaselineKind::PostFix).reset_kind(), BaselineKind::PostFix);
        assert_eq!(RunScope::Baseline(BaselineKind::PreFix).label(), "baseline_pre_fix");
    }

    #[test]
    fn skipped_is_empty_cell() {
        assert_eq!(StageStatus::Skipped.as_ledger_str(), "");
        assert_eq!(StageStatus::from_ledger_str(""), Some(StageStatus::Skipped));
        assert_eq!(StageStatus::from_ledger_str("bogus"), None);
    }
}
