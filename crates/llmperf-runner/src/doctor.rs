use std::fmt;
use std::path::Path;

use anyhow::{anyhow, Result};
use llmperf_core::{BuildTool, Project};
use llmperf_vcs::VcsAdapter;

use crate::util::{find_program, run_cmd};
use crate::Config;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", if self.ok { "ok" } else { "FAIL" }, self.name, self.detail)
    }
}

/// Environment checks for `projects`: git on PATH, each workspace a git
/// checkout, and the build tool resolvable from inside it.
pub fn doctor(root: &Path, cfg: &Config, vcs: &dyn VcsAdapter, projects: &[Project]) -> Vec<Check> {
    let mut checks = Vec::new();
    checks.push(match run_cmd(root, "git", &["--version"]) {
        Ok(v) => Check { name: "git".into(), ok: true, detail: v },
        Err(e) => Check { name: "git".into(), ok: false, detail: format!("git not usable: {e:#}") },
    });

    for &project in projects {
        let profile = cfg.profile(project);
        let dir = cfg.workspace_dir(root, &profile);
        let name = format!("{project} workspace");
        let is_repo = dir.is_dir() && vcs.is_repo(&dir).unwrap_or(false);
        checks.push(Check {
            name,
            ok: is_repo,
            detail: if is_repo {
                dir.display().to_string()
            } else if dir.is_dir() {
                format!("{} is not a git checkout", dir.display())
            } else {
                format!("{} does not exist", dir.display())
            },
        });

        let program = match (&profile.compile, profile.build_tool) {
            (Some(t), _) => t.0.first().cloned(),
            (None, BuildTool::Gradle) => Some("./gradlew".to_string()),
            (None, BuildTool::Maven) => Some("mvn".to_string()),
            (None, BuildTool::Script) => None,
        };
        let name = format!("{project} build tool");
        let check = match program {
            None => Check { name, ok: false, detail: "script build without a compile command".into() },
            Some(p) => match find_program(&dir, &p) {
                Some(found) => Check { name, ok: true, detail: found.display().to_string() },
                // a missing wrapper is generated after reset
                None if p == "./gradlew" && profile.bootstrap.is_some() => match find_program(&dir, "gradle") {
                    Some(found) => Check { name, ok: true, detail: format!("{} (bootstraps gradlew)", found.display()) },
                    None => Check { name, ok: false, detail: "neither ./gradlew nor gradle found".into() },
                },
                None => Check { name, ok: false, detail: format!("`{p}` not found") },
            },
        };
        checks.push(check);
    }
    checks
}

/// Err when any check failed.
pub fn ensure_healthy(checks: &[Check]) -> Result<()> {
    let failed: Vec<&Check> = checks.iter().filter(|c| !c.ok).collect();
    if failed.is_empty() {
        return Ok(());
    }
    Err(anyhow!(
        "{} check(s) failed:\n{}",
        failed.len(),
        failed.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("\n")
    ))
}
