use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use anyhow::{anyhow, Context, Result};
use llmperf_vcs::{ApplyOutcome, NormalizedPatch, RevId, VcsAdapter};
use tracing::debug;

const APPLY_FLAGS: [&str; 3] = ["--ignore-whitespace", "--recount", "--whitespace=nowarn"];

#[derive(Clone, Debug, Default)]
pub struct GitAdapter;

impl GitAdapter {
    pub fn new() -> Self {
        Self
    }

    fn run(repo: &Path, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(args[0]);
        cmd.args(&args[1..]).current_dir(repo);
        let out = cmd.output().with_context(|| format!("run {:?}", args))?;
        if !out.status.success() {
            return Err(anyhow!(
                "command failed: {:?}\nstdout:{}\nstderr:{}",
                args,
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// `git apply <args> -` with the diff on stdin.
    fn apply_stdin(repo: &Path, args: &[&str], text: &str) -> Result<Output> {
        let mut child = Command::new("git")
            .arg("apply")
            .args(args)
            .arg("-")
            .current_dir(repo)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| "spawn git apply")?;
        {
            let mut stdin = child.stdin.take().ok_or_else(|| anyhow!("git apply stdin unavailable"))?;
            stdin.write_all(text.as_bytes())?;
        }
        Ok(child.wait_with_output()?)
    }
}

impl VcsAdapter for GitAdapter {
    fn name(&self) -> &'static str {
        "git"
    }

    fn is_repo(&self, root: &Path) -> Result<bool> {
        if !root.is_dir() {
            return Ok(false);
        }
        let out = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(root)
            .output()
            .with_context(|| "git rev-parse")?;
        if !out.status.success() {
            return Ok(false);
        }
        // a directory nested inside some other checkout is not a workspace
        let top = std::path::PathBuf::from(String::from_utf8_lossy(&out.stdout).trim());
        Ok(top.canonicalize().ok() == root.canonicalize().ok())
    }

    fn is_clean(&self, root: &Path) -> Result<bool> {
        let out = Self::run(root, &["git", "status", "--porcelain"])?;
        Ok(out.is_empty())
    }

    fn head_rev(&self, root: &Path) -> Result<RevId> {
        Self::run(root, &["git", "rev-parse", "HEAD"])
    }

    fn clean(&self, root: &Path, include_ignored: bool) -> Result<()> {
        Self::run(root, &["git", "reset", "--hard", "-q"])?;
        let flags = if include_ignored { "-fdx" } else { "-fd" };
        Self::run(root, &["git", "clean", flags, "-q"])?;
        Ok(())
    }

    fn hard_reset(&self, root: &Path, rev: &str) -> Result<()> {
        Self::run(root, &["git", "reset", "--hard", "-q", rev])?;
        Ok(())
    }

    fn path_exists_at(&self, root: &Path, rev: &str, path: &str) -> Result<bool> {
        let spec = format!("{rev}:{path}");
        let out = Command::new("git")
            .args(["cat-file", "-e", &spec])
            .current_dir(root)
            .output()
            .with_context(|| format!("git cat-file -e {spec}"))?;
        Ok(out.status.success())
    }

    fn restore_paths_from(&self, root: &Path, rev: &str, paths: &[String]) -> Result<()> {
        let mut present: Vec<&str> = Vec::new();
        for p in paths {
            if self.path_exists_at(root, rev, p)? {
                present.push(p);
            } else {
                let abs = root.join(p);
                if abs.exists() {
                    debug!(path = %p, rev, "absent in ancestor, removing");
                    std::fs::remove_file(&abs).with_context(|| format!("remove {}", abs.display()))?;
                }
            }
        }
        if !present.is_empty() {
            let mut args = vec!["git", "checkout", rev, "--"];
            args.extend(present);
            Self::run(root, &args)?;
        }
        Ok(())
    }

    fn apply_patch(&self, root: &Path, patch: &NormalizedPatch) -> Result<ApplyOutcome> {
        let mut check_args = vec!["--check"];
        check_args.extend(APPLY_FLAGS);
        let check = Self::apply_stdin(root, &check_args, &patch.text)?;
        if !check.status.success() {
            let reason = String::from_utf8_lossy(&check.stderr).trim().to_string();
            return Ok(ApplyOutcome::Rejected(reason));
        }

        let out = Self::apply_stdin(root, &APPLY_FLAGS, &patch.text)?;
        if !out.status.success() {
            return Ok(ApplyOutcome::Rejected(String::from_utf8_lossy(&out.stderr).trim().to_string()));
        }
        Ok(ApplyOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmperf_vcs::contract::{init_git_repo, init_history_fixture, run_vcs_contract_suite, FOO_PRE};
    use llmperf_vcs::normalize_patch;
    use tempfile::tempdir;

    #[test]
    fn git_adapter_contract() {
        let dir = tempdir().unwrap();
        init_history_fixture(dir.path()).unwrap();
        run_vcs_contract_suite(&GitAdapter::new(), dir.path()).unwrap();
    }

    #[test]
    fn plain_directory_is_not_a_repo() {
        let dir = tempdir().unwrap();
        assert!(!GitAdapter::new().is_repo(dir.path()).unwrap());
        assert!(!GitAdapter::new().is_repo(&dir.path().join("missing")).unwrap());
        init_git_repo(dir.path()).unwrap();
        assert!(GitAdapter::new().is_repo(dir.path()).unwrap());
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        assert!(!GitAdapter::new().is_repo(&dir.path().join("sub")).unwrap());
    }

    #[test]
    fn clean_with_ignored_removes_build_outputs() {
        let dir = tempdir().unwrap();
        init_git_repo(dir.path()).unwrap();
        std::fs::write(dir.path().join(".gitignore"), "build/\n").unwrap();
        llmperf_vcs::contract::commit_all(dir.path(), "ignore").unwrap();
        std::fs::create_dir_all(dir.path().join("build")).unwrap();
        std::fs::write(dir.path().join("build/out.class"), "x").unwrap();

        let git = GitAdapter::new();
        git.clean(dir.path(), false).unwrap();
        assert!(dir.path().join("build/out.class").exists());
        git.clean(dir.path(), true).unwrap();
        assert!(!dir.path().join("build").exists());
    }

    #[test]
    fn wrong_hunk_counts_are_recounted() {
        let dir = tempdir().unwrap();
        init_history_fixture(dir.path()).unwrap();
        let git = GitAdapter::new();
        git.restore_paths_from(dir.path(), "HEAD~1", &["modA/Foo.java".to_string()]).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("modA/Foo.java")).unwrap(), FOO_PRE);

        // hunk header lengths as a model typically miscounts them
        let diff = "--- a/modA/Foo.java\n+++ b/modA/Foo.java\n@@ -1,9 +1,9 @@\n class Foo {\n-  int x = 1;\n+  int x = 5;\n }\n";
        let patch = normalize_patch(diff).unwrap();
        assert_eq!(git.apply_patch(dir.path(), &patch).unwrap(), ApplyOutcome::Applied);
        assert!(std::fs::read_to_string(dir.path().join("modA/Foo.java")).unwrap().contains("int x = 5;"));
    }
}
