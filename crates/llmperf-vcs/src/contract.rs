use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};

use crate::patch::normalize_patch;
use crate::types::{ApplyOutcome, VcsAdapter};

/// Shared adapter contract suite. Needs a repo built by [`init_history_fixture`].
pub fn run_vcs_contract_suite(adapter: &dyn VcsAdapter, repo: &Path) -> Result<()> {
    if !adapter.is_repo(repo)? {
        return Err(anyhow!("fixture is not a repository"));
    }
    let fix = adapter.head_rev(repo)?;
    let pre = format!("{fix}~1");

    // dirty the tree, then clean it
    std::fs::write(repo.join("modA/Foo.java"), "garbage")?;
    std::fs::write(repo.join("scratch.txt"), "untracked")?;
    adapter.clean(repo, false)?;
    if !adapter.is_clean(repo)? || repo.join("scratch.txt").exists() {
        return Err(anyhow!("clean left changes behind"));
    }

    // restore target paths from the ancestor; New.java does not exist there
    let paths = vec!["modA/Foo.java".to_string(), "modA/New.java".to_string()];
    if adapter.path_exists_at(repo, &pre, "modA/New.java")? {
        return Err(anyhow!("New.java should be absent before the fix"));
    }
    adapter.restore_paths_from(repo, &pre, &paths)?;
    let foo = std::fs::read_to_string(repo.join("modA/Foo.java"))?;
    if foo != FOO_PRE {
        return Err(anyhow!("Foo.java not restored from {pre}: {foo:?}"));
    }
    if repo.join("modA/New.java").exists() {
        return Err(anyhow!("path absent in ancestor was not removed"));
    }
    if std::fs::read_to_string(repo.join("README.md"))? != "fixture" {
        return Err(anyhow!("non-target file changed by restore"));
    }

    // stale hunk is rejected atomically
    adapter.hard_reset(repo, &fix)?;
    let stale = normalize_patch(&two_file_diff("int x = 99;"))?;
    if let ApplyOutcome::Applied = adapter.apply_patch(repo, &stale)? {
        return Err(anyhow!("stale patch applied"));
    }
    if !adapter.is_clean(repo)? {
        return Err(anyhow!("rejected patch modified the tree"));
    }

    // matching hunk applies
    let good = normalize_patch(&two_file_diff("int x = 2;"))?;
    if !adapter.apply_patch(repo, &good)?.is_applied() {
        return Err(anyhow!("valid patch rejected"));
    }
    if !std::fs::read_to_string(repo.join("modA/Foo.java"))?.contains("int x = 3;") {
        return Err(anyhow!("valid patch did not change Foo.java"));
    }

    adapter.hard_reset(repo, &fix)?;
    if !adapter.is_clean(repo)? {
        return Err(anyhow!("hard reset left changes behind"));
    }
    Ok(())
}

pub const FOO_PRE: &str = "class Foo {\n  int x = 1;\n}\n";
pub const FOO_POST: &str = "class Foo {\n  int x = 2;\n}\n";

/// Diff against the post-fix Foo.java plus a second file, so a stale first
/// hunk must leave the second file untouched too.
fn two_file_diff(expected_line: &str) -> String {
    format!(
        "--- a/modA/Foo.java\n+++ b/modA/Foo.java\n@@ -1,3 +1,3 @@\n class Foo {{\n-  {expected_line}\n+  int x = 3;\n }}\n\
         --- a/modA/Bar.java\n+++ b/modA/Bar.java\n@@ -1 +1 @@\n-class Bar {{}}\n+class Bar {{ int y; }}\n"
    )
}

/// Initialize a minimal git repo fixture with one commit.
pub fn init_git_repo(dir: &Path) -> Result<()> {
    run(dir, &["git", "init", "-q"])?;
    run(dir, &["git", "config", "user.email", "llmperf@example.com"])?;
    run(dir, &["git", "config", "user.name", "llmperf"])?;
    run(dir, &["git", "config", "core.autocrlf", "false"])?;
    std::fs::write(dir.join("README.md"), "fixture")?;
    commit_all(dir, "init")?;
    Ok(())
}

/// Fixture with a two-commit history: the pre-fix state of `modA/Foo.java`,
/// then a "fix" commit that changes it and adds `modA/New.java`.
/// Returns the fix commit hash.
pub fn init_history_fixture(dir: &Path) -> Result<String> {
    init_git_repo(dir)?;
    std::fs::create_dir_all(dir.join("modA"))?;
    std::fs::write(dir.join("modA/Foo.java"), FOO_PRE)?;
    std::fs::write(dir.join("modA/Bar.java"), "class Bar {}\n")?;
    commit_all(dir, "pre-fix")?;
    std::fs::write(dir.join("modA/Foo.java"), FOO_POST)?;
    std::fs::write(dir.join("modA/New.java"), "class New {}\n")?;
    commit_all(dir, "fix")
}

/// Stage everything and commit; returns the new HEAD.
pub fn commit_all(dir: &Path, message: &str) -> Result<String> {
    run(dir, &["git", "add", "-A"])?;
    run(dir, &["git", "commit", "-q", "-m", message])?;
    run(dir, &["git", "rev-parse", "HEAD"])
}

fn run(dir: &Path, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new(args[0]);
    cmd.args(&args[1..]).current_dir(dir);
    let out = cmd.output().with_context(|| format!("run {:?}", args))?;
    if !out.status.success() {
        return Err(anyhow!("command failed: {:?}\nstdout:{}\nstderr:{}",
            args,
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}
