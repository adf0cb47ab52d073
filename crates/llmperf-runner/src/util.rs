use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

pub fn run_cmd(dir: &Path, program: &str, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(dir);
    let out = cmd.output().with_context(|| format!("run {} {:?}", program, args))?;
    if !out.status.success() {
        return Err(anyhow!(
            "command failed: {} {:?}\nstdout:{}\nstderr:{}",
            program,
            args,
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// Resolve `program` the way the shell would: paths containing a separator
/// are taken relative to `dir`, bare names are searched on `PATH`.
pub fn find_program(dir: &Path, program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let p = dir.join(program);
        return p.is_file().then_some(p);
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).map(|d| d.join(program)).find(|p| p.is_file())
}
