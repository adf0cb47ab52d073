//! Blocking subprocess execution for build, test and benchmark commands.
//!
//! Every command runs with an explicit working directory. Output is captured
//! whole and capped at [`MAX_OUTPUT_BYTES`] per stream, keeping the tail where
//! Gradle and Maven print their failure summaries.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tracing::debug;

pub const MAX_OUTPUT_BYTES: usize = 2 * 1024 * 1024;

/// Result of one external command.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Rendered command line, for logs.
    pub command: String,
    /// Exit status 0.
    pub passed: bool,
    /// `None` when killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ExecResult {
    /// stdout followed by stderr, the layout written to stage logs.
    pub fn combined_output(&self) -> String {
        let mut s = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        s.push_str(&self.stdout);
        if !self.stderr.is_empty() {
            if !s.is_empty() && !s.ends_with('\n') {
                s.push('\n');
            }
            s.push_str(&self.stderr);
        }
        s
    }

    pub fn log_text(&self) -> String {
        let status = self.exit_code.map_or("killed".to_string(), |c| format!("exit {c}"));
        format!(
            "$ {}\n[{} in {:.1}s]\n{}",
            self.command,
            status,
            self.duration.as_secs_f64(),
            self.combined_output()
        )
    }
}

/// Run `argv[0]` with the remaining arguments in `dir`. Spawn failures are
/// errors; a non-zero exit is a normal result.
pub fn run_argv(dir: &Path, argv: &[String]) -> Result<ExecResult> {
    let (program, args) = argv.split_first().ok_or_else(|| anyhow!("empty command"))?;
    let command = argv.join(" ");
    let start = Instant::now();
    debug!(dir = %dir.display(), %command, "exec");

    let out = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("run {:?} in {}", argv, dir.display()))?;

    let result = ExecResult {
        command,
        passed: out.status.success(),
        exit_code: out.status.code(),
        stdout: truncate_output(&out.stdout),
        stderr: truncate_output(&out.stderr),
        duration: start.elapsed(),
    };
    debug!(
        command = %result.command,
        passed = result.passed,
        exit_code = ?result.exit_code,
        duration_ms = result.duration.as_millis() as u64,
        "exec completed"
    );
    Ok(result)
}

/// Lossy UTF-8 conversion keeping the last [`MAX_OUTPUT_BYTES`].
fn truncate_output(bytes: &[u8]) -> String {
    if bytes.len() <= MAX_OUTPUT_BYTES {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let tail = &bytes[bytes.len() - MAX_OUTPUT_BYTES..];
    format!("[output truncated]...\n{}", String::from_utf8_lossy(tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[test]
    fn captures_exit_code_and_streams() {
        let dir = tempdir().unwrap();
        let r = run_argv(dir.path(), &sh("echo out; echo err >&2; exit 3")).unwrap();
        assert!(!r.passed);
        assert_eq!(r.exit_code, Some(3));
        assert_eq!(r.stdout, "out\n");
        assert_eq!(r.stderr, "err\n");
        assert_eq!(r.combined_output(), "out\nerr\n");
        assert!(r.log_text().starts_with("$ sh -c"));
    }

    #[test]
    fn runs_in_given_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let r = run_argv(dir.path(), &sh("test -f marker")).unwrap();
        assert!(r.passed);
    }

    #[test]
    fn missing_program_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(run_argv(dir.path(), &["llmperf-no-such-tool".to_string()]).is_err());
        assert!(run_argv(dir.path(), &[]).is_err());
    }

    #[test]
    fn truncation_keeps_tail() {
        let mut bytes = vec![b'a'; MAX_OUTPUT_BYTES + 10];
        bytes.extend_from_slice(b"BUILD FAILED");
        let s = truncate_output(&bytes);
        assert!(s.starts_with("[output truncated]"));
        assert!(s.ends_with("BUILD FAILED"));
    }
}
