//! Normalisation and static validation of unified diffs before they touch a
//! workspace. Model replies often wrap the diff in a markdown fence or carry
//! Windows line endings; both are undone here. A payload that fails
//! validation is rejected without invoking the VCS.

use std::path::{Component, Path};

use llmperf_core::EvalError;
use tracing::debug;

/// A diff ready for `git apply`: LF line endings, trailing newline, and the
/// set of repository-relative paths it touches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedPatch {
    pub text: String,
    pub files: Vec<String>,
    pub hunks: usize,
}

pub fn normalize_patch(raw: &str) -> Result<NormalizedPatch, EvalError> {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let body = if starts_like_diff(&text) {
        text
    } else if let Some(fenced) = extract_fenced_diff(&text) {
        debug!(bytes = fenced.len(), "diff extracted from fenced block");
        fenced
    } else {
        debug!("prose before diff headers dropped");
        strip_preamble(&text)
    };

    if body.trim().is_empty() {
        return Err(EvalError::PatchRejected("empty diff".into()));
    }

    let mut files: Vec<String> = Vec::new();
    let mut hunks = 0;
    for line in body.lines() {
        if line.starts_with("@@ ") {
            hunks += 1;
        } else if let Some(rest) = line.strip_prefix("+++ ").or_else(|| line.strip_prefix("--- ")) {
            if hunks > 0 && line.starts_with("--- ") && !is_header_pair(&body, line) {
                // a removed line that happens to start with "-- "
                continue;
            }
            if let Some(path) = header_path(rest) {
                check_path(&path)?;
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        } else if let Some(rest) = line.strip_prefix("diff --git ") {
            for part in rest.split_whitespace() {
                let p = strip_side_prefix(part);
                check_path(p)?;
            }
        }
    }

    if files.is_empty() {
        return Err(EvalError::PatchRejected("no file headers".into()));
    }
    if hunks == 0 {
        return Err(EvalError::PatchRejected("no hunks".into()));
    }

    let mut text = body;
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(NormalizedPatch { text, files, hunks })
}

fn starts_like_diff(text: &str) -> bool {
    text.lines()
        .find(|l| !l.trim().is_empty())
        .is_some_and(|l| l.starts_with("diff --git ") || l.starts_with("--- ") || l.starts_with("Index: "))
}

/// First fenced block whose body contains a unified-diff header.
fn extract_fenced_diff(text: &str) -> Option<String> {
    let mut in_block = false;
    let mut block = String::new();
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            if in_block {
                if block.lines().any(|l| l.starts_with("--- ") || l.starts_with("diff --git ")) {
                    return Some(block);
                }
                block.clear();
            }
            in_block = !in_block;
            continue;
        }
        if in_block {
            block.push_str(line);
            block.push('\n');
        }
    }
    None
}

/// Drop prose before the first header line of an unfenced reply.
fn strip_preamble(text: &str) -> String {
    let mut out = String::new();
    let mut started = false;
    for line in text.lines() {
        if !started && (line.starts_with("diff --git ") || line.starts_with("--- ")) {
            started = true;
        }
        if started {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// A `--- ` line inside a hunk is a header only when followed by `+++ `.
fn is_header_pair(body: &str, minus_line: &str) -> bool {
    let mut lines = body.lines();
    while let Some(l) = lines.next() {
        if l == minus_line {
            return lines.next().is_some_and(|n| n.starts_with("+++ "));
        }
    }
    false
}

fn header_path(rest: &str) -> Option<String> {
    let raw = rest.split('\t').next().unwrap_or(rest).trim();
    let raw = raw.trim_matches('"');
    if raw == "/dev/null" || raw.is_empty() {
        return None;
    }
    Some(strip_side_prefix(raw).to_string())
}

fn strip_side_prefix(p: &str) -> &str {
    p.strip_prefix("a/").or_else(|| p.strip_prefix("b/")).unwrap_or(p)
}

fn check_path(p: &str) -> Result<(), EvalError> {
    if p == "/dev/null" {
        return Ok(());
    }
    let path = Path::new(p);
    let escapes = path.components().any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes || p.starts_with('/') || p.starts_with('\\') {
        return Err(EvalError::PatchRejected(format!("path escapes workspace: {p}")));
    }
    Ok(())
}
