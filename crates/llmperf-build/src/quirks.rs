//! Declarative rewrites that make historical commits buildable on a current
//! toolchain. Each row names a project, the stage it runs before, the files it
//! touches (glob, relative to the workspace root) and a regex rewrite.
//!
//! Applying a table is idempotent: files are written only when their content
//! changes, and a row whose replacement would match its own pattern again is
//! refused when the table is built.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use llmperf_core::Project;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::BuildError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuirkStage {
    Reset,
    Build,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuirkRow {
    pub name: String,
    pub project: Project,
    pub stage: QuirkStage,
    pub file_glob: String,
    pub pattern: String,
    pub replacement: String,
}

#[derive(Clone, Debug)]
struct Quirk {
    row: QuirkRow,
    regex: Regex,
}

/// One file rewritten by one row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuirkHit {
    pub quirk: String,
    pub path: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct QuirkTable {
    quirks: Vec<Quirk>,
}

impl QuirkTable {
    /// Built-in rows. Gradle distributions before 6.x do not run on the JDKs
    /// the harness uses, so old wrapper pins are lifted.
    pub fn builtin() -> Result<Self, BuildError> {
        let wrapper = |project| QuirkRow {
            name: "gradle-wrapper-distribution".into(),
            project,
            stage: QuirkStage::Reset,
            file_glob: "gradle/wrapper/gradle-wrapper.properties".into(),
            pattern: r"(?m)^distributionUrl=(.*)/gradle-[2-5]\.[0-9.]+-(bin|all)\.zip$".into(),
            replacement: "distributionUrl=$1/gradle-6.9.4-$2.zip".into(),
        };
        Self::from_rows(vec![wrapper(Project::Kafka), wrapper(Project::RoaringBitmap)])
    }

    pub fn from_rows(rows: Vec<QuirkRow>) -> Result<Self, BuildError> {
        let mut table = Self::default();
        table.extend(rows)?;
        Ok(table)
    }

    pub fn extend(&mut self, rows: Vec<QuirkRow>) -> Result<(), BuildError> {
        for row in rows {
            let err = |reason: String| BuildError::Quirk { name: row.name.clone(), reason };
            glob(&row.file_glob).map_err(|e| err(e.to_string()))?;
            let regex = Regex::new(&row.pattern).map_err(|e| err(format!("invalid pattern: {e}")))?;
            if regex.is_match(&strip_group_refs(&row.replacement)) {
                return Err(err("replacement matches its own pattern".into()));
            }
            self.quirks.push(Quirk { row, regex });
        }
        Ok(())
    }

    /// Rows from a YAML list of [`QuirkRow`].
    pub fn load_yaml(path: &Path) -> Result<Vec<QuirkRow>> {
        let text = std::fs::read_to_string(path).with_context(|| format!("read quirks {}", path.display()))?;
        let rows: Vec<QuirkRow> =
            serde_yaml::from_str(&text).with_context(|| format!("parse quirks {}", path.display()))?;
        Ok(rows)
    }

    pub fn len(&self) -> usize {
        self.quirks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quirks.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &QuirkRow> {
        self.quirks.iter().map(|q| &q.row)
    }

    /// Apply every row for (`project`, `stage`) under `root`.
    pub fn apply(&self, project: Project, stage: QuirkStage, root: &Path) -> Result<Vec<QuirkHit>> {
        let active: Vec<&Quirk> =
            self.quirks.iter().filter(|q| q.row.project == project && q.row.stage == stage).collect();
        if active.is_empty() {
            return Ok(vec![]);
        }
        let set = globset_for(&active)?;

        let mut hits = Vec::new();
        let walker = WalkDir::new(root).follow_links(false).into_iter().filter_entry(|e| e.file_name() != ".git");
        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match entry.path().strip_prefix(root) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            let matched = set.matches(&rel);
            if matched.is_empty() {
                continue;
            }

            let path = entry.path();
            let original = match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let mut text = original.clone();
            let mut names = Vec::new();
            for idx in matched {
                let q = active[idx];
                let next = q.regex.replace_all(&text, q.row.replacement.as_str()).into_owned();
                if next != text {
                    if q.regex.replace_all(&next, q.row.replacement.as_str()) != next {
                        return Err(BuildError::Quirk {
                            name: q.row.name.clone(),
                            reason: format!("rewrite of {rel} is not idempotent"),
                        }
                        .into());
                    }
                    names.push(q.row.name.clone());
                    text = next;
                }
            }
            if text != original {
                std::fs::write(path, &text).with_context(|| format!("write {}", path.display()))?;
                for name in names {
                    info!(%project, quirk = %name, file = %rel, "quirk applied");
                    hits.push(QuirkHit { quirk: name, path: path.to_path_buf() });
                }
            }
        }
        Ok(hits)
    }
}

fn glob(pattern: &str) -> Result<globset::Glob, globset::Error> {
    GlobBuilder::new(pattern).literal_separator(true).build()
}

fn globset_for(quirks: &[&Quirk]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for q in quirks {
        builder.add(glob(&q.row.file_glob).with_context(|| format!("invalid glob: {:?}", q.row.file_glob))?);
    }
    Ok(builder.build()?)
}

/// Replacement text with `$1`, `${name}` and `$$` references removed.
fn strip_group_refs(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                }
            }
            _ => {
                while chars.peek().is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_') {
                    chars.next();
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const WRAPPER: &str = "distributionBase=GRADLE_USER_HOME\n\
        distributionUrl=https\\://services.gradle.org/distributions/gradle-5.1.1-all.zip\n";

    fn write(root: &Path, rel: &str, text: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, text).unwrap();
    }

    #[test]
    fn builtin_wrapper_rewrite_is_idempotent() {
        let dir = tempdir().unwrap();
        write(dir.path(), "gradle/wrapper/gradle-wrapper.properties", WRAPPER);
        let table = QuirkTable::builtin().unwrap();

        let hits = table.apply(Project::Kafka, QuirkStage::Reset, dir.path()).unwrap();
        assert_eq!(hits.len(), 1);
        let once = std::fs::read_to_string(dir.path().join("gradle/wrapper/gradle-wrapper.properties")).unwrap();
        assert!(once.contains("gradle-6.9.4-all.zip"));
        assert!(once.starts_with("distributionBase=GRADLE_USER_HOME\n"));

        let hits = table.apply(Project::Kafka, QuirkStage::Reset, dir.path()).unwrap();
        assert!(hits.is_empty());
        let twice = std::fs::read_to_string(dir.path().join("gradle/wrapper/gradle-wrapper.properties")).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rows_are_scoped_by_project_and_stage() {
        let dir = tempdir().unwrap();
        write(dir.path(), "gradle/wrapper/gradle-wrapper.properties", WRAPPER);
        let table = QuirkTable::builtin().unwrap();
        assert!(table.apply(Project::Netty, QuirkStage::Reset, dir.path()).unwrap().is_empty());
        assert!(table.apply(Project::Kafka, QuirkStage::Build, dir.path()).unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(dir.path().join("gradle/wrapper/gradle-wrapper.properties")).unwrap(), WRAPPER);
    }

    #[test]
    fn glob_matches_nested_files_and_skips_git_dir() {
        let dir = tempdir().unwrap();
        write(dir.path(), "pom.xml", "<v>1.0-SNAPSHOT</v>");
        write(dir.path(), "codec/pom.xml", "<v>1.0-SNAPSHOT</v>");
        write(dir.path(), ".git/pom.xml", "<v>1.0-SNAPSHOT</v>");
        let table = QuirkTable::from_rows(vec![QuirkRow {
            name: "release-version".into(),
            project: Project::Netty,
            stage: QuirkStage::Build,
            file_glob: "**/pom.xml".into(),
            pattern: r"<v>([0-9.]+)-SNAPSHOT</v>".into(),
            replacement: "<v>$1</v>".into(),
        }])
        .unwrap();
        let hits = table.apply(Project::Netty, QuirkStage::Build, dir.path()).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(std::fs::read_to_string(dir.path().join("codec/pom.xml")).unwrap(), "<v>1.0</v>");
        assert_eq!(std::fs::read_to_string(dir.path().join(".git/pom.xml")).unwrap(), "<v>1.0-SNAPSHOT</v>");
    }

    #[test]
    fn self_matching_replacement_is_refused() {
        let row = QuirkRow {
            name: "loop".into(),
            project: Project::Presto,
            stage: QuirkStage::Build,
            file_glob: "pom.xml".into(),
            pattern: "skip".into(),
            replacement: "skip-all".into(),
        };
        assert!(QuirkTable::from_rows(vec![row.clone()]).is_err());
        let bad_regex = QuirkRow { pattern: "(".into(), replacement: "x".into(), ..row };
        assert!(QuirkTable::from_rows(vec![bad_regex]).is_err());
    }

    #[test]
    fn yaml_rows_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quirks.yaml");
        std::fs::write(
            &path,
            "- name: jdk-target\n  project: presto\n  stage: build\n  file_glob: pom.xml\n  pattern: '<release>8</release>'\n  replacement: '<release>11</release>'\n",
        )
        .unwrap();
        let rows = QuirkTable::load_yaml(&path).unwrap();
        assert_eq!(rows[0].project, Project::Presto);
        assert_eq!(rows[0].stage, QuirkStage::Build);
        let mut table = QuirkTable::builtin().unwrap();
        table.extend(rows).unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn group_refs_are_stripped() {
        assert_eq!(strip_group_refs("a$1b${name}c$$d"), "abc$d");
    }
}
