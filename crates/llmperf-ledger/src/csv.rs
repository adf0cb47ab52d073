use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use llmperf_core::{path_component, verdict_from_parts, ApplyStatus, LedgerKey, PatchName, Project, StageStatus, TaskId, Verdict};
use llmperf_tasks::parse_table;
use tracing::debug;

use crate::traits::{Ledger, LedgerEntry, LedgerError};

pub const LEDGER_FILE: &str = "verdicts.csv";
pub const LEDGER_HEADER: &str = "patch,apply,build,test";

/// Delimited append-only ledger: one `verdicts.csv` per
/// `{root}/{project}/{model_or_baseline}/{task_id}/`.
#[derive(Clone, Debug)]
pub struct CsvLedger {
    pub root: PathBuf,
}

impl CsvLedger {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn file_for(&self, project: Project, scope: &str, task_id: &TaskId) -> PathBuf {
        self.root
            .join(project.as_str())
            .join(path_component(scope))
            .join(path_component(task_id.as_str()))
            .join(LEDGER_FILE)
    }

    fn read_file(path: &Path, project: Project, scope: &str, task_id: &TaskId) -> Result<Vec<LedgerEntry>> {
        if !path.exists() {
            return Ok(vec![]);
        }
        let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let location = path.display().to_string();
        let table = parse_table(&text, &location)?;
        let col = |name: &str| {
            table.column(name).ok_or_else(|| LedgerError::Corrupt {
                location: location.clone(),
                reason: format!("missing column `{name}`"),
            })
        };
        let (c_patch, c_apply, c_build, c_test) = (col("patch")?, col("apply")?, col("build")?, col("test")?);

        let mut out = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let corrupt = |reason: String| LedgerError::Corrupt { location: format!("{}:{}", location, row.line), reason };
            let apply_s = row.get(Some(c_apply));
            let apply = ApplyStatus::from_ledger_str(apply_s).ok_or_else(|| corrupt(format!("bad apply `{apply_s}`")))?;
            let build_s = row.get(Some(c_build));
            let build = StageStatus::from_ledger_str(build_s).ok_or_else(|| corrupt(format!("bad build `{build_s}`")))?;
            let test_s = row.get(Some(c_test));
            let test = StageStatus::from_ledger_str(test_s).ok_or_else(|| corrupt(format!("bad test `{test_s}`")))?;
            let verdict = verdict_from_parts(apply, build, test).map_err(|e| corrupt(e.to_string()))?;
            out.push(LedgerEntry {
                key: LedgerKey {
                    project,
                    scope: scope.to_string(),
                    task_id: task_id.clone(),
                    patch: PatchName::from_str(row.get(Some(c_patch))),
                },
                verdict,
            });
        }
        Ok(out)
    }
}

/// Quote a cell when it holds a delimiter or quote.
fn cell(s: &str) -> String {
    if s.contains(',') || s.contains('"') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn format_row(patch: &PatchName, verdict: &Verdict) -> String {
    format!(
        "{},{},{},{}",
        cell(patch.as_str()),
        verdict.patch_apply().as_ledger_str(),
        verdict.build().as_ledger_str(),
        verdict.test().as_ledger_str()
    )
}

impl Ledger for CsvLedger {
    fn get(&self, key: &LedgerKey) -> Result<Option<Verdict>> {
        let path = self.file_for(key.project, &key.scope, &key.task_id);
        let entries = Self::read_file(&path, key.project, &key.scope, &key.task_id)?;
        Ok(entries.into_iter().find(|e| e.key.patch == key.patch).map(|e| e.verdict))
    }

    fn record(&self, key: &LedgerKey, verdict: &Verdict) -> Result<bool> {
        if self.contains(key)? {
            debug!(%key, "verdict already recorded");
            return Ok(false);
        }
        let path = self.file_for(key.project, &key.scope, &key.task_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        let mut buf = String::new();
        if f.metadata()?.len() == 0 {
            buf.push_str(LEDGER_HEADER);
            buf.push('\n');
        }
        buf.push_str(&format_row(&key.patch, verdict));
        buf.push('\n');
        f.write_all(buf.as_bytes()).with_context(|| format!("append {}", path.display()))?;
        f.sync_data()?;
        Ok(true)
    }

    fn entries(&self, project: Project, scope: &str) -> Result<Vec<LedgerEntry>> {
        let scope_dir = self.root.join(project.as_str()).join(path_component(scope));
        if !scope_dir.is_dir() {
            return Ok(vec![]);
        }
        let mut task_dirs: Vec<PathBuf> = std::fs::read_dir(&scope_dir)
            .with_context(|| format!("read {}", scope_dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.join(LEDGER_FILE).is_file())
            .collect();
        task_dirs.sort();

        let mut out = Vec::new();
        for dir in task_dirs {
            let task = dir.file_name().and_then(|s| s.to_str()).unwrap_or_default();
            out.extend(Self::read_file(&dir.join(LEDGER_FILE), project, scope, &TaskId::from_str(task))?);
        }
        Ok(out)
    }

    fn scopes(&self, project: Project) -> Result<Vec<String>> {
        let project_dir = self.root.join(project.as_str());
        if !project_dir.is_dir() {
            return Ok(vec![]);
        }
        let mut out: Vec<String> = std::fs::read_dir(&project_dir)
            .with_context(|| format!("read {}", project_dir.display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        out.sort();
        Ok(out)
    }
}
