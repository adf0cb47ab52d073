use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use llmperf_core::{verdict_from_parts, ApplyStatus, LedgerKey, PatchName, Project, StageStatus, TaskId, Verdict};
use llmperf_ledger::{Ledger, LedgerEntry, LedgerError};
use rusqlite::{params, Connection, OptionalExtension};

/// Verdict ledger in a single SQLite file. Same semantics as the CSV ledger;
/// the unique key makes `record` a no-op for keys already present.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn row_to_verdict(location: &str, apply: &str, build: &str, test: &str) -> Result<Verdict> {
        let corrupt = |reason: String| LedgerError::Corrupt { location: location.to_string(), reason };
        let apply = ApplyStatus::from_ledger_str(apply).ok_or_else(|| corrupt(format!("bad apply `{apply}`")))?;
        let build = StageStatus::from_ledger_str(build).ok_or_else(|| corrupt(format!("bad build `{build}`")))?;
        let test = StageStatus::from_ledger_str(test).ok_or_else(|| corrupt(format!("bad test `{test}`")))?;
        Ok(verdict_from_parts(apply, build, test).map_err(|e| corrupt(e.to_string()))?)
    }
}

impl Ledger for SqliteLedger {
    fn get(&self, key: &LedgerKey) -> Result<Option<Verdict>> {
        let conn = self.conn.lock().map_err(|_| anyhow!("ledger connection poisoned"))?;
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT patch_apply, build, test FROM verdicts
                 WHERE project=?1 AND scope=?2 AND task_id=?3 AND patch=?4",
                params![key.project.as_str(), key.scope, key.task_id.as_str(), key.patch.as_str()],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        match row {
            Some((a, b, t)) => Ok(Some(Self::row_to_verdict(&key.to_string(), &a, &b, &t)?)),
            None => Ok(None),
        }
    }

    fn record(&self, key: &LedgerKey, verdict: &Verdict) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| anyhow!("ledger connection poisoned"))?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO verdicts(project, scope, task_id, patch, patch_apply, build, test, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                key.project.as_str(),
                key.scope,
                key.task_id.as_str(),
                key.patch.as_str(),
                verdict.patch_apply().as_ledger_str(),
                verdict.build().as_ledger_str(),
                verdict.test().as_ledger_str(),
                now_unix()
            ],
        )?;
        Ok(inserted == 1)
    }

    fn entries(&self, project: Project, scope: &str) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn.lock().map_err(|_| anyhow!("ledger connection poisoned"))?;
        let mut stmt = conn.prepare(
            "SELECT task_id, patch, patch_apply, build, test FROM verdicts
             WHERE project=?1 AND scope=?2 ORDER BY task_id, rowid",
        )?;
        let rows = stmt.query_map(params![project.as_str(), scope], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
            ))
        })?;

        let mut out = vec![];
        for row in rows {
            let (task_id, patch, a, b, t) = row?;
            let key = LedgerKey {
                project,
                scope: scope.to_string(),
                task_id: TaskId::from_str(task_id),
                patch: PatchName::from_str(patch),
            };
            let verdict = Self::row_to_verdict(&key.to_string(), &a, &b, &t)?;
            out.push(LedgerEntry { key, verdict });
        }
        Ok(out)
    }

    fn scopes(&self, project: Project) -> Result<Vec<String>> {
        let conn = self.conn.lock().map_err(|_| anyhow!("ledger connection poisoned"))?;
        let mut stmt = conn.prepare("SELECT DISTINCT scope FROM verdicts WHERE project=?1 ORDER BY scope")?;
        let rows = stmt.query_map(params![project.as_str()], |r| r.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

pub fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmperf_core::{BaselineKind, RunScope};
    use tempfile::tempdir;

    fn key(scope: &RunScope, patch: &str) -> LedgerKey {
        LedgerKey::new(Project::Netty, scope, &TaskId::from_str("N1"), &PatchName::from_str(patch))
    }

    #[test]
    fn sqlite_open_and_migrate_twice() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("ledger.db");
        drop(SqliteLedger::open(&db_path).unwrap());
        let _ = SqliteLedger::open(&db_path).unwrap();
    }

    #[test]
    fn record_is_first_write_wins() {
        let dir = tempdir().unwrap();
        let ledger = SqliteLedger::open(&dir.path().join("ledger.db")).unwrap();
        let scope = RunScope::Model("gpt".into());

        assert!(ledger.record(&key(&scope, "P3"), &Verdict::tested(false)).unwrap());
        assert!(!ledger.record(&key(&scope, "P3"), &Verdict::tested(true)).unwrap());
        assert_eq!(ledger.get(&key(&scope, "P3")).unwrap(), Some(Verdict::tested(false)));
        assert_eq!(ledger.get(&key(&scope, "P4")).unwrap(), None);
    }

    #[test]
    fn entries_are_scoped() {
        let dir = tempdir().unwrap();
        let ledger = SqliteLedger::open(&dir.path().join("ledger.db")).unwrap();
        let model = RunScope::Model("gpt".into());
        let pre = RunScope::Baseline(BaselineKind::PreFix);
        ledger.record(&key(&model, "P1"), &Verdict::tested(true)).unwrap();
        ledger.record(&key(&model, "P2"), &Verdict::patch_rejected()).unwrap();
        ledger.record(&key(&pre, "developer"), &Verdict::build_failed()).unwrap();

        let got = ledger.entries(Project::Netty, &model.label()).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].verdict, Verdict::patch_rejected());
        assert_eq!(ledger.entries(Project::Netty, &pre.label()).unwrap().len(), 1);
        assert!(ledger.entries(Project::Kafka, &model.label()).unwrap().is_empty());
        assert_eq!(ledger.scopes(Project::Netty).unwrap(), vec!["baseline_pre_fix", "gpt"]);
    }

    #[test]
    fn verdicts_survive_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("ledger.db");
        let scope = RunScope::Model("gpt".into());
        SqliteLedger::open(&db_path).unwrap().record(&key(&scope, "P1"), &Verdict::build_failed()).unwrap();
        assert!(SqliteLedger::open(&db_path).unwrap().contains(&key(&scope, "P1")).unwrap());
    }
}
