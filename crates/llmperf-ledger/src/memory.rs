use std::collections::BTreeMap;
use std::sync::Mutex;

use llmperf_core::{LedgerKey, Project, Verdict};

use crate::traits::{Ledger, LedgerEntry};

/// In-memory ledger for tests. Not durable.
#[derive(Default)]
pub struct InMemoryLedger {
    inner: Mutex<BTreeMap<LedgerKey, Verdict>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Ledger for InMemoryLedger {
    fn get(&self, key: &LedgerKey) -> anyhow::Result<Option<Verdict>> {
        Ok(self.inner.lock().unwrap().get(key).copied())
    }

    fn record(&self, key: &LedgerKey, verdict: &Verdict) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.contains_key(key) {
            return Ok(false);
        }
        inner.insert(key.clone(), *verdict);
        Ok(true)
    }

    fn entries(&self, project: Project, scope: &str) -> anyhow::Result<Vec<LedgerEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .iter()
            .filter(|(k, _)| k.project == project && k.scope == scope)
            .map(|(k, v)| LedgerEntry { key: k.clone(), verdict: *v })
            .collect())
    }

    fn scopes(&self, project: Project) -> anyhow::Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<String> = inner.keys().filter(|k| k.project == project).map(|k| k.scope.clone()).collect();
        out.dedup();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmperf_core::{PatchName, RunScope, TaskId};

    fn key(patch: &str) -> LedgerKey {
        LedgerKey::new(Project::Kafka, &RunScope::Model("gpt".into()), &TaskId::from_str("T1"), &PatchName::from_str(patch))
    }

    #[test]
    fn test_new_is_empty() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.is_empty());
        assert!(!ledger.contains(&key("P1")).unwrap());
    }

    #[test]
    fn test_record_then_contains() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.record(&key("P1"), &Verdict::tested(true)).unwrap());
        assert!(ledger.contains(&key("P1")).unwrap());
        assert_eq!(ledger.get(&key("P1")).unwrap(), Some(Verdict::tested(true)));
    }

    #[test]
    fn test_second_record_is_noop() {
        let ledger = InMemoryLedger::new();
        ledger.record(&key("P1"), &Verdict::tested(true)).unwrap();
        assert!(!ledger.record(&key("P1"), &Verdict::patch_rejected()).unwrap());
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&key("P1")).unwrap(), Some(Verdict::tested(true)));
    }

    #[test]
    fn test_entries_filter_by_scope() {
        let ledger = InMemoryLedger::new();
        ledger.record(&key("P1"), &Verdict::tested(true)).unwrap();
        let other = LedgerKey::new(Project::Kafka, &RunScope::Model("gemini".into()), &TaskId::from_str("T1"), &PatchName::from_str("P1"));
        ledger.record(&other, &Verdict::build_failed()).unwrap();
        assert_eq!(ledger.entries(Project::Kafka, "gpt").unwrap().len(), 1);
        assert_eq!(ledger.entries(Project::Netty, "gpt").unwrap().len(), 0);
        assert_eq!(ledger.scopes(Project::Kafka).unwrap(), vec!["gemini", "gpt"]);
    }
}
