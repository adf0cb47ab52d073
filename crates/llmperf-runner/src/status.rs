use std::collections::BTreeMap;
use std::fmt::Write;

use anyhow::Result;
use llmperf_core::{ApplyStatus, Project, StageStatus};
use llmperf_ledger::Ledger;
use llmperf_tasks::TaskRegistry;

/// Prompt variants encoded as `{task}_prompt{N}` in patch names.
pub const PROMPT_VARIANTS: [(u32, &str); 4] =
    [(1, "Zero-Hint"), (2, "Semantic-Hint"), (3, "Structural-Hint"), (4, "Hybrid-Hint")];

pub fn variant_label(variant: Option<u32>) -> String {
    match variant {
        None => "-".to_string(),
        Some(n) => PROMPT_VARIANTS
            .iter()
            .find(|(k, _)| *k == n)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| format!("prompt{n}")),
    }
}

/// Verdict counts for one (project, scope, prompt variant) group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassRate {
    pub project: Project,
    pub scope: String,
    pub variant: Option<u32>,
    pub candidates: usize,
    pub applied: usize,
    pub built: usize,
    pub plausible: usize,
}

impl PassRate {
    pub fn rate(&self) -> f64 {
        if self.candidates == 0 {
            0.0
        } else {
            self.plausible as f64 / self.candidates as f64
        }
    }
}

/// Group every ledger verdict for tasks in `registry` by project, scope and
/// prompt variant. Verdicts for tasks no longer in the table are ignored.
pub fn pass_rates(ledger: &dyn Ledger, registry: &TaskRegistry) -> Result<Vec<PassRate>> {
    let mut out = Vec::new();
    for project in registry.projects() {
        for scope in ledger.scopes(project)? {
            let mut groups: BTreeMap<Option<u32>, PassRate> = BTreeMap::new();
            for entry in ledger.entries(project, &scope)? {
                if registry.get(project, &entry.key.task_id).is_none() {
                    continue;
                }
                let variant = entry.key.patch.prompt_variant();
                let g = groups.entry(variant).or_insert_with(|| PassRate {
                    project,
                    scope: scope.clone(),
                    variant,
                    candidates: 0,
                    applied: 0,
                    built: 0,
                    plausible: 0,
                });
                g.candidates += 1;
                if entry.verdict.patch_apply() == ApplyStatus::Success {
                    g.applied += 1;
                }
                if entry.verdict.build() == StageStatus::Success {
                    g.built += 1;
                }
                if entry.verdict.is_plausible() {
                    g.plausible += 1;
                }
            }
            out.extend(groups.into_values());
        }
    }
    Ok(out)
}

pub fn render_table(rows: &[PassRate]) -> String {
    let mut s = String::new();
    let _ = writeln!(
        s,
        "{:<14} {:<20} {:<16} {:>10} {:>8} {:>8} {:>10} {:>8}",
        "project", "scope", "variant", "candidates", "applied", "built", "plausible", "rate"
    );
    for r in rows {
        let _ = writeln!(
            s,
            "{:<14} {:<20} {:<16} {:>10} {:>8} {:>8} {:>10} {:>7.2}%",
            r.project.as_str(),
            r.scope,
            variant_label(r.variant),
            r.candidates,
            r.applied,
            r.built,
            r.plausible,
            r.rate() * 100.0
        );
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmperf_core::{BaselineKind, LedgerKey, PatchName, RunScope, TaskId, Verdict};
    use llmperf_ledger::InMemoryLedger;

    fn record(ledger: &InMemoryLedger, scope: &RunScope, task: &str, patch: &str, v: Verdict) {
        let key = LedgerKey::new(Project::Kafka, scope, &TaskId::from_str(task), &PatchName::from_str(patch));
        ledger.record(&key, &v).unwrap();
    }

    #[test]
    fn groups_by_scope_and_prompt_variant() {
        let registry = TaskRegistry::parse(
            "repository,id,commit_hash,source_code,jmh_case,unittest,commit_url\n\
             kafka,K1,abc,a/B.java,X,,\nkafka,K2,abd,a/C.java,X,,\n",
            "t",
        )
        .unwrap();
        let ledger = InMemoryLedger::new();
        let gpt = RunScope::Model("gpt".into());
        record(&ledger, &gpt, "K1", "K1_prompt1", Verdict::tested(true));
        record(&ledger, &gpt, "K2", "K2_prompt1", Verdict::patch_rejected());
        record(&ledger, &gpt, "K1", "K1_prompt3", Verdict::build_failed());
        record(&ledger, &gpt, "GONE", "GONE_prompt1", Verdict::tested(true));
        record(&ledger, &RunScope::Baseline(BaselineKind::PostFix), "K1", "developer", Verdict::tested(true));

        let rows = pass_rates(&ledger, &registry).unwrap();
        assert_eq!(rows.len(), 3);
        let baseline = &rows[0];
        assert_eq!((baseline.scope.as_str(), baseline.variant, baseline.plausible), ("baseline_post_fix", None, 1));
        let p1 = &rows[1];
        assert_eq!((p1.variant, p1.candidates, p1.applied, p1.plausible), (Some(1), 2, 1, 1));
        assert!((p1.rate() - 0.5).abs() < 1e-9);
        let p3 = &rows[2];
        assert_eq!((p3.variant, p3.applied, p3.built), (Some(3), 1, 0));

        let table = render_table(&rows);
        assert!(table.contains("Zero-Hint"));
        assert!(table.contains("Structural-Hint"));
        assert!(table.contains("50.00%"));
    }

    #[test]
    fn unknown_variants_keep_their_number() {
        assert_eq!(variant_label(Some(7)), "prompt7");
        assert_eq!(variant_label(Some(4)), "Hybrid-Hint");
        assert_eq!(variant_label(None), "-");
    }
}
