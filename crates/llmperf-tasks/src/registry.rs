use std::collections::HashSet;
use std::path::Path;

use llmperf_core::{path_component, EvalError, Project, Task, TaskId};
use sha2::{Digest, Sha256};

use crate::table::{parse_table, Row, Table};

pub const REQUIRED_COLUMNS: [&str; 7] =
    ["repository", "id", "commit_hash", "source_code", "jmh_case", "unittest", "commit_url"];

/// Immutable catalog of evaluation tasks, in table order.
#[derive(Clone, Debug)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
    fingerprint: String,
}

impl TaskRegistry {
    pub fn load(path: &Path) -> Result<Self, EvalError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EvalError::malformed(format!("task table {}", path.display()), e.to_string()))?;
        Self::parse(&text, &format!("task table {}", path.display()))
    }

    pub fn parse(text: &str, origin: &str) -> Result<Self, EvalError> {
        let table = parse_table(text, origin)?;
        for col in REQUIRED_COLUMNS {
            if table.column(col).is_none() {
                return Err(EvalError::malformed(origin, format!("missing column `{col}`")));
            }
        }

        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let task = parse_row(&table, row).map_err(|reason| EvalError::malformed(origin, format!("line {}: {reason}", row.line)))?;
            if !seen.insert((task.project, task.id.clone())) {
                return Err(EvalError::malformed(
                    origin,
                    format!("line {}: duplicate task {} for {}", row.line, task.id, task.project),
                ));
            }
            tasks.push(task);
        }

        let fingerprint = fingerprint(&tasks);
        Ok(Self { tasks, fingerprint })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn for_project(&self, project: Project) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.project == project)
    }

    /// Projects in order of first appearance.
    pub fn projects(&self) -> Vec<Project> {
        let mut out: Vec<Project> = Vec::new();
        for t in &self.tasks {
            if !out.contains(&t.project) {
                out.push(t.project);
            }
        }
        out
    }

    pub fn get(&self, project: Project, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.project == project && &t.id == id)
    }

    /// SHA-256 over the canonical JSON of every parsed task.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn parse_row(table: &Table, row: &Row) -> Result<Task, String> {
    let repository = row.get(table.column("repository"));
    let project = Project::parse(repository).ok_or_else(|| format!("unknown repository `{repository}`"))?;

    let id = row.get(table.column("id"));
    if id.is_empty() {
        return Err("empty id".into());
    }
    // ids name ledger, artifact and patch directories and must survive the trip back
    if path_component(id) != id || id.starts_with('.') {
        return Err(format!("task id `{id}` is not usable as a directory name"));
    }

    let commit_hash = row.get(table.column("commit_hash"));
    if commit_hash.is_empty() || !commit_hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("invalid commit_hash `{commit_hash}`"));
    }

    let target_paths = split_paths(row.get(table.column("source_code")));
    if target_paths.is_empty() {
        return Err("empty source_code".into());
    }

    let fix_depth = match row.get(table.column("fix_depth")) {
        "" => 1,
        s => match s.parse::<u32>() {
            Ok(n) if n >= 1 => n,
            _ => return Err(format!("fix_depth must be a positive integer, got `{s}`")),
        },
    };

    let commit_url = Some(row.get(table.column("commit_url")).to_string()).filter(|s| !s.is_empty());

    Ok(Task {
        project,
        id: TaskId::from_str(id),
        commit_hash: commit_hash.to_string(),
        target_paths,
        benchmark_id: row.get(table.column("jmh_case")).to_string(),
        unit_test_ids: split_paths(row.get(table.column("unittest"))),
        fix_depth,
        commit_url,
    })
}

/// Whitespace-separated path list, order kept, duplicates dropped.
fn split_paths(cell: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for p in cell.split_whitespace() {
        if !out.iter().any(|q| q == p) {
            out.push(p.to_string());
        }
    }
    out
}

fn fingerprint(tasks: &[Task]) -> String {
    let bytes = serde_json::to_vec(tasks).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "repository,id,commit_hash,source_code,jmh_case,unittest,commit_url";

    fn table(rows: &[&str]) -> String {
        let mut s = HEADER.to_string();
        for r in rows {
            s.push('\n');
            s.push_str(r);
        }
        s
    }

    #[test]
    fn parses_scenario_row() {
        let text = table(&["kafka,T1,abc123,modA/Foo.java,FooBench.run,modA/FooTest.java,https://example.org/c/abc123"]);
        let reg = TaskRegistry::parse(&text, "t").unwrap();
        let t = &reg.tasks()[0];
        assert_eq!(t.project, Project::Kafka);
        assert_eq!(t.id.as_str(), "T1");
        assert_eq!(t.target_paths, vec!["modA/Foo.java"]);
        assert_eq!(t.unit_test_ids, vec!["modA/FooTest.java"]);
        assert_eq!(t.build_module(), "modA");
        assert_eq!(t.fix_depth, 1);
        assert_eq!(t.commit_url.as_deref(), Some("https://example.org/c/abc123"));
    }

    #[test]
    fn unittest_is_whitespace_list_and_may_be_empty() {
        let text = table(&[
            "netty,N1,def456,codec/A.java,ABench,\"codec/ATest.java  codec/BTest.java\",",
            "netty,N2,def457,codec/A.java,ABench,,",
        ]);
        let reg = TaskRegistry::parse(&text, "t").unwrap();
        assert_eq!(reg.tasks()[0].unit_test_ids, vec!["codec/ATest.java", "codec/BTest.java"]);
        assert!(reg.tasks()[1].unit_test_ids.is_empty());
        assert_eq!(reg.tasks()[1].commit_url, None);
    }

    #[test]
    fn fix_depth_column_is_optional_and_validated() {
        let text = format!("{HEADER},fix_depth\nkafka,T1,abc,a/B.java,X,,,3\nkafka,T2,abd,a/B.java,X,,,");
        let reg = TaskRegistry::parse(&text, "t").unwrap();
        assert_eq!(reg.tasks()[0].fix_depth, 3);
        assert_eq!(reg.tasks()[1].fix_depth, 1);

        let bad = format!("{HEADER},fix_depth\nkafka,T1,abc,a/B.java,X,,,0");
        assert!(TaskRegistry::parse(&bad, "t").is_err());
    }

    #[test]
    fn rejects_bad_rows() {
        assert!(TaskRegistry::parse("id,commit_hash\nT1,abc", "t").is_err());
        assert!(TaskRegistry::parse(&table(&["spark,T1,abc,a/B.java,X,,"]), "t").is_err());
        assert!(TaskRegistry::parse(&table(&["kafka,T1,not-a-hash,a/B.java,X,,"]), "t").is_err());
        assert!(TaskRegistry::parse(&table(&["kafka,T1,abc,,X,,"]), "t").is_err());
        for id in ["a/b", "T 1", "x:y", ".."] {
            let err = TaskRegistry::parse(&table(&[&format!("kafka,{id},abc,a/B.java,X,,")]), "t").unwrap_err();
            assert!(err.to_string().contains("directory name"), "{id}: {err}");
        }
        assert!(TaskRegistry::parse(&table(&["kafka,kafka-1234_a.b,abc,a/B.java,X,,"]), "t").is_ok());
        assert!(TaskRegistry::parse(&table(&["kafka,T1,abc,a/B.java,X,,", "kafka,T1,abd,a/C.java,X,,"]), "t").is_err());
    }

    #[test]
    fn same_id_in_two_projects_is_fine() {
        let reg = TaskRegistry::parse(&table(&["kafka,T1,abc,a/B.java,X,,", "presto,T1,abd,a/C.java,X,,"]), "t").unwrap();
        assert_eq!(reg.projects(), vec![Project::Kafka, Project::Presto]);
        assert!(reg.get(Project::Presto, &TaskId::from_str("T1")).is_some());
        assert_eq!(reg.for_project(Project::Kafka).count(), 1);
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = TaskRegistry::parse(&table(&["kafka,T1,abc,a/B.java,X,,"]), "t").unwrap();
        let b = TaskRegistry::parse(&table(&["kafka,T1,abc,a/B.java,X,,"]), "t").unwrap();
        let c = TaskRegistry::parse(&table(&["kafka,T1,abd,a/B.java,X,,"]), "t").unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
