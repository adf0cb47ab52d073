use llmperf_core::{BuildTool, Project};
use serde::{Deserialize, Serialize};

use crate::template::CommandTemplate;

/// Run once after a reset when `creates` is missing from the workspace,
/// e.g. generating a Gradle wrapper for commits that do not ship one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bootstrap {
    pub creates: String,
    pub command: CommandTemplate,
}

/// Everything the pipeline needs to know to build, test and benchmark one project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectProfile {
    pub project: Project,
    /// Directory name under the workspaces root.
    pub repo_dir: String,
    pub build_tool: BuildTool,
    /// Compile/test only the task's module (and its dependencies) instead of the root build.
    pub scoped_build: bool,
    pub compile: Option<CommandTemplate>,
    pub test: Option<CommandTemplate>,
    pub bench: Option<CommandTemplate>,
    /// Module that packages the benchmark harness. Rebuilt from the current
    /// tree before every benchmark run so the result reflects the patch.
    pub bench_module: Option<String>,
    pub extra_build_args: Vec<String>,
    pub bootstrap: Option<Bootstrap>,
}

impl ProjectProfile {
    pub fn builtin(project: Project) -> Self {
        let (bench, bench_module, extra_build_args, bootstrap) = match project {
            Project::Kafka => (
                CommandTemplate::new(["./jmh-benchmarks/jmh.sh", "-rf", "json", "-rff", "{output}", "{benchmark}"]),
                None,
                vec![],
                Some(Bootstrap { creates: "gradlew".into(), command: CommandTemplate::new(["gradle", "wrapper"]) }),
            ),
            Project::RoaringBitmap => (
                CommandTemplate::new(["./jmh/run.sh", "{benchmark}", "-rf", "json", "-rff", "{output}"]),
                None,
                vec![],
                None,
            ),
            Project::Netty => (
                CommandTemplate::new([
                    "java", "-jar", "microbench/target/microbenchmarks.jar", "{benchmark}", "-rf", "json", "-rff", "{output}",
                ]),
                Some("microbench".to_string()),
                vec!["-Dcheckstyle.skip=true".into(), "-Denforcer.skip=true".into(), "-Danimal.sniffer.skip=true".into()],
                None,
            ),
            Project::Presto => (
                CommandTemplate::new([
                    "java", "-jar", "presto-benchmark/target/benchmarks.jar", "{benchmark}", "-rf", "json", "-rff", "{output}",
                ]),
                Some("presto-benchmark".to_string()),
                vec!["-Dair.check.skip-all=true".into()],
                None,
            ),
        };
        Self {
            project,
            repo_dir: project.as_str().to_string(),
            build_tool: project.default_build_tool(),
            scoped_build: project.has_scoped_build(),
            compile: None,
            test: None,
            bench: Some(bench),
            bench_module,
            extra_build_args,
            bootstrap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_mapping() {
        assert_eq!(ProjectProfile::builtin(Project::Kafka).build_tool, BuildTool::Gradle);
        assert_eq!(ProjectProfile::builtin(Project::RoaringBitmap).build_tool, BuildTool::Gradle);
        assert_eq!(ProjectProfile::builtin(Project::Netty).build_tool, BuildTool::Maven);
        assert_eq!(ProjectProfile::builtin(Project::Presto).build_tool, BuildTool::Maven);
        assert!(!ProjectProfile::builtin(Project::RoaringBitmap).scoped_build);
        assert_eq!(ProjectProfile::builtin(Project::RoaringBitmap).repo_dir, "RoaringBitmap");
        assert!(ProjectProfile::builtin(Project::Kafka).bootstrap.is_some());
        assert_eq!(ProjectProfile::builtin(Project::Netty).bench_module.as_deref(), Some("microbench"));
        assert_eq!(ProjectProfile::builtin(Project::Presto).bench_module.as_deref(), Some("presto-benchmark"));
        assert!(ProjectProfile::builtin(Project::Kafka).bench_module.is_none());
    }
}
