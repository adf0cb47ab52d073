use std::path::Path;

use anyhow::Result;
use llmperf_core::{BuildTool, Project};

use crate::exec::{run_argv, ExecResult};
use crate::profile::ProjectProfile;
use crate::template::{CommandTemplate, TemplateVars};
use crate::BuildError;

/// Configured command templates. For Gradle and Maven they override the
/// built-in invocations; the script adapter has nothing else.
#[derive(Clone, Debug)]
pub struct Commands {
    pub project: Project,
    pub compile: Option<CommandTemplate>,
    pub test: Option<CommandTemplate>,
    pub bench: Option<CommandTemplate>,
}

impl Commands {
    fn from_profile(p: &ProjectProfile) -> Self {
        Self { project: p.project, compile: p.compile.clone(), test: p.test.clone(), bench: p.bench.clone() }
    }

    fn missing(&self, what: &'static str) -> BuildError {
        BuildError::MissingCommand { project: self.project.to_string(), what }
    }
}

/// One build tool. Argv construction is pure; execution is shared.
pub trait BuildAdapter: Send + Sync {
    fn tool(&self) -> BuildTool;

    fn commands(&self) -> &Commands;

    /// Compile `module` and its dependency closure without running tests or
    /// static analysis. `""` is the root build.
    fn compile_argv(&self, module: &str) -> Result<Vec<String>, BuildError>;

    /// Run exactly one test class in `module`.
    fn test_argv(&self, module: &str, test: &str) -> Result<Vec<String>, BuildError>;

    fn bench_argv(&self, benchmark: &str, output: &Path) -> Result<Vec<String>, BuildError> {
        let cmds = self.commands();
        let t = cmds.bench.as_ref().ok_or_else(|| cmds.missing("benchmark"))?;
        let output = output.to_string_lossy();
        t.render(&TemplateVars { benchmark: Some(benchmark), output: Some(&output), ..Default::default() })
    }

    /// Packages the benchmark harness from the current tree, when the tool
    /// does not do it as part of the benchmark command.
    fn bench_build_argv(&self) -> Option<Vec<String>> {
        None
    }

    fn compile(&self, root: &Path, module: &str) -> Result<ExecResult> {
        run_argv(root, &self.compile_argv(module)?)
    }

    fn run_test(&self, root: &Path, module: &str, test: &str) -> Result<ExecResult> {
        run_argv(root, &self.test_argv(module, test)?)
    }

    /// A failed harness build is returned as the result, without running the benchmark.
    fn bench(&self, root: &Path, benchmark: &str, output: &Path) -> Result<ExecResult> {
        let argv = self.bench_argv(benchmark, output)?;
        if let Some(build) = self.bench_build_argv() {
            let exec = run_argv(root, &build)?;
            if !exec.passed {
                return Ok(exec);
            }
        }
        run_argv(root, &argv)
    }
}

/// Static project -> adapter mapping, after configuration overrides.
pub fn adapter_for(profile: &ProjectProfile) -> Result<Box<dyn BuildAdapter>, BuildError> {
    let commands = Commands::from_profile(profile);
    Ok(match profile.build_tool {
        BuildTool::Gradle => Box::new(GradleAdapter {
            wrapper: "./gradlew".into(),
            scoped: profile.scoped_build,
            extra_args: profile.extra_build_args.clone(),
            commands,
        }),
        BuildTool::Maven => Box::new(MavenAdapter {
            mvn: "mvn".into(),
            scoped: profile.scoped_build,
            bench_module: profile.bench_module.clone(),
            extra_args: profile.extra_build_args.clone(),
            commands,
        }),
        BuildTool::Script => {
            if commands.compile.is_none() {
                return Err(commands.missing("compile"));
            }
            if commands.test.is_none() {
                return Err(commands.missing("test"));
            }
            Box::new(ScriptAdapter { scoped: profile.scoped_build, commands })
        }
    })
}

fn render_override(
    t: Option<&CommandTemplate>,
    module: &str,
    test: Option<&str>,
) -> Option<Result<Vec<String>, BuildError>> {
    t.map(|t| t.render(&TemplateVars { module: Some(module), test, ..Default::default() }))
}

#[derive(Clone, Debug)]
pub struct GradleAdapter {
    pub wrapper: String,
    pub scoped: bool,
    pub extra_args: Vec<String>,
    pub commands: Commands,
}

impl GradleAdapter {
    fn task(&self, module: &str, task: &str) -> String {
        if self.scoped && !module.is_empty() {
            format!(":{module}:{task}")
        } else {
            task.to_string()
        }
    }
}

impl BuildAdapter for GradleAdapter {
    fn tool(&self) -> BuildTool {
        BuildTool::Gradle
    }

    fn commands(&self) -> &Commands {
        &self.commands
    }

    fn compile_argv(&self, module: &str) -> Result<Vec<String>, BuildError> {
        if let Some(r) = render_override(self.commands.compile.as_ref(), module, None) {
            return r;
        }
        let mut argv = vec![self.wrapper.clone(), self.task(module, "compileJava"), "--console=plain".into()];
        argv.extend(self.extra_args.iter().cloned());
        Ok(argv)
    }

    fn test_argv(&self, module: &str, test: &str) -> Result<Vec<String>, BuildError> {
        if let Some(r) = render_override(self.commands.test.as_ref(), module, Some(test)) {
            return r;
        }
        let mut argv = vec![
            self.wrapper.clone(),
            self.task(module, "test"),
            "--tests".into(),
            test.to_string(),
            "--console=plain".into(),
        ];
        argv.extend(self.extra_args.iter().cloned());
        Ok(argv)
    }
}

#[derive(Clone, Debug)]
pub struct MavenAdapter {
    pub mvn: String,
    pub scoped: bool,
    pub bench_module: Option<String>,
    pub extra_args: Vec<String>,
    pub commands: Commands,
}

impl MavenAdapter {
    fn scope_args(&self, module: &str) -> Vec<String> {
        if self.scoped && !module.is_empty() {
            vec!["-pl".into(), module.to_string(), "-am".into()]
        } else {
            vec![]
        }
    }
}

impl BuildAdapter for MavenAdapter {
    fn tool(&self) -> BuildTool {
        BuildTool::Maven
    }

    fn commands(&self) -> &Commands {
        &self.commands
    }

    fn compile_argv(&self, module: &str) -> Result<Vec<String>, BuildError> {
        if let Some(r) = render_override(self.commands.compile.as_ref(), module, None) {
            return r;
        }
        let mut argv = vec![self.mvn.clone(), "-B".into(), "compile".into(), "-DskipTests".into()];
        argv.extend(self.scope_args(module));
        argv.extend(self.extra_args.iter().cloned());
        Ok(argv)
    }

    fn test_argv(&self, module: &str, test: &str) -> Result<Vec<String>, BuildError> {
        if let Some(r) = render_override(self.commands.test.as_ref(), module, Some(test)) {
            return r;
        }
        let mut argv = vec![
            self.mvn.clone(),
            "-B".into(),
            "test".into(),
            format!("-Dtest={test}"),
            "-DfailIfNoTests=false".into(),
            "-Dsurefire.failIfNoSpecifiedTests=false".into(),
        ];
        argv.extend(self.scope_args(module));
        argv.extend(self.extra_args.iter().cloned());
        Ok(argv)
    }

    fn bench_build_argv(&self) -> Option<Vec<String>> {
        let module = self.bench_module.as_ref()?;
        let mut argv = vec![
            self.mvn.clone(),
            "-B".into(),
            "package".into(),
            "-DskipTests".into(),
            "-pl".into(),
            module.clone(),
            "-am".into(),
        ];
        argv.extend(self.extra_args.iter().cloned());
        Some(argv)
    }
}

/// User-supplied command templates, e.g. the per-project build/test shell scripts.
#[derive(Clone, Debug)]
pub struct ScriptAdapter {
    pub scoped: bool,
    pub commands: Commands,
}

impl ScriptAdapter {
    fn module<'a>(&self, module: &'a str) -> &'a str {
        if self.scoped {
            module
        } else {
            ""
        }
    }
}

impl BuildAdapter for ScriptAdapter {
    fn tool(&self) -> BuildTool {
        BuildTool::Script
    }

    fn commands(&self) -> &Commands {
        &self.commands
    }

    fn compile_argv(&self, module: &str) -> Result<Vec<String>, BuildError> {
        render_override(self.commands.compile.as_ref(), self.module(module), None)
            .unwrap_or_else(|| Err(self.commands.missing("compile")))
    }

    fn test_argv(&self, module: &str, test: &str) -> Result<Vec<String>, BuildError> {
        render_override(self.commands.test.as_ref(), self.module(module), Some(test))
            .unwrap_or_else(|| Err(self.commands.missing("test")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn gradle_scopes_to_module() {
        let a = adapter_for(&ProjectProfile::builtin(Project::Kafka)).unwrap();
        assert_eq!(a.tool(), BuildTool::Gradle);
        assert_eq!(a.compile_argv("clients").unwrap(), vec!["./gradlew", ":clients:compileJava", "--console=plain"]);
        assert_eq!(
            a.test_argv("clients", "FooTest").unwrap(),
            vec!["./gradlew", ":clients:test", "--tests", "FooTest", "--console=plain"]
        );
        assert_eq!(a.compile_argv("").unwrap()[1], "compileJava");
    }

    #[test]
    fn unscoped_project_builds_root() {
        let a = adapter_for(&ProjectProfile::builtin(Project::RoaringBitmap)).unwrap();
        assert_eq!(a.compile_argv("RoaringBitmap").unwrap()[1], "compileJava");
        assert_eq!(a.test_argv("RoaringBitmap", "RoaringBitmapTest").unwrap()[1], "test");
    }

    #[test]
    fn maven_uses_also_make() {
        let a = adapter_for(&ProjectProfile::builtin(Project::Netty)).unwrap();
        let argv = a.compile_argv("codec").unwrap();
        assert_eq!(&argv[..4], &["mvn", "-B", "compile", "-DskipTests"]);
        assert!(argv.windows(3).any(|w| w == ["-pl", "codec", "-am"]));
        assert!(argv.contains(&"-Dcheckstyle.skip=true".to_string()));
        let argv = a.test_argv("codec", "ByteToMessageDecoderTest").unwrap();
        assert!(argv.contains(&"-Dtest=ByteToMessageDecoderTest".to_string()));
    }

    #[test]
    fn bench_renders_output_path() {
        let a = adapter_for(&ProjectProfile::builtin(Project::Kafka)).unwrap();
        let argv = a.bench_argv("FooBench.run", &PathBuf::from("/b/kafka/gpt/P1/FooBench.run_T1.json")).unwrap();
        assert_eq!(argv[0], "./jmh-benchmarks/jmh.sh");
        assert!(argv.contains(&"/b/kafka/gpt/P1/FooBench.run_T1.json".to_string()));
        assert_eq!(argv.last().unwrap(), "FooBench.run");
    }

    #[test]
    fn maven_bench_packages_harness_from_current_tree() {
        let a = adapter_for(&ProjectProfile::builtin(Project::Netty)).unwrap();
        let build = a.bench_build_argv().unwrap();
        assert_eq!(&build[..4], &["mvn", "-B", "package", "-DskipTests"]);
        assert!(build.windows(3).any(|w| w == ["-pl", "microbench", "-am"]));
        let argv = a.bench_argv("FooBench", &PathBuf::from("/b/out.json")).unwrap();
        assert_eq!(&argv[..3], &["java", "-jar", "microbench/target/microbenchmarks.jar"]);

        let presto = adapter_for(&ProjectProfile::builtin(Project::Presto)).unwrap();
        assert!(presto.bench_build_argv().unwrap().contains(&"presto-benchmark".to_string()));
        assert!(adapter_for(&ProjectProfile::builtin(Project::Kafka)).unwrap().bench_build_argv().is_none());
    }

    #[test]
    fn script_adapter_requires_templates() {
        let mut p = ProjectProfile::builtin(Project::Presto);
        p.build_tool = BuildTool::Script;
        assert!(adapter_for(&p).is_err());

        p.compile = Some(CommandTemplate::new(["scripts/presto_build.sh", "{module}"]));
        p.test = Some(CommandTemplate::new(["scripts/presto_test.sh", "{module}", "{test}"]));
        let a = adapter_for(&p).unwrap();
        assert_eq!(a.compile_argv("presto-main").unwrap(), vec!["scripts/presto_build.sh", "presto-main"]);
        assert_eq!(a.test_argv("presto-main", "TestX").unwrap(), vec!["scripts/presto_test.sh", "presto-main", "TestX"]);
    }

    #[test]
    fn overrides_win_over_builtin_invocation() {
        let mut p = ProjectProfile::builtin(Project::Kafka);
        p.compile = Some(CommandTemplate::new(["./gradlew", "-p", "{module}", "classes"]));
        let a = adapter_for(&p).unwrap();
        assert_eq!(a.compile_argv("core").unwrap(), vec!["./gradlew", "-p", "core", "classes"]);
        assert_eq!(a.test_argv("core", "T").unwrap()[1], ":core:test");
    }
}
