use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use llmperf_build::{Bootstrap, CommandTemplate, ProjectProfile, QuirkTable};
use llmperf_core::{BuildTool, EvalError, Project};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Per-project overrides keyed by project name (`kafka`, `netty`, `presto`, `RoaringBitmap`).
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectOverrides>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    pub workspaces_root: String,
    pub patches_root: String,
    pub results_root: String,
    pub benchmarks_root: String,
    pub artifacts_root: String,
    #[serde(default)]
    pub quirks_file: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Csv,
    Sqlite,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackend,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Also delete ignored files (build outputs) when cleaning before a reset.
    #[serde(default)]
    pub clean_ignored: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProjectOverrides {
    #[serde(default)]
    pub repo_dir: Option<String>,
    #[serde(default)]
    pub build_tool: Option<BuildTool>,
    #[serde(default)]
    pub scoped_build: Option<bool>,
    #[serde(default)]
    pub compile: Option<CommandTemplate>,
    #[serde(default)]
    pub test: Option<CommandTemplate>,
    #[serde(default)]
    pub bench: Option<CommandTemplate>,
    #[serde(default)]
    pub bench_module: Option<String>,
    #[serde(default)]
    pub extra_build_args: Option<Vec<String>>,
    #[serde(default)]
    pub bootstrap: Option<Bootstrap>,
}

impl Config {
    pub fn default_for_repo() -> Self {
        Self {
            paths: PathsConfig {
                workspaces_root: "workspaces".to_string(),
                patches_root: "patches".to_string(),
                results_root: "results".to_string(),
                benchmarks_root: "benchmarks".to_string(),
                artifacts_root: ".llmperf/artifacts".to_string(),
                quirks_file: None,
            },
            ledger: LedgerConfig::default(),
            workspace: WorkspaceConfig::default(),
            projects: BTreeMap::new(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse llmperf.toml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Load the config under `root`, writing the defaults first if there is none.
    pub fn load_or_init(root: &Path) -> Result<Self> {
        let path = Self::config_path(root);
        if path.exists() {
            return Self::load_from(&path);
        }
        let cfg = Self::default_for_repo();
        cfg.save_to(&path)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        for name in self.projects.keys() {
            if Project::parse(name).is_none() {
                return Err(EvalError::Usage(format!("unknown project `{name}` in [projects]")));
            }
        }
        Ok(())
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(".llmperf").join("llmperf.toml")
    }

    /// Tilde-expanded; relative paths are taken from `root`.
    pub fn resolve(root: &Path, p: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(p).to_string());
        if expanded.is_absolute() {
            expanded
        } else {
            root.join(expanded)
        }
    }

    pub fn workspaces_root(&self, root: &Path) -> PathBuf {
        Self::resolve(root, &self.paths.workspaces_root)
    }

    pub fn patches_root(&self, root: &Path) -> PathBuf {
        Self::resolve(root, &self.paths.patches_root)
    }

    pub fn results_root(&self, root: &Path) -> PathBuf {
        Self::resolve(root, &self.paths.results_root)
    }

    pub fn benchmarks_root(&self, root: &Path) -> PathBuf {
        Self::resolve(root, &self.paths.benchmarks_root)
    }

    pub fn artifacts_root(&self, root: &Path) -> PathBuf {
        Self::resolve(root, &self.paths.artifacts_root)
    }

    pub fn sqlite_path(&self, root: &Path) -> PathBuf {
        self.results_root(root).join("ledger.db")
    }

    /// Projects with an explicit `[projects.<name>]` section.
    pub fn configured_projects(&self) -> Vec<Project> {
        self.projects.keys().filter_map(|k| Project::parse(k)).collect()
    }

    fn overrides(&self, project: Project) -> Option<&ProjectOverrides> {
        self.projects.iter().find(|(k, _)| Project::parse(k) == Some(project)).map(|(_, v)| v)
    }

    /// Built-in profile with this config's overrides applied.
    pub fn profile(&self, project: Project) -> ProjectProfile {
        let mut p = ProjectProfile::builtin(project);
        let Some(o) = self.overrides(project) else {
            return p;
        };
        if let Some(v) = &o.repo_dir {
            p.repo_dir = v.clone();
        }
        if let Some(v) = o.build_tool {
            p.build_tool = v;
        }
        if let Some(v) = o.scoped_build {
            p.scoped_build = v;
        }
        if o.compile.is_some() {
            p.compile = o.compile.clone();
        }
        if o.test.is_some() {
            p.test = o.test.clone();
        }
        if o.bench.is_some() {
            p.bench = o.bench.clone();
        }
        if o.bench_module.is_some() {
            p.bench_module = o.bench_module.clone();
        }
        if let Some(v) = &o.extra_build_args {
            p.extra_build_args = v.clone();
        }
        if o.bootstrap.is_some() {
            p.bootstrap = o.bootstrap.clone();
        }
        p
    }

    pub fn workspace_dir(&self, root: &Path, profile: &ProjectProfile) -> PathBuf {
        self.workspaces_root(root).join(&profile.repo_dir)
    }

    /// Built-in quirks plus the rows of `paths.quirks_file`, if set.
    pub fn quirk_table(&self, root: &Path) -> Result<QuirkTable> {
        let mut table = QuirkTable::builtin()?;
        if let Some(file) = &self.paths.quirks_file {
            let rows = QuirkTable::load_yaml(&Self::resolve(root, file))?;
            table.extend(rows)?;
        }
        Ok(table)
    }
}
