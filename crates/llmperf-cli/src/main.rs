use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use llmperf_core::{EvalError, Project};
use llmperf_runner::{ensure_healthy, pass_rates, render_table, scope_for_mode, Config, RunRequest, Runner};
use llmperf_tasks::TaskRegistry;

#[derive(Parser)]
#[command(name = "llmperf", version, about = "Evaluate LLM-generated performance patches against historical fixes")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// The fix commit with target files rolled back to their pre-fix content
    BaselinePreFix,
    /// The developer's fix commit as-is
    BaselinePostFix,
    /// Every patch a model produced, applied to the pre-fix source
    Model,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::BaselinePreFix => "baseline-pre-fix",
            Mode::BaselinePostFix => "baseline-post-fix",
            Mode::Model => "model",
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Write a default .llmperf/llmperf.toml and create the output directories
    Init,

    /// Check git, workspaces and build tools
    Doctor {
        /// Check the projects named in this task table instead of the configured ones
        #[arg(long)]
        tasks: Option<PathBuf>,
    },

    /// Evaluate candidates and record verdicts
    Run {
        #[arg(long)]
        tasks: PathBuf,
        #[arg(long, value_enum)]
        mode: Mode,
        /// Model whose patches to evaluate (required with --mode model)
        #[arg(long, required_if_eq("mode", "model"))]
        model: Option<String>,
        /// Only run tasks of this project
        #[arg(long)]
        project: Option<String>,
        /// Record verdicts without running benchmarks
        #[arg(long)]
        no_bench: bool,
    },

    /// Pass-rate summary per project, model and prompt variant
    Status {
        #[arg(long)]
        tasks: PathBuf,
    },
}

fn load_tasks(path: &Path) -> anyhow::Result<TaskRegistry> {
    let registry = TaskRegistry::load(path)?;
    info!(path = %path.display(), tasks = registry.tasks().len(), fingerprint = registry.fingerprint(), "task table loaded");
    Ok(registry)
}

fn parse_project(name: &str) -> anyhow::Result<Project> {
    Ok(Project::parse(name).ok_or_else(|| EvalError::Usage(format!("unknown project `{name}`")))?)
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            Runner::init_repo(&repo_root)?;
            println!("Initialized llmperf in {}", Config::config_path(&repo_root).display());
        }
        Command::Doctor { tasks } => {
            let r = Runner::open(repo_root)?;
            let projects = match tasks {
                Some(path) => load_tasks(&path)?.projects(),
                None if !r.cfg.projects.is_empty() => r.cfg.configured_projects(),
                None => Project::ALL.to_vec(),
            };
            let checks = r.doctor(&projects);
            for c in &checks {
                println!("{c}");
            }
            ensure_healthy(&checks)?;
            println!("OK");
        }
        Command::Run { tasks, mode, model, project, no_bench } => {
            let scope = scope_for_mode(mode.as_str(), model.as_deref())?;
            let project = project.as_deref().map(parse_project).transpose()?;
            let registry = load_tasks(&tasks)?;
            let r = Runner::open(repo_root)?;
            let summary = r.run(&registry, &RunRequest { scope: scope.clone(), project, bench: !no_bench })?;
            println!(
                "{}: {} recorded ({} plausible), {} already recorded, {} task errors, {} benchmarks written, {} benchmark failures",
                scope.label(),
                summary.recorded,
                summary.plausible,
                summary.skipped,
                summary.task_errors,
                summary.benchmarks_written,
                summary.benchmark_failures
            );
        }
        Command::Status { tasks } => {
            let registry = load_tasks(&tasks)?;
            let r = Runner::open(repo_root)?;
            let rows = pass_rates(r.ledger.as_ref(), &registry)?;
            if rows.is_empty() {
                println!("No verdicts recorded for {} tasks", registry.tasks().len());
            } else {
                print!("{}", render_table(&rows));
            }
        }
    }

    Ok(())
}
