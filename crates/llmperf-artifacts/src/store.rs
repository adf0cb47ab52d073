use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use llmperf_core::{path_component, LedgerKey};

use crate::manifest::{EvidenceManifest, EvidenceRole};

pub const MANIFEST_FILE: &str = "evidence_manifest.json";
pub const WORKLOG_FILE: &str = "worklog.md";

pub trait ArtifactStore: Send + Sync {
    fn create_run_dir(&self, key: &LedgerKey) -> Result<PathBuf>;
    fn write_manifest(&self, run_dir: &Path, manifest: &EvidenceManifest) -> Result<()>;
    fn append_worklog(&self, run_dir: &Path, line: &str) -> Result<()>;
    fn write_role_bytes(&self, run_dir: &Path, role: EvidenceRole, name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Evidence tree at `{root}/{project}/{scope}/{task_id}/{patch}/`.
#[derive(Clone)]
pub struct FsArtifactStore {
    pub root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn run_dir_for(&self, key: &LedgerKey) -> PathBuf {
        self.root
            .join(key.project.as_str())
            .join(path_component(&key.scope))
            .join(path_component(key.task_id.as_str()))
            .join(path_component(key.patch.as_str()))
    }

    pub fn read_manifest(run_dir: &Path) -> Result<EvidenceManifest> {
        let path = run_dir.join(MANIFEST_FILE);
        let bytes = std::fs::read(&path).with_context(|| format!("read manifest {}", path.display()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn create_run_dir(&self, key: &LedgerKey) -> Result<PathBuf> {
        let dir = self.run_dir_for(key);
        std::fs::create_dir_all(&dir).with_context(|| format!("create run dir {}", dir.display()))?;
        Ok(dir)
    }

    fn write_manifest(&self, run_dir: &Path, manifest: &EvidenceManifest) -> Result<()> {
        let path = run_dir.join(MANIFEST_FILE);
        let bytes = serde_json::to_vec_pretty(manifest)?;
        std::fs::write(&path, bytes).with_context(|| format!("write manifest {}", path.display()))?;
        Ok(())
    }

    fn append_worklog(&self, run_dir: &Path, line: &str) -> Result<()> {
        let path = run_dir.join(WORKLOG_FILE);
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open worklog {}", path.display()))?;
        writeln!(f, "{}", line)?;
        Ok(())
    }

    fn write_role_bytes(&self, run_dir: &Path, role: EvidenceRole, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = run_dir.join(role.dir_name());
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(path_component(name));
        std::fs::write(&path, bytes).with_context(|| format!("write artifact {}", path.display()))?;
        Ok(path)
    }
}
