//! Project identity and environment root path resolution (§3, §6).

use crate::env_config;
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};

/// `<basename>_<md5(abs_project_path)[0..8]>`, optionally suffixed
/// `-d<md5(dep_file)[0..8]>` so a manifest edit invalidates the environment.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProjectIdentity(String);

impl ProjectIdentity {
    pub fn compute(project_dir: &Path, dep_file_contents: Option<&[u8]>) -> Self {
        let basename = project_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string());
        let path_hash = md5_hex8(project_dir.to_string_lossy().as_bytes());
        let mut identity = format!("{basename}_{path_hash}");
        if let Some(contents) = dep_file_contents {
            identity.push_str(&format!("-d{}", md5_hex8(contents)));
        }
        ProjectIdentity(identity)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The first 8 hex characters of the MD5 digest — shared by project
/// identity hashing and the `dev:md5` CLI command (§11).
pub fn md5_hex8(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    let full = format!("{digest:x}");
    full[..8].to_string()
}

/// `${XDG_DATA_HOME:-$HOME/.local/share}/launchpad/<project_identity>`.
pub fn data_home() -> anyhow::Result<PathBuf> {
    if let Some(test_home) = env_config::test_home() {
        return Ok(test_home.join(".local").join("share"));
    }
    if let Some(xdg) = env_config::xdg_data_home() {
        return Ok(xdg);
    }
    let home = env_config::home().ok_or_else(|| anyhow::anyhow!("HOME is not set"))?;
    Ok(home.join(".local").join("share"))
}

pub fn env_root(identity: &ProjectIdentity) -> anyhow::Result<PathBuf> {
    Ok(data_home()?.join("launchpad").join(identity.as_str()))
}

pub fn global_env_root() -> anyhow::Result<PathBuf> {
    Ok(data_home()?.join("launchpad").join("global"))
}
