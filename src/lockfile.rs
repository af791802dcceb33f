//! Lockfile Store (C4): `pantry.lock` read/write/validate (§4.4).

use anyhow::Context;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::NamedTempFile;

pub const LOCKFILE_NAME: &str = "pantry.lock";
const LOCKFILE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct LockfileEntry {
    pub name: String,
    pub version: String,
    pub resolved: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dev: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lockfile {
    version: String,
    packages: BTreeMap<String, LockfileEntry>,
}

impl Default for Lockfile {
    fn default() -> Self {
        Lockfile {
            version: LOCKFILE_VERSION.to_string(),
            packages: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DriftReport {
    pub missing: Vec<String>,
    pub version_mismatch: Vec<String>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.version_mismatch.is_empty()
    }
}

impl Lockfile {
    pub fn load(project_dir: &Path) -> anyhow::Result<Self> {
        let path = project_dir.join(LOCKFILE_NAME);
        if !path.is_file() {
            return Ok(Lockfile::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("Invalid lockfile at {}", path.display()))
    }

    /// Atomic write: temp file in the same directory, then rename (§4.4).
    pub fn write(&self, project_dir: &Path) -> anyhow::Result<()> {
        let path = project_dir.join(LOCKFILE_NAME);
        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize lockfile")?;
        let mut temp_file =
            NamedTempFile::new_in(project_dir).context("Failed to create lockfile temp file")?;
        use std::io::Write;
        temp_file
            .write_all(contents.as_bytes())
            .context("Failed to write lockfile contents")?;
        temp_file
            .persist(&path)
            .context("Failed to atomically replace lockfile")?;
        Ok(())
    }

    pub fn key(name: &str, version: &str) -> String {
        format!("{name}@{version}")
    }

    pub fn insert(&mut self, entry: LockfileEntry) {
        let key = Self::key(&entry.name, &entry.version);
        self.packages.insert(key, entry);
    }

    /// `(version, url, integrity)` for the newest locked entry of `name`, if
    /// any — the resolver consults this before the registry (§4.3).
    pub fn locked(&self, name: &str) -> Option<(&str, &str, Option<&str>)> {
        self.packages
            .values()
            .filter(|entry| entry.name == name)
            .max_by(|a, b| a.version.cmp(&b.version))
            .map(|entry| (entry.version.as_str(), entry.resolved.as_str(), entry.integrity.as_deref()))
    }

    pub fn validate(&self, installed: &BTreeMap<String, String>) -> DriftReport {
        let mut report = DriftReport::default();
        for entry in self.packages.values() {
            match installed.get(&entry.name) {
                None => report.missing.push(entry.name.clone()),
                Some(installed_version) if installed_version != &entry.version => {
                    report.version_mismatch.push(entry.name.clone())
                }
                Some(_) => {}
            }
        }
        report
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn sample_entry(name: &str, version: &str) -> LockfileEntry {
        LockfileEntry {
            name: name.to_string(),
            version: version.to_string(),
            resolved: format!("https://dist.pkgx.dev/{name}/linux/x86-64/v{version}.tar.xz"),
            integrity: None,
            dev: false,
            optional: false,
            dependencies: BTreeMap::new(),
        }
    }

    #[test]
    fn round_trips_through_disk() {
        let tmp = TempDir::new().unwrap();
        let mut lockfile = Lockfile::default();
        lockfile.insert(sample_entry("nodejs.org", "22.1.0"));
        lockfile.write(tmp.path()).unwrap();

        let reloaded = Lockfile::load(tmp.path()).unwrap();
        let (version, url, _) = reloaded.locked("nodejs.org").unwrap();
        assert_eq!(version, "22.1.0");
        assert!(url.contains("22.1.0"));
    }

    #[test]
    fn lockfile_trumps_registry_scenario() {
        // Scenario seed #3.
        let mut lockfile = Lockfile::default();
        lockfile.insert(sample_entry("nodejs.org", "22.1.0"));
        let (version, _, _) = lockfile.locked("nodejs.org").unwrap();
        assert_eq!(version, "22.1.0");
    }

    #[test]
    fn missing_lockfile_loads_as_empty() {
        let tmp = TempDir::new().unwrap();
        let lockfile = Lockfile::load(tmp.path()).unwrap();
        assert!(lockfile.locked("anything").is_none());
    }

    #[test]
    fn validate_reports_missing_and_mismatched() {
        let mut lockfile = Lockfile::default();
        lockfile.insert(sample_entry("nodejs.org", "22.1.0"));
        lockfile.insert(sample_entry("redis.io", "7.2.0"));

        let mut installed = BTreeMap::new();
        installed.insert("nodejs.org".to_string(), "21.0.0".to_string());

        let report = lockfile.validate(&installed);
        assert_eq!(report.missing, vec!["redis.io".to_string()]);
        assert_eq!(report.version_mismatch, vec!["nodejs.org".to_string()]);
    }
}
