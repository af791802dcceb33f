//! Inferred-signal detection: recognized files that imply a requirement
//! without a dedicated dependency declaration (§4.1).

use crate::{Requirement, Scope, Source};
use fs_err as fs;
use serde::Deserialize;
use std::path::Path;

/// Accumulates state across a directory's inferred files so the Node/Bun
/// mutual-exclusion rule (scenario seed #1) can be enforced once every file
/// has been looked at.
#[derive(Default)]
pub struct InferredState {
    pub requirements: Vec<Requirement>,
    js_runtime_contributed: bool,
    bun_lock_present: bool,
    package_json_present: bool,
}

impl InferredState {
    fn push(&mut self, domain: &str, constraint: &str) {
        self.requirements.push(Requirement {
            domain: domain.to_string(),
            constraint: constraint.to_string(),
            scope: Scope::Local,
            source: Source::Inferred,
        });
    }

    /// Called once per file found directly in the project directory.
    pub fn observe(&mut self, file_name: &str, dir: &Path) {
        match file_name {
            "package.json" => self.package_json_present = true,
            "bun.lock" | "bun.lockb" => {
                self.bun_lock_present = true;
                self.js_runtime_contributed = true;
                self.push("bun.sh", "*");
            }
            ".nvmrc" | ".node-version" => {
                self.js_runtime_contributed = true;
                let version = fs::read_to_string(dir.join(file_name))
                    .ok()
                    .map(|s| s.trim().trim_start_matches('v').to_string())
                    .filter(|s| !s.is_empty());
                self.push("nodejs.org", version.as_deref().unwrap_or("*"));
            }
            ".python-version" => {
                let version = fs::read_to_string(dir.join(file_name))
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                self.push("python.org", version.as_deref().unwrap_or("*"));
            }
            ".terraform-version" => {
                let version = fs::read_to_string(dir.join(file_name))
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                self.push("terraform.io", version.as_deref().unwrap_or("*"));
            }
            "Cargo.toml" => self.push("rust-lang.org", "*"),
            "go.mod" => self.push("go.dev", "*"),
            "Gemfile" => self.push("ruby-lang.org", "*"),
            "Taskfile.yml" | "Taskfile.yaml" => self.push("taskfile.dev", "*"),
            "skaffold.yaml" | "skaffold.yml" => self.push("skaffold.dev", "*"),
            _ => {}
        }
        if file_name == ".git" || file_name == ".hg" || file_name == ".svn" {
            if !cfg!(target_os = "macos") {
                let domain = match file_name {
                    ".git" => "git-scm.org",
                    ".hg" => "mercurial-scm.org",
                    _ => "apache.org/subversion",
                };
                self.push(domain, "*");
            }
        }
    }

    /// `package.json`'s `packageManager` field can itself pin a JS runtime
    /// (e.g. `"bun@1.0.21"`), which both contributes a requirement and
    /// suppresses the default `nodejs.org` inference below.
    pub fn observe_package_json(&mut self, dir: &Path) {
        let Ok(contents) = fs::read_to_string(dir.join("package.json")) else {
            return;
        };
        #[derive(Deserialize)]
        struct PackageJson {
            #[serde(rename = "packageManager")]
            package_manager: Option<String>,
        }
        let Ok(parsed) = serde_json::from_str::<PackageJson>(&contents) else {
            return;
        };
        if let Some(package_manager) = parsed.package_manager {
            if let Some(rest) = package_manager.strip_prefix("bun") {
                self.js_runtime_contributed = true;
                let version = rest.strip_prefix('@').filter(|v| !v.is_empty());
                self.push("bun.sh", version.unwrap_or("*"));
            } else if package_manager.starts_with("deno") {
                self.js_runtime_contributed = true;
            }
        }
    }

    /// Applies the default `nodejs.org ^22` inference once the whole
    /// directory has been scanned, per §4.1's four-way guard.
    pub fn finish(mut self, explicit_deps_present: bool) -> Vec<Requirement> {
        if self.package_json_present
            && !self.js_runtime_contributed
            && !self.bun_lock_present
            && !explicit_deps_present
        {
            self.push("nodejs.org", "^22");
        }
        self.requirements
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn bun_package_manager_suppresses_nodejs_inference() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("package.json"),
            r#"{"packageManager": "bun@1.0.21"}"#,
        )
        .unwrap();

        let mut state = InferredState::default();
        state.observe("package.json", tmp.path());
        state.observe_package_json(tmp.path());
        let reqs = state.finish(false);

        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].domain, "bun.sh");
        assert_eq!(reqs[0].constraint, "1.0.21");
    }

    #[test]
    fn plain_package_json_infers_nodejs() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("package.json"), r#"{"name": "x"}"#).unwrap();

        let mut state = InferredState::default();
        state.observe("package.json", tmp.path());
        state.observe_package_json(tmp.path());
        let reqs = state.finish(false);

        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].domain, "nodejs.org");
        assert_eq!(reqs[0].constraint, "^22");
    }

    #[test]
    fn explicit_deps_suppresses_nodejs_default() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("package.json"), r#"{"name": "x"}"#).unwrap();

        let mut state = InferredState::default();
        state.observe("package.json", tmp.path());
        state.observe_package_json(tmp.path());
        let reqs = state.finish(true);

        assert!(reqs.is_empty());
    }
}
