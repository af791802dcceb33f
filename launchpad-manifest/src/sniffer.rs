//! Walks a project directory, parses recognized manifests, and emits a
//! deduplicated requirement list (C1, §4.1).

use crate::env_subst;
use crate::front_matter;
use crate::inferred::InferredState;
use crate::pantry_yaml::PantryYaml;
use crate::{Requirement, Scope, ServicesInfo, SniffError, SniffResult, Source};
use fs_err as fs;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source files this large are never script-sized pkgx front-matter
/// candidates; skipping them bounds the cost of the front-matter scan.
const FRONT_MATTER_SCAN_CAP_BYTES: u64 = 256 * 1024;

/// First-match-wins order for both "which explicit YAML governs this
/// directory" and "walk upward to find a project root" (§6).
pub const EXPLICIT_MANIFEST_NAMES: &[&str] = &[
    "dependencies.yaml",
    "dependencies.yml",
    "deps.yaml",
    "deps.yml",
    "pkgx.yaml",
    "pkgx.yml",
    "launchpad.yaml",
    "launchpad.yml",
    ".dependencies.yaml",
    ".dependencies.yml",
    ".deps.yaml",
    ".deps.yml",
    ".pkgx.yaml",
    ".pkgx.yml",
    ".launchpad.yaml",
    ".launchpad.yml",
];

const INFERRED_FILE_NAMES: &[&str] = &[
    "package.json",
    "Cargo.toml",
    "go.mod",
    "pyproject.toml",
    "Gemfile",
    "Taskfile.yml",
    "Taskfile.yaml",
    "skaffold.yaml",
    "skaffold.yml",
    ".nvmrc",
    ".node-version",
    ".python-version",
    ".terraform-version",
    "bun.lock",
    "bun.lockb",
    ".git",
    ".hg",
    ".svn",
];

/// Walks upward from `start_dir` for the first directory containing any
/// recognized manifest or inferred signal.
pub fn find_project_root(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = Some(start_dir.to_path_buf());
    while let Some(d) = dir {
        let has_explicit = EXPLICIT_MANIFEST_NAMES.iter().any(|name| d.join(name).is_file());
        let has_inferred = INFERRED_FILE_NAMES
            .iter()
            .any(|name| d.join(name).exists());
        if has_explicit || has_inferred {
            return Some(d);
        }
        dir = d.parent().map(PathBuf::from);
    }
    None
}

/// Sniffs a single project directory (no upward walk — the caller resolves
/// the project root first via [`find_project_root`]).
pub fn sniff(project_dir: &Path, home: &Path) -> Result<SniffResult, SniffError> {
    let explicit_file = EXPLICIT_MANIFEST_NAMES
        .iter()
        .map(|name| project_dir.join(name))
        .find(|path| path.is_file());

    let mut explicit_reqs = Vec::new();
    let mut env = BTreeMap::new();
    let mut services = None;

    if let Some(path) = &explicit_file {
        match parse_pantry_yaml(path) {
            Ok(yaml) => merge_pantry_yaml(yaml, home, project_dir, &mut explicit_reqs, &mut env, &mut services)?,
            Err(err) => {
                // Parse errors never fail the sniff (§4.1); this file just
                // contributes nothing.
                debug!("failed to parse {}: {}", path.display(), err);
            }
        }
    }

    let entries: Vec<_> = fs::read_dir(project_dir).map_err(SniffError::Io)?.flatten().collect();

    let mut inferred = InferredState::default();
    for entry in &entries {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if INFERRED_FILE_NAMES.contains(&name) {
            inferred.observe(name, project_dir);
        }
    }
    if project_dir.join("package.json").is_file() {
        inferred.observe_package_json(project_dir);
    }
    let inferred_reqs = inferred.finish(explicit_file.is_some());

    // §4.1's "read YAML front-matter" mode: a `---`-fenced pkgx block
    // embedded in an otherwise ordinary source file, e.g. a shebang script.
    // Every top-level file is a candidate except the explicit manifest
    // itself, already handled above.
    for entry in &entries {
        let path = entry.path();
        if explicit_file.as_deref() == Some(path.as_path()) {
            continue;
        }
        let Ok(file_type) = entry.file_type() else { continue };
        if !file_type.is_file() {
            continue;
        }
        if entry.metadata().map(|m| m.len()).unwrap_or(0) > FRONT_MATTER_SCAN_CAP_BYTES {
            continue;
        }
        let Ok(contents) = fs::read_to_string(&path) else { continue };
        if let Some(yaml) = front_matter::extract(&contents) {
            merge_pantry_yaml(yaml, home, project_dir, &mut explicit_reqs, &mut env, &mut services)?;
        }
    }

    let explicit_reqs = dedupe_explicit(explicit_reqs);
    let mut requirements = explicit_reqs;
    requirements.extend(dedupe(inferred_reqs, &requirements));

    Ok(SniffResult {
        pkgs: requirements,
        env,
        services,
    })
}

/// Applies one parsed pantry-YAML document (an explicit manifest file or a
/// front-matter block) onto the accumulators shared across every source
/// this sniff considers. `services` keeps the first value seen; later
/// sources never override an already-decided services block.
fn merge_pantry_yaml(
    yaml: PantryYaml,
    home: &Path,
    project_dir: &Path,
    requirements: &mut Vec<Requirement>,
    env: &mut BTreeMap<String, String>,
    services: &mut Option<ServicesInfo>,
) -> Result<(), SniffError> {
    let default_scope = if yaml.global { Scope::Global } else { Scope::Local };
    if let Some(block) = &yaml.dependencies {
        for (domain, dep) in block.entries() {
            let scope = match dep.global_override() {
                Some(true) => Scope::Global,
                Some(false) => Scope::Local,
                None => default_scope,
            };
            requirements.push(Requirement {
                domain,
                constraint: dep.version().to_string(),
                scope,
                source: Source::Explicit,
            });
        }
    }
    for (key, value) in &yaml.env {
        let substituted =
            env_subst::substitute(value, home, project_dir).map_err(|err| SniffError::InvalidEnv(err.to_string()))?;
        env.insert(key.clone(), substituted);
    }
    if services.is_none() {
        *services = yaml.services.map(|s| ServicesInfo {
            enabled: s.enabled.unwrap_or(true),
            auto_start: s.auto_start.unwrap_or_default(),
            infer: s.infer.unwrap_or(false),
        });
    }
    Ok(())
}

/// Explicit wins over inferred for the same domain; within the inferred set
/// the more specific constraint wins (exact > non-wildcard range > `*`).
fn dedupe(inferred: Vec<Requirement>, explicit: &[Requirement]) -> Vec<Requirement> {
    let mut by_domain: BTreeMap<String, Requirement> = BTreeMap::new();
    for req in inferred {
        by_domain
            .entry(req.domain.clone())
            .and_modify(|existing| {
                if specificity(&req.constraint) > specificity(&existing.constraint) {
                    *existing = req.clone();
                }
            })
            .or_insert(req);
    }
    for req in explicit {
        by_domain.remove(&req.domain);
    }
    by_domain.into_values().collect()
}

/// Explicit sources (the manifest file and any front-matter blocks) can
/// both name the same domain; the more specific constraint wins, same rule
/// as inferred-vs-inferred.
fn dedupe_explicit(reqs: Vec<Requirement>) -> Vec<Requirement> {
    let mut by_domain: BTreeMap<String, Requirement> = BTreeMap::new();
    for req in reqs {
        by_domain
            .entry(req.domain.clone())
            .and_modify(|existing| {
                if specificity(&req.constraint) > specificity(&existing.constraint) {
                    *existing = req.clone();
                }
            })
            .or_insert(req);
    }
    by_domain.into_values().collect()
}

fn specificity(constraint: &str) -> u8 {
    match constraint {
        "*" | "latest" => 0,
        c if c.starts_with('^') || c.starts_with('~') || c.contains('-') || c.contains("||") => 1,
        _ => 2,
    }
}

fn parse_pantry_yaml(path: &Path) -> anyhow::Result<PantryYaml> {
    let contents = fs::read_to_string(path)?;
    Ok(PantryYaml::from_str(&contents)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn node_bun_mutual_exclusion_scenario() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("package.json"),
            r#"{"packageManager":"bun"}"#,
        )
        .unwrap();

        let result = sniff(tmp.path(), &tmp.path().join("home")).unwrap();
        assert_eq!(result.pkgs.len(), 1);
        assert_eq!(result.pkgs[0].domain, "bun.sh");
        assert_eq!(result.pkgs[0].constraint, "*");
    }

    #[test]
    fn explicit_yaml_overrides_inferred_for_same_domain() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("launchpad.yaml"),
            "dependencies:\n  rust-lang.org: \"1.75\"\n",
        )
        .unwrap();
        fs::write(tmp.path().join("Cargo.toml"), "[package]\nname=\"x\"\n").unwrap();

        let result = sniff(tmp.path(), &tmp.path().join("home")).unwrap();
        assert_eq!(result.pkgs.len(), 1);
        assert_eq!(result.pkgs[0].source, Source::Explicit);
        assert_eq!(result.pkgs[0].constraint, "1.75");
    }

    #[test]
    fn invalid_dollar_in_env_is_fatal() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("launchpad.yaml"),
            "dependencies: []\nenv:\n  PRICE: \"$5\"\n",
        )
        .unwrap();

        let err = sniff(tmp.path(), &tmp.path().join("home")).unwrap_err();
        assert!(matches!(err, SniffError::InvalidEnv(_)));
    }

    #[test]
    fn unrecognized_directory_yields_no_requirements() {
        let tmp = TempDir::new().unwrap();
        let result = sniff(tmp.path(), &tmp.path().join("home")).unwrap();
        assert!(result.pkgs.is_empty());
    }

    #[test]
    fn front_matter_block_in_a_shebang_script_is_picked_up_as_explicit() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("build.ts"),
            "#!/usr/bin/env -S pkgx +deno run\n# ---\n# dependencies:\n#   deno.land: ^1.34\n# ---\nconsole.log(1)\n",
        )
        .unwrap();

        let result = sniff(tmp.path(), &tmp.path().join("home")).unwrap();
        assert_eq!(result.pkgs.len(), 1);
        assert_eq!(result.pkgs[0].domain, "deno.land");
        assert_eq!(result.pkgs[0].source, Source::Explicit);
    }

    #[test]
    fn explicit_yaml_file_wins_over_a_less_specific_front_matter_block_for_the_same_domain() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("launchpad.yaml"),
            "dependencies:\n  nodejs.org: \"22.4.1\"\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("build.sh"),
            "#!/usr/bin/env bash\n# ---\n# dependencies:\n#   nodejs.org: \"*\"\n# ---\necho hi\n",
        )
        .unwrap();

        let result = sniff(tmp.path(), &tmp.path().join("home")).unwrap();
        assert_eq!(result.pkgs.len(), 1);
        assert_eq!(result.pkgs[0].constraint, "22.4.1");
    }

    #[test]
    fn plain_source_files_without_front_matter_contribute_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("main.rs"), "fn main() {}\n").unwrap();

        let result = sniff(tmp.path(), &tmp.path().join("home")).unwrap();
        assert!(result.pkgs.is_empty());
    }
}
