//! Environment Materializer (C8, §4.8): lays out `ENV/`, extracts and
//! relocates each resolved package into it, and wires up symlinks.

use crate::archive::{self, Compression};
use crate::checkpoint::{Checkpoint, RollbackLog};
use crate::download::DownloadedArchive;
use crate::spec::ResolvedPackage;
use anyhow::Context;
use fs_err as fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::fs::symlink;

/// `$GLOBAL_STUB_DIR` stands in for `/usr/local/bin` so tests never touch
/// the real system directory; production always passes the real path.
#[derive(Debug, Clone)]
pub struct MaterializeOptions<'a> {
    pub env_root: &'a Path,
    pub global_env_root: &'a Path,
    pub global_stub_dir: &'a Path,
}

#[derive(Debug, Default)]
pub struct MaterializeReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
}

/// The newest `v<version>` directory directly under `domain_dir`, skipping
/// the bare-major symlinks (`v22`) in favor of full versions (`v22.4.1`),
/// which always also exist alongside them.
fn newest_version_dir(domain_dir: &Path) -> Option<(crate::version_range::Version, PathBuf)> {
    use crate::version_range::Version;

    let entries = std::fs::read_dir(domain_dir).ok()?;
    let mut best: Option<(Version, PathBuf)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(raw) = name.strip_prefix('v') else { continue };
        if !raw.contains('.') {
            continue;
        }
        let Some(version) = Version::parse(raw) else { continue };
        if best.as_ref().map(|(b, _)| version > *b).unwrap_or(true) {
            best = Some((version, entry.path()));
        }
    }
    best
}

/// Newest installed version per domain under `env_root`, for drift checks
/// against the lockfile (§4.4's `validate`). Mirrors the version scan the
/// readiness oracle does, but unconstrained and across every domain present.
pub fn installed_versions(env_root: &Path) -> std::collections::BTreeMap<String, String> {
    let mut installed = std::collections::BTreeMap::new();
    let Ok(domains) = std::fs::read_dir(env_root) else {
        return installed;
    };
    for domain_entry in domains.flatten() {
        let Ok(file_type) = domain_entry.file_type() else { continue };
        if !file_type.is_dir() {
            continue;
        }
        let domain = domain_entry.file_name().to_string_lossy().to_string();
        if let Some((version, _)) = newest_version_dir(&domain_entry.path()) {
            installed.insert(domain, version.to_string());
        }
    }
    installed
}

/// `lib`/`lib64` directories under the newest installed version of every
/// domain in `env_root`, for the activation plan's `*LIBRARY_PATH` exports
/// (§4.10 bullet 3). Called against both the project env root and the
/// global env root so a package satisfied globally still contributes its
/// library directory to activation.
pub fn discover_library_paths(env_root: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let Ok(domains) = std::fs::read_dir(env_root) else {
        return paths;
    };
    for domain_entry in domains.flatten() {
        let Ok(file_type) = domain_entry.file_type() else { continue };
        if !file_type.is_dir() {
            continue;
        }
        let Some((_, version_dir)) = newest_version_dir(&domain_entry.path()) else { continue };
        for lib_subdir in ["lib", "lib64"] {
            let candidate = version_dir.join(lib_subdir);
            if candidate.is_dir() {
                paths.push(candidate);
            }
        }
    }
    paths
}

/// Materializes every resolved package into `ENV/`, consulting and updating
/// the checkpoint as it goes (§4.8 steps 2–4, 6).
pub fn materialize(
    packages: &[ResolvedPackage],
    archives: &[DownloadedArchive],
    options: &MaterializeOptions,
) -> anyhow::Result<MaterializeReport> {
    fs::create_dir_all(options.env_root).context("Failed to create environment root")?;
    let mut checkpoint = Checkpoint::load(options.env_root)?;
    checkpoint.start_if_unset();
    let mut report = MaterializeReport::default();
    let mut log = RollbackLog::default();

    for package in packages {
        let key = format!("{}@{}", package.domain, package.version);
        if checkpoint.is_installed(&key) {
            debug!("{} already recorded in checkpoint, skipping", key);
            report.skipped.push(key);
            continue;
        }
        match install_one(package, archives, options, &mut log) {
            Ok(created) => {
                checkpoint.mark_installed(&key, &created.files, &created.dirs);
                checkpoint.save(options.env_root)?;
                report.installed.push(key);
            }
            Err(err) => {
                warn!("Install of {} failed, rolling back: {}", key, err);
                let rolled_back = log.rollback();
                debug!(
                    "Rollback removed {} operation(s), {} failed",
                    rolled_back.removed, rolled_back.failed
                );
                return Err(err);
            }
        }
    }

    if let Some(elapsed) = checkpoint.elapsed_secs() {
        debug!("Materialization finished in {}s", elapsed);
    }
    log.commit();
    Checkpoint::delete(options.env_root)?;
    Ok(report)
}

struct CreatedPaths {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

fn install_one(
    package: &ResolvedPackage,
    archives: &[DownloadedArchive],
    options: &MaterializeOptions,
    log: &mut RollbackLog,
) -> anyhow::Result<CreatedPaths> {
    let archive_entry = archives
        .iter()
        .find(|a| a.domain == package.domain)
        .with_context(|| format!("No downloaded archive for {}", package.domain))?;

    let compression = Compression::from_filename(
        archive_entry.path.file_name().and_then(|n| n.to_str()).unwrap_or(""),
    )
    .unwrap_or(Compression::Xz);
    archive::validate(&archive_entry.path, compression)
        .with_context(|| format!("Archive for {} failed validation", package.domain))?;

    let tmp_dir = options
        .env_root
        .join(".tmp")
        .join(format!("{}-{}", package.domain, package.version));
    fs::create_dir_all(&tmp_dir)?;
    archive::extract(&archive_entry.path, compression, &tmp_dir)
        .with_context(|| format!("Failed to extract {}", package.domain))?;
    let staged_root = archive::locate_package_root(&tmp_dir, &package.domain, &package.version.to_string())?;

    let warnings = launchpad_relocator::relocate_package(
        &staged_root,
        &options.env_root.join("lib"),
        &options.global_env_root.join("lib"),
    )
    .with_context(|| format!("Relocation failed for {}", package.domain))?;
    for warning in &warnings {
        warn!("{}: {}", warning.file.display(), warning.message);
    }

    let final_dir = options
        .env_root
        .join(&package.domain)
        .join(format!("v{}", package.version));
    if let Some(parent) = final_dir.parent() {
        fs::create_dir_all(parent)?;
        log.record_dir(parent.to_path_buf());
    }
    // Move, not copy, into place (§4.8 step 3) — atomic within the same filesystem.
    fs::rename(&staged_root, &final_dir)
        .with_context(|| format!("Failed to move staged tree into {}", final_dir.display()))?;
    log.record_dir(final_dir.clone());

    let mut created_files = Vec::new();
    let mut created_dirs = vec![final_dir.clone()];

    // The registry doesn't hand back a declared program list, so programs
    // are discovered from the staged tree itself rather than assumed.
    let programs = if package.programs.is_empty() {
        discover_programs(&final_dir)
    } else {
        package.programs.clone()
    };

    for program in &programs {
        let target = final_dir.join("bin").join(program);
        if !target.is_file() {
            continue;
        }
        let link = options.env_root.join("bin").join(program);
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)?;
        }
        create_symlink_idempotent(&target, &link, log)?;
        created_files.push(link);
    }

    if let Some(major) = package.version.major_component() {
        let major_link = options.env_root.join(&package.domain).join(format!("v{major}"));
        create_symlink_idempotent(&final_dir, &major_link, log)?;
        created_files.push(major_link);
    }

    if package.scope_is_global() {
        materialize_global_stubs(package, &programs, &final_dir, options.global_stub_dir, log, &mut created_files)?;
    }

    created_dirs.push(tmp_dir);
    Ok(CreatedPaths {
        files: created_files,
        dirs: created_dirs,
    })
}

/// Lists executable entries under `package_root/bin` and `package_root/sbin`,
/// in the absence of any registry-declared program list (§4.8 step 4).
fn discover_programs(package_root: &Path) -> Vec<String> {
    let mut found = Vec::new();
    for subdir in ["bin", "sbin"] {
        let dir = package_root.join(subdir);
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            if is_executable_file(&entry.path()) {
                if let Some(name) = entry.file_name().to_str() {
                    found.push(name.to_string());
                }
            }
        }
    }
    found.sort();
    found
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

fn create_symlink_idempotent(target: &Path, link: &Path, log: &mut RollbackLog) -> anyhow::Result<()> {
    if let Ok(existing) = fs::read_link(link) {
        if existing.as_path() == target {
            return Ok(());
        }
    }
    if link.exists() && fs::symlink_metadata(link)?.file_type().is_symlink() {
        fs::remove_file(link)?;
    } else if link.exists() {
        // Never overwrite a user file that is not a symlink (§4.8 step 4).
        anyhow::bail!("Refusing to overwrite non-symlink at {}", link.display());
    }
    #[cfg(unix)]
    symlink(target, link).with_context(|| format!("Failed to create symlink {}", link.display()))?;
    #[cfg(not(unix))]
    fs::copy(target, link).with_context(|| format!("Failed to materialize stand-in for {}", link.display()))?;
    log.record_symlink(link.to_path_buf());
    Ok(())
}

/// `scope=global` packages also get a POSIX shell stub under the global
/// stub directory (§4.8 step 5): exec absolute path, fall back to scanning
/// the global env, trigger reinstall, fall back to system command, exit 127.
fn materialize_global_stubs(
    package: &ResolvedPackage,
    programs: &[String],
    final_dir: &Path,
    global_stub_dir: &Path,
    log: &mut RollbackLog,
    created_files: &mut Vec<PathBuf>,
) -> anyhow::Result<()> {
    fs::create_dir_all(global_stub_dir)?;
    for program in programs {
        let absolute = final_dir.join("bin").join(program);
        let stub_path = global_stub_dir.join(program);
        let script = format!(
            r#"#!/bin/sh
# launchpad global stub for {domain} {version}
export DYLD_LIBRARY_PATH="{lib}:$DYLD_LIBRARY_PATH"
export DYLD_FALLBACK_LIBRARY_PATH="{lib}:$DYLD_FALLBACK_LIBRARY_PATH"
export LD_LIBRARY_PATH="{lib}:$LD_LIBRARY_PATH"
if [ -x "{absolute}" ]; then
  exec "{absolute}" "$@"
fi
for candidate in "$HOME"/.local/share/launchpad/global/bin/{program} "$HOME"/.local/share/launchpad/global/sbin/{program}; do
  if [ -x "$candidate" ]; then
    exec "$candidate" "$@"
  fi
done
launchpad install >&2 2>/dev/null || true
if command -v {program} >/dev/null 2>&1; then
  exec {program} "$@"
fi
echo "launchpad: {program} is not available and could not be installed" >&2
exit 127
"#,
            domain = package.domain,
            version = package.version,
            lib = final_dir.join("lib").display(),
            absolute = absolute.display(),
            program = program,
        );
        fs::write(&stub_path, script)?;
        set_executable(&stub_path)?;
        log.record_file(stub_path.clone());
        created_files.push(stub_path);
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::version_range::Version;
    use tempfile::TempDir;

    #[test]
    fn installed_versions_picks_newest_per_domain() {
        let tmp = TempDir::new().unwrap();
        let env_root = tmp.path().join("env");
        fs::create_dir_all(env_root.join("nodejs.org").join("v22.1.0")).unwrap();
        fs::create_dir_all(env_root.join("nodejs.org").join("v22.4.1")).unwrap();
        fs::create_dir_all(env_root.join("nodejs.org").join("v22")).unwrap();
        fs::create_dir_all(env_root.join("redis.io").join("v7.2.0")).unwrap();

        let installed = installed_versions(&env_root);
        assert_eq!(installed.get("nodejs.org").map(String::as_str), Some("22.4.1"));
        assert_eq!(installed.get("redis.io").map(String::as_str), Some("7.2.0"));
    }

    #[test]
    fn installed_versions_is_empty_for_a_missing_env_root() {
        let tmp = TempDir::new().unwrap();
        let installed = installed_versions(&tmp.path().join("nonexistent"));
        assert!(installed.is_empty());
    }

    #[test]
    fn discover_library_paths_finds_lib_and_lib64_under_the_newest_version() {
        let tmp = TempDir::new().unwrap();
        let env_root = tmp.path().join("env");
        fs::create_dir_all(env_root.join("nodejs.org").join("v22.1.0").join("lib")).unwrap();
        fs::create_dir_all(env_root.join("nodejs.org").join("v22.4.1").join("lib")).unwrap();
        fs::create_dir_all(env_root.join("redis.io").join("v7.2.0").join("lib64")).unwrap();

        let paths = discover_library_paths(&env_root);
        assert!(paths.contains(&env_root.join("nodejs.org").join("v22.4.1").join("lib")));
        assert!(!paths.iter().any(|p| p.ends_with("v22.1.0/lib")));
        assert!(paths.contains(&env_root.join("redis.io").join("v7.2.0").join("lib64")));
    }

    #[test]
    fn discover_library_paths_skips_domains_with_no_lib_dir() {
        let tmp = TempDir::new().unwrap();
        let env_root = tmp.path().join("env");
        fs::create_dir_all(env_root.join("git-scm.org").join("v2.44.0").join("bin")).unwrap();

        let paths = discover_library_paths(&env_root);
        assert!(paths.is_empty());
    }

    fn make_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn materialize_creates_bin_symlink_and_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let env_root = tmp.path().join("env");
        let global_root = tmp.path().join("global");
        let stub_dir = tmp.path().join("stubs");
        fs::create_dir_all(&env_root).unwrap();

        let archive_path = tmp.path().join("redis.io.tar.gz");
        make_tar_gz(&archive_path, &[("redis.io/v7.2.0/bin/redis-server", b"binary")]);

        let package = ResolvedPackage {
            domain: "redis.io".to_string(),
            version: Version::parse("7.2.0").unwrap(),
            tarball_url: "https://dist.pkgx.dev/redis.io/linux/x86-64/v7.2.0.tar.gz".to_string(),
            integrity: None,
            programs: vec!["redis-server".to_string()],
            scope: crate::spec::Scope::Local,
            companions: Vec::new(),
        };
        let archives = vec![DownloadedArchive {
            domain: "redis.io".to_string(),
            path: archive_path,
        }];
        let options = MaterializeOptions {
            env_root: &env_root,
            global_env_root: &global_root,
            global_stub_dir: &stub_dir,
        };
        let report = materialize(&[package], &archives, &options).unwrap();
        assert_eq!(report.installed, vec!["redis.io@7.2.0"]);
        assert!(env_root.join("bin").join("redis-server").exists());
        assert!(!env_root.join(".pantry-checkpoint.json").exists());
    }

    #[test]
    fn materialize_skips_packages_already_in_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let env_root = tmp.path().join("env");
        fs::create_dir_all(&env_root).unwrap();
        let mut checkpoint = Checkpoint::default();
        checkpoint.mark_installed("redis.io@7.2.0", &[], &[]);
        checkpoint.save(&env_root).unwrap();

        let package = ResolvedPackage {
            domain: "redis.io".to_string(),
            version: Version::parse("7.2.0").unwrap(),
            tarball_url: String::new(),
            integrity: None,
            programs: Vec::new(),
            scope: crate::spec::Scope::Local,
            companions: Vec::new(),
        };
        let options = MaterializeOptions {
            env_root: &env_root,
            global_env_root: &tmp.path().join("global"),
            global_stub_dir: &tmp.path().join("stubs"),
        };
        let report = materialize(&[package], &[], &options).unwrap();
        assert_eq!(report.skipped, vec!["redis.io@7.2.0"]);
        assert!(report.installed.is_empty());
    }

    #[test]
    fn materialize_discovers_programs_when_registry_declares_none() {
        let tmp = TempDir::new().unwrap();
        let env_root = tmp.path().join("env");
        fs::create_dir_all(&env_root).unwrap();

        let archive_path = tmp.path().join("bun.sh.tar.gz");
        make_tar_gz(
            &archive_path,
            &[
                ("bun.sh/v1.1.0/bin/bun", b"binary"),
                ("bun.sh/v1.1.0/bin/bunx", b"binary"),
            ],
        );

        let package = ResolvedPackage {
            domain: "bun.sh".to_string(),
            version: Version::parse("1.1.0").unwrap(),
            tarball_url: "https://dist.pkgx.dev/bun.sh/linux/x86-64/v1.1.0.tar.gz".to_string(),
            integrity: None,
            programs: Vec::new(),
            scope: crate::spec::Scope::Local,
            companions: Vec::new(),
        };
        let archives = vec![DownloadedArchive {
            domain: "bun.sh".to_string(),
            path: archive_path,
        }];
        let options = MaterializeOptions {
            env_root: &env_root,
            global_env_root: &tmp.path().join("global"),
            global_stub_dir: &tmp.path().join("stubs"),
        };
        materialize(&[package], &archives, &options).unwrap();
        assert!(env_root.join("bin").join("bun").exists());
        assert!(env_root.join("bin").join("bunx").exists());
    }
}
