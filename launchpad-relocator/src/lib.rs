//! Post-install binary relocation: rewrites dynamic-linker references in
//! Mach-O files so they resolve against an environment root instead of the
//! tarball's build-time prefix.

pub use platform::{Arch, Platform};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub mod macho;
mod platform;

#[derive(Error, Debug)]
pub enum RelocationError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("unsupported platform or architecture: {0}")]
    UnsupportedPlatform(String),
    #[error("invalid Mach-O file: {0}")]
    InvalidMachO(String),
    #[error("failed to run `{0}`, is it installed?")]
    SubprocessSpawn(String, #[source] io::Error),
    #[error("`{0}` failed: {1}")]
    SubprocessFailed(String, String),
}

/// One non-fatal warning surfaced to the caller; relocation failures never
/// abort the install (§7: Relocation errors are warned, non-fatal).
#[derive(Debug, Clone)]
pub struct RelocationWarning {
    pub file: PathBuf,
    pub message: String,
}

/// Rewrites every Mach-O file under `package_root/bin` and
/// `package_root/lib` so that `@rpath` and foreign absolute references point
/// at `env_lib_dir`, and adds rpaths for the package's own `lib/` and the
/// global environment. No-op outside macOS.
pub fn relocate_package(
    package_root: &Path,
    env_lib_dir: &Path,
    global_lib_dir: &Path,
) -> Result<Vec<RelocationWarning>, RelocationError> {
    if !Platform::current().map(Platform::is_macos).unwrap_or(false) {
        return Ok(Vec::new());
    }

    let mut warnings = Vec::new();
    for subdir in ["bin", "lib"] {
        let dir = package_root.join(subdir);
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            match relocate_one(path, env_lib_dir, global_lib_dir, subdir == "lib") {
                Ok(true) => debug!("relocated {}", path.display()),
                Ok(false) => {}
                Err(err) => {
                    warn!("failed to relocate {}: {}", path.display(), err);
                    warnings.push(RelocationWarning {
                        file: path.to_path_buf(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
    Ok(warnings)
}

/// Returns `Ok(true)` if the file was a Mach-O file that got touched.
fn relocate_one(
    path: &Path,
    env_lib_dir: &Path,
    global_lib_dir: &Path,
    is_dylib: bool,
) -> Result<bool, RelocationError> {
    if !macho::is_macho_file(path)? {
        return Ok(false);
    }
    let info = macho::parse_macho(path)?;

    let mut touched = false;
    for dependency in &info.dependencies {
        if !macho::needs_relocation(dependency) {
            continue;
        }
        let basename = dependency.rsplit('/').next().unwrap_or(dependency);
        let target = env_lib_dir.join(basename);
        if target.is_file() {
            macho::change_install_name(path, dependency, &target.to_string_lossy())?;
            touched = true;
        }
    }

    if is_dylib {
        if let Some(install_name) = &info.install_name {
            if install_name.starts_with('/') && macho::needs_relocation(install_name) {
                let basename = install_name.rsplit('/').next().unwrap_or(install_name);
                let new_id = env_lib_dir.join(basename);
                macho::change_install_id(path, &new_id.to_string_lossy())?;
                touched = true;
            }
        }
    }

    // Stale rpaths from the tarball's own build-time prefix (e.g. a homebrew
    // Cellar path) point nowhere useful in the installed environment and are
    // dropped before the environment's own rpaths are added.
    for existing in &info.rpaths {
        if macho::needs_relocation(existing) {
            macho::delete_rpath(path, existing)?;
            touched = true;
        }
    }

    let package_lib = path
        .parent()
        .and_then(|p| p.parent())
        .map(|root| root.join("lib"))
        .unwrap_or_else(|| env_lib_dir.to_path_buf());
    for rpath in [package_lib.as_path(), global_lib_dir] {
        let rpath_str = rpath.to_string_lossy();
        if !info.rpaths.iter().any(|existing| existing == rpath_str.as_ref()) {
            macho::add_rpath(path, &rpath_str)?;
            touched = true;
        }
    }

    if touched {
        macho::codesign_adhoc(path)?;
    }
    Ok(touched)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn relocate_package_is_noop_without_any_binaries() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("bin")).unwrap();
        fs::create_dir_all(tmp.path().join("lib")).unwrap();
        let warnings =
            relocate_package(tmp.path(), &tmp.path().join("lib"), Path::new("/nonexistent")).unwrap();
        assert!(warnings.is_empty());
    }
}
